//! Typed control payload parsers must be total over arbitrary bytes.

#![no_main]

use emberlink_proto::{
    BroadcastKeyResponse, ClockRequest, ClockResponse, NodeCommand, NodeNameResult, NodeNameSet,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = ClockRequest::from_bytes(data);
    let _ = ClockResponse::from_bytes(data);
    let _ = NodeNameSet::from_bytes(data);
    let _ = NodeNameResult::from_bytes(data);
    let _ = BroadcastKeyResponse::from_bytes(data);
    let _ = NodeCommand::parse(data);
});
