//! Frame decoding must be total: any byte string either parses into a
//! frame that re-encodes to the same bytes, or returns an error. Never a
//! panic, never an out-of-bounds read.

#![no_main]

use emberlink_proto::Frame;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(frame) = Frame::decode(data) {
        let reencoded = frame.to_bytes().expect("decoded frames are within the MTU");
        assert_eq!(reencoded, data, "decode/encode must round-trip exactly");
    }
});
