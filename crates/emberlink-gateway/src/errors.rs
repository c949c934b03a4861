//! Gateway runtime errors.

use emberlink_proto::{MacAddress, ProtocolError};
use thiserror::Error;

use crate::store::StoreError;

/// Errors surfaced to the gateway's caller. Frame-level failures from
/// peers never appear here; those are handled by drop/invalidate policy
/// inside the dispatcher.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Downstream send addressed to an address with no record
    #[error("unknown node {0}")]
    UnknownNode(MacAddress),

    /// Downstream send addressed to a peer without an established session
    #[error("node {0} has no established session")]
    NotRegistered(MacAddress),

    /// Outgoing frame failed to encode (oversized payload)
    #[error("frame encoding failed: {0}")]
    Encode(#[from] ProtocolError),

    /// Settings persistence failed
    #[error("settings store: {0}")]
    Store(#[from] StoreError),
}
