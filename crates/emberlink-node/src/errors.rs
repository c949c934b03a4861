//! Node runtime errors.

use emberlink_proto::ProtocolError;
use thiserror::Error;

use crate::store::StoreError;

/// Errors surfaced to the node application.
#[derive(Error, Debug)]
pub enum NodeError {
    /// No established session; register first
    #[error("not registered with the gateway")]
    NotRegistered,

    /// The broadcast key has not been received yet
    #[error("no broadcast key")]
    NoBroadcastKey,

    /// Name rejected locally before transmission
    #[error("invalid node name: {0}")]
    InvalidName(&'static str),

    /// Outgoing frame failed to encode (oversized payload)
    #[error("frame encoding failed: {0}")]
    Encode(#[from] ProtocolError),

    /// Settings persistence failed
    #[error("settings store: {0}")]
    Store(#[from] StoreError),
}
