//! Session-layer error taxonomy.
//!
//! Every variant corresponds to a defined handling policy: malformed
//! frames are dropped silently, authentication failures invalidate the
//! session, replay rejects count toward a threshold, stale key epochs are
//! dropped without side effects (they are expected during crossed
//! handshakes).

use emberlink_proto::{MessageType, ProtocolError};
use thiserror::Error;

use emberlink_crypto::CryptoError;

/// Errors from the session state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Frame failed structural decoding
    #[error("malformed frame: {0}")]
    BadFrame(#[from] ProtocolError),

    /// Handshake or invalidate HMAC did not verify under the network key
    #[error("handshake authentication failed")]
    HandshakeAuthentication,

    /// The Diffie-Hellman exchange was degenerate
    #[error("key exchange failed: {0}")]
    KeyExchange(CryptoError),

    /// AEAD open failed under the session or broadcast key
    #[error("frame decryption failed")]
    DecryptFailed,

    /// Frame carries a key epoch other than the session's current one.
    /// Expected during crossed handshakes; dropped without side effects.
    #[error("stale key epoch: frame has {got}, session has {expected}")]
    StaleKeyEpoch {
        /// The session's current epoch
        expected: u8,
        /// The epoch carried by the frame
        got: u8,
    },

    /// Counter outside the acceptance window
    #[error("replay rejected: counter {counter} after {last} (consecutive rejects: {consecutive})")]
    ReplayRejected {
        /// The rejected counter value
        counter: u16,
        /// Last accepted counter
        last: u16,
        /// Consecutive rejects on this window, including this one
        consecutive: u8,
    },

    /// Envelope type travels in the opposite direction for this role
    #[error("unexpected direction for {0:?}")]
    WrongDirection(MessageType),

    /// No session key is established
    #[error("no established session")]
    NotRegistered,
}

impl SessionError {
    /// Whether this failure must tear the session down immediately
    /// (authentication-class failures), as opposed to dropping the frame.
    #[must_use]
    pub fn invalidates_session(&self) -> bool {
        matches!(self, Self::DecryptFailed | Self::HandshakeAuthentication)
    }
}
