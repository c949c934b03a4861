//! Codec error types.
//!
//! Malformed frames are cheap to produce for anyone with a radio, so every
//! variant here maps to "drop the frame"; none of them are recoverable.

use thiserror::Error;

/// Convenience alias for codec results.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding wire frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame shorter than the minimum for its type
    #[error("frame too short: need {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Minimum length for this frame type
        expected: usize,
        /// Bytes actually available
        actual: usize,
    },

    /// Frame exceeds the radio MTU
    #[error("frame too long: {len} bytes exceeds MTU of {max}")]
    FrameTooLong {
        /// Length of the offending frame
        len: usize,
        /// Maximum allowed length
        max: usize,
    },

    /// Fixed-layout frame with trailing or missing bytes
    #[error("length mismatch for {what}: expected {expected} bytes, got {actual}")]
    LengthMismatch {
        /// Frame or payload being parsed
        what: &'static str,
        /// Exact expected length
        expected: usize,
        /// Bytes actually present
        actual: usize,
    },

    /// First byte is not a known message-type tag
    #[error("unknown message type tag {0:#04x}")]
    UnknownType(u8),

    /// Invalidate frame carries an unknown reason code
    #[error("unknown invalidate reason {0:#04x}")]
    UnknownReason(u8),

    /// Text field is not valid UTF-8
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),
}
