//! Emberlink wire frame codec.
//!
//! Emberlink frames travel over a connectionless broadcast radio with
//! 6-byte addressing and a 250-byte MTU. Every frame starts with a 1-byte
//! message-type tag followed by a type-specific fixed or bounded layout.
//!
//! This crate is pure data: it parses and serializes frames, validates
//! lengths and tags, and defines the typed control payloads that travel
//! inside the encrypted channel. It performs no cryptography and holds no
//! session state; sealing and opening the encrypted envelopes is the job of
//! the session layer.
//!
//! # Invariants
//!
//! - Every field has an explicit length. The decoder rejects frames that
//!   are short, exceed the MTU, or carry an unknown tag.
//! - Decoding never allocates proportionally to an untrusted length claim:
//!   the only variable-length copy is bounded by the MTU.

pub mod control;
pub mod errors;
pub mod frame;
pub mod mac_addr;
pub mod message;

pub use control::{
    BroadcastKeyResponse, ClockRequest, ClockResponse, NodeCommand, NodeNameResult, NodeNameSet,
};
pub use errors::{ProtocolError, Result};
pub use frame::{
    CLIENT_HELLO_LEN, ENVELOPE_HEADER_LEN, Envelope, Frame, INVALIDATE_FRAME_LEN,
    MIN_ENVELOPE_LEN, SERVER_HELLO_LEN,
};
pub use mac_addr::MacAddress;
pub use message::{Direction, InvalidateReason, Keying, MessageType};

/// Largest frame the radio can carry (ESP-NOW-class MTU).
pub const MAX_FRAME_LEN: usize = 250;

/// Poly1305 authentication tag length appended to every ciphertext.
pub const AEAD_TAG_LEN: usize = 16;

/// AEAD nonce length carried in every encrypted envelope.
pub const NONCE_LEN: usize = 12;

/// Handshake initialization vector length.
pub const HANDSHAKE_IV_LEN: usize = 12;

/// HMAC-SHA256 tag length on handshake and invalidate frames.
pub const HMAC_LEN: usize = 32;

/// Curve25519 public key length in handshake frames.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Maximum node name length in bytes.
pub const MAX_NODE_NAME_LEN: usize = 32;
