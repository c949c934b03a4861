//! Emberlink cryptographic primitives.
//!
//! Building blocks for the session subsystem. Pure functions with
//! deterministic outputs; callers provide random bytes, which keeps every
//! operation reproducible under a seeded test environment.
//!
//! # Key lifecycle
//!
//! ```text
//! Ephemeral x25519 exchange (per handshake)
//!        │
//!        ▼
//! HKDF-SHA256("EIoT-session", shared ‖ IV_node ‖ IV_gateway)
//!        │
//!        ▼
//! Session key ── ChaCha20-Poly1305 per-frame AEAD
//!
//! Gateway broadcast master (random, long-lived)
//!        │
//!        ▼
//! HKDF-SHA256("EIoT-bcast", master ‖ epoch)
//!        │
//!        ▼
//! Broadcast key ── one-to-many downstream AEAD
//! ```
//!
//! # Security
//!
//! - Domain separation: session and broadcast keys use distinct HKDF
//!   labels, so material from one hierarchy can never collide with the
//!   other.
//! - Nonce structure binds each frame to (key epoch, direction, counter);
//!   uniqueness per key holds regardless of the random prefix.
//! - Handshake frames are authenticated with HMAC-SHA256 under the
//!   pre-shared network key; tags are compared in constant time.
//! - Session keys and shared secrets are zeroized on drop.

#![forbid(unsafe_code)]

pub mod aead;
pub mod dh;
pub mod errors;
pub mod kdf;
pub mod mac;

pub use aead::{build_nonce, open, seal};
pub use dh::{DhKeyPair, SharedSecret};
pub use errors::CryptoError;
pub use kdf::{SymmetricKey, derive_broadcast_key, derive_session_key};
pub use mac::{handshake_tag, verify_handshake_tag};

/// Length of every symmetric key in the protocol.
pub const KEY_LEN: usize = 32;
