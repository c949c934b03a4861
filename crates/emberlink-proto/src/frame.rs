//! Frame layouts and the top-level encode/decode entry points.
//!
//! Five layouts exist on the wire:
//!
//! ```text
//! ClientHello:
//!   [tag(1)] [public_key(32)] [iv(12)] [hmac(32)]                 = 77 bytes
//! ServerHello:
//!   [tag(1)] [public_key(32)] [iv(12)] [key_id(1)] [hmac(32)]     = 78 bytes
//! Encrypted envelope (all session- and broadcast-keyed types):
//!   [tag(1)] [key_id(1)] [counter(2 LE)] [nonce(12)] [ct ‖ tag16] ≥ 32 bytes
//! ClearNodeData:
//!   [tag(1)] [counter(2 LE)] [payload]                            ≥ 3 bytes
//! InvalidateKey:
//!   [tag(1)] [reason(1)] [hmac(32)]                               = 34 bytes
//! ```
//!
//! The gateway half of the handshake acknowledges the key epoch it
//! assigned; the node adopts it, which lets a rebooted node fall back in
//! step instead of having every frame of a stale epoch dropped silently.
//!
//! Decoding validates the length of every field before copying anything;
//! the single variable-length field (envelope ciphertext) is bounded by
//! the MTU, so no allocation scales with an untrusted claim.

use bytes::BufMut;

use crate::{
    AEAD_TAG_LEN, HANDSHAKE_IV_LEN, HMAC_LEN, MAX_FRAME_LEN, NONCE_LEN, PUBLIC_KEY_LEN,
    errors::{ProtocolError, Result},
    message::{InvalidateReason, MessageType},
};

/// Client handshake frame length: tag + public key + IV + HMAC.
pub const CLIENT_HELLO_LEN: usize = 1 + PUBLIC_KEY_LEN + HANDSHAKE_IV_LEN + HMAC_LEN;

/// Server handshake frame length: client layout plus the acknowledged
/// key epoch byte.
pub const SERVER_HELLO_LEN: usize = CLIENT_HELLO_LEN + 1;

/// Invalidate frame length: tag + reason + HMAC.
pub const INVALIDATE_FRAME_LEN: usize = 1 + 1 + HMAC_LEN;

/// Envelope header length: tag + key_id + counter + nonce.
pub const ENVELOPE_HEADER_LEN: usize = 1 + 1 + 2 + NONCE_LEN;

/// Smallest valid envelope: header plus an empty ciphertext's auth tag.
pub const MIN_ENVELOPE_LEN: usize = ENVELOPE_HEADER_LEN + AEAD_TAG_LEN;

/// An encrypted envelope, common to every session- and broadcast-keyed
/// message type.
///
/// The ciphertext includes the trailing 16-byte Poly1305 tag. The key
/// epoch (`key_id`) and counter are carried in the clear so the receiver
/// can discard stale-epoch and replayed frames before attempting a
/// decrypt; both are also bound into the AEAD associated data, so a
/// tampered header fails authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Message type (must be an envelope type)
    pub msg_type: MessageType,
    /// Key epoch the sender used
    pub key_id: u8,
    /// Per-direction monotonic counter
    pub counter: u16,
    /// AEAD nonce
    pub nonce: [u8; NONCE_LEN],
    /// Ciphertext with trailing auth tag
    pub ciphertext: Vec<u8>,
}

/// A decoded wire frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Node half of the handshake: ephemeral public key, random IV, and
    /// an HMAC under the network key
    ClientHello {
        /// Ephemeral curve25519 public key
        public_key: [u8; PUBLIC_KEY_LEN],
        /// Node-chosen random IV, mixed into key derivation
        iv: [u8; HANDSHAKE_IV_LEN],
        /// HMAC-SHA256 over `tag ‖ public_key ‖ iv` under the network key
        hmac: [u8; HMAC_LEN],
    },

    /// Gateway half of the handshake
    ServerHello {
        /// Ephemeral curve25519 public key
        public_key: [u8; PUBLIC_KEY_LEN],
        /// Gateway-chosen random IV, mixed into key derivation
        iv: [u8; HANDSHAKE_IV_LEN],
        /// Key epoch assigned to the new session
        key_id: u8,
        /// HMAC-SHA256 over `tag ‖ public_key ‖ iv ‖ key_id` under the
        /// network key
        hmac: [u8; HMAC_LEN],
    },

    /// Any encrypted envelope type
    Envelope(Envelope),

    /// Unencrypted upstream data, counter-protected only
    ClearData {
        /// Per-direction monotonic counter
        counter: u16,
        /// Application payload
        payload: Vec<u8>,
    },

    /// Session invalidation notice
    InvalidateKey {
        /// Why the session was destroyed
        reason: InvalidateReason,
        /// HMAC-SHA256 over `tag ‖ reason` under the network key
        hmac: [u8; HMAC_LEN],
    },
}

impl Frame {
    /// Message type of this frame.
    #[must_use]
    pub fn msg_type(&self) -> MessageType {
        match self {
            Self::ClientHello { .. } => MessageType::ClientHello,
            Self::ServerHello { .. } => MessageType::ServerHello,
            Self::Envelope(envelope) => envelope.msg_type,
            Self::ClearData { .. } => MessageType::ClearNodeData,
            Self::InvalidateKey { .. } => MessageType::InvalidateKey,
        }
    }

    /// Serialize into a buffer.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FrameTooLong` if the result would exceed the MTU
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        let len = self.encoded_len();
        if len > MAX_FRAME_LEN {
            return Err(ProtocolError::FrameTooLong { len, max: MAX_FRAME_LEN });
        }

        match self {
            Self::ClientHello { public_key, iv, hmac } => {
                dst.put_u8(MessageType::ClientHello.tag());
                dst.put_slice(public_key);
                dst.put_slice(iv);
                dst.put_slice(hmac);
            },
            Self::ServerHello { public_key, iv, key_id, hmac } => {
                dst.put_u8(MessageType::ServerHello.tag());
                dst.put_slice(public_key);
                dst.put_slice(iv);
                dst.put_u8(*key_id);
                dst.put_slice(hmac);
            },
            Self::Envelope(envelope) => {
                dst.put_u8(envelope.msg_type.tag());
                dst.put_u8(envelope.key_id);
                dst.put_u16_le(envelope.counter);
                dst.put_slice(&envelope.nonce);
                dst.put_slice(&envelope.ciphertext);
            },
            Self::ClearData { counter, payload } => {
                dst.put_u8(MessageType::ClearNodeData.tag());
                dst.put_u16_le(*counter);
                dst.put_slice(payload);
            },
            Self::InvalidateKey { reason, hmac } => {
                dst.put_u8(MessageType::InvalidateKey.tag());
                dst.put_u8(reason.code());
                dst.put_slice(hmac);
            },
        }

        Ok(())
    }

    /// Serialize into a fresh byte vector.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FrameTooLong` if the result would exceed the MTU
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode(&mut out)?;
        Ok(out)
    }

    /// Length of the serialized frame.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::ClientHello { .. } => CLIENT_HELLO_LEN,
            Self::ServerHello { .. } => SERVER_HELLO_LEN,
            Self::Envelope(envelope) => ENVELOPE_HEADER_LEN + envelope.ciphertext.len(),
            Self::ClearData { payload, .. } => 1 + 2 + payload.len(),
            Self::InvalidateKey { .. } => INVALIDATE_FRAME_LEN,
        }
    }

    /// Parse a frame from raw radio bytes.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FrameTooShort` if no tag byte is present or a
    ///   layout is truncated
    /// - `ProtocolError::FrameTooLong` if the input exceeds the MTU
    /// - `ProtocolError::UnknownType` / `UnknownReason` for unassigned
    ///   tag or reason values
    /// - `ProtocolError::LengthMismatch` if a fixed layout has trailing
    ///   bytes
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_FRAME_LEN {
            return Err(ProtocolError::FrameTooLong { len: bytes.len(), max: MAX_FRAME_LEN });
        }
        let (&tag, rest) = bytes
            .split_first()
            .ok_or(ProtocolError::FrameTooShort { expected: 1, actual: 0 })?;

        let msg_type = MessageType::from_tag(tag)?;
        match msg_type {
            MessageType::ClientHello => decode_client_hello(rest),
            MessageType::ServerHello => decode_server_hello(rest),
            MessageType::ClearNodeData => decode_clear_data(rest),
            MessageType::InvalidateKey => decode_invalidate(bytes.len(), rest),
            _ => decode_envelope(msg_type, bytes.len(), rest),
        }
    }
}

fn decode_client_hello(rest: &[u8]) -> Result<Frame> {
    if rest.len() != CLIENT_HELLO_LEN - 1 {
        return Err(ProtocolError::LengthMismatch {
            what: "client hello",
            expected: CLIENT_HELLO_LEN,
            actual: rest.len() + 1,
        });
    }

    let mut public_key = [0u8; PUBLIC_KEY_LEN];
    let mut iv = [0u8; HANDSHAKE_IV_LEN];
    let mut hmac = [0u8; HMAC_LEN];
    public_key.copy_from_slice(&rest[..PUBLIC_KEY_LEN]);
    iv.copy_from_slice(&rest[PUBLIC_KEY_LEN..PUBLIC_KEY_LEN + HANDSHAKE_IV_LEN]);
    hmac.copy_from_slice(&rest[PUBLIC_KEY_LEN + HANDSHAKE_IV_LEN..]);

    Ok(Frame::ClientHello { public_key, iv, hmac })
}

fn decode_server_hello(rest: &[u8]) -> Result<Frame> {
    if rest.len() != SERVER_HELLO_LEN - 1 {
        return Err(ProtocolError::LengthMismatch {
            what: "server hello",
            expected: SERVER_HELLO_LEN,
            actual: rest.len() + 1,
        });
    }

    let mut public_key = [0u8; PUBLIC_KEY_LEN];
    let mut iv = [0u8; HANDSHAKE_IV_LEN];
    let mut hmac = [0u8; HMAC_LEN];
    public_key.copy_from_slice(&rest[..PUBLIC_KEY_LEN]);
    iv.copy_from_slice(&rest[PUBLIC_KEY_LEN..PUBLIC_KEY_LEN + HANDSHAKE_IV_LEN]);
    let key_id = rest[PUBLIC_KEY_LEN + HANDSHAKE_IV_LEN];
    hmac.copy_from_slice(&rest[PUBLIC_KEY_LEN + HANDSHAKE_IV_LEN + 1..]);

    Ok(Frame::ServerHello { public_key, iv, key_id, hmac })
}

fn decode_envelope(msg_type: MessageType, total_len: usize, rest: &[u8]) -> Result<Frame> {
    if total_len < MIN_ENVELOPE_LEN {
        return Err(ProtocolError::FrameTooShort {
            expected: MIN_ENVELOPE_LEN,
            actual: total_len,
        });
    }

    let key_id = rest[0];
    let counter = u16::from_le_bytes([rest[1], rest[2]]);
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&rest[3..3 + NONCE_LEN]);
    // Bounded by the MTU check in `Frame::decode`.
    let ciphertext = rest[3 + NONCE_LEN..].to_vec();

    Ok(Frame::Envelope(Envelope { msg_type, key_id, counter, nonce, ciphertext }))
}

fn decode_clear_data(rest: &[u8]) -> Result<Frame> {
    if rest.len() < 2 {
        return Err(ProtocolError::FrameTooShort { expected: 3, actual: rest.len() + 1 });
    }
    let counter = u16::from_le_bytes([rest[0], rest[1]]);
    Ok(Frame::ClearData { counter, payload: rest[2..].to_vec() })
}

fn decode_invalidate(total_len: usize, rest: &[u8]) -> Result<Frame> {
    if total_len != INVALIDATE_FRAME_LEN {
        return Err(ProtocolError::LengthMismatch {
            what: "invalidate frame",
            expected: INVALIDATE_FRAME_LEN,
            actual: total_len,
        });
    }
    let reason = InvalidateReason::from_code(rest[0])?;
    let mut hmac = [0u8; HMAC_LEN];
    hmac.copy_from_slice(&rest[1..]);
    Ok(Frame::InvalidateKey { reason, hmac })
}
