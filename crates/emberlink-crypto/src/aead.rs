//! ChaCha20-Poly1305 sealing with structured nonces.
//!
//! Nonce layout (12 bytes):
//!
//! ```text
//! [prefix(4, random)] [key_id(1)] [direction(1)] [counter(2 LE)] [zero(4)]
//! ```
//!
//! The (key_id, direction, counter) triple makes the nonce unique per key
//! and direction even if the random prefix repeats; the prefix adds margin
//! when counters are disabled by configuration.

use chacha20poly1305::{
    ChaCha20Poly1305, Nonce,
    aead::{Aead, KeyInit, Payload},
};

use crate::{errors::CryptoError, kdf::SymmetricKey};

/// Build the 12-byte AEAD nonce from its protocol fields.
#[must_use]
pub fn build_nonce(prefix: [u8; 4], key_id: u8, direction: u8, counter: u16) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[0..4].copy_from_slice(&prefix);
    nonce[4] = key_id;
    nonce[5] = direction;
    nonce[6..8].copy_from_slice(&counter.to_le_bytes());
    nonce
}

/// Encrypt and authenticate. Returns ciphertext with the 16-byte Poly1305
/// tag appended.
#[must_use]
pub fn seal(key: &SymmetricKey, nonce: &[u8; 12], aad: &[u8], plaintext: &[u8]) -> Vec<u8> {
    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
    let Ok(ciphertext) = cipher.encrypt(Nonce::from_slice(nonce), Payload { msg: plaintext, aad })
    else {
        unreachable!("ChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };
    ciphertext
}

/// Verify and decrypt a ciphertext produced by [`seal`].
///
/// # Errors
///
/// - `CryptoError::DecryptionFailed` if the key, nonce, associated data,
///   or ciphertext do not match what was sealed
pub fn open(
    key: &SymmetricKey,
    nonce: &[u8; 12],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map_err(|_| CryptoError::DecryptionFailed)
}
