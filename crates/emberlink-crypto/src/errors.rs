//! Crypto error types.

use thiserror::Error;

/// Errors from the cryptographic primitives.
///
/// Deliberately carries no detail about *why* an authentication failed;
/// distinguishing tag failures from padding or length failures hands an
/// oracle to an attacker.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    /// AEAD open failed: wrong key, wrong nonce, or tampered data
    #[error("authenticated decryption failed")]
    DecryptionFailed,

    /// The Diffie-Hellman exchange produced the degenerate all-zero
    /// shared secret (peer sent a low-order point)
    #[error("non-contributory key exchange")]
    NonContributoryExchange,
}
