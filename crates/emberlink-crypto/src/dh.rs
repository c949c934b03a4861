//! Ephemeral curve25519 Diffie-Hellman for the session handshake.
//!
//! Key pairs are built from caller-provided seed bytes rather than an
//! internal RNG so a seeded environment reproduces handshakes exactly.

use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::errors::CryptoError;

/// An ephemeral x25519 key pair, alive for one handshake.
pub struct DhKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl DhKeyPair {
    /// Build a key pair from 32 random bytes. The seed is clamped per
    /// curve25519 rules by the underlying implementation.
    #[must_use]
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let secret = StaticSecret::from(seed);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Public key bytes to place in a handshake frame.
    #[must_use]
    pub fn public_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// Complete the exchange against the peer's public key. Does not
    /// consume the pair: an unauthentic reply must not burn the
    /// in-flight handshake.
    ///
    /// # Errors
    ///
    /// - `CryptoError::NonContributoryExchange` if the peer supplied a
    ///   low-order point and the shared secret is degenerate
    pub fn agree(&self, peer_public: &[u8; 32]) -> Result<SharedSecret, CryptoError> {
        let shared = self.secret.diffie_hellman(&PublicKey::from(*peer_public));
        if !shared.was_contributory() {
            return Err(CryptoError::NonContributoryExchange);
        }
        Ok(SharedSecret(shared.to_bytes()))
    }
}

/// The raw Diffie-Hellman output, input to session key derivation.
///
/// Zeroized on drop; never leaves the handshake path.
pub struct SharedSecret([u8; 32]);

impl SharedSecret {
    /// Raw shared secret bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Drop for SharedSecret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_sides_agree_on_the_shared_secret() {
        let node = DhKeyPair::from_seed([0x11; 32]);
        let gateway = DhKeyPair::from_seed([0x22; 32]);

        let node_public = node.public_bytes();
        let gateway_public = gateway.public_bytes();

        let from_node = node.agree(&gateway_public).unwrap();
        let from_gateway = gateway.agree(&node_public).unwrap();

        assert_eq!(from_node.as_bytes(), from_gateway.as_bytes());
    }

    #[test]
    fn different_seeds_produce_different_publics() {
        let a = DhKeyPair::from_seed([0x01; 32]);
        let b = DhKeyPair::from_seed([0x02; 32]);
        assert_ne!(a.public_bytes(), b.public_bytes());
    }

    #[test]
    fn low_order_peer_point_is_rejected() {
        let node = DhKeyPair::from_seed([0x33; 32]);
        // The identity point is low-order; the exchange must not yield a key.
        let result = node.agree(&[0u8; 32]);
        assert_eq!(result.err(), Some(CryptoError::NonContributoryExchange));
    }
}
