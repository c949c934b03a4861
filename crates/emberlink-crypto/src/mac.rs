//! HMAC-SHA256 authentication for clear-text frames.
//!
//! Handshake and invalidate frames travel before (or after) a session key
//! exists, so they are authenticated with the pre-shared network key
//! instead. Proves membership in the network; defends against strangers,
//! not against a compromised member.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Compute the HMAC-SHA256 tag over the concatenation of `parts` under
/// the network key.
#[must_use]
pub fn handshake_tag(network_key: &[u8; 32], parts: &[&[u8]]) -> [u8; 32] {
    let Ok(mut mac) = HmacSha256::new_from_slice(network_key) else {
        unreachable!("HMAC-SHA256 accepts any key size");
    };
    for part in parts {
        mac.update(part);
    }
    let digest = mac.finalize().into_bytes();

    let mut tag = [0u8; 32];
    tag.copy_from_slice(&digest);
    tag
}

/// Verify a received tag in constant time.
#[must_use]
pub fn verify_handshake_tag(network_key: &[u8; 32], parts: &[&[u8]], tag: &[u8; 32]) -> bool {
    let expected = handshake_tag(network_key, parts);
    expected.ct_eq(tag).into()
}
