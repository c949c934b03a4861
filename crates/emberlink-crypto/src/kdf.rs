//! Domain-separated key derivation with HKDF-SHA256.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::{KEY_LEN, dh::SharedSecret};

/// Label for deriving a per-node session key.
const SESSION_LABEL: &[u8] = b"EIoT-session";

/// Label for deriving the broadcast key of an epoch.
const BROADCAST_LABEL: &[u8] = b"EIoT-bcast";

/// A 32-byte symmetric AEAD key, zeroized on drop.
#[derive(Clone)]
pub struct SymmetricKey([u8; KEY_LEN]);

impl SymmetricKey {
    /// Wrap raw key bytes (e.g. a broadcast key received on the wire).
    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Whether every byte is zero. A registered session must never hold
    /// an all-zero key.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

// Keys never appear in logs.
impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

/// Derive a session key from the handshake's shared secret and both
/// sides' random IVs.
///
/// Info layout: `"EIoT-session" ‖ IV_node ‖ IV_gateway`. Both IVs are
/// mixed in so neither side alone controls the derivation input.
#[must_use]
pub fn derive_session_key(
    shared: &SharedSecret,
    node_iv: &[u8; 12],
    gateway_iv: &[u8; 12],
) -> SymmetricKey {
    let hkdf = Hkdf::<Sha256>::new(None, shared.as_bytes());

    let mut info = Vec::with_capacity(SESSION_LABEL.len() + 24);
    info.extend_from_slice(SESSION_LABEL);
    info.extend_from_slice(node_iv);
    info.extend_from_slice(gateway_iv);

    let mut key = [0u8; KEY_LEN];
    let Ok(()) = hkdf.expand(&info, &mut key) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };
    SymmetricKey(key)
}

/// Derive the broadcast key for an epoch from the gateway's long-lived
/// broadcast master secret.
#[must_use]
pub fn derive_broadcast_key(master: &[u8; KEY_LEN], epoch: u8) -> SymmetricKey {
    let hkdf = Hkdf::<Sha256>::new(None, master);

    let mut info = Vec::with_capacity(BROADCAST_LABEL.len() + 1);
    info.extend_from_slice(BROADCAST_LABEL);
    info.push(epoch);

    let mut key = [0u8; KEY_LEN];
    let Ok(()) = hkdf.expand(&info, &mut key) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };
    SymmetricKey(key)
}
