//! Broadcast key management.
//!
//! The gateway keeps one broadcast key per epoch, derived from a random
//! long-lived master secret. The key reaches each node under that node's
//! session key; broadcast frames then carry the epoch in the envelope's
//! `key_id` slot so receivers can discard frames from a rotated-out
//! epoch the same way they discard stale session epochs.

use emberlink_core::Environment;
use emberlink_crypto::{SymmetricKey, derive_broadcast_key};
use emberlink_proto::BroadcastKeyResponse;
use zeroize::Zeroize;

/// Broadcast key state for the current epoch.
pub struct BroadcastState {
    master: [u8; 32],
    epoch: u8,
    key: SymmetricKey,
    send_counter: u16,
}

impl BroadcastState {
    /// Draw a fresh master secret and derive epoch 1.
    #[must_use]
    pub fn new<E: Environment>(env: &E) -> Self {
        let master: [u8; 32] = env.random_array();
        let key = derive_broadcast_key(&master, 1);
        Self { master, epoch: 1, key, send_counter: 1 }
    }

    /// Current epoch.
    #[must_use]
    pub fn epoch(&self) -> u8 {
        self.epoch
    }

    /// Current broadcast key.
    #[must_use]
    pub fn key(&self) -> &SymmetricKey {
        &self.key
    }

    /// Consume the next downstream broadcast counter.
    pub fn next_counter(&mut self) -> u16 {
        let counter = self.send_counter;
        self.send_counter = self.send_counter.wrapping_add(1);
        counter
    }

    /// Advance to the next epoch: re-derive the key and restart the
    /// downstream counter. Receivers reset their windows when they adopt
    /// the new key.
    pub fn rotate(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        self.key = derive_broadcast_key(&self.master, self.epoch);
        self.send_counter = 1;
    }

    /// The key-delivery payload for one recipient.
    #[must_use]
    pub fn response(&self) -> BroadcastKeyResponse {
        BroadcastKeyResponse { epoch: self.epoch, key: *self.key.as_bytes() }
    }
}

impl Drop for BroadcastState {
    fn drop(&mut self) {
        self.master.zeroize();
    }
}
