//! Bounded node table.
//!
//! One record per peer address, capped at a fixed capacity. Lookups by
//! address and by name are O(1); the name index mirrors the records and
//! enforces uniqueness across registered peers. Records survive session
//! invalidation (keeping key-epoch continuity for the next handshake) and
//! are removed only by explicit eviction.

use std::collections::{HashMap, VecDeque};

use emberlink_core::{PeerStatus, ReplayWindow, Session};
use emberlink_proto::MacAddress;

/// Default node table capacity.
pub const DEFAULT_MAX_NODES: usize = 100;

/// A downstream frame waiting for a sleepy peer's next wake.
#[derive(Debug, Clone)]
pub struct PendingDownstream<I> {
    /// When the frame was queued
    pub queued_at: I,
    /// Encoded frame, sealed and ready to transmit
    pub frame: Vec<u8>,
}

/// Per-peer state held by the gateway.
pub struct NodeRecord<I> {
    /// Peer address
    pub mac: MacAddress,
    /// Lifecycle state
    pub status: PeerStatus,
    /// Established session; present only when registered
    pub session: Option<Session>,
    /// Key epoch of the last minted session; the next handshake
    /// strictly increments it (mod 256)
    pub last_key_id: u8,
    /// Claimed node name, unique across registered peers
    pub name: Option<String>,
    /// Peer deep-sleeps between transmissions
    pub sleepy: bool,
    /// Last reported signal strength
    pub rssi: Option<i8>,
    /// Frames accepted from this peer
    pub packets_ok: u32,
    /// Frames rejected from this peer
    pub packets_err: u32,
    /// Time of the last valid frame either way
    pub last_activity: I,
    /// Whether the current broadcast key reached this peer under the
    /// current session
    pub broadcast_key_sent: bool,
    /// Acceptance window for this peer's broadcast-keyed frames
    pub broadcast_recv: ReplayWindow,
    /// Acceptance window for this peer's unencrypted frames
    pub clear_recv: ReplayWindow,
    /// Downstream frames waiting for the peer's next wake
    pub pending_downstream: VecDeque<PendingDownstream<I>>,
}

impl<I: Copy> NodeRecord<I> {
    fn new(mac: MacAddress, now: I) -> Self {
        Self {
            mac,
            status: PeerStatus::Unregistered,
            session: None,
            last_key_id: 0,
            name: None,
            sleepy: false,
            rssi: None,
            packets_ok: 0,
            packets_err: 0,
            last_activity: now,
            broadcast_key_sent: false,
            broadcast_recv: ReplayWindow::new(),
            clear_recv: ReplayWindow::new(),
            pending_downstream: VecDeque::new(),
        }
    }

    /// Tear the session down: key material is dropped (and zeroized by
    /// its own destructor), status returns to `Unregistered`. The record
    /// itself stays, preserving `last_key_id` and statistics.
    pub fn invalidate(&mut self) {
        self.session = None;
        self.status = PeerStatus::Unregistered;
        self.broadcast_key_sent = false;
        self.pending_downstream.clear();
    }
}

/// Bounded associative store of peer records, keyed by address.
pub struct NodeTable<I> {
    records: HashMap<MacAddress, NodeRecord<I>>,
    names: HashMap<String, MacAddress>,
    capacity: usize,
}

impl<I: Copy> NodeTable<I> {
    /// Create a table bounded at `capacity` records.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            records: HashMap::with_capacity(capacity),
            names: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Look up a record by address.
    #[must_use]
    pub fn find_by_mac(&self, mac: &MacAddress) -> Option<&NodeRecord<I>> {
        self.records.get(mac)
    }

    /// Mutable lookup by address.
    pub fn find_by_mac_mut(&mut self, mac: &MacAddress) -> Option<&mut NodeRecord<I>> {
        self.records.get_mut(mac)
    }

    /// Look up the address claiming a name.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<&NodeRecord<I>> {
        self.names.get(name).and_then(|mac| self.records.get(mac))
    }

    /// Fetch the record for `mac`, creating it if the table has room.
    /// Returns `None` only when the table is at capacity and the address
    /// is new.
    pub fn find_or_insert(&mut self, mac: MacAddress, now: I) -> Option<&mut NodeRecord<I>> {
        if !self.records.contains_key(&mac) && self.records.len() >= self.capacity {
            return None;
        }
        Some(self.records.entry(mac).or_insert_with(|| NodeRecord::new(mac, now)))
    }

    /// Remove a record entirely, releasing its name.
    pub fn remove(&mut self, mac: &MacAddress) -> Option<NodeRecord<I>> {
        let record = self.records.remove(mac)?;
        if let Some(name) = &record.name {
            self.names.remove(name);
        }
        Some(record)
    }

    /// Try to claim `name` for `mac`. Fails if another record holds it.
    /// An existing claim by the same record is released first, so a node
    /// can rename itself.
    pub fn claim_name(&mut self, mac: MacAddress, name: &str) -> bool {
        if let Some(owner) = self.names.get(name) {
            return *owner == mac;
        }
        let Some(record) = self.records.get_mut(&mac) else {
            return false;
        };
        if let Some(previous) = record.name.take() {
            self.names.remove(&previous);
        }
        record.name = Some(name.to_owned());
        self.names.insert(name.to_owned(), mac);
        true
    }

    /// Iterate over registered records. Order is unspecified.
    pub fn iterate_active(&self) -> impl Iterator<Item = &NodeRecord<I>> {
        self.records.values().filter(|record| record.status.is_registered())
    }

    /// Addresses of registered records, for mutation loops.
    #[must_use]
    pub fn active_macs(&self) -> Vec<MacAddress> {
        self.iterate_active().map(|record| record.mac).collect()
    }

    /// Number of registered records.
    #[must_use]
    pub fn count_active(&self) -> usize {
        self.iterate_active().count()
    }

    /// Total records, registered or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All record addresses, for sweep loops.
    #[must_use]
    pub fn all_macs(&self) -> Vec<MacAddress> {
        self.records.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(last: u8) -> MacAddress {
        MacAddress::new([0xAA, 0, 0, 0, 0, last])
    }

    #[test]
    fn insert_and_find() {
        let mut table = NodeTable::new(4);
        table.find_or_insert(mac(1), 0u64).unwrap();
        assert!(table.find_by_mac(&mac(1)).is_some());
        assert!(table.find_by_mac(&mac(2)).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn capacity_bound_rejects_new_addresses() {
        let mut table = NodeTable::new(2);
        table.find_or_insert(mac(1), 0u64).unwrap();
        table.find_or_insert(mac(2), 0u64).unwrap();
        assert!(table.find_or_insert(mac(3), 0u64).is_none());
        // Existing addresses still resolve at capacity
        assert!(table.find_or_insert(mac(1), 0u64).is_some());
    }

    #[test]
    fn name_uniqueness_is_enforced() {
        let mut table = NodeTable::new(4);
        table.find_or_insert(mac(1), 0u64).unwrap();
        table.find_or_insert(mac(2), 0u64).unwrap();

        assert!(table.claim_name(mac(1), "kitchen"));
        assert!(!table.claim_name(mac(2), "kitchen"));
        assert!(table.claim_name(mac(2), "porch"));
        assert_eq!(table.find_by_name("kitchen").unwrap().mac, mac(1));
    }

    #[test]
    fn rename_releases_the_old_name() {
        let mut table = NodeTable::new(4);
        table.find_or_insert(mac(1), 0u64).unwrap();
        assert!(table.claim_name(mac(1), "kitchen"));
        assert!(table.claim_name(mac(1), "pantry"));
        assert!(table.find_by_name("kitchen").is_none());

        table.find_or_insert(mac(2), 0u64).unwrap();
        assert!(table.claim_name(mac(2), "kitchen"));
    }

    #[test]
    fn reclaiming_own_name_succeeds() {
        let mut table = NodeTable::new(4);
        table.find_or_insert(mac(1), 0u64).unwrap();
        assert!(table.claim_name(mac(1), "kitchen"));
        assert!(table.claim_name(mac(1), "kitchen"));
    }

    #[test]
    fn remove_releases_the_name() {
        let mut table = NodeTable::new(4);
        table.find_or_insert(mac(1), 0u64).unwrap();
        table.claim_name(mac(1), "kitchen");
        table.remove(&mac(1));
        assert!(table.find_by_name("kitchen").is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn active_count_tracks_status() {
        let mut table = NodeTable::new(4);
        table.find_or_insert(mac(1), 0u64).unwrap();
        assert_eq!(table.count_active(), 0);
        table.find_by_mac_mut(&mac(1)).unwrap().status = PeerStatus::Registered;
        assert_eq!(table.count_active(), 1);
        table.find_by_mac_mut(&mac(1)).unwrap().invalidate();
        assert_eq!(table.count_active(), 0);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn invalidate_preserves_epoch_continuity() {
        let mut table = NodeTable::new(4);
        let record = table.find_or_insert(mac(1), 0u64).unwrap();
        record.last_key_id = 7;
        record.status = PeerStatus::Registered;
        record.invalidate();
        assert_eq!(table.find_by_mac(&mac(1)).unwrap().last_key_id, 7);
    }
}
