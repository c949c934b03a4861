//! Clock synchronization arithmetic.
//!
//! Four timestamps, NTP style: the node stamps its request (t1), the
//! gateway stamps receive (t2) and transmit (t3), the node stamps the
//! response's arrival (t4). From those:
//!
//! ```text
//! offset     = ((t2 − t1) + (t3 − t4)) / 2
//! round trip = (t4 − t1) − (t3 − t2)
//! ```
//!
//! Millisecond-class accuracy is the target; plenty for scheduling a
//! deep-sleep window.

/// Clock-sync state for one node.
#[derive(Debug, Clone, Default)]
pub struct ClockSync {
    pending_t1: Option<u64>,
    offset_micros: Option<i64>,
    round_trip_micros: Option<u64>,
}

impl ClockSync {
    /// Fresh state with no sync performed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the transmit timestamp of an outgoing request.
    pub fn begin(&mut self, t1: u64) {
        self.pending_t1 = Some(t1);
    }

    /// Complete a sync from the response timestamps plus the local
    /// arrival time `t4`. Returns `(offset, round_trip)` in microseconds,
    /// or `None` if the echoed `t1` does not match the outstanding
    /// request.
    pub fn complete(&mut self, t1: u64, t2: u64, t3: u64, t4: u64) -> Option<(i64, u64)> {
        let pending = self.pending_t1.take()?;
        if pending != t1 {
            return None;
        }

        // i128 keeps the subtractions exact for any u64 inputs.
        let offset = ((i128::from(t2) - i128::from(t1)) + (i128::from(t3) - i128::from(t4))) / 2;
        let round_trip = (i128::from(t4) - i128::from(t1)) - (i128::from(t3) - i128::from(t2));

        let offset = i64::try_from(offset).ok()?;
        let round_trip = u64::try_from(round_trip.max(0)).ok()?;

        self.offset_micros = Some(offset);
        self.round_trip_micros = Some(round_trip);
        Some((offset, round_trip))
    }

    /// Last computed offset of the gateway clock relative to ours.
    #[must_use]
    pub fn offset_micros(&self) -> Option<i64> {
        self.offset_micros
    }

    /// Last computed round-trip time.
    #[must_use]
    pub fn round_trip_micros(&self) -> Option<u64> {
        self.round_trip_micros
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symmetric_path_recovers_skew_and_round_trip() {
        let mut sync = ClockSync::new();
        // Gateway clock runs 1_000_000 µs ahead; each path leg takes 2_000 µs.
        let t1 = 10_000;
        let t2 = t1 + 2_000 + 1_000_000;
        let t3 = t2 + 500; // processing time on the gateway
        let t4 = t1 + 2_000 + 500 + 2_000;

        sync.begin(t1);
        let (offset, round_trip) = sync.complete(t1, t2, t3, t4).unwrap();
        assert_eq!(offset, 1_000_000);
        assert_eq!(round_trip, 4_000);
    }

    #[test]
    fn negative_skew_is_signed() {
        let mut sync = ClockSync::new();
        // Gateway clock runs behind ours.
        let t1 = 2_000_000;
        let t2 = t1 - 500_000 + 1_000;
        let t3 = t2 + 100;
        let t4 = t1 + 2_100;

        sync.begin(t1);
        let (offset, _) = sync.complete(t1, t2, t3, t4).unwrap();
        assert_eq!(offset, -500_000);
    }

    #[test]
    fn mismatched_echo_is_ignored() {
        let mut sync = ClockSync::new();
        sync.begin(100);
        assert!(sync.complete(999, 200, 201, 300).is_none());
        assert!(sync.offset_micros().is_none());
    }

    #[test]
    fn response_without_request_is_ignored() {
        let mut sync = ClockSync::new();
        assert!(sync.complete(1, 2, 3, 4).is_none());
    }

    #[test]
    fn state_remembers_the_last_sync() {
        let mut sync = ClockSync::new();
        sync.begin(0);
        sync.complete(0, 10, 10, 20).unwrap();
        assert_eq!(sync.offset_micros(), Some(0));
        assert_eq!(sync.round_trip_micros(), Some(20));
    }
}
