//! Monotonic counter acceptance with wraparound.
//!
//! Each direction of a session carries an independent 16-bit counter.
//! A received value is accepted iff it is strictly ahead of the last
//! accepted one within a modular window `W`:
//!
//! ```text
//! accept ⇔ (received − last) mod 2^16 ∈ (0, W]
//! ```
//!
//! Acceptance reports how many frames were lost in between; rejection is
//! counted, and a run of consecutive rejects signals a desynchronized or
//! replaying peer.

/// Acceptance window over one 16-bit counter stream.
#[derive(Debug, Clone)]
pub struct ReplayWindow {
    last: u16,
    consecutive_rejects: u8,
}

/// Outcome of offering a received counter to the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterOutcome {
    /// Counter accepted; this many frames were skipped before it
    Accepted {
        /// `(received − last − 1) mod 2^16`
        lost: u16,
    },
    /// Counter outside `(0, W]` of the last accepted value
    Rejected {
        /// Consecutive rejects on this window, including this one
        consecutive: u8,
    },
}

impl ReplayWindow {
    /// Fresh window; the first acceptable counter is 1.
    #[must_use]
    pub fn new() -> Self {
        Self { last: 0, consecutive_rejects: 0 }
    }

    /// Last accepted counter value.
    #[must_use]
    pub fn last_accepted(&self) -> u16 {
        self.last
    }

    /// Current run of consecutive rejects.
    #[must_use]
    pub fn consecutive_rejects(&self) -> u8 {
        self.consecutive_rejects
    }

    /// Offer a received counter under window `w`.
    pub fn offer(&mut self, received: u16, w: u16) -> CounterOutcome {
        let ahead = received.wrapping_sub(self.last);
        if ahead == 0 || ahead > w {
            self.consecutive_rejects = self.consecutive_rejects.saturating_add(1);
            return CounterOutcome::Rejected { consecutive: self.consecutive_rejects };
        }

        let lost = ahead - 1;
        self.last = received;
        self.consecutive_rejects = 0;
        CounterOutcome::Accepted { lost }
    }
}

impl Default for ReplayWindow {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const W: u16 = 256;

    #[test]
    fn first_counter_is_accepted_with_no_loss() {
        let mut window = ReplayWindow::new();
        assert_eq!(window.offer(1, W), CounterOutcome::Accepted { lost: 0 });
    }

    #[test]
    fn replayed_counter_is_rejected() {
        let mut window = ReplayWindow::new();
        window.offer(1, W);
        assert_eq!(window.offer(1, W), CounterOutcome::Rejected { consecutive: 1 });
    }

    #[test]
    fn gap_within_window_reports_lost_frames() {
        let mut window = ReplayWindow::new();
        window.offer(1, W);
        assert_eq!(window.offer(5, W), CounterOutcome::Accepted { lost: 3 });
        // Not strictly greater than 5 any more
        assert_eq!(window.offer(3, W), CounterOutcome::Rejected { consecutive: 1 });
    }

    #[test]
    fn counter_beyond_window_is_rejected() {
        let mut window = ReplayWindow::new();
        window.offer(1, W);
        assert_eq!(window.offer(1 + W, W), CounterOutcome::Accepted { lost: W - 1 });
        assert!(matches!(window.offer(2 + 2 * W, W), CounterOutcome::Rejected { .. }));
    }

    #[test]
    fn wraparound_is_handled() {
        let mut window = ReplayWindow::new();
        window.offer(u16::MAX, u16::MAX); // move near the top with a huge window
        assert_eq!(window.offer(2, W), CounterOutcome::Accepted { lost: 2 });
    }

    #[test]
    fn consecutive_rejects_accumulate_and_reset() {
        let mut window = ReplayWindow::new();
        window.offer(10, u16::MAX);
        assert_eq!(window.offer(10, W), CounterOutcome::Rejected { consecutive: 1 });
        assert_eq!(window.offer(9, W), CounterOutcome::Rejected { consecutive: 2 });
        assert_eq!(window.offer(11, W), CounterOutcome::Accepted { lost: 0 });
        assert_eq!(window.consecutive_rejects(), 0);
    }

    proptest! {
        #[test]
        fn accepted_counters_are_strictly_ahead(last in any::<u16>(), received in any::<u16>()) {
            let mut window = ReplayWindow { last, consecutive_rejects: 0 };
            if let CounterOutcome::Accepted { lost } = window.offer(received, W) {
                let ahead = received.wrapping_sub(last);
                prop_assert!(ahead > 0 && ahead <= W);
                prop_assert_eq!(lost, ahead - 1);
                prop_assert_eq!(window.last_accepted(), received);
            } else {
                prop_assert_eq!(window.last_accepted(), last);
            }
        }

        #[test]
        fn replay_of_accepted_value_is_always_rejected(start in any::<u16>(), step in 1u16..=W) {
            let mut window = ReplayWindow { last: start, consecutive_rejects: 0 };
            let received = start.wrapping_add(step);
            prop_assert!(
                matches!(window.offer(received, W), CounterOutcome::Accepted { .. }),
                "expected first offer to be accepted"
            );
            prop_assert!(
                matches!(window.offer(received, W), CounterOutcome::Rejected { .. }),
                "expected replay offer to be rejected"
            );
        }
    }
}
