//! Bounded single-producer/single-consumer receive queue.
//!
//! The radio receive callback may fire from driver context while the main
//! loop is mid-iteration, so captured frames cross contexts through this
//! queue and nothing else. Push and pop are short critical sections over
//! preallocated storage; no allocation happens in steady state.
//!
//! # Overflow policy
//!
//! A push into a full primary ring displaces the *oldest* primary entry
//! into a bounded overflow area instead of dropping it, which keeps the
//! newest burst intact without losing the head of the queue. If the
//! overflow area is also full, the displaced entry is dropped and
//! counted. The consumer drains the overflow area first — it holds the
//! globally oldest entries — so pop order equals arrival order for every
//! record that survives.

use std::sync::{Arc, Mutex};

/// What happened to a pushed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Stored without displacing anything
    Stored,
    /// Stored; the oldest primary entry moved to the overflow area
    Displaced,
    /// Stored; the oldest primary entry was dropped (overflow full)
    DroppedOldest,
}

struct RingState<T> {
    primary: std::collections::VecDeque<T>,
    overflow: std::collections::VecDeque<T>,
    capacity: usize,
    overflow_capacity: usize,
    dropped: u64,
}

/// Create a bounded SPSC queue with the given primary and overflow
/// capacities. Storage for both areas is allocated up front.
#[must_use]
pub fn channel<T>(capacity: usize, overflow_capacity: usize) -> (Producer<T>, Consumer<T>) {
    let state = RingState {
        primary: std::collections::VecDeque::with_capacity(capacity),
        overflow: std::collections::VecDeque::with_capacity(overflow_capacity),
        capacity: capacity.max(1),
        overflow_capacity,
        dropped: 0,
    };
    let shared = Arc::new(Mutex::new(state));
    (Producer { shared: Arc::clone(&shared) }, Consumer { shared })
}

/// Producer half, held by the radio receive callback.
pub struct Producer<T> {
    shared: Arc<Mutex<RingState<T>>>,
}

impl<T> Producer<T> {
    /// Push a record. Never blocks beyond the critical section and never
    /// fails; at worst the oldest undelivered record is sacrificed.
    pub fn push(&self, item: T) -> PushOutcome {
        let Ok(mut state) = self.shared.lock() else {
            // A poisoned lock means the consumer panicked mid-pop; the
            // queue contents are unrecoverable either way.
            return PushOutcome::DroppedOldest;
        };

        let mut outcome = PushOutcome::Stored;
        if state.primary.len() == state.capacity {
            if let Some(victim) = state.primary.pop_front() {
                if state.overflow.len() < state.overflow_capacity {
                    state.overflow.push_back(victim);
                    outcome = PushOutcome::Displaced;
                } else {
                    state.dropped += 1;
                    tracing::trace!(
                        dropped = state.dropped,
                        "receive queue and overflow area full, oldest frame dropped"
                    );
                    outcome = PushOutcome::DroppedOldest;
                }
            }
        }
        state.primary.push_back(item);
        outcome
    }
}

/// Consumer half, held by the dispatcher.
pub struct Consumer<T> {
    shared: Arc<Mutex<RingState<T>>>,
}

impl<T> Consumer<T> {
    /// Pop the oldest surviving record, overflow area first.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.shared.lock().ok()?;
        state.overflow.pop_front().or_else(|| state.primary.pop_front())
    }

    /// Records currently queued across both areas.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.lock().map_or(0, |state| state.primary.len() + state.overflow.len())
    }

    /// Whether both areas are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records dropped because both areas were full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.shared.lock().map_or(0, |state| state.dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_without_overflow() {
        let (tx, rx) = channel(4, 2);
        for i in 0..4 {
            assert_eq!(tx.push(i), PushOutcome::Stored);
        }
        for i in 0..4 {
            assert_eq!(rx.pop(), Some(i));
        }
        assert!(rx.is_empty());
    }

    #[test]
    fn displaced_entries_are_served_first_in_arrival_order() {
        let (tx, rx) = channel(3, 2);
        for i in 0..3 {
            tx.push(i);
        }
        // 0 and 1 get displaced into the overflow area
        assert_eq!(tx.push(3), PushOutcome::Displaced);
        assert_eq!(tx.push(4), PushOutcome::Displaced);

        let drained: Vec<_> = std::iter::from_fn(|| rx.pop()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn drops_start_when_overflow_is_full() {
        let (tx, rx) = channel(2, 1);
        tx.push(0);
        tx.push(1);
        assert_eq!(tx.push(2), PushOutcome::Displaced); // 0 → overflow
        assert_eq!(tx.push(3), PushOutcome::DroppedOldest); // 1 dropped
        assert_eq!(rx.dropped(), 1);

        let drained: Vec<_> = std::iter::from_fn(|| rx.pop()).collect();
        assert_eq!(drained, vec![0, 2, 3]);
    }

    #[test]
    fn queue_bounds_hold_under_burst() {
        let (tx, rx) = channel(32, 15);
        for i in 0..100u32 {
            tx.push(i);
        }
        assert_eq!(rx.len(), 32 + 15);
        assert_eq!(rx.dropped(), 100 - 32 - 15);
    }

    #[test]
    fn pop_on_empty_returns_none() {
        let (_tx, rx) = channel::<u8>(2, 1);
        assert_eq!(rx.pop(), None);
    }

    #[test]
    fn zero_overflow_capacity_degrades_to_drop_oldest() {
        let (tx, rx) = channel(2, 0);
        tx.push(0);
        tx.push(1);
        assert_eq!(tx.push(2), PushOutcome::DroppedOldest);
        let drained: Vec<_> = std::iter::from_fn(|| rx.pop()).collect();
        assert_eq!(drained, vec![1, 2]);
        assert_eq!(rx.dropped(), 1);
    }
}
