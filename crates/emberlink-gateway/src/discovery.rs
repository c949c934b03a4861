//! Discovery forwarding queue.
//!
//! Nodes hand the gateway opaque discovery payloads to publish on their
//! behalf. Publishing is paced on a two-speed cadence: a long delay
//! before the first item (letting a just-booted fleet settle) and a
//! short delay between subsequent items, both doubled when the item's
//! node is sleepy.

use std::{collections::VecDeque, ops::Sub, time::Duration};

use emberlink_proto::MacAddress;

/// Delay before the first discovery item is released.
pub const DEFAULT_FIRST_DISCOVERY_DELAY: Duration = Duration::from_secs(5);

/// Delay between subsequent discovery items.
pub const DEFAULT_NEXT_DISCOVERY_DELAY: Duration = Duration::from_millis(500);

/// One queued discovery payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryItem {
    /// Node the payload came from
    pub mac: MacAddress,
    /// Topic the application should publish under
    pub topic: String,
    /// Opaque payload, forwarded verbatim
    pub payload: Vec<u8>,
    /// Whether the node is sleepy (doubles the cadence delays)
    pub sleepy: bool,
}

/// Paced FIFO of discovery items.
pub struct DiscoveryQueue<I> {
    queue: VecDeque<DiscoveryItem>,
    anchor: Option<I>,
    released_any: bool,
    first_delay: Duration,
    next_delay: Duration,
}

impl<I> DiscoveryQueue<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Create a queue with the given cadence.
    #[must_use]
    pub fn new(first_delay: Duration, next_delay: Duration) -> Self {
        Self { queue: VecDeque::new(), anchor: None, released_any: false, first_delay, next_delay }
    }

    /// Enqueue an item. The pacing clock for an idle queue starts now.
    pub fn push(&mut self, item: DiscoveryItem, now: I) {
        if self.queue.is_empty() {
            self.anchor = Some(now);
        }
        self.queue.push_back(item);
    }

    /// Release the front item if its delay has elapsed.
    pub fn release_due(&mut self, now: I) -> Option<DiscoveryItem> {
        let front = self.queue.front()?;
        let base = if self.released_any { self.next_delay } else { self.first_delay };
        let delay = if front.sleepy { base * 2 } else { base };

        let anchor = self.anchor?;
        if now - anchor < delay {
            return None;
        }

        self.released_any = true;
        self.anchor = Some(now);
        self.queue.pop_front()
    }

    /// Items still waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use emberlink_core::{Environment, ManualEnv};

    use super::*;

    fn item(sleepy: bool) -> DiscoveryItem {
        DiscoveryItem {
            mac: MacAddress::new([1, 2, 3, 4, 5, 6]),
            topic: "net/node/config".to_owned(),
            payload: vec![0x81],
            sleepy,
        }
    }

    #[test]
    fn first_item_waits_the_long_delay() {
        let env = ManualEnv::new(0);
        let mut queue = DiscoveryQueue::new(Duration::from_secs(5), Duration::from_millis(500));
        queue.push(item(false), env.now());

        env.advance(Duration::from_secs(4));
        assert!(queue.release_due(env.now()).is_none());

        env.advance(Duration::from_secs(1));
        assert!(queue.release_due(env.now()).is_some());
    }

    #[test]
    fn later_items_use_the_short_delay() {
        let env = ManualEnv::new(0);
        let mut queue = DiscoveryQueue::new(Duration::from_secs(5), Duration::from_millis(500));
        queue.push(item(false), env.now());
        queue.push(item(false), env.now());

        env.advance(Duration::from_secs(5));
        assert!(queue.release_due(env.now()).is_some());
        assert!(queue.release_due(env.now()).is_none());

        env.advance(Duration::from_millis(500));
        assert!(queue.release_due(env.now()).is_some());
        assert!(queue.is_empty());
    }

    #[test]
    fn sleepy_items_double_the_delay() {
        let env = ManualEnv::new(0);
        let mut queue = DiscoveryQueue::new(Duration::from_secs(5), Duration::from_millis(500));
        queue.push(item(true), env.now());

        env.advance(Duration::from_secs(9));
        assert!(queue.release_due(env.now()).is_none());
        env.advance(Duration::from_secs(1));
        assert!(queue.release_due(env.now()).is_some());
    }

    #[test]
    fn idle_queue_restarts_its_pacing_clock() {
        let env = ManualEnv::new(0);
        let mut queue = DiscoveryQueue::new(Duration::from_secs(5), Duration::from_millis(500));
        queue.push(item(false), env.now());
        env.advance(Duration::from_secs(5));
        queue.release_due(env.now()).unwrap();

        // Queue drains; a much later push must not release instantly
        env.advance(Duration::from_secs(60));
        queue.push(item(false), env.now());
        assert!(queue.release_due(env.now()).is_none());
        env.advance(Duration::from_millis(500));
        assert!(queue.release_due(env.now()).is_some());
    }
}
