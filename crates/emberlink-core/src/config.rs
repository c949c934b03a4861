//! Protocol timing and replay configuration.

use std::time::Duration;

/// Maximum session key lifetime before a re-handshake is forced.
pub const DEFAULT_MAX_KEY_VALIDITY: Duration = Duration::from_secs(48 * 60 * 60);

/// Time a node waits for a `ServerHello` before abandoning a handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

/// Acceptance window for the monotonic counters.
pub const DEFAULT_COUNTER_WINDOW: u16 = 256;

/// Consecutive counter rejects that invalidate a session.
pub const DEFAULT_COUNTER_REJECT_LIMIT: u8 = 3;

/// How long a downstream frame for a sleepy node waits for its wake.
pub const DEFAULT_DOWNSTREAM_TTL: Duration = Duration::from_secs(120);

/// Shared protocol knobs for both roles.
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    /// Session lifetime bound; on expiry the peer must re-handshake
    pub max_key_validity: Duration,
    /// Handshake abandonment timeout (node side)
    pub handshake_timeout: Duration,
    /// Modular window `W`: a counter is accepted iff
    /// `(received − last) mod 2^16 ∈ (0, W]`
    pub counter_window: u16,
    /// Consecutive counter rejects before the session is invalidated
    pub counter_reject_limit: u8,
    /// Whether monotonic counters are enforced. When disabled, replay
    /// protection degrades to nonce uniqueness within a session.
    pub use_counter: bool,
    /// Lifetime of queued downstream frames for sleepy nodes
    pub downstream_ttl: Duration,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_key_validity: DEFAULT_MAX_KEY_VALIDITY,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            counter_window: DEFAULT_COUNTER_WINDOW,
            counter_reject_limit: DEFAULT_COUNTER_REJECT_LIMIT,
            use_counter: true,
            downstream_ttl: DEFAULT_DOWNSTREAM_TTL,
        }
    }
}
