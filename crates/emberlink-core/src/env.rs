//! Environment abstraction for deterministic testing.
//!
//! Decouples the protocol from system resources (time, randomness). The
//! production [`SystemEnv`] uses the OS entropy source and the monotonic
//! clock; the deterministic [`ManualEnv`] uses a seeded RNG and a
//! manually advanced virtual clock, so every handshake, nonce, and
//! timeout in a test is reproducible from its seed.

use std::{
    ops::Sub,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use rand::{RngCore, SeedableRng, rngs::OsRng};
use rand_chacha::ChaCha12Rng;

/// Abstract environment providing time and randomness.
///
/// Implementations MUST guarantee that `now()` never goes backwards
/// within one execution and that `random_bytes()` is cryptographically
/// secure in production.
pub trait Environment: Clone + Send + Sync + 'static {
    /// The instant type used by this environment. Production uses
    /// `std::time::Instant`; simulation uses virtual time.
    type Instant: Copy + Ord + Send + Sync + Sub<Output = Duration>;

    /// Current monotonic time.
    fn now(&self) -> Self::Instant;

    /// Microseconds since an arbitrary fixed origin, for clock-sync
    /// timestamps. Monotonic, same origin for the lifetime of the value.
    fn now_micros(&self) -> u64;

    /// Fill the buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// A fixed-size array of random bytes.
    fn random_array<const N: usize>(&self) -> [u8; N] {
        let mut out = [0u8; N];
        self.random_bytes(&mut out);
        out
    }
}

/// Production environment: OS entropy and the system monotonic clock.
#[derive(Clone)]
pub struct SystemEnv {
    origin: Instant,
}

impl SystemEnv {
    /// Create an environment anchored at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SystemEnv {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn now_micros(&self) -> u64 {
        Instant::now().duration_since(self.origin).as_micros() as u64
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        OsRng.fill_bytes(buffer);
    }
}

/// Virtual instant used by [`ManualEnv`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SimInstant(Duration);

impl SimInstant {
    /// The virtual time origin.
    pub const ZERO: Self = Self(Duration::ZERO);
}

impl Sub for SimInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

struct ManualState {
    clock: Duration,
    rng: ChaCha12Rng,
}

/// Deterministic environment: seeded RNG, manually advanced clock.
///
/// Cloning shares the underlying state, so a gateway and a node driven by
/// clones of the same `ManualEnv` see one clock and one random stream.
/// Use [`ManualEnv::with_skew`] to give one side an offset microsecond
/// clock when testing clock synchronization.
#[derive(Clone)]
pub struct ManualEnv {
    state: Arc<Mutex<ManualState>>,
    skew_micros: u64,
}

impl ManualEnv {
    /// Create from an RNG seed, clock at zero.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        let state = ManualState { clock: Duration::ZERO, rng: ChaCha12Rng::seed_from_u64(seed) };
        Self { state: Arc::new(Mutex::new(state)), skew_micros: 0 }
    }

    /// A handle onto the same clock and RNG whose microsecond clock reads
    /// ahead by `skew`. Models a peer whose local clock disagrees.
    #[must_use]
    pub fn with_skew(&self, skew: Duration) -> Self {
        Self { state: Arc::clone(&self.state), skew_micros: skew.as_micros() as u64 }
    }

    /// Advance the shared virtual clock.
    pub fn advance(&self, delta: Duration) {
        if let Ok(mut state) = self.state.lock() {
            state.clock += delta;
        }
    }
}

impl Environment for ManualEnv {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        self.state.lock().map_or(SimInstant::ZERO, |state| SimInstant(state.clock))
    }

    fn now_micros(&self) -> u64 {
        let base = self.state.lock().map_or(0, |state| state.clock.as_micros() as u64);
        base + self.skew_micros
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        if let Ok(mut state) = self.state.lock() {
            state.rng.fill_bytes(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_env_is_deterministic() {
        let env1 = ManualEnv::new(42);
        let env2 = ManualEnv::new(42);
        assert_eq!(env1.random_array::<16>(), env2.random_array::<16>());
    }

    #[test]
    fn manual_clock_advances() {
        let env = ManualEnv::new(0);
        let before = env.now();
        env.advance(Duration::from_secs(5));
        let after = env.now();
        assert_eq!(after - before, Duration::from_secs(5));
    }

    #[test]
    fn clones_share_the_clock() {
        let env = ManualEnv::new(0);
        let clone = env.clone();
        env.advance(Duration::from_millis(250));
        assert_eq!(clone.now() - SimInstant::ZERO, Duration::from_millis(250));
    }

    #[test]
    fn skewed_handle_reads_ahead() {
        let env = ManualEnv::new(0);
        let skewed = env.with_skew(Duration::from_micros(1500));
        assert_eq!(skewed.now_micros(), env.now_micros() + 1500);
    }

    #[test]
    fn system_env_micros_is_monotonic() {
        let env = SystemEnv::new();
        let a = env.now_micros();
        let b = env.now_micros();
        assert!(b >= a);
    }
}
