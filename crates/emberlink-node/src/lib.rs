//! Emberlink node runtime.
//!
//! The sensor side of the link: exactly one session, to the gateway. The
//! runtime initiates handshakes (and retries them on timeout), seals
//! upstream data, opens downstream frames under the session or broadcast
//! key, answers invalidations by re-registering, and computes clock
//! offsets for scheduling deep-sleep windows.
//!
//! Application behavior plugs in through the [`Controller`] trait
//! (setup / loop / receive hooks) rather than inheritance; the runtime
//! itself is a plain value over an [`Environment`](emberlink_core::Environment)
//! and performs no I/O.

pub mod clock;
pub mod controller;
pub mod errors;
pub mod runtime;
pub mod store;

pub use clock::ClockSync;
pub use controller::{Controller, step};
pub use errors::NodeError;
pub use runtime::{Downstream, NodeAction, NodeConfig, NodeRuntime};
pub use store::{NodeSettings, StoreError};
