//! Emberlink gateway runtime.
//!
//! The coordinator side of the link: a bounded node table holding one
//! session per peer address, a dispatcher that drains the receive queue
//! and walks each frame through decode → session → replay → delivery,
//! broadcast key distribution, a discovery forwarding queue, and queued
//! downstream delivery for sleepy peers.
//!
//! The [`Gateway`](driver::Gateway) is a plain value over an
//! [`Environment`](emberlink_core::Environment); it performs no I/O.
//! Every call returns [`GatewayAction`](driver::GatewayAction)s for the
//! caller to execute: frames to transmit, payloads to hand to the
//! application, lifecycle notifications.

pub mod broadcast;
pub mod discovery;
pub mod driver;
pub mod errors;
pub mod store;
pub mod table;

pub use broadcast::BroadcastState;
pub use discovery::{DiscoveryItem, DiscoveryQueue};
pub use driver::{DownstreamKind, Gateway, GatewayAction, GatewayConfig, PayloadEncoding};
pub use errors::GatewayError;
pub use store::{GatewaySettings, StoreError};
pub use table::{NodeRecord, NodeTable};
