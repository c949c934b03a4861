//! Emberlink session core.
//!
//! The pieces shared by both ends of the link: the per-peer session state
//! machine (handshake, key epochs, AEAD envelopes), the monotonic counter
//! and replay engine, the single-producer/single-consumer receive queue,
//! and the environment abstraction that keeps all of it deterministic
//! under test.
//!
//! Everything here follows the action pattern: state machines take time
//! as a parameter and return data; they never perform I/O, never read a
//! clock, and never draw randomness on their own. The gateway and node
//! runtimes drive them and execute the resulting sends.

pub mod config;
pub mod counter;
pub mod env;
pub mod errors;
pub mod radio;
pub mod ring;
pub mod session;

pub use config::ProtocolConfig;
pub use counter::{CounterOutcome, ReplayWindow};
pub use env::{Environment, ManualEnv, SimInstant, SystemEnv};
pub use errors::SessionError;
pub use radio::{Radio, RxPacket};
pub use ring::{Consumer, Producer, PushOutcome};
pub use session::{
    HandshakeInitiation, Opened, PeerStatus, Role, Session, build_aad, invalidate_frame,
    open_with_key, respond_handshake, seal_with_key, verify_invalidate_frame,
};
