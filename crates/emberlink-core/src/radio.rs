//! Radio abstraction.
//!
//! The protocol core is transport-agnostic: anything that can deliver a
//! short datagram to a 6-byte address works. Sends are fire-and-forget;
//! the boolean only reports whether the driver accepted the frame.

use emberlink_proto::MacAddress;

/// Outbound half of the radio.
///
/// ```
/// use emberlink_core::{Radio, RxPacket, ring};
/// use emberlink_proto::MacAddress;
///
/// /// Loopback driver: every send lands in a receive queue.
/// struct Loopback {
///     mac: MacAddress,
///     rx: ring::Producer<RxPacket>,
/// }
///
/// impl Radio for Loopback {
///     fn send(&mut self, _dst: MacAddress, frame: &[u8]) -> bool {
///         self.rx.push(RxPacket {
///             src: self.mac,
///             data: frame.to_vec(),
///             rssi: None,
///             rx_micros: None,
///         });
///         true
///     }
/// }
///
/// let (producer, consumer) = ring::channel(8, 2);
/// let mut radio = Loopback { mac: MacAddress::new([1, 2, 3, 4, 5, 6]), rx: producer };
/// assert!(radio.send(MacAddress::BROADCAST, b"frame"));
/// assert_eq!(consumer.pop().unwrap().data, b"frame");
/// ```
pub trait Radio {
    /// Transmit a raw frame to `dst`. Returns `false` if the driver
    /// refused the frame; the core never retries.
    fn send(&mut self, dst: MacAddress, frame: &[u8]) -> bool;
}

/// A frame captured by the receive callback.
///
/// The callback must copy the frame out of driver memory and return
/// quickly; this record is what it pushes into the receive queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxPacket {
    /// Sender address
    pub src: MacAddress,
    /// Raw frame bytes, already copied out of the driver buffer
    pub data: Vec<u8>,
    /// Receive signal strength, when the driver reports it
    pub rssi: Option<i8>,
    /// Capture timestamp in environment microseconds, when the callback
    /// stamps it. Clock-sync answers use this instead of the (later)
    /// dispatch time.
    pub rx_micros: Option<u64>,
}
