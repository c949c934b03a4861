//! Node runtime state machine.
//!
//! ```text
//! ┌──────────────┐ connect ┌─────────────┐ ServerHello ┌────────────┐
//! │ Unregistered │────────>│ InitPending │────────────>│ Registered │
//! └──────────────┘         └─────────────┘             └────────────┘
//!        ▲                     │ timeout: retry               │
//!        │                     └───────────────┘              │
//!        │      InvalidateKey / key validity elapsed          │
//!        └────────────────────────────────────────────────────┘
//! ```
//!
//! The runtime owns the single session to its gateway. It re-registers
//! on its own after timeouts and invalidations (except an administrative
//! kick), keeps the broadcast key fresh, and never blocks: every method
//! returns the frames to transmit and the events to surface.

use emberlink_core::{
    CounterOutcome, Environment, HandshakeInitiation, Opened, PeerStatus, ProtocolConfig,
    ReplayWindow, RxPacket, Session, SessionError, open_with_key, seal_with_key,
    verify_invalidate_frame,
};
use emberlink_crypto::SymmetricKey;
use emberlink_proto::{
    AEAD_TAG_LEN, BroadcastKeyResponse, ClockRequest, ClockResponse, ENVELOPE_HEADER_LEN,
    Envelope, Frame, InvalidateReason, Keying, MAX_FRAME_LEN, MAX_NODE_NAME_LEN, MacAddress,
    MessageType, NodeCommand, NodeNameResult, NodeNameSet,
};
use tracing::{debug, info, warn};
use zeroize::Zeroize;

use crate::{clock::ClockSync, errors::NodeError};

/// Node configuration.
#[derive(Clone)]
pub struct NodeConfig {
    /// This node's radio address
    pub mac: MacAddress,
    /// The gateway's radio address
    pub gateway: MacAddress,
    /// Pre-shared network key authenticating handshakes
    pub network_key: [u8; 32],
    /// Shared protocol knobs
    pub protocol: ProtocolConfig,
    /// Re-register automatically after invalidation or key expiry.
    /// An administrative kick is always final until the application
    /// reconnects explicitly.
    pub auto_reconnect: bool,
}

impl NodeConfig {
    /// Defaults for the given addresses and network key.
    #[must_use]
    pub fn new(mac: MacAddress, gateway: MacAddress, network_key: [u8; 32]) -> Self {
        Self {
            mac,
            gateway,
            network_key,
            protocol: ProtocolConfig::default(),
            auto_reconnect: true,
        }
    }
}

impl Drop for NodeConfig {
    fn drop(&mut self) {
        self.network_key.zeroize();
    }
}

/// Downstream frame flavour, as seen by the node application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Downstream {
    /// Value write
    Set,
    /// Value request
    Get,
    /// Control-plane payload
    Control,
}

/// What the runtime wants the caller to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeAction {
    /// Transmit an encoded frame
    Send {
        /// Destination address
        dst: MacAddress,
        /// Encoded frame bytes
        frame: Vec<u8>,
    },
    /// Deliver a downstream payload to the application
    DataReceived {
        /// Decrypted payload
        payload: Vec<u8>,
        /// Frames lost before this one
        lost: u16,
        /// Frame flavour
        kind: Downstream,
        /// Whether the frame arrived under the broadcast key
        broadcast: bool,
    },
    /// Handshake completed
    Registered {
        /// Key epoch acknowledged by the gateway
        key_id: u8,
    },
    /// Session destroyed
    Disconnected {
        /// Why the session ended
        reason: InvalidateReason,
    },
    /// Gateway answered a name registration
    NameResult {
        /// Result code (see [`NodeNameResult`])
        code: i8,
    },
    /// Clock synchronization completed
    TimeSynced {
        /// Gateway clock minus ours, microseconds
        offset_micros: i64,
        /// Path round-trip, microseconds
        round_trip_micros: u64,
    },
    /// A broadcast key was received or replaced
    BroadcastKeyUpdated {
        /// The key's epoch
        epoch: u8,
    },
}

struct PendingHandshake<I> {
    initiation: HandshakeInitiation,
    started_at: I,
}

struct BroadcastKey {
    epoch: u8,
    key: SymmetricKey,
    recv: ReplayWindow,
    send_counter: u16,
}

/// The node runtime.
pub struct NodeRuntime<E: Environment> {
    env: E,
    config: NodeConfig,
    status: PeerStatus,
    session: Option<Session>,
    pending: Option<PendingHandshake<E::Instant>>,
    established_at: Option<E::Instant>,
    broadcast: Option<BroadcastKey>,
    clear_send: u16,
    clock: ClockSync,
    sleepy: bool,
    packets_ok: u32,
    packets_err: u32,
}

impl<E: Environment> NodeRuntime<E> {
    /// Create a runtime in `Unregistered`.
    #[must_use]
    pub fn new(env: E, config: NodeConfig) -> Self {
        Self {
            env,
            config,
            status: PeerStatus::Unregistered,
            session: None,
            pending: None,
            established_at: None,
            broadcast: None,
            clear_send: 1,
            clock: ClockSync::new(),
            sleepy: false,
            packets_ok: 0,
            packets_err: 0,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> PeerStatus {
        self.status
    }

    /// Key epoch of the current session, if registered.
    #[must_use]
    pub fn key_id(&self) -> Option<u8> {
        self.session.as_ref().map(Session::key_id)
    }

    /// Clock-sync state.
    #[must_use]
    pub fn clock(&self) -> &ClockSync {
        &self.clock
    }

    /// Epoch of the held broadcast key, if any.
    #[must_use]
    pub fn broadcast_epoch(&self) -> Option<u8> {
        self.broadcast.as_ref().map(|broadcast| broadcast.epoch)
    }

    /// Frames accepted / rejected so far.
    #[must_use]
    pub fn packet_stats(&self) -> (u32, u32) {
        (self.packets_ok, self.packets_err)
    }

    /// Start (or restart) a handshake with the gateway.
    pub fn connect(&mut self) -> Vec<NodeAction> {
        let (initiation, frame) =
            HandshakeInitiation::new(&self.env, &self.config.network_key);
        self.pending = Some(PendingHandshake { initiation, started_at: self.env.now() });
        if !self.status.is_registered() {
            self.status = PeerStatus::InitPending;
        }
        debug!(gateway = %self.config.gateway, "handshake started");

        encode_internal(&frame)
            .map(|bytes| NodeAction::Send { dst: self.config.gateway, frame: bytes })
            .into_iter()
            .collect()
    }

    /// Housekeeping: handshake retry and key-validity expiry.
    pub fn tick(&mut self) -> Vec<NodeAction> {
        let now = self.env.now();
        let mut actions = Vec::new();

        let handshake_stale = self
            .pending
            .as_ref()
            .is_some_and(|pending| now - pending.started_at > self.config.protocol.handshake_timeout);
        if handshake_stale {
            warn!("handshake timed out, retrying");
            self.pending = None;
            actions.extend(self.connect());
        }

        let expired = self.status.is_registered()
            && self
                .established_at
                .is_some_and(|established| now - established > self.config.protocol.max_key_validity);
        if expired {
            info!("session key reached its validity limit");
            self.drop_session(PeerStatus::KeyExpired);
            actions.push(NodeAction::Disconnected { reason: InvalidateReason::KeyExpired });
            if self.config.auto_reconnect {
                actions.extend(self.connect());
            }
        }

        actions
    }

    /// Process one captured frame.
    pub fn handle_packet(&mut self, packet: RxPacket) -> Vec<NodeAction> {
        let frame = match Frame::decode(&packet.data) {
            Ok(frame) => frame,
            Err(error) => {
                debug!(src = %packet.src, %error, "dropping malformed frame");
                self.packets_err += 1;
                return Vec::new();
            },
        };

        if packet.src != self.config.gateway {
            debug!(src = %packet.src, "ignoring frame from a non-gateway source");
            return Vec::new();
        }

        match frame {
            Frame::ServerHello { public_key, iv, key_id, hmac } => {
                self.on_server_hello(&public_key, &iv, key_id, &hmac)
            },
            Frame::Envelope(envelope) => {
                let t_rx = packet.rx_micros.unwrap_or_else(|| self.env.now_micros());
                match envelope.msg_type.keying() {
                    Keying::Session => self.on_session_envelope(&envelope, t_rx),
                    Keying::Broadcast => self.on_broadcast_envelope(&envelope),
                    Keying::Clear => Vec::new(),
                }
            },
            Frame::InvalidateKey { reason, hmac } => self.on_invalidate(reason, &hmac),
            Frame::ClientHello { .. } | Frame::ClearData { .. } => {
                debug!("ignoring upstream-only frame");
                Vec::new()
            },
        }
    }

    /// Send application data upstream.
    ///
    /// # Errors
    ///
    /// - `NodeError::NotRegistered` without an established session
    /// - `NodeError::Encode` if the payload exceeds the MTU
    pub fn send_data(&mut self, payload: &[u8], control: bool) -> Result<Vec<NodeAction>, NodeError> {
        let msg_type =
            if control { MessageType::ControlData } else { MessageType::SensorData };
        self.seal_upstream(msg_type, payload)
    }

    /// Send data under the broadcast key for any listener.
    ///
    /// # Errors
    ///
    /// - `NodeError::NoBroadcastKey` before the key has been received
    /// - `NodeError::Encode` if the payload exceeds the MTU
    pub fn send_broadcast_data(&mut self, payload: &[u8]) -> Result<Vec<NodeAction>, NodeError> {
        check_payload_len(payload)?;
        let prefix = self.env.random_array();
        let src = self.config.mac;
        let broadcast = self.broadcast.as_mut().ok_or(NodeError::NoBroadcastKey)?;

        let counter = broadcast.send_counter;
        broadcast.send_counter = broadcast.send_counter.wrapping_add(1);
        let envelope = seal_with_key(
            &broadcast.key,
            broadcast.epoch,
            counter,
            prefix,
            MessageType::SensorBroadcastData,
            src,
            MacAddress::BROADCAST,
            payload,
        );
        let frame = Frame::Envelope(envelope).to_bytes()?;
        Ok(vec![NodeAction::Send { dst: MacAddress::BROADCAST, frame }])
    }

    /// Send unencrypted, counter-protected data. Needs no session.
    ///
    /// # Errors
    ///
    /// - `NodeError::Encode` if the payload exceeds the MTU
    pub fn send_clear_data(&mut self, payload: &[u8]) -> Result<Vec<NodeAction>, NodeError> {
        let counter = self.clear_send;
        self.clear_send = self.clear_send.wrapping_add(1);
        let frame = Frame::ClearData { counter, payload: payload.to_vec() }.to_bytes()?;
        Ok(vec![NodeAction::Send { dst: self.config.gateway, frame }])
    }

    /// Request clock synchronization.
    ///
    /// # Errors
    ///
    /// - `NodeError::NotRegistered` without an established session
    pub fn request_time(&mut self) -> Result<Vec<NodeAction>, NodeError> {
        let t1 = self.env.now_micros();
        self.clock.begin(t1);
        self.seal_upstream(MessageType::ClockRequest, &ClockRequest { t1 }.to_bytes())
    }

    /// Ask the gateway to record a name for this node.
    ///
    /// # Errors
    ///
    /// - `NodeError::InvalidName` for an empty or over-long name
    /// - `NodeError::NotRegistered` without an established session
    pub fn set_name(&mut self, name: &str) -> Result<Vec<NodeAction>, NodeError> {
        if name.is_empty() {
            return Err(NodeError::InvalidName("empty"));
        }
        if name.len() > MAX_NODE_NAME_LEN {
            return Err(NodeError::InvalidName("longer than 32 bytes"));
        }
        let payload = NodeNameSet { name: name.to_owned() }.to_bytes();
        self.seal_upstream(MessageType::NodeNameSet, &payload)
    }

    /// Request the current broadcast key.
    ///
    /// # Errors
    ///
    /// - `NodeError::NotRegistered` without an established session
    pub fn request_broadcast_key(&mut self) -> Result<Vec<NodeAction>, NodeError> {
        self.seal_upstream(MessageType::BroadcastKeyRequest, &[])
    }

    /// Declare or clear the sleepy capability, informing the gateway.
    ///
    /// # Errors
    ///
    /// - `NodeError::NotRegistered` without an established session
    pub fn set_sleepy(&mut self, sleepy: bool) -> Result<Vec<NodeAction>, NodeError> {
        let actions =
            self.seal_upstream(MessageType::ControlData, &NodeCommand::SetSleepy(sleepy).to_bytes())?;
        self.sleepy = sleepy;
        if self.status.is_registered() {
            self.status = if sleepy { PeerStatus::Sleepy } else { PeerStatus::Registered };
        }
        Ok(actions)
    }

    /// Ask the gateway host to restart.
    ///
    /// # Errors
    ///
    /// - `NodeError::NotRegistered` without an established session
    pub fn request_gateway_restart(&mut self) -> Result<Vec<NodeAction>, NodeError> {
        self.seal_upstream(MessageType::ControlData, &NodeCommand::RestartGateway.to_bytes())
    }

    /// Hand the gateway an opaque discovery payload to publish on this
    /// node's behalf.
    ///
    /// # Errors
    ///
    /// - `NodeError::NotRegistered` without an established session
    /// - `NodeError::Encode` if the payload exceeds the MTU
    pub fn send_discovery(&mut self, payload: &[u8]) -> Result<Vec<NodeAction>, NodeError> {
        self.seal_upstream(MessageType::HaDiscovery, payload)
    }

    fn on_server_hello(
        &mut self,
        public_key: &[u8; 32],
        iv: &[u8; 12],
        key_id: u8,
        hmac: &[u8; 32],
    ) -> Vec<NodeAction> {
        let Some(pending) = self.pending.as_ref() else {
            debug!("unsolicited server hello");
            return Vec::new();
        };

        match pending.initiation.complete(&self.config.network_key, public_key, iv, key_id, hmac)
        {
            Ok(session) => {
                self.pending = None;
                self.session = Some(session);
                self.status =
                    if self.sleepy { PeerStatus::Sleepy } else { PeerStatus::Registered };
                self.established_at = Some(self.env.now());
                info!(key_id, "registered with gateway");
                vec![NodeAction::Registered { key_id }]
            },
            Err(error) => {
                // Keep the pending handshake: the genuine reply may still
                // be on its way.
                warn!(%error, "server hello rejected");
                self.packets_err += 1;
                Vec::new()
            },
        }
    }

    fn on_session_envelope(&mut self, envelope: &Envelope, t_rx: u64) -> Vec<NodeAction> {
        let Some(session) = self.session.as_mut() else {
            debug!("downstream frame without a session");
            return Vec::new();
        };

        match session.open(envelope, self.config.gateway, self.config.mac, &self.config.protocol)
        {
            Ok(opened) => {
                self.packets_ok += 1;
                self.dispatch_downstream(envelope.msg_type, opened, t_rx)
            },
            Err(SessionError::StaleKeyEpoch { expected, got }) => {
                debug!(expected, got, "dropping stale-epoch frame");
                Vec::new()
            },
            Err(SessionError::ReplayRejected { counter, last, consecutive }) => {
                self.packets_err += 1;
                debug!(counter, last, consecutive, "replay rejected");
                if consecutive >= self.config.protocol.counter_reject_limit {
                    self.drop_session(PeerStatus::Unregistered);
                    let mut actions =
                        vec![NodeAction::Disconnected { reason: InvalidateReason::WrongData }];
                    if self.config.auto_reconnect {
                        actions.extend(self.connect());
                    }
                    actions
                } else {
                    Vec::new()
                }
            },
            Err(error) => {
                self.packets_err += 1;
                debug!(%error, "downstream frame dropped");
                Vec::new()
            },
        }
    }

    fn dispatch_downstream(
        &mut self,
        msg_type: MessageType,
        opened: Opened,
        t_rx: u64,
    ) -> Vec<NodeAction> {
        match msg_type {
            MessageType::DownstreamDataSet => vec![NodeAction::DataReceived {
                payload: opened.plaintext,
                lost: opened.lost,
                kind: Downstream::Set,
                broadcast: false,
            }],
            MessageType::DownstreamDataGet => vec![NodeAction::DataReceived {
                payload: opened.plaintext,
                lost: opened.lost,
                kind: Downstream::Get,
                broadcast: false,
            }],
            MessageType::DownstreamCtrlData => vec![NodeAction::DataReceived {
                payload: opened.plaintext,
                lost: opened.lost,
                kind: Downstream::Control,
                broadcast: false,
            }],

            MessageType::ClockResponse => {
                let Ok(response) = ClockResponse::from_bytes(&opened.plaintext) else {
                    debug!("malformed clock response");
                    return Vec::new();
                };
                self.clock
                    .complete(response.t1, response.t2, response.t3, t_rx)
                    .map(|(offset_micros, round_trip_micros)| NodeAction::TimeSynced {
                        offset_micros,
                        round_trip_micros,
                    })
                    .into_iter()
                    .collect()
            },

            MessageType::NodeNameResult => NodeNameResult::from_bytes(&opened.plaintext)
                .map(|result| NodeAction::NameResult { code: result.code })
                .into_iter()
                .collect(),

            MessageType::BroadcastKeyResponse => {
                let Ok(response) = BroadcastKeyResponse::from_bytes(&opened.plaintext) else {
                    debug!("malformed broadcast key response");
                    return Vec::new();
                };
                self.broadcast = Some(BroadcastKey {
                    epoch: response.epoch,
                    key: SymmetricKey::from_bytes(response.key),
                    recv: ReplayWindow::new(),
                    send_counter: 1,
                });
                info!(epoch = response.epoch, "broadcast key updated");
                vec![NodeAction::BroadcastKeyUpdated { epoch: response.epoch }]
            },

            _ => {
                debug!(?msg_type, "unexpected downstream type");
                Vec::new()
            },
        }
    }

    fn on_broadcast_envelope(&mut self, envelope: &Envelope) -> Vec<NodeAction> {
        let gateway = self.config.gateway;
        let window = self.config.protocol.counter_window;
        let use_counter = self.config.protocol.use_counter;

        let refresh = match self.broadcast.as_ref() {
            None => true,
            Some(broadcast) => broadcast.epoch != envelope.key_id,
        };
        if refresh {
            debug!(epoch = envelope.key_id, "broadcast frame under an unheld epoch");
            // Self-heal: ask for the current key if we can.
            return self.request_broadcast_key().unwrap_or_default();
        }

        let Some(broadcast) = self.broadcast.as_mut() else {
            return Vec::new();
        };
        let plaintext =
            match open_with_key(&broadcast.key, envelope, gateway, MacAddress::BROADCAST) {
                Ok(plaintext) => plaintext,
                Err(error) => {
                    self.packets_err += 1;
                    debug!(%error, "broadcast frame failed authentication");
                    return Vec::new();
                },
            };

        let lost = if use_counter {
            match broadcast.recv.offer(envelope.counter, window) {
                CounterOutcome::Accepted { lost } => lost,
                CounterOutcome::Rejected { .. } => {
                    self.packets_err += 1;
                    return Vec::new();
                },
            }
        } else {
            0
        };

        self.packets_ok += 1;
        let kind = match envelope.msg_type {
            MessageType::DownstreamBroadcastDataGet => Downstream::Get,
            MessageType::DownstreamBroadcastCtrlData => Downstream::Control,
            _ => Downstream::Set,
        };
        vec![NodeAction::DataReceived { payload: plaintext, lost, kind, broadcast: true }]
    }

    fn on_invalidate(&mut self, reason: InvalidateReason, hmac: &[u8; 32]) -> Vec<NodeAction> {
        if !verify_invalidate_frame(&self.config.network_key, reason, hmac) {
            debug!(?reason, "unauthentic invalidate frame ignored");
            return Vec::new();
        }

        info!(?reason, "session invalidated by gateway");
        self.drop_session(PeerStatus::Unregistered);
        let mut actions = vec![NodeAction::Disconnected { reason }];
        if self.config.auto_reconnect && reason != InvalidateReason::Kicked {
            actions.extend(self.connect());
        }
        actions
    }

    fn drop_session(&mut self, transition: PeerStatus) {
        // Key material zeroizes as the session drops.
        self.session = None;
        self.established_at = None;
        self.status = transition;
    }

    fn seal_upstream(
        &mut self,
        msg_type: MessageType,
        plaintext: &[u8],
    ) -> Result<Vec<NodeAction>, NodeError> {
        check_payload_len(plaintext)?;
        if !self.status.is_registered() {
            return Err(NodeError::NotRegistered);
        }
        let prefix = self.env.random_array();
        let src = self.config.mac;
        let dst = self.config.gateway;
        let session = self.session.as_mut().ok_or(NodeError::NotRegistered)?;

        let envelope =
            session.seal(prefix, msg_type, src, dst, plaintext).map_err(|_| NodeError::NotRegistered)?;
        let frame = Frame::Envelope(envelope).to_bytes()?;
        Ok(vec![NodeAction::Send { dst, frame }])
    }
}

/// Encode a frame the runtime built itself; bounded layouts only.
fn encode_internal(frame: &Frame) -> Option<Vec<u8>> {
    match frame.to_bytes() {
        Ok(bytes) => Some(bytes),
        Err(error) => {
            warn!(%error, "internal frame exceeded MTU");
            None
        },
    }
}

fn check_payload_len(payload: &[u8]) -> Result<(), NodeError> {
    let frame_len = ENVELOPE_HEADER_LEN + payload.len() + AEAD_TAG_LEN;
    if frame_len > MAX_FRAME_LEN {
        return Err(NodeError::Encode(emberlink_proto::ProtocolError::FrameTooLong {
            len: frame_len,
            max: MAX_FRAME_LEN,
        }));
    }
    Ok(())
}
