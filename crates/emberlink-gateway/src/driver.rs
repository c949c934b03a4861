//! Gateway dispatcher.
//!
//! Single-consumer processing of everything the radio captured: frames
//! are decoded, walked through the per-node session (epoch check,
//! decrypt, replay window), and turned into actions for the caller to
//! execute. All session state is owned here; the radio callback's only
//! job is pushing [`RxPacket`]s into the queue handed out by
//! [`Gateway::new`].
//!
//! ```text
//! radio callback ──push──> receive queue ──poll──> dispatcher
//!                                                     │
//!                decode → node table → session → replay window
//!                                                     │
//!                         GatewayAction::{Send, DataReceived, …}
//! ```

use std::time::Duration;

use emberlink_core::{
    Consumer, CounterOutcome, Environment, Opened, PeerStatus, Producer, ProtocolConfig, RxPacket,
    SessionError, invalidate_frame, open_with_key, respond_handshake, ring, seal_with_key,
};
use emberlink_proto::{
    AEAD_TAG_LEN, ClockRequest, ClockResponse, ENVELOPE_HEADER_LEN, Envelope, Frame,
    InvalidateReason, Keying, MAX_FRAME_LEN, MAX_NODE_NAME_LEN, MacAddress, MessageType,
    NodeCommand, NodeNameResult, NodeNameSet,
};
use tracing::{debug, info, warn};
use zeroize::Zeroize;

use crate::{
    broadcast::BroadcastState,
    discovery::{
        DEFAULT_FIRST_DISCOVERY_DELAY, DEFAULT_NEXT_DISCOVERY_DELAY, DiscoveryItem, DiscoveryQueue,
    },
    errors::GatewayError,
    table::{DEFAULT_MAX_NODES, NodeTable, PendingDownstream},
};

/// Default primary receive queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// Default overflow area capacity.
pub const DEFAULT_OVERFLOW_CAPACITY: usize = 15;

/// Whether a delivered payload travelled encrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadEncoding {
    /// Session- or broadcast-keyed envelope
    Encrypted,
    /// Unencrypted node data
    Clear,
}

/// Downstream frame flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownstreamKind {
    /// Write a value on the node
    Set,
    /// Request a value from the node
    Get,
    /// Control-plane payload
    Control,
}

impl DownstreamKind {
    fn unicast_type(self) -> MessageType {
        match self {
            Self::Set => MessageType::DownstreamDataSet,
            Self::Get => MessageType::DownstreamDataGet,
            Self::Control => MessageType::DownstreamCtrlData,
        }
    }

    fn broadcast_type(self) -> MessageType {
        match self {
            Self::Set => MessageType::DownstreamBroadcastDataSet,
            Self::Get => MessageType::DownstreamBroadcastDataGet,
            Self::Control => MessageType::DownstreamBroadcastCtrlData,
        }
    }
}

/// Gateway configuration.
#[derive(Clone)]
pub struct GatewayConfig {
    /// The gateway's own radio address
    pub mac: MacAddress,
    /// Pre-shared network key authenticating handshakes
    pub network_key: [u8; 32],
    /// Network name, used as the discovery topic prefix
    pub network_name: String,
    /// Shared protocol knobs
    pub protocol: ProtocolConfig,
    /// Node table capacity
    pub max_nodes: usize,
    /// Primary receive queue capacity
    pub queue_capacity: usize,
    /// Overflow area capacity
    pub overflow_capacity: usize,
    /// Delay before the first discovery item is released
    pub first_discovery_delay: Duration,
    /// Delay between subsequent discovery items
    pub next_discovery_delay: Duration,
    /// Push the broadcast key to every node as it registers
    pub auto_broadcast_key: bool,
    /// Accept unencrypted node data frames
    pub accept_clear_data: bool,
}

impl GatewayConfig {
    /// Defaults for the given address and network key.
    #[must_use]
    pub fn new(mac: MacAddress, network_key: [u8; 32], network_name: impl Into<String>) -> Self {
        Self {
            mac,
            network_key,
            network_name: network_name.into(),
            protocol: ProtocolConfig::default(),
            max_nodes: DEFAULT_MAX_NODES,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            overflow_capacity: DEFAULT_OVERFLOW_CAPACITY,
            first_discovery_delay: DEFAULT_FIRST_DISCOVERY_DELAY,
            next_discovery_delay: DEFAULT_NEXT_DISCOVERY_DELAY,
            auto_broadcast_key: true,
            accept_clear_data: false,
        }
    }
}

impl Drop for GatewayConfig {
    fn drop(&mut self) {
        self.network_key.zeroize();
    }
}

/// What the dispatcher wants the caller to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayAction {
    /// Transmit an encoded frame
    Send {
        /// Destination address
        dst: MacAddress,
        /// Encoded frame bytes
        frame: Vec<u8>,
    },
    /// Deliver an accepted payload to the application
    DataReceived {
        /// Sending node
        src: MacAddress,
        /// Sending node's claimed name, if any
        name: Option<String>,
        /// Decrypted (or clear) payload
        payload: Vec<u8>,
        /// Frames lost before this one
        lost: u16,
        /// Whether this is control-plane data
        control: bool,
        /// Whether the payload travelled encrypted
        encoding: PayloadEncoding,
    },
    /// A node completed its first handshake since registration was lost
    NewNode {
        /// The node's address
        mac: MacAddress,
        /// Its claimed name, if any survived in the table
        name: Option<String>,
    },
    /// A node's session was destroyed
    NodeDisconnected {
        /// The node's address
        mac: MacAddress,
        /// Why the session ended
        reason: InvalidateReason,
    },
    /// Publish a discovery payload on a node's behalf
    Discovery {
        /// Originating node
        mac: MacAddress,
        /// Topic to publish under
        topic: String,
        /// Opaque payload, forwarded verbatim
        payload: Vec<u8>,
    },
    /// A node asked the gateway host to restart
    RestartRequested {
        /// The requesting node
        mac: MacAddress,
    },
}

/// The gateway runtime.
pub struct Gateway<E: Environment> {
    env: E,
    config: GatewayConfig,
    table: NodeTable<E::Instant>,
    broadcast: BroadcastState,
    discovery: DiscoveryQueue<E::Instant>,
    rx: Consumer<RxPacket>,
}

impl<E: Environment> Gateway<E> {
    /// Create the runtime and the producer handle for the radio receive
    /// callback.
    #[must_use]
    pub fn new(env: E, config: GatewayConfig) -> (Self, Producer<RxPacket>) {
        let (producer, consumer) = ring::channel(config.queue_capacity, config.overflow_capacity);
        let gateway = Self {
            table: NodeTable::new(config.max_nodes),
            broadcast: BroadcastState::new(&env),
            discovery: DiscoveryQueue::new(
                config.first_discovery_delay,
                config.next_discovery_delay,
            ),
            rx: consumer,
            env,
            config,
        };
        (gateway, producer)
    }

    /// Drain the receive queue and process every captured frame.
    pub fn poll(&mut self) -> Vec<GatewayAction> {
        let mut actions = Vec::new();
        while let Some(packet) = self.rx.pop() {
            actions.extend(self.handle_packet(packet));
        }
        actions
    }

    /// Process one captured frame.
    pub fn handle_packet(&mut self, packet: RxPacket) -> Vec<GatewayAction> {
        let frame = match Frame::decode(&packet.data) {
            Ok(frame) => frame,
            Err(error) => {
                debug!(src = %packet.src, %error, "dropping malformed frame");
                if let Some(record) = self.table.find_by_mac_mut(&packet.src) {
                    record.packets_err += 1;
                }
                return Vec::new();
            },
        };

        match frame {
            Frame::ClientHello { public_key, iv, hmac } => {
                self.on_client_hello(packet.src, &public_key, &iv, &hmac, packet.rssi)
            },
            Frame::Envelope(envelope) => {
                let t_rx = packet.rx_micros.unwrap_or_else(|| self.env.now_micros());
                self.on_envelope(packet.src, &envelope, packet.rssi, t_rx)
            },
            Frame::ClearData { counter, payload } => {
                self.on_clear_data(packet.src, counter, payload, packet.rssi)
            },
            Frame::ServerHello { .. } | Frame::InvalidateKey { .. } => {
                debug!(src = %packet.src, "ignoring downstream-only frame");
                Vec::new()
            },
        }
    }

    /// Housekeeping: key expiry, idle eviction, downstream TTL, and the
    /// discovery cadence. Call from the main loop.
    pub fn tick(&mut self) -> Vec<GatewayAction> {
        let now = self.env.now();
        let mut actions = Vec::new();

        for mac in self.table.all_macs() {
            let Some(record) = self.table.find_by_mac_mut(&mac) else { continue };
            let idle = now - record.last_activity;

            if idle > self.config.protocol.max_key_validity * 2 {
                let was_registered = record.status.is_registered();
                self.table.remove(&mac);
                info!(node = %mac, "evicting idle node record");
                if was_registered {
                    actions.push(self.invalidate_send(mac, InvalidateReason::KeyExpired));
                    actions.push(GatewayAction::NodeDisconnected {
                        mac,
                        reason: InvalidateReason::KeyExpired,
                    });
                }
                continue;
            }

            if record.status.is_registered() && idle > self.config.protocol.max_key_validity {
                record.status = PeerStatus::KeyExpired;
                record.invalidate();
                info!(node = %mac, "session key expired");
                actions.push(self.invalidate_send(mac, InvalidateReason::KeyExpired));
                actions.push(GatewayAction::NodeDisconnected {
                    mac,
                    reason: InvalidateReason::KeyExpired,
                });
                continue;
            }

            let ttl = self.config.protocol.downstream_ttl;
            record.pending_downstream.retain(|pending| now - pending.queued_at <= ttl);
        }

        while let Some(item) = self.discovery.release_due(now) {
            actions.push(GatewayAction::Discovery {
                mac: item.mac,
                topic: item.topic,
                payload: item.payload,
            });
        }

        actions
    }

    /// Send an encrypted downstream frame to one node. For sleepy peers
    /// the sealed frame is queued until their next upstream frame.
    ///
    /// # Errors
    ///
    /// - `GatewayError::UnknownNode` / `NotRegistered` for an absent or
    ///   sessionless target
    /// - `GatewayError::Encode` if the payload exceeds the MTU
    pub fn send_downstream(
        &mut self,
        dst: MacAddress,
        payload: &[u8],
        kind: DownstreamKind,
    ) -> Result<Vec<GatewayAction>, GatewayError> {
        check_payload_len(payload)?;
        let now = self.env.now();
        let prefix = self.env.random_array();
        let gateway_mac = self.config.mac;

        let record =
            self.table.find_by_mac_mut(&dst).ok_or(GatewayError::UnknownNode(dst))?;
        let registered = record.status.is_registered();
        let session = record
            .session
            .as_mut()
            .filter(|_| registered)
            .ok_or(GatewayError::NotRegistered(dst))?;

        let envelope = session
            .seal(prefix, kind.unicast_type(), gateway_mac, dst, payload)
            .map_err(|_| GatewayError::NotRegistered(dst))?;
        let frame = Frame::Envelope(envelope).to_bytes()?;

        if record.sleepy {
            record.pending_downstream.push_back(PendingDownstream { queued_at: now, frame });
            debug!(node = %dst, queued = record.pending_downstream.len(), "downstream queued for sleepy node");
            Ok(Vec::new())
        } else {
            Ok(vec![GatewayAction::Send { dst, frame }])
        }
    }

    /// Send a broadcast-keyed downstream frame to every listening node.
    ///
    /// # Errors
    ///
    /// - `GatewayError::Encode` if the payload exceeds the MTU
    pub fn broadcast_downstream(
        &mut self,
        payload: &[u8],
        kind: DownstreamKind,
    ) -> Result<GatewayAction, GatewayError> {
        check_payload_len(payload)?;
        let counter = self.broadcast.next_counter();
        let envelope = seal_with_key(
            self.broadcast.key(),
            self.broadcast.epoch(),
            counter,
            self.env.random_array(),
            kind.broadcast_type(),
            self.config.mac,
            MacAddress::BROADCAST,
            payload,
        );
        let frame = Frame::Envelope(envelope).to_bytes()?;
        Ok(GatewayAction::Send { dst: MacAddress::BROADCAST, frame })
    }

    /// Administratively destroy a node's session.
    pub fn kick(&mut self, mac: MacAddress) -> Vec<GatewayAction> {
        let Some(record) = self.table.find_by_mac_mut(&mac) else {
            return Vec::new();
        };
        let was_registered = record.status.is_registered();
        record.invalidate();
        info!(node = %mac, "kicked");

        let mut actions = vec![self.invalidate_send(mac, InvalidateReason::Kicked)];
        if was_registered {
            actions
                .push(GatewayAction::NodeDisconnected { mac, reason: InvalidateReason::Kicked });
        }
        actions
    }

    /// Rotate the broadcast key to a new epoch and redistribute it to
    /// every registered node.
    pub fn rotate_broadcast_key(&mut self) -> Vec<GatewayAction> {
        self.broadcast.rotate();
        info!(epoch = self.broadcast.epoch(), "broadcast key rotated");

        let mut actions = Vec::new();
        for mac in self.table.active_macs() {
            if let Some(action) = self.send_broadcast_key(mac) {
                actions.push(action);
            }
        }
        actions
    }

    /// Look up a node record.
    #[must_use]
    pub fn node(&self, mac: &MacAddress) -> Option<&crate::table::NodeRecord<E::Instant>> {
        self.table.find_by_mac(mac)
    }

    /// Registered node count.
    #[must_use]
    pub fn active_nodes(&self) -> usize {
        self.table.count_active()
    }

    /// Frames dropped by the receive queue.
    #[must_use]
    pub fn queue_dropped(&self) -> u64 {
        self.rx.dropped()
    }

    /// Current broadcast epoch.
    #[must_use]
    pub fn broadcast_epoch(&self) -> u8 {
        self.broadcast.epoch()
    }

    fn on_client_hello(
        &mut self,
        src: MacAddress,
        public_key: &[u8; 32],
        iv: &[u8; 12],
        hmac: &[u8; 32],
        rssi: Option<i8>,
    ) -> Vec<GatewayAction> {
        let now = self.env.now();

        let response = {
            let Some(record) = self.table.find_or_insert(src, now) else {
                warn!(node = %src, "node table full, rejecting handshake");
                return vec![self.invalidate_send(src, InvalidateReason::UnknownError)];
            };

            let key_id = record.last_key_id.wrapping_add(1);
            match respond_handshake(
                &self.env,
                &self.config.network_key,
                public_key,
                iv,
                hmac,
                key_id,
            ) {
                Ok((session, server_hello)) => {
                    let was_registered = record.status.is_registered();
                    record.session = Some(session);
                    record.last_key_id = key_id;
                    record.status =
                        if record.sleepy { PeerStatus::Sleepy } else { PeerStatus::Registered };
                    record.last_activity = now;
                    record.rssi = rssi.or(record.rssi);
                    record.broadcast_key_sent = false;
                    info!(node = %src, key_id, rehandshake = was_registered, "session established");
                    Some((server_hello, was_registered, record.name.clone()))
                },
                Err(error) => {
                    debug!(node = %src, %error, "rejecting handshake");
                    record.packets_err += 1;
                    None
                },
            }
        };

        let Some((server_hello, was_registered, name)) = response else {
            return Vec::new();
        };

        let mut actions = Vec::new();
        if let Some(frame) = encode_internal(&server_hello) {
            actions.push(GatewayAction::Send { dst: src, frame });
        }
        if !was_registered {
            actions.push(GatewayAction::NewNode { mac: src, name });
        }
        if self.config.auto_broadcast_key {
            if let Some(action) = self.send_broadcast_key(src) {
                actions.push(action);
            }
        }
        actions
    }

    fn on_envelope(
        &mut self,
        src: MacAddress,
        envelope: &Envelope,
        rssi: Option<i8>,
        t_rx: u64,
    ) -> Vec<GatewayAction> {
        match envelope.msg_type.keying() {
            Keying::Session => self.on_session_envelope(src, envelope, rssi, t_rx),
            Keying::Broadcast => self.on_broadcast_envelope(src, envelope, rssi),
            Keying::Clear => Vec::new(),
        }
    }

    fn on_session_envelope(
        &mut self,
        src: MacAddress,
        envelope: &Envelope,
        rssi: Option<i8>,
        t_rx: u64,
    ) -> Vec<GatewayAction> {
        let now = self.env.now();
        let gateway_mac = self.config.mac;

        enum Outcome {
            Unregistered,
            Expired,
            Opened(Opened, Vec<Vec<u8>>),
            Invalidate,
            Drop,
        }

        let outcome = {
            let Some(record) = self.table.find_by_mac_mut(&src) else {
                return vec![self.invalidate_send(src, InvalidateReason::UnregisteredNode)];
            };
            record.rssi = rssi.or(record.rssi);

            let registered = record.status.is_registered();
            if registered && now - record.last_activity > self.config.protocol.max_key_validity {
                record.status = PeerStatus::KeyExpired;
                record.invalidate();
                Outcome::Expired
            } else if let Some(session) = record.session.as_mut().filter(|_| registered) {
                match session.open(envelope, src, gateway_mac, &self.config.protocol) {
                    Ok(opened) => {
                        record.packets_ok += 1;
                        record.last_activity = now;
                        // Upstream traffic is the wake signal for sleepy
                        // peers; release anything queued for them.
                        let pending = record
                            .pending_downstream
                            .drain(..)
                            .map(|pending| pending.frame)
                            .collect();
                        Outcome::Opened(opened, pending)
                    },
                    Err(SessionError::StaleKeyEpoch { expected, got }) => {
                        debug!(node = %src, expected, got, "dropping stale-epoch frame");
                        Outcome::Drop
                    },
                    Err(SessionError::ReplayRejected { counter, last, consecutive }) => {
                        record.packets_err += 1;
                        debug!(node = %src, counter, last, consecutive, "replay rejected");
                        if consecutive >= self.config.protocol.counter_reject_limit {
                            record.invalidate();
                            Outcome::Invalidate
                        } else {
                            Outcome::Drop
                        }
                    },
                    Err(error) => {
                        record.packets_err += 1;
                        warn!(node = %src, %error, "frame failed authentication");
                        if error.invalidates_session() {
                            record.invalidate();
                            Outcome::Invalidate
                        } else {
                            Outcome::Drop
                        }
                    },
                }
            } else {
                Outcome::Unregistered
            }
        };

        match outcome {
            Outcome::Unregistered => {
                vec![self.invalidate_send(src, InvalidateReason::UnregisteredNode)]
            },
            Outcome::Expired => vec![
                self.invalidate_send(src, InvalidateReason::KeyExpired),
                GatewayAction::NodeDisconnected { mac: src, reason: InvalidateReason::KeyExpired },
            ],
            Outcome::Invalidate => vec![
                self.invalidate_send(src, InvalidateReason::WrongData),
                GatewayAction::NodeDisconnected { mac: src, reason: InvalidateReason::WrongData },
            ],
            Outcome::Drop => Vec::new(),
            Outcome::Opened(opened, pending) => {
                let mut actions: Vec<GatewayAction> = pending
                    .into_iter()
                    .map(|frame| GatewayAction::Send { dst: src, frame })
                    .collect();
                actions.extend(self.dispatch_payload(src, envelope.msg_type, opened, t_rx));
                actions
            },
        }
    }

    fn dispatch_payload(
        &mut self,
        src: MacAddress,
        msg_type: MessageType,
        opened: Opened,
        t_rx: u64,
    ) -> Vec<GatewayAction> {
        let name = self.table.find_by_mac(&src).and_then(|record| record.name.clone());
        match msg_type {
            MessageType::SensorData => vec![GatewayAction::DataReceived {
                src,
                name,
                payload: opened.plaintext,
                lost: opened.lost,
                control: false,
                encoding: PayloadEncoding::Encrypted,
            }],

            MessageType::ControlData => match NodeCommand::parse(&opened.plaintext) {
                Some(NodeCommand::RestartGateway) => {
                    info!(node = %src, "gateway restart requested");
                    vec![GatewayAction::RestartRequested { mac: src }]
                },
                Some(NodeCommand::SetSleepy(sleepy)) => {
                    if let Some(record) = self.table.find_by_mac_mut(&src) {
                        record.sleepy = sleepy;
                        if record.status.is_registered() {
                            record.status =
                                if sleepy { PeerStatus::Sleepy } else { PeerStatus::Registered };
                        }
                        debug!(node = %src, sleepy, "sleepy capability updated");
                    }
                    Vec::new()
                },
                None => vec![GatewayAction::DataReceived {
                    src,
                    name,
                    payload: opened.plaintext,
                    lost: opened.lost,
                    control: true,
                    encoding: PayloadEncoding::Encrypted,
                }],
            },

            MessageType::ClockRequest => {
                let Ok(request) = ClockRequest::from_bytes(&opened.plaintext) else {
                    debug!(node = %src, "malformed clock request");
                    return Vec::new();
                };
                let response = ClockResponse {
                    t1: request.t1,
                    t2: t_rx,
                    t3: self.env.now_micros(),
                };
                self.seal_to_node(src, MessageType::ClockResponse, &response.to_bytes())
                    .map(|frame| GatewayAction::Send { dst: src, frame })
                    .into_iter()
                    .collect()
            },

            MessageType::NodeNameSet => self.on_name_set(src, &opened.plaintext),

            MessageType::BroadcastKeyRequest => {
                self.send_broadcast_key(src).into_iter().collect()
            },

            MessageType::HaDiscovery => {
                let node_id = name.clone().unwrap_or_else(|| src.to_string());
                let topic = format!("{}/{node_id}/config", self.config.network_name);
                let sleepy = self.table.find_by_mac(&src).is_some_and(|record| record.sleepy);
                let now = self.env.now();
                self.discovery.push(
                    DiscoveryItem { mac: src, topic, payload: opened.plaintext, sleepy },
                    now,
                );
                Vec::new()
            },

            _ => {
                debug!(node = %src, ?msg_type, "unexpected upstream type");
                Vec::new()
            },
        }
    }

    fn on_name_set(&mut self, src: MacAddress, payload: &[u8]) -> Vec<GatewayAction> {
        let code = match NodeNameSet::from_bytes(payload) {
            Err(_) => {
                debug!(node = %src, "undecodable name request");
                return Vec::new();
            },
            Ok(request) if request.name.is_empty() => NodeNameResult::EMPTY,
            Ok(request) if request.name.len() > MAX_NODE_NAME_LEN => NodeNameResult::TOO_LONG,
            Ok(request) => {
                if self.table.claim_name(src, &request.name) {
                    info!(node = %src, name = %request.name, "name registered");
                    NodeNameResult::ACCEPTED
                } else {
                    debug!(node = %src, name = %request.name, "name already taken");
                    NodeNameResult::ALREADY_TAKEN
                }
            },
        };

        self.seal_to_node(src, MessageType::NodeNameResult, &NodeNameResult { code }.to_bytes())
            .map(|frame| GatewayAction::Send { dst: src, frame })
            .into_iter()
            .collect()
    }

    fn on_broadcast_envelope(
        &mut self,
        src: MacAddress,
        envelope: &Envelope,
        rssi: Option<i8>,
    ) -> Vec<GatewayAction> {
        if envelope.key_id != self.broadcast.epoch() {
            debug!(node = %src, got = envelope.key_id, current = self.broadcast.epoch(),
                "dropping broadcast frame from stale epoch");
            return Vec::new();
        }

        let plaintext =
            match open_with_key(self.broadcast.key(), envelope, src, MacAddress::BROADCAST) {
                Ok(plaintext) => plaintext,
                Err(error) => {
                    debug!(node = %src, %error, "broadcast frame failed authentication");
                    if let Some(record) = self.table.find_by_mac_mut(&src) {
                        record.packets_err += 1;
                    }
                    return Vec::new();
                },
            };

        let now = self.env.now();
        let window = self.config.protocol.counter_window;
        let use_counter = self.config.protocol.use_counter;
        let Some(record) = self.table.find_by_mac_mut(&src) else {
            // Broadcast traffic is not session-bound, but an unknown
            // sender still gets no delivery.
            return vec![self.invalidate_send(src, InvalidateReason::UnregisteredNode)];
        };
        record.rssi = rssi.or(record.rssi);

        let lost = if use_counter {
            match record.broadcast_recv.offer(envelope.counter, window) {
                CounterOutcome::Accepted { lost } => lost,
                CounterOutcome::Rejected { consecutive } => {
                    record.packets_err += 1;
                    debug!(node = %src, counter = envelope.counter, consecutive,
                        "broadcast replay rejected");
                    return Vec::new();
                },
            }
        } else {
            0
        };

        record.packets_ok += 1;
        record.last_activity = now;
        let name = record.name.clone();
        vec![GatewayAction::DataReceived {
            src,
            name,
            payload: plaintext,
            lost,
            control: false,
            encoding: PayloadEncoding::Encrypted,
        }]
    }

    fn on_clear_data(
        &mut self,
        src: MacAddress,
        counter: u16,
        payload: Vec<u8>,
        rssi: Option<i8>,
    ) -> Vec<GatewayAction> {
        if !self.config.accept_clear_data {
            debug!(node = %src, "clear data disabled, dropping");
            return Vec::new();
        }

        let now = self.env.now();
        let window = self.config.protocol.counter_window;
        let use_counter = self.config.protocol.use_counter;
        let Some(record) = self.table.find_or_insert(src, now) else {
            return vec![self.invalidate_send(src, InvalidateReason::UnknownError)];
        };
        record.rssi = rssi.or(record.rssi);

        let lost = if use_counter {
            match record.clear_recv.offer(counter, window) {
                CounterOutcome::Accepted { lost } => lost,
                CounterOutcome::Rejected { .. } => {
                    record.packets_err += 1;
                    return Vec::new();
                },
            }
        } else {
            0
        };

        record.packets_ok += 1;
        record.last_activity = now;
        let name = record.name.clone();
        vec![GatewayAction::DataReceived {
            src,
            name,
            payload,
            lost,
            control: false,
            encoding: PayloadEncoding::Clear,
        }]
    }

    /// Seal a control payload to one registered node under its session.
    fn seal_to_node(
        &mut self,
        dst: MacAddress,
        msg_type: MessageType,
        plaintext: &[u8],
    ) -> Option<Vec<u8>> {
        let prefix = self.env.random_array();
        let gateway_mac = self.config.mac;
        let record = self.table.find_by_mac_mut(&dst)?;
        let session = record.session.as_mut()?;
        let envelope = session.seal(prefix, msg_type, gateway_mac, dst, plaintext).ok()?;
        encode_internal(&Frame::Envelope(envelope))
    }

    fn send_broadcast_key(&mut self, dst: MacAddress) -> Option<GatewayAction> {
        let payload = self.broadcast.response().to_bytes();
        let frame = self.seal_to_node(dst, MessageType::BroadcastKeyResponse, &payload)?;
        if let Some(record) = self.table.find_by_mac_mut(&dst) {
            record.broadcast_key_sent = true;
        }
        Some(GatewayAction::Send { dst, frame })
    }

    fn invalidate_send(&self, dst: MacAddress, reason: InvalidateReason) -> GatewayAction {
        let frame = invalidate_frame(&self.config.network_key, reason);
        let bytes = encode_internal(&frame).unwrap_or_default();
        GatewayAction::Send { dst, frame: bytes }
    }
}

/// Encode a frame the gateway built itself. All internal layouts are
/// bounded well under the MTU, so failure indicates a bug, not input.
fn encode_internal(frame: &Frame) -> Option<Vec<u8>> {
    match frame.to_bytes() {
        Ok(bytes) => Some(bytes),
        Err(error) => {
            warn!(%error, "internal frame exceeded MTU");
            None
        },
    }
}

fn check_payload_len(payload: &[u8]) -> Result<(), GatewayError> {
    let frame_len = ENVELOPE_HEADER_LEN + payload.len() + AEAD_TAG_LEN;
    if frame_len > MAX_FRAME_LEN {
        return Err(GatewayError::Encode(emberlink_proto::ProtocolError::FrameTooLong {
            len: frame_len,
            max: MAX_FRAME_LEN,
        }));
    }
    Ok(())
}
