//! End-to-end scenarios driving a gateway and node runtime against each
//! other over a shared deterministic environment. Frames travel by
//! handing one side's `Send` actions to the other side's packet handler;
//! nothing is mocked below the wire format.

use std::time::Duration;

use emberlink_core::{ManualEnv, PeerStatus, RxPacket};
use emberlink_gateway::{
    DownstreamKind, Gateway, GatewayAction, GatewayConfig, PayloadEncoding,
};
use emberlink_node::{NodeAction, NodeConfig, NodeRuntime};
use emberlink_proto::{Envelope, Frame, InvalidateReason, MacAddress, MessageType, NONCE_LEN};

const GW_MAC: MacAddress = MacAddress::new([0x02, 0x10, 0x20, 0x30, 0x40, 0x50]);
const NODE_A: MacAddress = MacAddress::new([0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0x01]);
const NODE_B: MacAddress = MacAddress::new([0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0x02]);
const STRANGER: MacAddress = MacAddress::new([0xBB, 0xBB, 0xBB, 0xBB, 0xBB, 0x02]);
const NETWORK_KEY: [u8; 32] = [0x5C; 32];

fn gateway(env: &ManualEnv) -> Gateway<ManualEnv> {
    let (gateway, _producer) =
        Gateway::new(env.clone(), GatewayConfig::new(GW_MAC, NETWORK_KEY, "greenhouse"));
    gateway
}

fn node(env: &ManualEnv, mac: MacAddress) -> NodeRuntime<ManualEnv> {
    NodeRuntime::new(env.clone(), NodeConfig::new(mac, GW_MAC, NETWORK_KEY))
}

fn packet(src: MacAddress, frame: Vec<u8>) -> RxPacket {
    RxPacket { src, data: frame, rssi: Some(-42), rx_micros: None }
}

/// Hand every frame a node emitted to the gateway.
fn node_to_gateway(
    gateway: &mut Gateway<ManualEnv>,
    src: MacAddress,
    actions: Vec<NodeAction>,
) -> Vec<GatewayAction> {
    let mut out = Vec::new();
    for action in actions {
        if let NodeAction::Send { frame, .. } = action {
            out.extend(gateway.handle_packet(packet(src, frame)));
        }
    }
    out
}

/// Hand every frame the gateway emitted for `mac` (or broadcast) to a node.
fn gateway_to_node(
    node: &mut NodeRuntime<ManualEnv>,
    mac: MacAddress,
    actions: Vec<GatewayAction>,
) -> Vec<NodeAction> {
    let mut out = Vec::new();
    for action in actions {
        if let GatewayAction::Send { dst, frame } = action {
            if dst == mac || dst.is_broadcast() {
                out.extend(node.handle_packet(packet(GW_MAC, frame)));
            }
        }
    }
    out
}

/// Run a full handshake and return the node's acknowledged key epoch.
fn register(
    gateway: &mut Gateway<ManualEnv>,
    node: &mut NodeRuntime<ManualEnv>,
    mac: MacAddress,
) -> u8 {
    let hello = node.connect();
    let replies = node_to_gateway(gateway, mac, hello);
    let events = gateway_to_node(node, mac, replies);
    events
        .iter()
        .find_map(|event| match event {
            NodeAction::Registered { key_id } => Some(*key_id),
            _ => None,
        })
        .expect("handshake should complete")
}

#[test]
fn happy_path_handshake_and_sensor_data() {
    let env = ManualEnv::new(1);
    let mut gw = gateway(&env);
    let mut sensor = node(&env, NODE_A);

    let hello = sensor.connect();
    let replies = node_to_gateway(&mut gw, NODE_A, hello);
    assert!(
        replies.iter().any(|a| matches!(a, GatewayAction::NewNode { mac, .. } if *mac == NODE_A)),
        "first registration surfaces a new-node event"
    );

    let events = gateway_to_node(&mut sensor, NODE_A, replies);
    assert!(events.iter().any(|e| matches!(e, NodeAction::Registered { key_id: 1 })));
    assert!(events.iter().any(|e| matches!(e, NodeAction::BroadcastKeyUpdated { .. })));
    assert_eq!(sensor.status(), PeerStatus::Registered);

    let record = gw.node(&NODE_A).expect("gateway holds the session");
    assert_eq!(record.last_key_id, 1);
    assert!(record.status.is_registered());

    let sends = sensor.send_data(b"hello", false).unwrap();
    let delivered = node_to_gateway(&mut gw, NODE_A, sends);
    assert_eq!(
        delivered,
        vec![GatewayAction::DataReceived {
            src: NODE_A,
            name: None,
            payload: b"hello".to_vec(),
            lost: 0,
            control: false,
            encoding: PayloadEncoding::Encrypted,
        }]
    );
    assert_eq!(gw.node(&NODE_A).unwrap().packets_ok, 1);
}

#[test]
fn replayed_frame_is_rejected_without_delivery() {
    let env = ManualEnv::new(2);
    let mut gw = gateway(&env);
    let mut sensor = node(&env, NODE_A);
    register(&mut gw, &mut sensor, NODE_A);

    let sends = sensor.send_data(b"hello", false).unwrap();
    let NodeAction::Send { frame, .. } = &sends[0] else {
        unreachable!("send_data emits one frame")
    };
    let replayed = frame.clone();

    node_to_gateway(&mut gw, NODE_A, sends);
    let second = gw.handle_packet(packet(NODE_A, replayed));
    assert!(
        !second.iter().any(|a| matches!(a, GatewayAction::DataReceived { .. })),
        "replay must not reach the application"
    );
    assert_eq!(gw.node(&NODE_A).unwrap().packets_err, 1);
}

#[test]
fn out_of_order_within_window_reports_losses() {
    let env = ManualEnv::new(3);
    let mut gw = gateway(&env);
    let mut sensor = node(&env, NODE_A);
    register(&mut gw, &mut sensor, NODE_A);

    // ctr=1 accepted
    let first = sensor.send_data(b"one", false).unwrap();
    node_to_gateway(&mut gw, NODE_A, first);

    // ctr=2..4 sealed but never delivered
    let _lost2 = sensor.send_data(b"two", false).unwrap();
    let lost3 = sensor.send_data(b"three", false).unwrap();
    let _lost4 = sensor.send_data(b"four", false).unwrap();

    // ctr=5 arrives next: accepted with three losses
    let fifth = sensor.send_data(b"five", false).unwrap();
    let delivered = node_to_gateway(&mut gw, NODE_A, fifth);
    assert!(delivered.iter().any(
        |a| matches!(a, GatewayAction::DataReceived { payload, lost: 3, .. } if payload == b"five")
    ));

    // The late ctr=3 frame is no longer strictly ahead: rejected
    let late = node_to_gateway(&mut gw, NODE_A, lost3);
    assert!(!late.iter().any(|a| matches!(a, GatewayAction::DataReceived { .. })));
    assert_eq!(gw.node(&NODE_A).unwrap().packets_err, 1);
}

#[test]
fn key_expiry_invalidates_and_node_reregisters() {
    let env = ManualEnv::new(4);
    let mut gw = gateway(&env);
    let mut sensor = node(&env, NODE_A);
    register(&mut gw, &mut sensor, NODE_A);

    env.advance(Duration::from_secs(49 * 60 * 60)); // past the 48 h validity

    let sends = sensor.send_data(b"stale", false).unwrap();
    let replies = node_to_gateway(&mut gw, NODE_A, sends);
    assert!(replies.iter().any(|a| matches!(
        a,
        GatewayAction::NodeDisconnected { mac, reason: InvalidateReason::KeyExpired } if *mac == NODE_A
    )));
    assert!(!gw.node(&NODE_A).unwrap().status.is_registered());

    // The invalidate reaches the node, which auto-starts a new handshake
    let events = gateway_to_node(&mut sensor, NODE_A, replies);
    assert!(events.iter().any(|e| matches!(
        e,
        NodeAction::Disconnected { reason: InvalidateReason::KeyExpired }
    )));
    let reconnect: Vec<NodeAction> = events
        .into_iter()
        .filter(|e| matches!(e, NodeAction::Send { .. }))
        .collect();
    let replies = node_to_gateway(&mut gw, NODE_A, reconnect);
    let events = gateway_to_node(&mut sensor, NODE_A, replies);
    assert!(
        events.iter().any(|e| matches!(e, NodeAction::Registered { key_id: 2 })),
        "re-registration strictly increments the key epoch"
    );
}

#[test]
fn stranger_data_gets_invalidate_and_no_session() {
    let env = ManualEnv::new(5);
    let mut gw = gateway(&env);

    let forged = Frame::Envelope(Envelope {
        msg_type: MessageType::SensorData,
        key_id: 1,
        counter: 1,
        nonce: [0u8; NONCE_LEN],
        ciphertext: vec![0u8; 32],
    })
    .to_bytes()
    .unwrap();

    let replies = gw.handle_packet(packet(STRANGER, forged));
    let [GatewayAction::Send { dst, frame }] = replies.as_slice() else {
        unreachable!("exactly one invalidate reply expected")
    };
    assert_eq!(*dst, STRANGER);
    assert!(matches!(
        Frame::decode(frame),
        Ok(Frame::InvalidateKey { reason: InvalidateReason::UnregisteredNode, .. })
    ));
    assert!(gw.node(&STRANGER).is_none(), "no session is allocated for strangers");
}

#[test]
fn name_collision_keeps_the_prior_owner() {
    let env = ManualEnv::new(6);
    let mut gw = gateway(&env);
    let mut a = node(&env, NODE_A);
    let mut b = node(&env, NODE_B);
    register(&mut gw, &mut a, NODE_A);
    register(&mut gw, &mut b, NODE_B);

    let sends = a.set_name("kitchen").unwrap();
    let replies = node_to_gateway(&mut gw, NODE_A, sends);
    let events = gateway_to_node(&mut a, NODE_A, replies);
    assert!(events.iter().any(|e| matches!(e, NodeAction::NameResult { code: 0 })));

    let sends = b.set_name("kitchen").unwrap();
    let replies = node_to_gateway(&mut gw, NODE_B, sends);
    let events = gateway_to_node(&mut b, NODE_B, replies);
    assert!(events.iter().any(|e| matches!(e, NodeAction::NameResult { code: -1 })));

    assert_eq!(gw.node(&NODE_A).unwrap().name.as_deref(), Some("kitchen"));
    assert_eq!(gw.node(&NODE_B).unwrap().name, None);
}

#[test]
fn rehandshake_bumps_epoch_and_stale_frames_drop_silently() {
    let env = ManualEnv::new(7);
    let mut gw = gateway(&env);
    let mut sensor = node(&env, NODE_A);
    register(&mut gw, &mut sensor, NODE_A);

    // A frame sealed under epoch 1, held back (e.g. displaced into the
    // overflow area during a burst)
    let held = sensor.send_data(b"old-epoch", false).unwrap();

    // The node re-handshakes; both sides move to epoch 2
    let mut fresh = node(&env, NODE_A);
    let key_id = register(&mut gw, &mut fresh, NODE_A);
    assert_eq!(key_id, 2);

    // The held frame surfaces after the rekey: dropped, no delivery, no
    // invalidation
    let late = node_to_gateway(&mut gw, NODE_A, held);
    assert!(late.is_empty(), "stale-epoch frames are dropped silently");
    assert!(gw.node(&NODE_A).unwrap().status.is_registered());
}

#[test]
fn decrypt_failure_invalidates_the_session() {
    let env = ManualEnv::new(8);
    let mut gw = gateway(&env);
    let mut sensor = node(&env, NODE_A);
    register(&mut gw, &mut sensor, NODE_A);

    let sends = sensor.send_data(b"payload", false).unwrap();
    let NodeAction::Send { frame, .. } = &sends[0] else {
        unreachable!("send_data emits one frame")
    };
    let mut tampered = frame.clone();
    let last = tampered.len() - 1;
    tampered[last] ^= 0xFF;

    let replies = gw.handle_packet(packet(NODE_A, tampered));
    assert!(replies.iter().any(|a| matches!(
        a,
        GatewayAction::NodeDisconnected { reason: InvalidateReason::WrongData, .. }
    )));
    assert!(!gw.node(&NODE_A).unwrap().status.is_registered());
}

#[test]
fn clock_sync_recovers_offset_over_a_symmetric_path() {
    let env = ManualEnv::new(9);
    let mut gw = gateway(&env);
    let mut sensor = node(&env, NODE_A);
    register(&mut gw, &mut sensor, NODE_A);

    let request = sensor.request_time().unwrap();
    // Perfect path: no latency either way, shared clock → zero offset
    let replies = node_to_gateway(&mut gw, NODE_A, request);
    let events = gateway_to_node(&mut sensor, NODE_A, replies);

    let synced = events
        .iter()
        .find_map(|e| match e {
            NodeAction::TimeSynced { offset_micros, round_trip_micros } => {
                Some((*offset_micros, *round_trip_micros))
            },
            _ => None,
        })
        .expect("sync should complete");
    assert_eq!(synced, (0, 0));
    assert_eq!(sensor.clock().offset_micros(), Some(0));
}

#[test]
fn sleepy_downstream_is_queued_until_wake() {
    let env = ManualEnv::new(10);
    let mut gw = gateway(&env);
    let mut sensor = node(&env, NODE_A);
    register(&mut gw, &mut sensor, NODE_A);

    let sends = sensor.set_sleepy(true).unwrap();
    node_to_gateway(&mut gw, NODE_A, sends);
    assert_eq!(gw.node(&NODE_A).unwrap().status, PeerStatus::Sleepy);

    // Downstream while asleep: nothing on the air yet
    let actions = gw.send_downstream(NODE_A, b"valve=1", DownstreamKind::Set).unwrap();
    assert!(actions.is_empty());
    assert_eq!(gw.node(&NODE_A).unwrap().pending_downstream.len(), 1);

    // Next upstream frame is the wake signal; the queued frame rides out
    let sends = sensor.send_data(b"awake", false).unwrap();
    let replies = node_to_gateway(&mut gw, NODE_A, sends);
    assert!(replies.iter().any(|a| matches!(a, GatewayAction::Send { dst, .. } if *dst == NODE_A)));
    assert!(gw.node(&NODE_A).unwrap().pending_downstream.is_empty());

    let events = gateway_to_node(&mut sensor, NODE_A, replies);
    assert!(events.iter().any(|e| matches!(
        e,
        NodeAction::DataReceived { payload, broadcast: false, .. } if payload == b"valve=1"
    )));
}

#[test]
fn queued_downstream_expires_after_ttl() {
    let env = ManualEnv::new(11);
    let mut gw = gateway(&env);
    let mut sensor = node(&env, NODE_A);
    register(&mut gw, &mut sensor, NODE_A);
    node_to_gateway(&mut gw, NODE_A, sensor.set_sleepy(true).unwrap());

    gw.send_downstream(NODE_A, b"stale", DownstreamKind::Set).unwrap();
    env.advance(Duration::from_secs(121)); // past the 120 s TTL
    gw.tick();
    assert!(gw.node(&NODE_A).unwrap().pending_downstream.is_empty());
}

#[test]
fn broadcast_downstream_reaches_every_registered_node() {
    let env = ManualEnv::new(12);
    let mut gw = gateway(&env);
    let mut a = node(&env, NODE_A);
    let mut b = node(&env, NODE_B);
    register(&mut gw, &mut a, NODE_A);
    register(&mut gw, &mut b, NODE_B);

    let action = gw.broadcast_downstream(b"all-report", DownstreamKind::Control).unwrap();
    for sensor in [&mut a, &mut b] {
        let events = gateway_to_node(sensor, NODE_A, vec![action.clone()]);
        assert!(events.iter().any(|e| matches!(
            e,
            NodeAction::DataReceived { payload, broadcast: true, .. } if payload == b"all-report"
        )));
    }
}

#[test]
fn broadcast_key_rotation_redistributes_and_old_epoch_drops() {
    let env = ManualEnv::new(13);
    let mut gw = gateway(&env);
    let mut sensor = node(&env, NODE_A);
    register(&mut gw, &mut sensor, NODE_A);
    assert_eq!(sensor.broadcast_epoch(), Some(1));

    let redistribution = gw.rotate_broadcast_key();
    let events = gateway_to_node(&mut sensor, NODE_A, redistribution);
    assert!(events.iter().any(|e| matches!(e, NodeAction::BroadcastKeyUpdated { epoch: 2 })));
    assert_eq!(sensor.broadcast_epoch(), Some(2));

    // A broadcast sealed after rotation decrypts under the new key
    let action = gw.broadcast_downstream(b"fresh", DownstreamKind::Set).unwrap();
    let events = gateway_to_node(&mut sensor, NODE_A, vec![action]);
    assert!(events.iter().any(|e| matches!(
        e,
        NodeAction::DataReceived { broadcast: true, .. }
    )));
}

#[test]
fn restart_command_surfaces_and_stays_out_of_data_path() {
    let env = ManualEnv::new(14);
    let mut gw = gateway(&env);
    let mut sensor = node(&env, NODE_A);
    register(&mut gw, &mut sensor, NODE_A);

    let sends = sensor.request_gateway_restart().unwrap();
    let replies = node_to_gateway(&mut gw, NODE_A, sends);
    assert!(replies.iter().any(|a| matches!(
        a,
        GatewayAction::RestartRequested { mac } if *mac == NODE_A
    )));
    assert!(!replies.iter().any(|a| matches!(a, GatewayAction::DataReceived { .. })));
}

#[test]
fn discovery_payloads_are_forwarded_after_the_cadence_delay() {
    let env = ManualEnv::new(15);
    let mut gw = gateway(&env);
    let mut sensor = node(&env, NODE_A);
    register(&mut gw, &mut sensor, NODE_A);
    node_to_gateway(&mut gw, NODE_A, sensor.set_name("kitchen").unwrap());

    let sends = sensor.send_discovery(b"\x81\xA3dev\xA7kitchen").unwrap();
    let immediate = node_to_gateway(&mut gw, NODE_A, sends);
    assert!(
        !immediate.iter().any(|a| matches!(a, GatewayAction::Discovery { .. })),
        "discovery is paced, never released inline"
    );

    // Under the first-item delay: still held
    env.advance(Duration::from_secs(4));
    assert!(gw.tick().iter().all(|a| !matches!(a, GatewayAction::Discovery { .. })));

    // Past it: released with the node's name in the topic
    env.advance(Duration::from_secs(2));
    let released = gw.tick();
    assert!(released.iter().any(|a| matches!(
        a,
        GatewayAction::Discovery { mac, topic, .. }
            if *mac == NODE_A && topic == "greenhouse/kitchen/config"
    )));
}

#[test]
fn table_capacity_rejects_extra_handshakes() {
    let env = ManualEnv::new(16);
    let mut config = GatewayConfig::new(GW_MAC, NETWORK_KEY, "greenhouse");
    config.max_nodes = 1;
    let (mut gw, _producer) = Gateway::new(env.clone(), config);

    let mut a = node(&env, NODE_A);
    register(&mut gw, &mut a, NODE_A);

    let mut b = node(&env, NODE_B);
    let hello = b.connect();
    let replies = node_to_gateway(&mut gw, NODE_B, hello);
    let [GatewayAction::Send { frame, .. }] = replies.as_slice() else {
        unreachable!("full table answers with exactly one frame")
    };
    assert!(matches!(
        Frame::decode(frame),
        Ok(Frame::InvalidateKey { reason: InvalidateReason::UnknownError, .. })
    ));
    assert!(gw.node(&NODE_B).is_none());
}

#[test]
fn admin_kick_disconnects_and_node_stays_down() {
    let env = ManualEnv::new(17);
    let mut gw = gateway(&env);
    let mut sensor = node(&env, NODE_A);
    register(&mut gw, &mut sensor, NODE_A);

    let replies = gw.kick(NODE_A);
    assert!(replies.iter().any(|a| matches!(
        a,
        GatewayAction::NodeDisconnected { reason: InvalidateReason::Kicked, .. }
    )));

    let events = gateway_to_node(&mut sensor, NODE_A, replies);
    assert!(events.iter().any(|e| matches!(
        e,
        NodeAction::Disconnected { reason: InvalidateReason::Kicked }
    )));
    // Kicked nodes do not auto-reconnect
    assert!(!events.iter().any(|e| matches!(e, NodeAction::Send { .. })));
    assert_eq!(sensor.status(), PeerStatus::Unregistered);
}
