//! Application controller dispatch.
//!
//! Node behavior plugs into the runtime through a capability trait
//! instead of subclassing: `on_setup` runs once after registration,
//! `on_loop` runs every main-loop pass, `on_rx` runs for every delivered
//! downstream payload. All hooks get the runtime and may send through it;
//! whatever actions they produce are merged into the step's output.

use emberlink_core::{Environment, RxPacket};

use crate::runtime::{Downstream, NodeAction, NodeRuntime};

/// Application hooks driven by [`step`].
pub trait Controller<E: Environment> {
    /// Runs once after the node first registers with its gateway.
    fn on_setup(&mut self, node: &mut NodeRuntime<E>) -> Vec<NodeAction> {
        let _ = node;
        Vec::new()
    }

    /// Runs on every main-loop pass, before captured frames are handled.
    fn on_loop(&mut self, node: &mut NodeRuntime<E>) -> Vec<NodeAction> {
        let _ = node;
        Vec::new()
    }

    /// Runs for every downstream payload delivered to the application.
    fn on_rx(
        &mut self,
        node: &mut NodeRuntime<E>,
        payload: &[u8],
        kind: Downstream,
        broadcast: bool,
    ) -> Vec<NodeAction>;
}

/// One cooperative main-loop pass: controller loop hook, then runtime
/// housekeeping, then every captured frame, feeding delivered payloads
/// back into the controller.
pub fn step<E: Environment, C: Controller<E>>(
    node: &mut NodeRuntime<E>,
    controller: &mut C,
    packets: impl IntoIterator<Item = RxPacket>,
) -> Vec<NodeAction> {
    let mut actions = controller.on_loop(node);
    actions.extend(node.tick());

    for packet in packets {
        for action in node.handle_packet(packet) {
            match &action {
                NodeAction::DataReceived { payload, kind, broadcast, .. } => {
                    let follow_ups = controller.on_rx(node, payload, *kind, *broadcast);
                    actions.push(action.clone());
                    actions.extend(follow_ups);
                },
                NodeAction::Registered { .. } => {
                    actions.push(action.clone());
                    actions.extend(controller.on_setup(node));
                },
                _ => actions.push(action),
            }
        }
    }
    actions
}
