//! Protocol dispatcher: routes decoded packets and local input.
//!
//! Inbound packets come from a connection's decode loop; outbound packets
//! come from the presentation layer through the input pump.

use lanchat_core::{Packet, PacketType, UiPacket};

use crate::node::Node;

fn invalid_command(message: &str) -> String {
    format!("invalid command '{message}'. Run ':help' to see available commands")
}

/// Route one packet received from peer `from`.
pub async fn handle_inbound(node: &Node, packet: Packet, from: &str) {
    match packet.kind {
        PacketType::Ping => {
            tracing::trace!(peer = %from, "ping");
        }
        PacketType::Chat => {
            node.emit(UiPacket::chat(packet.user.clone(), packet.message.clone()))
                .await;
            node.broadcast(&packet, Some(from)).await;
        }
        PacketType::Admin => {
            node.emit(UiPacket::admin(packet.message)).await;
        }
        PacketType::Cmd => match node.commands().lookup(&packet.message) {
            Some(cmd) => {
                if let Some(handler) = cmd.inbound {
                    handler(node, &packet, from).await;
                } else {
                    tracing::debug!(peer = %from, command = cmd.name, "command has no inbound effect");
                }
            }
            None => {
                tracing::debug!(peer = %from, message = %packet.message, "unknown command");
                node.log_to_ui(invalid_command(&packet.message)).await;
            }
        },
    }
}

/// Turn one action from the presentation layer into wire traffic.
pub async fn handle_outbound(node: &Node, packet: UiPacket) {
    if packet.is_command() {
        match node.commands().lookup(&packet.message) {
            Some(cmd) => match cmd.outbound {
                Some(handler) => handler(node, &packet).await,
                None => node.log_to_ui(invalid_command(&packet.message)).await,
            },
            None => node.log_to_ui(invalid_command(&packet.message)).await,
        }
        return;
    }

    let wire = Packet::chat(node.name(), packet.message);
    node.broadcast(&wire, None).await;
}
