//! Per-process node state shared by every task of every generation.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use lanchat_core::config::LanchatConfig;
use lanchat_core::{Packet, UiPacket};

use crate::commands::CommandRegistry;
use crate::registry::{
    ConnectionRegistry, PeerId, PeerInfo, RestartHandle, RestartRequest, Role,
};

/// Settings the node is started with. Built by the process from its config.
#[derive(Debug, Clone)]
pub struct NodeSettings {
    pub name: String,
    pub port: u16,
    pub ping_interval: Duration,
    pub backoff_ceiling: Duration,
}

impl From<&LanchatConfig> for NodeSettings {
    fn from(config: &LanchatConfig) -> Self {
        Self {
            name: config.identity.username.clone(),
            port: config.network.port,
            ping_interval: Duration::from_secs(config.lifecycle.ping_interval_secs.max(1)),
            backoff_ceiling: Duration::from_millis(config.lifecycle.backoff_ceiling_ms),
        }
    }
}

/// Identity, registry, and presentation link of one node.
pub struct Node {
    name: RwLock<String>,
    port: u16,
    registry: ConnectionRegistry,
    commands: CommandRegistry,
    to_ui: mpsc::Sender<UiPacket>,
}

impl Node {
    /// Build a node and the receiving end of its restart mailbox.
    pub fn new(
        name: impl Into<String>,
        port: u16,
        to_ui: mpsc::Sender<UiPacket>,
    ) -> (Arc<Self>, mpsc::Receiver<RestartRequest>) {
        let (restart, restart_rx) = RestartHandle::mailbox();
        let node = Arc::new(Self {
            name: RwLock::new(name.into()),
            port,
            registry: ConnectionRegistry::new(restart),
            commands: CommandRegistry::builtin(),
            to_ui,
        });
        (node, restart_rx)
    }

    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        *self.name.write() = name.into();
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn role(&self) -> Role {
        self.registry.role()
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    pub fn request_restart(&self, req: RestartRequest) -> bool {
        self.registry.request_restart(req)
    }

    /// Clone of the presentation sender, for tasks that outlive a borrow.
    pub fn ui_sender(&self) -> mpsc::Sender<UiPacket> {
        self.to_ui.clone()
    }

    /// Push a packet to the presentation layer.
    pub async fn emit(&self, packet: UiPacket) {
        if self.to_ui.send(packet).await.is_err() {
            tracing::debug!("presentation queue closed, dropping packet");
        }
    }

    /// Push an Admin notice to the presentation layer.
    pub async fn log_to_ui(&self, message: impl Into<String>) {
        self.emit(UiPacket::admin(message)).await;
    }

    /// Write one packet to `id`. Returns true if it was written.
    ///
    /// A failed write drops the peer the same way a closed connection does.
    pub async fn transmit(&self, packet: &Packet, id: &str) -> bool {
        let delivery = self.registry.transmit(packet, id).await;
        self.announce_departures(delivery.dropped).await;
        delivery.delivered == 1
    }

    /// Send to every peer except `except`. Returns how many writes succeeded.
    ///
    /// Peers whose write fails are dropped and their departure announced.
    pub async fn broadcast(&self, packet: &Packet, except: Option<&str>) -> usize {
        let delivery = self.registry.broadcast(packet, except).await;
        self.announce_departures(delivery.dropped).await;
        delivery.delivered
    }

    /// Standard removal path for a peer whose connection ended.
    ///
    /// Announced peers get a departure notice, locally and to the rest.
    pub async fn drop_peer(&self, id: &PeerId) {
        if let Some(info) = self.registry.remove(id) {
            self.announce_departures(vec![info]).await;
        }
    }

    /// Tell the UI and the remaining peers about peers that are already
    /// removed. A notice that fails to reach someone queues them too.
    async fn announce_departures(&self, mut departed: Vec<PeerInfo>) {
        while let Some(info) = departed.pop() {
            if info.name.is_empty() {
                continue;
            }
            let msg = format!("user \"{}\" disconnected", info.name);
            self.log_to_ui(msg.clone()).await;
            let delivery = self
                .registry
                .broadcast(&Packet::admin(msg), Some(&info.id))
                .await;
            departed.extend(delivery.dropped);
        }
    }
}
