//! Lanchat integration test harness.
//!
//! Every test runs several complete nodes inside one process, talking over
//! loopback TCP. Each node gets its own registry, supervisor, and pair of
//! presentation queues, so nothing is shared between them but the network.
//!
//!   cargo test --test integration
//!
//! Each test picks its own free port; tests can run in parallel.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use lanchat_core::{UiPacket, UiPacketType, UI_QUEUE_CAPACITY};
use lanchat_services::{
    LifecycleState, LocalhostScanner, NetScanner, Node, NodeSettings, NullScanner, Supervisor,
};

mod election;
mod failover;
mod relay;

// ── Harness ───────────────────────────────────────────────────────────────────

/// Upper bound for any single expectation.
pub const WAIT: Duration = Duration::from_secs(10);

/// A port nobody is listening on right now.
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|l| l.local_addr())
        .map(|a| a.port())
        .expect("no free port")
}

/// A running node plus both ends of its presentation layer.
pub struct TestNode {
    pub node: Arc<Node>,
    pub state: watch::Receiver<LifecycleState>,
    pub ui: mpsc::Receiver<UiPacket>,
    pub input: mpsc::Sender<UiPacket>,
    pub shutdown: CancellationToken,
    pub task: JoinHandle<()>,
}

/// Start a node that becomes hub unconditionally.
pub fn spawn_hub(name: &str, port: u16) -> TestNode {
    spawn_node(name, port, Arc::new(NullScanner))
}

/// Start a node that looks for a hub on 127.0.0.1 only.
pub fn spawn_peer(name: &str, port: u16) -> TestNode {
    let scanner = LocalhostScanner {
        timeout: Duration::from_millis(500),
    };
    spawn_node(name, port, Arc::new(scanner))
}

pub fn spawn_node(name: &str, port: u16, scanner: Arc<dyn NetScanner>) -> TestNode {
    let (to_ui, ui) = mpsc::channel(UI_QUEUE_CAPACITY);
    let (input, from_ui) = mpsc::channel(UI_QUEUE_CAPACITY);
    let shutdown = CancellationToken::new();

    let settings = NodeSettings {
        name: name.to_string(),
        port,
        ping_interval: Duration::from_millis(200),
        backoff_ceiling: Duration::from_millis(50),
    };
    let supervisor = Supervisor::new(settings, scanner, to_ui, from_ui, shutdown.clone());

    TestNode {
        node: supervisor.node(),
        state: supervisor.subscribe(),
        ui,
        input,
        shutdown,
        task: tokio::spawn(supervisor.run()),
    }
}

impl TestNode {
    /// Wait until the supervisor reports `want`.
    pub async fn wait_state(&mut self, want: LifecycleState) -> Result<()> {
        let state = &mut self.state;
        tokio::time::timeout(WAIT, async {
            while *state.borrow_and_update() != want {
                state.changed().await.context("supervisor gone")?;
            }
            Ok::<_, anyhow::Error>(())
        })
        .await
        .with_context(|| format!("timed out waiting for {want:?}"))?
    }

    /// Wait for a UI packet matching `pred`, discarding everything before it.
    pub async fn expect_ui(&mut self, pred: impl Fn(&UiPacket) -> bool) -> Result<UiPacket> {
        let ui = &mut self.ui;
        let mut seen = Vec::new();
        let found = tokio::time::timeout(WAIT, async {
            while let Some(p) = ui.recv().await {
                if pred(&p) {
                    return Some(p);
                }
                seen.push(p.message);
            }
            None
        })
        .await;

        match found {
            Ok(Some(p)) => Ok(p),
            Ok(None) => bail!("presentation queue closed; saw {seen:?}"),
            Err(_) => bail!("no matching UI packet; saw {seen:?}"),
        }
    }

    /// Wait for an Admin notice with exactly this text.
    pub async fn expect_admin(&mut self, text: &str) -> Result<()> {
        self.expect_ui(|p| p.kind == UiPacketType::Admin && p.message == text)
            .await
            .map(|_| ())
    }

    /// Type a line as the local user.
    pub async fn say(&self, line: &str) -> Result<()> {
        self.input
            .send(UiPacket::chat("", line))
            .await
            .context("node stopped reading input")
    }

    /// Cancel the root token and wait for the supervisor to finish.
    pub async fn stop(self) -> Result<()> {
        self.shutdown.cancel();
        tokio::time::timeout(WAIT, self.task)
            .await
            .context("supervisor did not stop")?
            .context("supervisor panicked")
    }
}

/// A hub and two peers, fully introduced to each other.
pub async fn three_node_network(port: u16) -> Result<(TestNode, TestNode, TestNode)> {
    let mut alice = spawn_hub("alice", port);
    alice.wait_state(LifecycleState::Hub).await?;

    let mut bob = spawn_peer("bob", port);
    bob.wait_state(LifecycleState::Peer).await?;
    alice.expect_admin("user \"bob\" connected").await?;
    bob.expect_admin("user \"alice\" connected").await?;

    let mut carol = spawn_peer("carol", port);
    carol.wait_state(LifecycleState::Peer).await?;
    alice.expect_admin("user \"carol\" connected").await?;
    carol.expect_admin("user \"alice\" connected").await?;
    bob.expect_admin("user \"carol\" connected").await?;

    Ok((alice, bob, carol))
}
