//! Lifecycle supervisor: discovery, election and restarts.
//!
//! The supervisor owns the restart mailbox. Each request tears down the
//! running generation, waits the requested delay, and starts a new one.
//! A generation scans for a hub, then either dials it (role `Peer`) or
//! listens on the configured port (role `Hub`), and in both cases runs the
//! liveness pings and the local input pump until its token is cancelled.
//!
//! Decode loops are not part of a generation. They outlive it and end when
//! their socket does.

use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use lanchat_core::{Packet, UiPacket};

use crate::connection::register_stream;
use crate::dispatch;
use crate::node::{Node, NodeSettings};
use crate::registry::{RestartRequest, Role};
use crate::scanner::NetScanner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Discovering,
    Hub,
    Peer,
    Restarting,
    Stopped,
}

/// Everything a generation needs, shared across generations.
#[derive(Clone)]
struct GenerationCtx {
    node: Arc<Node>,
    scanner: Arc<dyn NetScanner>,
    ping_interval: Duration,
    from_ui: Arc<Mutex<mpsc::Receiver<UiPacket>>>,
    state: Arc<watch::Sender<LifecycleState>>,
}

struct Generation {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl Generation {
    /// Cancel the generation and wait for its accept loop, ping loop, and
    /// input pump to finish.
    async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "generation task failed");
        }
    }
}

pub struct Supervisor {
    ctx: GenerationCtx,
    backoff_ceiling: Duration,
    restart_rx: mpsc::Receiver<RestartRequest>,
    shutdown: CancellationToken,
}

impl Supervisor {
    /// Build a node and its supervisor. `shutdown` is the process root token.
    pub fn new(
        settings: NodeSettings,
        scanner: Arc<dyn NetScanner>,
        to_ui: mpsc::Sender<UiPacket>,
        from_ui: mpsc::Receiver<UiPacket>,
        shutdown: CancellationToken,
    ) -> Self {
        let (node, restart_rx) = Node::new(settings.name, settings.port, to_ui);
        let (state, _) = watch::channel(LifecycleState::Discovering);
        Self {
            ctx: GenerationCtx {
                node,
                scanner,
                ping_interval: settings.ping_interval,
                from_ui: Arc::new(Mutex::new(from_ui)),
                state: Arc::new(state),
            },
            backoff_ceiling: settings.backoff_ceiling,
            restart_rx,
            shutdown,
        }
    }

    pub fn node(&self) -> Arc<Node> {
        self.ctx.node.clone()
    }

    /// Observe lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.ctx.state.subscribe()
    }

    /// Run until the root token is cancelled.
    pub async fn run(mut self) {
        let node = self.ctx.node.clone();
        tracing::info!(
            name = %node.name(),
            port = node.port(),
            scanner = self.ctx.scanner.name(),
            "supervisor starting"
        );
        node.request_restart(RestartRequest::After(Duration::ZERO));

        let mut current: Option<Generation> = None;
        let mut generation: u64 = 0;

        loop {
            let req = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                req = self.restart_rx.recv() => match req {
                    Some(r) => r,
                    None => break,
                },
            };

            // Keep peer removals during teardown from queueing more restarts.
            node.registry().set_role(Role::Hub);
            if let Some(prev) = current.take() {
                self.ctx.state.send_replace(LifecycleState::Restarting);
                prev.stop().await;
            }
            while self.restart_rx.try_recv().is_ok() {}

            let delay = req.delay(self.backoff_ceiling);
            tracing::info!(?req, delay_ms = delay.as_millis() as u64, "restarting");
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }

            generation += 1;
            let token = self.shutdown.child_token();
            let task = tokio::spawn(run_generation(self.ctx.clone(), token.clone(), generation));
            current = Some(Generation { token, task });
        }

        if let Some(prev) = current.take() {
            prev.stop().await;
        }
        let closed = node.registry().clear();
        self.ctx.state.send_replace(LifecycleState::Stopped);
        tracing::info!(closed, "supervisor stopped");
    }
}

// ── Generation ────────────────────────────────────────────────────────────────

/// Drive `fut` to completion unless the generation is cancelled first.
async fn until_cancelled<F: Future>(token: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        _ = token.cancelled() => None,
        out = fut => Some(out),
    }
}

async fn run_generation(ctx: GenerationCtx, token: CancellationToken, generation: u64) {
    let node = &ctx.node;
    let port = node.port();
    ctx.state.send_replace(LifecycleState::Discovering);
    if until_cancelled(&token, node.log_to_ui("Scanning for hosts")).await.is_none() {
        return;
    }

    let found = tokio::select! {
        _ = token.cancelled() => return,
        found = ctx.scanner.find_host(port) => found,
    };

    let listener = match found {
        Some(addr) => {
            let joined = until_cancelled(&token, async {
                node.log_to_ui(format!("Found host at {addr}; connecting..."))
                    .await;
                join_hub(node, addr).await
            });
            match joined.await {
                None => return,
                Some(Err(e)) => {
                    tracing::error!(generation, %addr, error = %e, "failed to join hub");
                    node.request_restart(RestartRequest::Backoff);
                    return;
                }
                Some(Ok(())) => {}
            }
            ctx.state.send_replace(LifecycleState::Peer);
            tracing::info!(generation, hub = %addr, "running as peer");
            None
        }
        None => {
            let notice = node.log_to_ui(format!(
                "No host found; starting server at 0.0.0.0:{port} ..."
            ));
            if until_cancelled(&token, notice).await.is_none() {
                return;
            }
            match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
                Ok(l) => {
                    node.registry().set_role(Role::Hub);
                    ctx.state.send_replace(LifecycleState::Hub);
                    tracing::info!(generation, port, "running as hub");
                    Some(l)
                }
                Err(e) => {
                    tracing::error!(generation, port, error = %e, "failed to listen");
                    node.request_restart(RestartRequest::Backoff);
                    return;
                }
            }
        }
    };

    tokio::join!(
        async {
            if let Some(listener) = listener {
                accept_loop(node, listener, &token).await;
            }
        },
        ping_loop(node, ctx.ping_interval, &token),
        input_pump(node, &ctx.from_ui, &token),
    );
    tracing::debug!(generation, "generation ended");
}

/// Dial the hub, register the connection, and announce our name.
async fn join_hub(node: &Arc<Node>, addr: SocketAddr) -> Result<()> {
    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("failed to connect to {addr}"))?;

    // Set before the reader starts so a quick hangup still counts as orphaning.
    node.registry().set_role(Role::Peer);
    let (id, _reader) = register_stream(node, stream)?;

    let name = node.name();
    node.transmit(&Packet::cmd(name.clone(), format!(":id {name}")), &id)
        .await;
    Ok(())
}

async fn accept_loop(node: &Arc<Node>, listener: TcpListener, token: &CancellationToken) {
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                tracing::debug!("accept loop shutting down");
                return;
            }

            accepted = listener.accept() => {
                let stream = match accepted {
                    Ok((stream, _)) => stream,
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                        continue;
                    }
                };
                match register_stream(node, stream) {
                    Ok((id, _)) => tracing::info!(peer = %id, "peer connected"),
                    Err(e) => tracing::warn!(error = %e, "could not register connection"),
                }
            }
        }
    }
}

async fn ping_loop(node: &Node, period: Duration, token: &CancellationToken) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = ticker.tick() => {
                match until_cancelled(token, node.broadcast(&Packet::ping(), None)).await {
                    Some(sent) => tracing::trace!(sent, "ping"),
                    None => return,
                }
            }
        }
    }
}

async fn input_pump(
    node: &Node,
    from_ui: &Mutex<mpsc::Receiver<UiPacket>>,
    token: &CancellationToken,
) {
    let mut rx = from_ui.lock().await;
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            packet = rx.recv() => match packet {
                Some(p) => {
                    if until_cancelled(token, dispatch::handle_outbound(node, p)).await.is_none() {
                        return;
                    }
                }
                None => {
                    tracing::debug!("presentation queue closed");
                    token.cancelled().await;
                    return;
                }
            },
        }
    }
}
