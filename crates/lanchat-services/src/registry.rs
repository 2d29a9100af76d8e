//! Connection registry: the live set of peers this node talks to.
//!
//! Entries are keyed by the remote transport address. All bookkeeping
//! happens under one readers-writer lock that is only ever held for map
//! operations; encoding and socket writes run after the guard is released,
//! serialized per peer by that peer's own writer mutex.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::SinkExt;
use parking_lot::RwLock;
use rand::Rng;
use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, Mutex};
use tokio_util::codec::FramedWrite;

use lanchat_core::{Packet, PacketCodec};

/// Remote address of a connection, e.g. `192.168.1.20:51234`.
pub type PeerId = String;

/// Default upper bound (exclusive) of the randomized restart backoff.
pub const DEFAULT_BACKOFF_CEILING: Duration = Duration::from_millis(8000);

// ── Role ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Accepting connections and relaying between peers.
    Hub,
    /// Connected to a single hub.
    Peer,
}

// ── Restart mailbox ───────────────────────────────────────────────────────────

/// A request to tear down the current generation and start discovery again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartRequest {
    /// Wait exactly this long before the next generation.
    After(Duration),
    /// Wait a uniformly random time below the backoff ceiling.
    Backoff,
}

impl RestartRequest {
    /// Millisecond form: non-negative values are used as-is, negative
    /// values select the randomized backoff.
    pub fn from_millis(ms: i64) -> Self {
        if ms < 0 {
            Self::Backoff
        } else {
            Self::After(Duration::from_millis(ms as u64))
        }
    }

    /// Resolve to a concrete delay. `Backoff` draws from `[0, ceiling)`.
    pub fn delay(self, ceiling: Duration) -> Duration {
        match self {
            Self::After(d) => d,
            Self::Backoff => {
                let max = ceiling.as_millis() as u64;
                if max == 0 {
                    return Duration::ZERO;
                }
                Duration::from_millis(rand::thread_rng().gen_range(0..max))
            }
        }
    }
}

/// Sending side of the single-slot restart mailbox.
///
/// Requests never block. One arriving while another is still pending is
/// dropped: the pending one already guarantees a fresh generation.
#[derive(Debug, Clone)]
pub struct RestartHandle {
    tx: mpsc::Sender<RestartRequest>,
}

impl RestartHandle {
    /// Create the mailbox. The receiver belongs to the supervisor.
    pub fn mailbox() -> (Self, mpsc::Receiver<RestartRequest>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }

    /// Post a request. Returns false if it was coalesced or nobody listens.
    pub fn request(&self, req: RestartRequest) -> bool {
        match self.tx.try_send(req) {
            Ok(()) => {
                tracing::info!(?req, "restart requested");
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!(?req, "restart already pending");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(?req, "restart mailbox closed");
                false
            }
        }
    }
}

// ── Connections ───────────────────────────────────────────────────────────────

type PacketSink = FramedWrite<Box<dyn AsyncWrite + Send + Unpin>, PacketCodec>;

/// Write side of a registered peer plus its announced name.
pub struct PeerConnection {
    /// Empty until the peer announces itself with `:id`.
    name: String,
    sink: Arc<Mutex<PacketSink>>,
}

impl PeerConnection {
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let writer: Box<dyn AsyncWrite + Send + Unpin> = Box::new(writer);
        Self {
            name: String::new(),
            sink: Arc::new(Mutex::new(FramedWrite::new(writer, PacketCodec::new()))),
        }
    }
}

/// Snapshot of a registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub id: PeerId,
    pub name: String,
}

/// Outcome of binding a name to a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameChange {
    /// First announcement; the stored name was empty.
    Announced,
    /// Same name as before. Nothing changed.
    Unchanged,
    /// Replaced a previous non-empty name.
    Renamed { previous: String },
}

/// Result of a transmit or broadcast.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Writes that succeeded.
    pub delivered: usize,
    /// Peers removed because their write failed. The caller owes them the
    /// same departure handling as a closed connection.
    pub dropped: Vec<PeerInfo>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("peer {0} is already registered")]
    AlreadyRegistered(PeerId),
}

// ── Registry ──────────────────────────────────────────────────────────────────

struct RegistryState {
    peers: HashMap<PeerId, PeerConnection>,
    role: Role,
}

pub struct ConnectionRegistry {
    state: RwLock<RegistryState>,
    restart: RestartHandle,
}

impl ConnectionRegistry {
    /// New empty registry. The role starts pinned to `Hub` so that nothing
    /// asks for a restart before the first generation picks a real role.
    pub fn new(restart: RestartHandle) -> Self {
        Self {
            state: RwLock::new(RegistryState {
                peers: HashMap::new(),
                role: Role::Hub,
            }),
            restart,
        }
    }

    pub fn role(&self) -> Role {
        self.state.read().role
    }

    pub fn set_role(&self, role: Role) {
        self.state.write().role = role;
    }

    pub fn request_restart(&self, req: RestartRequest) -> bool {
        self.restart.request(req)
    }

    pub fn len(&self) -> usize {
        self.state.read().peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().peers.is_empty()
    }

    /// Track a new connection. Ids are unique among live entries.
    pub fn register(&self, id: impl Into<PeerId>, conn: PeerConnection) -> Result<(), RegistryError> {
        let id = id.into();
        let mut state = self.state.write();
        if state.peers.contains_key(&id) {
            return Err(RegistryError::AlreadyRegistered(id));
        }
        tracing::debug!(peer = %id, total = state.peers.len() + 1, "peer registered");
        state.peers.insert(id, conn);
        Ok(())
    }

    pub fn lookup(&self, id: &str) -> Option<PeerInfo> {
        self.state.read().peers.get(id).map(|c| PeerInfo {
            id: id.to_string(),
            name: c.name.clone(),
        })
    }

    /// Snapshot of every entry, sorted by id.
    pub fn peers(&self) -> Vec<PeerInfo> {
        let mut out: Vec<PeerInfo> = self
            .state
            .read()
            .peers
            .iter()
            .map(|(id, c)| PeerInfo {
                id: id.clone(),
                name: c.name.clone(),
            })
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Bind `name` to peer `id`. Returns `None` if the peer is not registered.
    pub fn rename(&self, id: &str, name: &str) -> Option<NameChange> {
        let mut state = self.state.write();
        let conn = state.peers.get_mut(id)?;
        let change = if conn.name.is_empty() {
            NameChange::Announced
        } else if conn.name == name {
            return Some(NameChange::Unchanged);
        } else {
            NameChange::Renamed {
                previous: conn.name.clone(),
            }
        };
        conn.name = name.to_string();
        Some(change)
    }

    /// Drop a peer. Safe to call for ids that are already gone.
    ///
    /// If this empties the registry of a node that is not the hub, a
    /// randomized restart is requested.
    pub fn remove(&self, id: &str) -> Option<PeerInfo> {
        let (removed, orphaned) = {
            let mut state = self.state.write();
            let removed = state.peers.remove(id).map(|c| PeerInfo {
                id: id.to_string(),
                name: c.name,
            });
            let orphaned =
                removed.is_some() && state.role == Role::Peer && state.peers.is_empty();
            (removed, orphaned)
        };

        if removed.is_some() {
            tracing::debug!(peer = %id, "peer removed");
        }
        if orphaned {
            tracing::info!("lost connection to hub");
            self.restart.request(RestartRequest::Backoff);
        }
        removed
    }

    /// Drop every entry without triggering restarts. Used on shutdown.
    pub fn clear(&self) -> usize {
        let mut state = self.state.write();
        let n = state.peers.len();
        state.peers.clear();
        n
    }

    /// Encode and write one packet to `id`. A failed write removes the peer.
    pub async fn transmit(&self, packet: &Packet, id: &str) -> Delivery {
        let sink = self.state.read().peers.get(id).map(|c| c.sink.clone());
        let Some(sink) = sink else {
            tracing::warn!(peer = %id, "transmit: peer not found");
            return Delivery::default();
        };

        match send(&sink, packet.clone()).await {
            Ok(()) => Delivery {
                delivered: 1,
                dropped: Vec::new(),
            },
            Err(e) => {
                tracing::warn!(peer = %id, error = %e, "transmit failed, dropping peer");
                Delivery {
                    delivered: 0,
                    dropped: self.remove(id).into_iter().collect(),
                }
            }
        }
    }

    /// Send to every peer except `except`.
    ///
    /// Targets are snapshotted under the read lock; peers whose write fails
    /// are removed afterwards, one write-locked removal each, and reported
    /// back in [`Delivery::dropped`].
    pub async fn broadcast(&self, packet: &Packet, except: Option<&str>) -> Delivery {
        let targets: Vec<(PeerId, Arc<Mutex<PacketSink>>)> = self
            .state
            .read()
            .peers
            .iter()
            .filter(|(id, _)| Some(id.as_str()) != except)
            .map(|(id, c)| (id.clone(), c.sink.clone()))
            .collect();

        let results = join_all(targets.into_iter().map(|(id, sink)| async move {
            let result = send(&sink, packet.clone()).await;
            (id, result)
        }))
        .await;

        let mut delivery = Delivery::default();
        for (id, result) in results {
            match result {
                Ok(()) => delivery.delivered += 1,
                Err(e) => {
                    tracing::warn!(peer = %id, error = %e, "broadcast write failed");
                    delivery.dropped.extend(self.remove(&id));
                }
            }
        }
        delivery
    }
}

async fn send(sink: &Mutex<PacketSink>, packet: Packet) -> Result<(), lanchat_core::CodecError> {
    sink.lock().await.send(packet).await
}
