//! Hub discovery.
//!
//! A scanner answers one question: is some node already accepting
//! connections on the chat port? The subnet variant probes every host of
//! each local IPv4 network with a bounded pool of concurrent connects.

use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::task::JoinSet;

use lanchat_core::config::LanchatConfig;

/// Default number of concurrent probes.
pub const DEFAULT_WORKERS: usize = 10;

/// Default per-candidate connect timeout.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(100);

/// Widest subnet that is scanned in full. Wider ones are narrowed.
const MAX_PREFIX_WIDTH: u32 = 8;

#[async_trait]
pub trait NetScanner: Send + Sync {
    fn name(&self) -> &'static str;

    /// Address of a hub listening on `port`, or `None` if nobody answered.
    async fn find_host(&self, port: u16) -> Option<SocketAddr>;
}

// ── Variants ──────────────────────────────────────────────────────────────────

/// Probes every host of every local IPv4 network.
#[derive(Debug, Clone)]
pub struct SubnetScanner {
    /// Try 127.0.0.1 before touching the network.
    pub local: bool,
    pub workers: usize,
    pub timeout: Duration,
}

impl Default for SubnetScanner {
    fn default() -> Self {
        Self {
            local: false,
            workers: DEFAULT_WORKERS,
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

#[async_trait]
impl NetScanner for SubnetScanner {
    fn name(&self) -> &'static str {
        "subnet"
    }

    async fn find_host(&self, port: u16) -> Option<SocketAddr> {
        if self.local {
            let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
            if tcp_probe(addr, self.timeout).await {
                return Some(addr);
            }
        }

        let networks = match interface_networks() {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "could not enumerate interfaces");
                return None;
            }
        };

        for net in networks {
            let hosts: Vec<SocketAddr> = net
                .hosts()
                .map(|ip| SocketAddr::from((ip, port)))
                .collect();
            tracing::debug!(
                local = %net.local,
                prefix = net.prefix_len(),
                candidates = hosts.len(),
                "scanning network"
            );

            let timeout = self.timeout;
            if let Some(addr) =
                probe_candidates(hosts, self.workers, move |a| tcp_probe(a, timeout)).await
            {
                return Some(addr);
            }
        }
        None
    }
}

/// Only ever looks at 127.0.0.1. For several nodes on one machine.
#[derive(Debug, Clone)]
pub struct LocalhostScanner {
    pub timeout: Duration,
}

impl Default for LocalhostScanner {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

#[async_trait]
impl NetScanner for LocalhostScanner {
    fn name(&self) -> &'static str {
        "localhost"
    }

    async fn find_host(&self, port: u16) -> Option<SocketAddr> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        tcp_probe(addr, self.timeout).await.then_some(addr)
    }
}

/// Never finds anything, so the node always becomes the hub.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullScanner;

#[async_trait]
impl NetScanner for NullScanner {
    fn name(&self) -> &'static str {
        "null"
    }

    async fn find_host(&self, _port: u16) -> Option<SocketAddr> {
        None
    }
}

/// Pick the scanner the configuration asks for.
pub fn scanner_from_config(config: &LanchatConfig) -> Arc<dyn NetScanner> {
    let net = &config.network;
    let timeout = Duration::from_millis(net.probe_timeout_ms);
    if net.force_host {
        Arc::new(NullScanner)
    } else if net.loopback_only {
        Arc::new(LocalhostScanner { timeout })
    } else {
        Arc::new(SubnetScanner {
            local: net.local,
            workers: net.scan_workers.max(1),
            timeout,
        })
    }
}

// ── Worker pool ───────────────────────────────────────────────────────────────

/// Connect to `addr` within `timeout`. The probe connection is closed at once.
pub async fn tcp_probe(addr: SocketAddr, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

/// Run `probe` over `candidates` with at most `workers` in flight.
///
/// Returns the first candidate whose probe succeeds and aborts the other
/// workers. Returns `None` only once every worker has finished.
pub async fn probe_candidates<P, F>(
    candidates: Vec<SocketAddr>,
    workers: usize,
    probe: P,
) -> Option<SocketAddr>
where
    P: Fn(SocketAddr) -> F + Send + Sync + 'static,
    F: Future<Output = bool> + Send + 'static,
{
    let queue = Arc::new(Mutex::new(candidates.into_iter()));
    let probe = Arc::new(probe);

    let mut pool = JoinSet::new();
    for _ in 0..workers.max(1) {
        let queue = queue.clone();
        let probe = probe.clone();
        pool.spawn(async move {
            loop {
                // Guard dropped before the probe is awaited.
                let next = queue.lock().next();
                let addr = next?;
                if probe(addr).await {
                    return Some(addr);
                }
            }
        });
    }

    while let Some(joined) = pool.join_next().await {
        match joined {
            Ok(Some(addr)) => {
                pool.abort_all();
                tracing::info!(%addr, "host found");
                return Some(addr);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "probe worker failed"),
        }
    }
    None
}

// ── Interfaces ────────────────────────────────────────────────────────────────

/// One local IPv4 address with its netmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalNetwork {
    pub local: Ipv4Addr,
    pub netmask: Ipv4Addr,
}

impl LocalNetwork {
    pub fn prefix_len(&self) -> u32 {
        u32::from(self.netmask).count_ones()
    }

    /// Candidate hosts: every address in the network except the network
    /// address, the broadcast address, and our own.
    pub fn hosts(&self) -> impl Iterator<Item = Ipv4Addr> {
        let mask = if 32 - self.prefix_len() > MAX_PREFIX_WIDTH {
            u32::MAX << MAX_PREFIX_WIDTH
        } else {
            u32::from(self.netmask)
        };
        let local = u32::from(self.local);
        let network = local & mask;
        let broadcast = network | !mask;

        let range = if broadcast - network < 2 {
            0..0
        } else {
            (network + 1)..broadcast
        };
        range.filter(move |ip| *ip != local).map(Ipv4Addr::from)
    }
}

/// IPv4 networks of every interface that is up and not loopback.
pub fn interface_networks() -> nix::Result<Vec<LocalNetwork>> {
    use nix::net::if_::InterfaceFlags;

    let mut out = Vec::new();
    for ifa in nix::ifaddrs::getifaddrs()? {
        if !ifa.flags.contains(InterfaceFlags::IFF_UP)
            || ifa.flags.contains(InterfaceFlags::IFF_LOOPBACK)
        {
            continue;
        }
        let addr = ifa.address.as_ref().and_then(|a| a.as_sockaddr_in());
        let mask = ifa.netmask.as_ref().and_then(|a| a.as_sockaddr_in());
        if let (Some(addr), Some(mask)) = (addr, mask) {
            let net = LocalNetwork {
                local: *SocketAddrV4::from(*addr).ip(),
                netmask: *SocketAddrV4::from(*mask).ip(),
            };
            if !out.contains(&net) {
                out.push(net);
            }
        }
    }
    Ok(out)
}
