//! Startup configuration for a node.
//!
//! Membership is static: the peer list given here is fixed for the lifetime
//! of the process.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use anyhow::{Result, ensure};

/// Ports of the default localhost cluster, used when no peers are given.
pub const DEFAULT_CLUSTER_PORTS: [u16; 3] = [3000, 3001, 3002];

/// Largest client write body accepted by `POST /message`.
pub const DEFAULT_MAX_SUBMIT_BYTES: usize = 16 * 1024 * 1024;

/// Protocol timing.
///
/// The heartbeat interval must stay well below the minimum election timeout,
/// otherwise followers start elections while the leader is healthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Lower bound of the randomized election timeout.
    pub election_timeout_min: Duration,
    /// Upper bound of the randomized election timeout.
    pub election_timeout_max: Duration,
    /// Period between two leader heartbeats.
    pub heartbeat_interval: Duration,
    /// Per-call timeout for vote requests and heartbeats.
    pub rpc_timeout: Duration,
    /// Per-call timeout for the replication round of a client write.
    pub submit_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            election_timeout_min: Duration::from_millis(150),
            election_timeout_max: Duration::from_millis(300),
            heartbeat_interval: Duration::from_millis(50),
            rpc_timeout: Duration::from_millis(100),
            submit_timeout: Duration::from_millis(500),
        }
    }
}

impl Timing {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.election_timeout_min <= self.election_timeout_max,
            "election timeout min ({:?}) exceeds max ({:?})",
            self.election_timeout_min,
            self.election_timeout_max
        );
        ensure!(
            self.heartbeat_interval < self.election_timeout_min,
            "heartbeat interval ({:?}) must be below the minimum election timeout ({:?})",
            self.heartbeat_interval,
            self.election_timeout_min
        );
        ensure!(!self.rpc_timeout.is_zero(), "rpc timeout must be non-zero");
        ensure!(!self.submit_timeout.is_zero(), "submit timeout must be non-zero");
        Ok(())
    }
}

/// Everything a node needs to know at startup.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Socket address the HTTP server binds to.
    pub listen_addr: SocketAddr,
    /// Base URL other nodes use to reach this one; doubles as the node id.
    pub advertise: String,
    /// Base URLs of the other cluster members (self is filtered out).
    pub peers: Vec<String>,
    pub timing: Timing,
    /// Body limit for client writes. Replication bodies are unbounded, since
    /// they carry the whole log.
    pub max_submit_bytes: usize,
}

impl NodeConfig {
    /// Builds a config advertising `http://<listen_addr>`.
    pub fn new(listen_addr: SocketAddr, peers: Vec<String>) -> Self {
        Self {
            listen_addr,
            advertise: format!("http://{listen_addr}"),
            peers,
            timing: Timing::default(),
            max_submit_bytes: DEFAULT_MAX_SUBMIT_BYTES,
        }
    }

    /// The default three-node cluster on localhost, seen from `port`.
    pub fn local_cluster(port: u16) -> Self {
        let peers = DEFAULT_CLUSTER_PORTS
            .iter()
            .filter(|&&p| p != port)
            .map(|p| format!("http://localhost:{p}"))
            .collect();
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, port)),
            advertise: format!("http://localhost:{port}"),
            peers,
            timing: Timing::default(),
            max_submit_bytes: DEFAULT_MAX_SUBMIT_BYTES,
        }
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_max_submit_bytes(mut self, max_submit_bytes: usize) -> Self {
        self.max_submit_bytes = max_submit_bytes;
        self
    }
}
