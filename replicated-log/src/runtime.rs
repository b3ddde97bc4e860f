//! Spawning a node and driving it.
//!
//! A running node consists of:
//!
//! - **Replica**: the shared state (`Mutex<Node>`), the peer registry, the
//!   HTTP client and the timing configuration, behind an `Arc`
//! - **HTTP server task**: axum serving the RPC surface
//! - **Election sleepers**: at most one live task, re-spawned on every reset
//! - **Heartbeat loop**: only while the node leads
//!
//! The caller gets a [`NodeHandle`] to query, write, force an election, or
//! shut the node down.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::clock::random_election_timeout;
use crate::config::{NodeConfig, Timing};
use crate::error::SubmitError;
use crate::log::{Attachment, Entry};
use crate::node::Node;
use crate::peers::PeerRegistry;
use crate::rpc::{PeerClient, QueryResponse};
use crate::server;

/// State shared by the timers, the heartbeat loop and the HTTP handlers.
pub struct Replica {
    pub(crate) node: Mutex<Node>,
    pub(crate) peers: PeerRegistry,
    pub(crate) client: PeerClient,
    pub(crate) timing: Timing,
    pub(crate) max_submit_bytes: usize,
    shutdown: watch::Receiver<bool>,
}

impl Replica {
    fn new(config: &NodeConfig, shutdown: watch::Receiver<bool>) -> Result<Self> {
        config.timing.validate()?;
        let peers = PeerRegistry::new(&config.advertise, config.peers.iter().cloned())?;
        let node = Node::new(peers.own(), peers.len());
        Ok(Self {
            node: Mutex::new(node),
            peers,
            client: PeerClient::new()?,
            timing: config.timing,
            max_submit_bytes: config.max_submit_bytes,
            shutdown,
        })
    }

    pub fn id(&self) -> &str {
        self.peers.own()
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub(crate) fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.clone()
    }

    /// Spawns the sleeper for a pending election-timer reset, if any.
    ///
    /// Must be called with the node lock held, after every transition that
    /// may have reset the clock.
    pub(crate) fn arm_election_timer(self: &Arc<Self>, node: &mut Node) {
        let Some(generation) = node.clock_mut().take_pending() else {
            return;
        };
        if self.is_shut_down() {
            return;
        }
        let delay = random_election_timeout(
            self.timing.election_timeout_min,
            self.timing.election_timeout_max,
        );
        let replica = Arc::clone(self);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            replica.on_election_timeout(generation).await;
        });
        node.clock_mut().attach(generation, task.abort_handle());
    }

    pub async fn query(&self) -> QueryResponse {
        self.node.lock().await.query()
    }
}

/// Handle to a running node.
pub struct NodeHandle {
    replica: Arc<Replica>,
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    server: JoinHandle<()>,
}

impl NodeHandle {
    /// Address the HTTP server actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The node id, i.e. its advertised base URL.
    pub fn id(&self) -> &str {
        self.replica.id()
    }

    /// What the node currently believes about the cluster.
    pub async fn status(&self) -> QueryResponse {
        self.replica.query().await
    }

    /// Submits a client write, waiting for the replication round.
    pub async fn submit(
        &self,
        content: String,
        attachment: Option<Attachment>,
    ) -> Result<Entry, SubmitError> {
        Arc::clone(&self.replica).submit(content, attachment).await
    }

    /// Starts an election right away instead of waiting for the timer.
    ///
    /// Returns false if the node already leads.
    pub async fn campaign(&self) -> bool {
        Arc::clone(&self.replica).campaign().await
    }

    /// Stops the server, the heartbeat loop and any pending timer.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);
        self.replica.node.lock().await.clock_mut().stop();
        self.server.await.context("http server task panicked")?;
        info!(node = %self.replica.id(), "node stopped");
        Ok(())
    }
}

/// Binds `config.listen_addr` and starts a node on it.
pub async fn spawn_node(config: NodeConfig) -> Result<NodeHandle> {
    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    spawn_node_on(listener, config).await
}

/// Starts a node on an already bound listener.
///
/// Useful when the advertised addresses of the whole cluster must be known
/// before any node starts, e.g. with ephemeral ports.
pub async fn spawn_node_on(listener: TcpListener, config: NodeConfig) -> Result<NodeHandle> {
    let local_addr = listener.local_addr().context("listener has no local address")?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let replica = Arc::new(Replica::new(&config, shutdown_rx)?);

    // The initial follower timer was requested by `Node::new`.
    {
        let mut node = replica.node.lock().await;
        replica.arm_election_timer(&mut node);
    }

    let app = server::router(Arc::clone(&replica));
    let mut server_shutdown = replica.shutdown_signal();
    let server = tokio::spawn(async move {
        let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = server_shutdown.changed().await;
        });
        if let Err(err) = serve.await {
            warn!(error = %err, "http server exited with error");
        }
    });

    info!(
        node = %replica.id(),
        %local_addr,
        peers = ?replica.peers.addrs(),
        "node listening"
    );

    Ok(NodeHandle {
        replica,
        local_addr,
        shutdown_tx,
        server,
    })
}
