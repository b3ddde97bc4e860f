//! Shared harness: a cluster of real nodes on ephemeral localhost ports.

#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use anyhow::{Result, bail};
use tokio::net::TcpListener;

use replicated_log::config::{NodeConfig, Timing};
use replicated_log::rpc::QueryResponse;
use replicated_log::runtime::{NodeHandle, spawn_node_on};

/// Slightly slower than the defaults so loaded CI machines don't flap.
pub fn test_timing() -> Timing {
    Timing {
        election_timeout_min: Duration::from_millis(300),
        election_timeout_max: Duration::from_millis(600),
        heartbeat_interval: Duration::from_millis(50),
        rpc_timeout: Duration::from_millis(150),
        submit_timeout: Duration::from_millis(500),
    }
}

/// Timers long enough that no election starts on its own during a test.
pub fn quiet_timing() -> Timing {
    Timing {
        election_timeout_min: Duration::from_secs(30),
        election_timeout_max: Duration::from_secs(60),
        ..test_timing()
    }
}

pub struct TestCluster {
    nodes: Vec<Option<NodeHandle>>,
    urls: Vec<String>,
}

impl TestCluster {
    pub async fn start(n: usize, timing: Timing) -> Result<Self> {
        Self::start_with(n, |config| config.with_timing(timing)).await
    }

    /// Like [`TestCluster::start`], letting the caller adjust every node's
    /// config.
    pub async fn start_with<F>(n: usize, configure: F) -> Result<Self>
    where
        F: Fn(NodeConfig) -> NodeConfig,
    {
        let mut listeners = Vec::with_capacity(n);
        let mut urls = Vec::with_capacity(n);
        for _ in 0..n {
            let listener = TcpListener::bind("127.0.0.1:0").await?;
            urls.push(format!("http://{}", listener.local_addr()?));
            listeners.push(listener);
        }

        let mut nodes = Vec::with_capacity(n);
        for (i, listener) in listeners.into_iter().enumerate() {
            let peers = urls
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, url)| url.clone())
                .collect();
            let config = configure(NodeConfig::new(listener.local_addr()?, peers));
            nodes.push(Some(spawn_node_on(listener, config).await?));
        }

        Ok(Self { nodes, urls })
    }

    pub fn url(&self, i: usize) -> &str {
        &self.urls[i]
    }

    pub fn node(&self, i: usize) -> &NodeHandle {
        self.nodes[i].as_ref().expect("node was stopped")
    }

    pub fn running(&self) -> impl Iterator<Item = (usize, &NodeHandle)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, node)| node.as_ref().map(|node| (i, node)))
    }

    pub async fn statuses(&self) -> Vec<(usize, QueryResponse)> {
        let mut statuses = Vec::new();
        for (i, node) in self.running() {
            statuses.push((i, node.status().await));
        }
        statuses
    }

    /// Waits until exactly one running node leads and every other running
    /// node points at it. Returns the leader's index.
    pub async fn wait_for_leader(&self, timeout: Duration) -> Result<usize> {
        let cluster = self;
        eventually(timeout, move || async move {
            let statuses = cluster.statuses().await;
            let leaders: Vec<_> = statuses
                .iter()
                .filter(|(_, status)| status.is_leader)
                .collect();
            let [(leader, leader_status)] = leaders.as_slice() else {
                return None;
            };
            let settled = statuses.iter().all(|(i, status)| {
                i == leader
                    || (status.term == leader_status.term
                        && status.leader_hint.as_deref() == Some(cluster.url(*leader)))
            });
            settled.then_some(*leader)
        })
        .await
    }

    pub async fn stop(&mut self, i: usize) -> Result<()> {
        if let Some(node) = self.nodes[i].take() {
            node.shutdown().await?;
        }
        Ok(())
    }

    pub async fn shutdown(mut self) -> Result<()> {
        for i in 0..self.nodes.len() {
            self.stop(i).await?;
        }
        Ok(())
    }
}

/// Polls `check` until it yields a value or `timeout` elapses.
pub async fn eventually<T, F, Fut>(timeout: Duration, mut check: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(value) = check().await {
            return Ok(value);
        }
        if tokio::time::Instant::now() >= deadline {
            bail!("condition not met within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Returns base URLs nothing listens on.
pub async fn dead_urls(n: usize) -> Result<Vec<String>> {
    let mut urls = Vec::with_capacity(n);
    for _ in 0..n {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        urls.push(format!("http://{}", listener.local_addr()?));
    }
    Ok(urls)
}

/// HTTP client that reports redirects instead of following them.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("failed to build test client")
}
