//! Static peer registry and concurrent broadcast.

use std::future::Future;
use std::time::Duration;

use anyhow::{Result, ensure};
use futures::future::join_all;
use tracing::debug;

/// The other members of the cluster, fixed at startup.
///
/// Addresses are base URLs such as `http://127.0.0.1:3001`. The node's own
/// address is filtered out, so `len()` is the number of *other* nodes.
#[derive(Debug, Clone)]
pub struct PeerRegistry {
    own: String,
    peers: Vec<String>,
}

/// Outcome of one peer call within a broadcast round.
///
/// `result` is `None` when the call failed or timed out; the round treats
/// that peer as having withheld its vote or acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerReply<T> {
    pub peer: String,
    pub result: Option<T>,
}

impl PeerRegistry {
    pub fn new(own: &str, peers: impl IntoIterator<Item = String>) -> Result<Self> {
        let own = normalize(own);
        ensure!(!own.is_empty(), "node address must not be empty");

        let mut unique: Vec<String> = Vec::new();
        for peer in peers {
            let peer = normalize(&peer);
            if peer.is_empty() || peer == own || unique.contains(&peer) {
                continue;
            }
            unique.push(peer);
        }
        Ok(Self { own, peers: unique })
    }

    /// This node's own address.
    pub fn own(&self) -> &str {
        &self.own
    }

    pub fn addrs(&self) -> &[String] {
        &self.peers
    }

    pub(crate) fn len(&self) -> usize {
        self.peers.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Redirect target used when no leader is known.
    pub fn fallback(&self) -> Option<&str> {
        self.peers.first().map(String::as_str)
    }

    /// Calls every peer concurrently, each call bounded by `timeout`.
    ///
    /// Failures never escape: an error or a timeout becomes an absent
    /// result for that peer. Replies come back in registry order.
    pub async fn broadcast<T, F, Fut>(&self, timeout: Duration, call: F) -> Vec<PeerReply<T>>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let calls = self.peers.iter().map(|peer| {
            let peer = peer.clone();
            let fut = call(peer.clone());
            async move {
                let result = match tokio::time::timeout(timeout, fut).await {
                    Ok(Ok(reply)) => Some(reply),
                    Ok(Err(err)) => {
                        debug!(%peer, error = %err, "peer call failed");
                        None
                    }
                    Err(_) => {
                        debug!(%peer, ?timeout, "peer call timed out");
                        None
                    }
                };
                PeerReply { peer, result }
            }
        });
        join_all(calls).await
    }
}

fn normalize(addr: &str) -> String {
    addr.trim().trim_end_matches('/').to_string()
}
