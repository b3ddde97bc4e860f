//! Log replication: leader heartbeats, the follower side of AppendEntries,
//! and client writes.
//!
//! Every replication call ships the leader's full log. A follower that
//! accepts simply replaces its own log with it.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::SubmitError;
use crate::log::{Attachment, Entry};
use crate::rpc::{AppendEntries, AppendResponse};
use crate::runtime::Replica;

/// Peer acknowledgements a client write needs.
///
/// The leader's own copy is not counted, so this is `peer_count / 2` rather
/// than a majority of the cluster. For three nodes that is one follower.
pub fn acks_needed(peer_count: usize) -> usize {
    peer_count / 2
}

/// Tally of one replication round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicationRound {
    pub acks: usize,
    pub rejected: Vec<String>,
    pub unreachable: Vec<String>,
}

impl Replica {
    /// Sends `request` to every peer and tallies the answers.
    pub(crate) async fn replicate(
        &self,
        request: AppendEntries,
        timeout: Duration,
    ) -> ReplicationRound {
        let request = Arc::new(request);
        let client = self.client.clone();
        let replies = self
            .peers
            .broadcast(timeout, |peer| {
                let client = client.clone();
                let request = Arc::clone(&request);
                async move { client.append_entries(&peer, &request).await }
            })
            .await;

        let mut round = ReplicationRound::default();
        for reply in replies {
            match reply.result {
                Some(AppendResponse { success: true }) => round.acks += 1,
                Some(AppendResponse { success: false }) => round.rejected.push(reply.peer),
                None => round.unreachable.push(reply.peer),
            }
        }
        round
    }

    pub(crate) fn spawn_heartbeat(self: &Arc<Self>, term: u64) {
        let replica = Arc::clone(self);
        tokio::spawn(async move { replica.heartbeat_loop(term).await });
    }

    /// Pushes the log to all peers every heartbeat period while this node
    /// leads `term`.
    ///
    /// Rounds never fail: rejections and unreachable peers are logged and the
    /// next round is scheduled regardless.
    async fn heartbeat_loop(self: Arc<Self>, term: u64) {
        let mut shutdown = self.shutdown_signal();
        loop {
            if self.is_shut_down() {
                break;
            }
            let request = {
                let node = self.node.lock().await;
                if !node.is_leader_for(term) {
                    break;
                }
                node.replication_request()
            };
            let Some(request) = request else {
                break;
            };

            let round = self.replicate(request, self.timing.rpc_timeout).await;
            if !round.rejected.is_empty() || !round.unreachable.is_empty() {
                warn!(
                    node = %self.id(),
                    term,
                    acks = round.acks,
                    rejected = ?round.rejected,
                    unreachable = ?round.unreachable,
                    "some followers did not accept the heartbeat"
                );
            }

            tokio::select! {
                _ = tokio::time::sleep(self.timing.heartbeat_interval) => {}
                _ = shutdown.changed() => break,
            }
        }
        debug!(node = %self.id(), term, "heartbeat loop stopped");
    }

    /// Handles an inbound AppendEntries.
    pub(crate) async fn handle_append(self: &Arc<Self>, request: AppendEntries) -> AppendResponse {
        let leader = request.leader_id.clone();
        let term = request.term;
        let claimed_last = request.last_log_index;

        let mut node = self.node.lock().await;
        let was_leader = node.is_leader();
        let response = node.handle_append_entries(request);
        self.arm_election_timer(&mut node);

        if response.success {
            if node.last_log_index() != claimed_last {
                warn!(
                    node = %self.id(),
                    %leader,
                    claimed_last,
                    actual_last = node.last_log_index(),
                    "leader's last index disagrees with its entries"
                );
            }
            if was_leader {
                info!(node = %self.id(), %leader, term, "stepped down for another leader");
            }
        } else {
            debug!(
                node = %self.id(),
                %leader,
                term,
                current_term = node.term(),
                "rejected append from stale leader"
            );
        }
        response
    }

    /// Appends a client write and waits for the replication round.
    ///
    /// On quorum failure the entry stays in the local log.
    pub(crate) async fn submit(
        self: Arc<Self>,
        content: String,
        attachment: Option<Attachment>,
    ) -> Result<Entry, SubmitError> {
        let (entry, request) = {
            let mut node = self.node.lock().await;
            match node.append_local(content, attachment) {
                Some(appended) => appended,
                None => {
                    let redirect = node
                        .redirect_hint()
                        .or_else(|| self.peers.fallback())
                        .map(str::to_owned);
                    debug!(node = %self.id(), ?redirect, "refusing write, not the leader");
                    return Err(SubmitError::NotLeader { redirect });
                }
            }
        };

        let round = self.replicate(request, self.timing.submit_timeout).await;
        let needed = acks_needed(self.peers.len());
        if round.acks >= needed {
            info!(
                node = %self.id(),
                index = entry.index,
                acks = round.acks,
                "write acknowledged"
            );
            Ok(entry)
        } else {
            warn!(
                node = %self.id(),
                index = entry.index,
                acks = round.acks,
                needed,
                "write failed to reach quorum, keeping local entry"
            );
            Err(SubmitError::QuorumFailed {
                index: entry.index,
                acks: round.acks,
                needed,
            })
        }
    }
}
