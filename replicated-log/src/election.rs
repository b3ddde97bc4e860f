//! Election rounds.
//!
//! When the election timer fires the node enters a new term as candidate,
//! votes for itself and asks every peer for its vote. Peers that fail or
//! time out count as withheld votes. A strict majority of the whole cluster
//! makes the node leader; anything else just waits for the next randomized
//! timeout, which is what breaks repeated split votes.

use std::sync::Arc;

use tracing::{debug, info};

use crate::node::ElectionOutcome;
use crate::rpc::{VoteRequest, VoteResponse};
use crate::runtime::Replica;

/// True if `votes` (self included) is a strict majority of the cluster.
///
/// The cluster has `peer_count + 1` members.
pub fn has_majority(votes: usize, peer_count: usize) -> bool {
    votes > (peer_count + 1) / 2
}

impl Replica {
    /// Election timer callback.
    pub(crate) async fn on_election_timeout(self: Arc<Self>, generation: u64) {
        if self.is_shut_down() {
            return;
        }
        let request = {
            let mut node = self.node.lock().await;
            if !node.clock_mut().fire(generation) {
                debug!(generation, "stale election timer ignored");
                return;
            }
            let request = node.start_election();
            self.arm_election_timer(&mut node);
            request
        };
        if let Some(request) = request {
            self.run_election(request).await;
        }
    }

    /// Starts an election immediately, bypassing the timer.
    pub(crate) async fn campaign(self: Arc<Self>) -> bool {
        let request = {
            let mut node = self.node.lock().await;
            let request = node.start_election();
            self.arm_election_timer(&mut node);
            request
        };
        match request {
            Some(request) => {
                self.run_election(request).await;
                true
            }
            None => false,
        }
    }

    async fn run_election(self: Arc<Self>, request: VoteRequest) {
        let term = request.term;
        info!(
            node = %self.id(),
            term,
            last_log_index = request.last_log_index,
            "starting election"
        );

        let client = self.client.clone();
        let replies = self
            .peers
            .broadcast(self.timing.rpc_timeout, |peer| {
                let client = client.clone();
                let request = request.clone();
                async move { client.request_vote(&peer, &request).await }
            })
            .await;
        let votes = 1 + replies
            .iter()
            .filter(|reply| matches!(reply.result, Some(VoteResponse { vote_granted: true })))
            .count();

        let mut node = self.node.lock().await;
        match node.conclude_election(term, votes) {
            ElectionOutcome::Won => {
                info!(node = %self.id(), term, votes, "won election, now leader");
                drop(node);
                self.spawn_heartbeat(term);
            }
            ElectionOutcome::Lost => {
                info!(
                    node = %self.id(),
                    term,
                    votes,
                    cluster = self.peers.len() + 1,
                    "election lost, waiting for a fresh timeout"
                );
                self.arm_election_timer(&mut node);
            }
            ElectionOutcome::Superseded => {
                debug!(node = %self.id(), term, "election superseded");
            }
        }
    }

    /// Handles an inbound vote request.
    pub(crate) async fn handle_vote(self: &Arc<Self>, request: VoteRequest) -> VoteResponse {
        let mut node = self.node.lock().await;
        let previous_term = node.term();
        let response = node.handle_vote_request(&request);
        self.arm_election_timer(&mut node);

        if response.vote_granted {
            info!(
                node = %self.id(),
                term = request.term,
                "granted vote"
            );
        } else if node.term() > previous_term {
            info!(
                node = %self.id(),
                term = request.term,
                "adopted newer term, refused vote for shorter log"
            );
        } else {
            debug!(
                node = %self.id(),
                term = request.term,
                current_term = node.term(),
                "refused stale vote request"
            );
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn majority_for_three_node_cluster() {
        assert!(!has_majority(1, 2));
        assert!(has_majority(2, 2));
        assert!(has_majority(3, 2));
    }

    #[test]
    fn majority_for_five_node_cluster() {
        assert!(!has_majority(2, 4));
        assert!(has_majority(3, 4));
    }

    #[test]
    fn majority_for_even_cluster_needs_more_than_half() {
        // Four nodes: 2 votes is a tie, not a majority.
        assert!(!has_majority(2, 3));
        assert!(has_majority(3, 3));
    }

    #[test]
    fn lone_node_is_its_own_majority() {
        assert!(has_majority(1, 0));
    }
}
