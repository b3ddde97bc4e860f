//! The node state machine.
//!
//! [`Node`] owns everything a replica knows: its term, its role, the last
//! leader it heard from, its log and its election clock. Every mutation goes
//! through one of the transition methods below, which the runtime calls while
//! holding the node lock, so a transition is never observed half-applied.
//!
//! Nothing here performs I/O. Transitions that need a new election timer
//! reset the [`ElectionClock`]; the runtime notices the pending request and
//! spawns the sleeper.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::clock::ElectionClock;
use crate::election;
use crate::log::{Attachment, Entry, LogStore};
use crate::rpc::{AppendEntries, AppendResponse, QueryResponse, VoteRequest, VoteResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Follower,
    Candidate,
    Leader,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Follower => write!(f, "follower"),
            Role::Candidate => write!(f, "candidate"),
            Role::Leader => write!(f, "leader"),
        }
    }
}

/// Result of tallying an election round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionOutcome {
    /// Majority reached; the node is now leader.
    Won,
    /// No majority; a fresh election timeout was requested.
    Lost,
    /// The node left the candidate state or moved to another term while
    /// the votes were in flight; the tally is discarded.
    Superseded,
}

#[derive(Debug)]
pub struct Node {
    id: String,
    peer_count: usize,
    current_term: u64,
    role: Role,
    leader_hint: Option<String>,
    log: LogStore,
    clock: ElectionClock,
}

impl Node {
    /// Creates a follower at term 0 with an election timer requested.
    pub fn new(id: impl Into<String>, peer_count: usize) -> Self {
        let mut clock = ElectionClock::new();
        clock.reset();
        Self {
            id: id.into(),
            peer_count,
            current_term: 0,
            role: Role::Follower,
            leader_hint: None,
            log: LogStore::new(),
            clock,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn term(&self) -> u64 {
        self.current_term
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_leader(&self) -> bool {
        self.role == Role::Leader
    }

    /// True if this node leads exactly `term`.
    pub fn is_leader_for(&self, term: u64) -> bool {
        self.is_leader() && self.current_term == term
    }

    pub fn leader_hint(&self) -> Option<&str> {
        self.leader_hint.as_deref()
    }

    /// Where to send a client this node cannot serve: the current leader if
    /// one is known and it is not this node.
    pub fn redirect_hint(&self) -> Option<&str> {
        self.leader_hint().filter(|hint| *hint != self.id)
    }

    pub fn log(&self) -> &LogStore {
        &self.log
    }

    pub fn last_log_index(&self) -> i64 {
        self.log.last_index()
    }

    #[cfg(test)]
    pub fn clock(&self) -> &ElectionClock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut ElectionClock {
        &mut self.clock
    }

    /// Adopts `term` if it is newer than ours, stepping down to follower.
    ///
    /// The leader hint belongs to the old term and is dropped.
    /// Returns true if the term was adopted.
    pub fn observe_term(&mut self, term: u64) -> bool {
        if term <= self.current_term {
            return false;
        }
        self.current_term = term;
        self.role = Role::Follower;
        self.leader_hint = None;
        self.clock.reset();
        true
    }

    /// Enters a new term as candidate, voting for itself.
    ///
    /// Returns the vote request to broadcast, or `None` if this node already
    /// leads.
    pub fn start_election(&mut self) -> Option<VoteRequest> {
        if self.is_leader() {
            return None;
        }
        self.current_term += 1;
        self.role = Role::Candidate;
        self.leader_hint = None;
        self.clock.reset();
        Some(VoteRequest {
            term: self.current_term,
            last_log_index: self.last_log_index(),
        })
    }

    /// Tallies the votes of the election started for `term`.
    ///
    /// `votes` includes the candidate's own vote.
    pub fn conclude_election(&mut self, term: u64, votes: usize) -> ElectionOutcome {
        if self.role != Role::Candidate || self.current_term != term {
            return ElectionOutcome::Superseded;
        }
        if election::has_majority(votes, self.peer_count) {
            self.role = Role::Leader;
            self.leader_hint = Some(self.id.clone());
            self.clock.stop();
            ElectionOutcome::Won
        } else {
            self.clock.reset();
            ElectionOutcome::Lost
        }
    }

    /// Answers a candidate's vote request.
    ///
    /// Requests for our term or an older one are refused without touching
    /// any state. A newer term is always adopted, but the vote is granted
    /// only if the candidate's log is at least as long as ours.
    pub fn handle_vote_request(&mut self, req: &VoteRequest) -> VoteResponse {
        if req.term <= self.current_term {
            return VoteResponse {
                vote_granted: false,
            };
        }
        let log_ok = req.last_log_index >= self.last_log_index();
        self.observe_term(req.term);
        VoteResponse {
            vote_granted: log_ok,
        }
    }

    /// Accepts the leader's log if its term is not older than ours.
    ///
    /// On acceptance the local log is replaced wholesale; no consistency
    /// check against the previous entries is made.
    pub fn handle_append_entries(&mut self, req: AppendEntries) -> AppendResponse {
        if req.term < self.current_term {
            return AppendResponse { success: false };
        }
        self.current_term = req.term;
        self.role = Role::Follower;
        self.log.replace(req.entries);
        self.leader_hint = Some(req.leader_id);
        self.clock.reset();
        AppendResponse { success: true }
    }

    /// Appends a client entry if this node leads.
    ///
    /// Returns the new entry together with the replication request carrying
    /// the updated log, or `None` when this node is not the leader (nothing
    /// is appended in that case).
    pub fn append_local(
        &mut self,
        content: String,
        attachment: Option<Attachment>,
    ) -> Option<(Entry, AppendEntries)> {
        if !self.is_leader() {
            return None;
        }
        let entry = self.log.append(content, attachment);
        let request = self.replication_request()?;
        Some((entry, request))
    }

    /// Snapshot of the full log to push to followers, if leading.
    pub fn replication_request(&self) -> Option<AppendEntries> {
        if !self.is_leader() {
            return None;
        }
        Some(AppendEntries {
            term: self.current_term,
            leader_id: self.id.clone(),
            entries: self.log.entries().to_vec(),
            last_log_index: self.last_log_index(),
        })
    }

    pub fn query(&self) -> QueryResponse {
        QueryResponse {
            entries: self.log.entries().to_vec(),
            is_leader: self.is_leader(),
            term: self.current_term,
            leader_hint: self.leader_hint.clone(),
            node: self.id.clone(),
            role: self.role,
        }
    }
}
