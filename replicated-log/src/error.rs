use thiserror::Error;

/// Why a client write was not acknowledged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// This node is not the leader; retry against `redirect`.
    #[error("not the leader, retry against {}", redirect.as_deref().unwrap_or("<unknown>"))]
    NotLeader { redirect: Option<String> },

    /// The entry was appended locally at `index` but too few peers
    /// acknowledged it. The local append is not rolled back, so the entry
    /// may still surface in later replication rounds; clients must not
    /// assume it committed.
    #[error("entry {index} reached {acks} of {needed} required peers")]
    QuorumFailed { index: u64, acks: usize, needed: usize },
}
