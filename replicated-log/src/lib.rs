//! A small replicated log served over HTTP.
//!
//! A static cluster of peers elects one leader per term. The leader appends
//! client-submitted entries to its log and pushes the whole log to every
//! follower, answering the client once enough peers acknowledged the copy.
//!
//! # Architecture
//!
//! All per-node state (term, role, leader hint, log and the election clock)
//! lives in a single [`node::Node`] guarded by one `tokio::sync::Mutex`. Every
//! state change is a synchronous transition method on `Node`, executed while
//! the lock is held. Outbound peer calls run after the lock is released,
//! concurrently, each under its own timeout.
//!
//! Three kinds of actors contend on that lock:
//!
//! - **Election timer**: a spawned sleeper keyed by a generation counter. A
//!   sleeper whose generation was superseded wakes up and does nothing.
//! - **Heartbeat loop**: spawned when a node wins an election; it stops on
//!   the first tick at which the node no longer leads the term it won.
//! - **HTTP handlers**: `/vote`, `/append`, `/message`, `/messages`.
//!
//! # Modules
//!
//! - [`config`]: listen/advertise addresses, peers and protocol timing
//! - [`clock`]: election timer generations and randomized timeouts
//! - [`peers`]: static peer registry and the broadcast-with-timeout helper
//! - [`log`]: in-memory entry log
//! - [`node`]: the node state machine
//! - [`election`]: vote tallying and the election round
//! - [`replication`]: heartbeats, follower-side append and client writes
//! - [`rpc`]: wire types and the HTTP client used to reach peers
//! - [`server`]: axum routes exposing the RPC surface
//! - [`runtime`]: spawning a node and the handle used to drive it
//! - [`error`]: client-facing write errors
//!
//! # Known simplifications
//!
//! Followers replace their log wholesale with whatever the leader sends, with
//! no previous-index/term consistency check, so a stale leader that rejoins
//! can overwrite a longer follower log. The commit threshold counts only peer
//! acknowledgements (`peers / 2`) while elections need a strict majority of
//! the whole cluster. Nothing is persisted; a restart loses all state.

pub mod clock;
pub mod config;
pub mod election;
pub mod error;
pub mod log;
pub mod node;
pub mod peers;
pub mod replication;
pub mod rpc;
pub mod runtime;
pub mod server;
