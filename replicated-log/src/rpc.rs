//! Wire types and the HTTP client used to reach peers.
//!
//! Bodies are JSON with camelCase field names.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::log::{Attachment, Entry};
use crate::node::Role;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub term: u64,
    pub last_log_index: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteResponse {
    pub vote_granted: bool,
}

/// Full-log replication, also used as the leader heartbeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendEntries {
    pub term: u64,
    pub leader_id: String,
    pub entries: Vec<Entry>,
    pub last_log_index: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendResponse {
    pub success: bool,
}

/// JSON form of a client write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub content: String,
    #[serde(default)]
    pub attachment: Option<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub success: bool,
    pub entry: Entry,
}

/// What a node currently believes; no consistency guarantee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub entries: Vec<Entry>,
    pub is_leader: bool,
    pub term: u64,
    pub leader_hint: Option<String>,
    pub node: String,
    pub role: Role,
}

/// Posts RPCs to peers.
///
/// Timeouts are applied per call by the broadcast helper, not here.
#[derive(Debug, Clone)]
pub struct PeerClient {
    http: Client,
}

impl PeerClient {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .no_proxy()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(Duration::from_secs(1))
            .build()
            .context("failed to build http client")?;
        Ok(Self { http })
    }

    pub async fn request_vote(&self, peer: &str, req: &VoteRequest) -> Result<VoteResponse> {
        self.post(peer, "vote", req).await
    }

    pub async fn append_entries(&self, peer: &str, req: &AppendEntries) -> Result<AppendResponse> {
        self.post(peer, "append", req).await
    }

    async fn post<Req, Resp>(&self, peer: &str, path: &str, req: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = format!("{}/{}", peer.trim_end_matches('/'), path);
        let resp = self
            .http
            .post(&url)
            .json(req)
            .send()
            .await
            .with_context(|| format!("POST {url} failed"))?
            .error_for_status()
            .with_context(|| format!("POST {url} returned an error status"))?;
        resp.json()
            .await
            .with_context(|| format!("invalid response body from {url}"))
    }
}
