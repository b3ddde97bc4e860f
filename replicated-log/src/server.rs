//! HTTP routes.
//!
//! | Route            | Purpose                              |
//! |------------------|--------------------------------------|
//! | `POST /vote`     | vote request from a candidate        |
//! | `POST /append`   | log replication / heartbeat          |
//! | `POST /message`  | client write (multipart or JSON)     |
//! | `GET /messages`  | local view of the log and leadership |

use std::sync::Arc;

use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Request, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::error::SubmitError;
use crate::log::Attachment;
use crate::rpc::{
    AppendEntries, AppendResponse, QueryResponse, SubmitRequest, SubmitResponse, VoteRequest,
    VoteResponse,
};
use crate::runtime::Replica;

/// Builds the router for `replica`.
///
/// `/append` carries the leader's whole log, so it has no body limit.
/// Client writes are capped at `max_submit_bytes` and refused with 413
/// before anything is appended.
pub fn router(replica: Arc<Replica>) -> Router {
    let submit_limit = DefaultBodyLimit::max(replica.max_submit_bytes);
    Router::new()
        .route("/vote", post(vote))
        .route("/append", post(append).layer(DefaultBodyLimit::disable()))
        .route("/message", post(submit).layer(submit_limit))
        .route("/messages", get(query))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(replica)
}

async fn vote(
    State(replica): State<Arc<Replica>>,
    Json(request): Json<VoteRequest>,
) -> Json<VoteResponse> {
    Json(replica.handle_vote(request).await)
}

async fn append(
    State(replica): State<Arc<Replica>>,
    Json(request): Json<AppendEntries>,
) -> Json<AppendResponse> {
    Json(replica.handle_append(request).await)
}

async fn query(State(replica): State<Arc<Replica>>) -> Json<QueryResponse> {
    Json(replica.query().await)
}

async fn submit(State(replica): State<Arc<Replica>>, request: Request) -> Response {
    let form = match read_submission(request).await {
        Ok(form) => form,
        Err((status, reason)) => {
            debug!(%status, %reason, "rejected write request");
            return (status, Json(json!({ "error": reason }))).into_response();
        }
    };

    match replica.submit(form.content, form.attachment).await {
        Ok(entry) => Json(SubmitResponse {
            success: true,
            entry,
        })
        .into_response(),
        Err(err) => err.into_response(),
    }
}

/// Decodes a write from either a JSON body or a multipart form with a
/// `content` text field and an optional `file` part.
///
/// Errors carry the status to answer with, 413 for oversized bodies.
async fn read_submission(request: Request) -> Result<SubmitRequest, (StatusCode, String)> {
    let is_json = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"));

    if is_json {
        let Json(body) = Json::<SubmitRequest>::from_request(request, &())
            .await
            .map_err(|rejection| (rejection.status(), rejection.body_text()))?;
        return Ok(body);
    }

    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|rejection| (rejection.status(), rejection.body_text()))?;
    let field_error = |err: MultipartError| (err.status(), err.body_text());

    let mut content = None;
    let mut attachment = None;
    while let Some(field) = multipart.next_field().await.map_err(field_error)? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("content") => content = Some(field.text().await.map_err(field_error)?),
            Some("file") => {
                let file_name = field.file_name().unwrap_or_default().to_owned();
                let mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_owned();
                let bytes = field.bytes().await.map_err(field_error)?.to_vec();
                attachment = Some(Attachment {
                    name: file_name,
                    mime_type,
                    bytes,
                });
            }
            _ => {}
        }
    }

    let content = content.ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            "missing `content` field".to_owned(),
        )
    })?;
    Ok(SubmitRequest {
        content,
        attachment,
    })
}

impl IntoResponse for SubmitError {
    fn into_response(self) -> Response {
        match self {
            SubmitError::NotLeader { redirect } => (
                StatusCode::TEMPORARY_REDIRECT,
                Json(json!({ "error": "not-leader", "redirect": redirect })),
            )
                .into_response(),
            SubmitError::QuorumFailed {
                index,
                acks,
                needed,
            } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "quorum-failed",
                    "index": index,
                    "acks": acks,
                    "needed": needed,
                })),
            )
                .into_response(),
        }
    }
}
