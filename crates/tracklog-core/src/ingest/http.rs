//! HTTP ingestion endpoint

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use super::{describe_payload, is_message, IngestError};
use crate::datalog::SessionRecorder;

/// Largest accepted request body (16 MiB)
const MAX_BODY_BYTES: u64 = 16 * 1024 * 1024;

/// `GET /health` body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message_count: u64,
    pub uptime: f64,
    pub log_file: Option<String>,
}

/// `POST /control` success body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub status: String,
    pub message_index: u64,
    pub timestamp: f64,
}

/// `GET /status` body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub message_count: u64,
    pub current_log: Option<String>,
    pub uptime: f64,
}

/// `POST /reset` body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetResponse {
    pub status: String,
    pub previous_message_count: u64,
    pub previous_log_file: Option<String>,
    pub new_log_file: String,
}

/// Error body for 4xx/5xx responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}

fn json_reply<T: Serialize>(body: &T, status: StatusCode) -> Response {
    warp::reply::with_status(warp::reply::json(body), status).into_response()
}

fn error_reply(status: StatusCode, message: impl Into<String>) -> Response {
    json_reply(
        &ErrorResponse {
            error: message.into(),
        },
        status,
    )
}

fn health(recorder: &SessionRecorder) -> Response {
    let status = recorder.status();
    json_reply(
        &HealthResponse {
            status: "ok".to_string(),
            message_count: status.message_count,
            uptime: status.uptime(),
            log_file: status.log_file.as_deref().map(display_path),
        },
        StatusCode::OK,
    )
}

fn control(recorder: &SessionRecorder, body: &[u8]) -> Response {
    if body.iter().all(u8::is_ascii_whitespace) {
        return error_reply(StatusCode::BAD_REQUEST, "No JSON data provided");
    }
    let payload: Value = match serde_json::from_slice(body) {
        Ok(payload) => payload,
        Err(e) => return error_reply(StatusCode::BAD_REQUEST, format!("Invalid JSON: {e}")),
    };
    if !is_message(&payload) {
        return error_reply(StatusCode::BAD_REQUEST, "No JSON data provided");
    }

    let summary = describe_payload(&payload);
    match recorder.record(payload) {
        Ok(receipt) => {
            match summary {
                Some(hands) => info!(
                    "Received hand data: {} - Message #{}",
                    hands, receipt.message_index
                ),
                None => info!("Received data - Message #{}", receipt.message_index),
            }
            json_reply(
                &ControlResponse {
                    status: "ok".to_string(),
                    message_index: receipt.message_index,
                    timestamp: receipt.server_timestamp,
                },
                StatusCode::OK,
            )
        }
        Err(e) => {
            error!("Error processing request: {}", e);
            error_reply(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

fn status(recorder: &SessionRecorder) -> Response {
    let status = recorder.status();
    json_reply(
        &StatusResponse {
            status: "running".to_string(),
            message_count: status.message_count,
            current_log: status.log_file.as_deref().map(display_path),
            uptime: status.uptime(),
        },
        StatusCode::OK,
    )
}

fn reset(recorder: &SessionRecorder) -> Response {
    match recorder.reset() {
        Ok(outcome) => json_reply(
            &ResetResponse {
                status: "reset".to_string(),
                previous_message_count: outcome.previous_message_count(),
                previous_log_file: outcome.previous.as_ref().map(|p| display_path(&p.path)),
                new_log_file: display_path(&outcome.current.path),
            },
            StatusCode::OK,
        ),
        Err(e) => {
            error!("Failed to reset session: {}", e);
            error_reply(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Run a recorder call on the blocking pool; it takes a lock and writes to disk
async fn run_blocking<F>(call: F) -> Result<Response, Rejection>
where
    F: FnOnce() -> Response + Send + 'static,
{
    match tokio::task::spawn_blocking(call).await {
        Ok(response) => Ok(response),
        Err(e) => {
            error!("Recorder task failed: {}", e);
            Ok(error_reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                "recorder task failed",
            ))
        }
    }
}

/// All ingestion routes bound to `recorder`
pub fn routes(
    recorder: Arc<SessionRecorder>,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    let with_recorder = warp::any().map(move || Arc::clone(&recorder));

    let health_route = warp::path!("health")
        .and(warp::get())
        .and(with_recorder.clone())
        .map(|recorder: Arc<SessionRecorder>| health(&recorder));

    let control_route = warp::path!("control")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::bytes())
        .and(with_recorder.clone())
        .and_then(|body: Bytes, recorder: Arc<SessionRecorder>| {
            run_blocking(move || control(&recorder, &body))
        });

    let status_route = warp::path!("status")
        .and(warp::get())
        .and(with_recorder.clone())
        .map(|recorder: Arc<SessionRecorder>| status(&recorder));

    let reset_route = warp::path!("reset")
        .and(warp::post())
        .and(with_recorder)
        .and_then(|recorder: Arc<SessionRecorder>| run_blocking(move || reset(&recorder)));

    health_route
        .or(control_route)
        .unify()
        .or(status_route)
        .unify()
        .or(reset_route)
        .unify()
}

/// Bind the HTTP endpoint; the returned future runs until `shutdown` fires
pub fn serve_http(
    addr: SocketAddr,
    recorder: Arc<SessionRecorder>,
    shutdown: CancellationToken,
) -> Result<(SocketAddr, impl Future<Output = ()>), IngestError> {
    let (bound, server) = warp::serve(routes(recorder))
        .try_bind_with_graceful_shutdown(addr, async move { shutdown.cancelled().await })?;
    info!("HTTP server started on http://{}", bound);
    Ok((bound, server))
}
