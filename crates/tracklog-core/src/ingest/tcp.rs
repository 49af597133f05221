//! Line-oriented TCP ingestion
//!
//! Each connection sends newline-delimited JSON objects. Every line is
//! answered with one JSON line: an `ack` carrying the assigned message index,
//! or an `error`. A bad line never closes the connection.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{describe_payload, describe_wrists, is_message};
use crate::datalog::SessionRecorder;

/// Longest accepted line (1 MiB)
const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Accept connections until `shutdown` fires, then wait for open connections to finish
pub async fn serve_tcp(
    listener: TcpListener,
    recorder: Arc<SessionRecorder>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    info!("TCP ingestion listening on {}", listener.local_addr()?);
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        continue;
                    }
                };
                info!("Client {} connected", peer);
                let recorder = Arc::clone(&recorder);
                let shutdown = shutdown.clone();
                connections.spawn(async move {
                    if let Err(e) = handle_connection(stream, recorder, &shutdown).await {
                        warn!("Connection {} closed with error: {}", peer, e);
                    }
                    info!("Client {} disconnected", peer);
                });
            }
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    while connections.join_next().await.is_some() {}
    Ok(())
}

async fn handle_connection(
    stream: TcpStream,
    recorder: Arc<SessionRecorder>,
    shutdown: &CancellationToken,
) -> Result<(), LinesCodecError> {
    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));

    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = framed.next() => next,
        };
        let reply = match next {
            None => break,
            Some(Ok(line)) => {
                // Recording locks and writes to disk, so keep it off the async workers
                let recorder = Arc::clone(&recorder);
                match tokio::task::spawn_blocking(move || handle_line(&recorder, &line)).await {
                    Ok(Some(reply)) => reply,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!("Recorder task failed: {}", e);
                        error_line("recorder task failed")
                    }
                }
            }
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => error_line("line too long"),
            Some(Err(e)) => return Err(e),
        };
        framed.send(reply.to_string()).await?;
    }
    Ok(())
}

fn error_line(message: impl Into<String>) -> Value {
    json!({ "type": "error", "error": message.into() })
}

/// Record one line and build its reply; blank lines get no reply
pub(crate) fn handle_line(recorder: &SessionRecorder, line: &str) -> Option<Value> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let payload: Value = match serde_json::from_str(line) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Invalid JSON received: {:.100}", line);
            return Some(error_line(format!("Invalid JSON: {e}")));
        }
    };
    if !is_message(&payload) {
        return Some(error_line("No JSON data provided"));
    }

    let summary = describe_payload(&payload);
    let wrists = describe_wrists(&payload);
    let reply = match recorder.record(payload) {
        Ok(receipt) => {
            match summary {
                Some(hands) => debug!("Message #{}: {}", receipt.message_index, hands),
                None => debug!("Message #{}", receipt.message_index),
            }
            for wrist in &wrists {
                debug!("  {}", wrist);
            }
            json!({
                "type": "ack",
                "messageId": receipt.message_index,
                "timestamp": receipt.server_timestamp,
            })
        }
        Err(e) => {
            warn!("Failed to record message: {}", e);
            error_line(e.to_string())
        }
    };
    Some(reply)
}
