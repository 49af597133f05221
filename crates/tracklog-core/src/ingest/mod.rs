//! Ingestion endpoints
//!
//! Thin network front-ends that accept tracking messages and hand each one
//! to a shared [`SessionRecorder`](crate::datalog::SessionRecorder).
//!
//! - HTTP: `GET /health`, `POST /control`, `GET /status`, `POST /reset`
//! - TCP: newline-delimited JSON objects, each answered with an ack line

mod http;
mod tcp;

pub use http::{
    routes, serve_http, ControlResponse, ErrorResponse, HealthResponse, ResetResponse,
    StatusResponse,
};
pub use tcp::serve_tcp;

use serde_json::Value;
use thiserror::Error;

/// Errors starting an ingestion endpoint
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Failed to bind HTTP server: {0}")]
    Bind(#[from] warp::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Keys carrying per-hand joint data in hand-tracking payloads
const HAND_KEYS: [(&str, &str); 2] = [("leftHand", "left"), ("rightHand", "right")];

/// Short description of a payload for the request log
pub(crate) fn describe_payload(payload: &Value) -> Option<String> {
    let object = payload.as_object()?;
    if !HAND_KEYS.iter().any(|(key, _)| object.contains_key(*key)) {
        return None;
    }
    let hands: Vec<&str> = HAND_KEYS
        .iter()
        .filter(|(key, _)| object.get(*key).is_some_and(|hand| !hand.is_null()))
        .map(|(_, name)| *name)
        .collect();
    Some(hands.join(", "))
}

/// Joint carrying the wrist position in a 27-joint hand
const WRIST_JOINT: usize = 24;

fn wrist_of(hand: &Value) -> Option<[f64; 3]> {
    let joint = hand.get("joints")?.get(WRIST_JOINT)?;
    // Compact frames store `[x, y, z]`, detailed frames `{"position": [x, y, z]}`
    let position = joint.get("position").unwrap_or(joint).as_array()?;
    match position.as_slice() {
        [x, y, z] => Some([x.as_f64()?, y.as_f64()?, z.as_f64()?]),
        _ => None,
    }
}

/// Wrist positions of the hands in a payload, formatted for the debug log
pub(crate) fn describe_wrists(payload: &Value) -> Vec<String> {
    let mut wrists = Vec::new();
    for (key, name) in HAND_KEYS {
        if let Some(hand) = payload.get(key) {
            if let Some([x, y, z]) = wrist_of(hand) {
                wrists.push(format!("{name} wrist x={x:.3}, y={y:.3}, z={z:.3}"));
            }
        }
    }
    if let Some(is_left) = payload.get("isLeft").and_then(Value::as_bool) {
        if let Some([x, y, z]) = wrist_of(payload) {
            let name = if is_left { "left" } else { "right" };
            wrists.push(format!("{name} wrist x={x:.3}, y={y:.3}, z={z:.3}"));
        }
    }
    wrists
}

/// Accept only non-empty JSON objects as messages
pub(crate) fn is_message(payload: &Value) -> bool {
    payload.as_object().is_some_and(|object| !object.is_empty())
}
