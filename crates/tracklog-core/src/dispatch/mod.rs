//! Dispatch sinks
//!
//! A sink receives replayed payloads one at a time and reports whether each
//! delivery succeeded. Failures are per message; the replay schedule never
//! waits for a retry.

mod error;
mod http;

pub use error::DispatchError;
pub use http::HttpSink;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of a successful delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReceipt {
    /// Time spent in the dispatch call
    pub latency: Duration,
    /// Transport status code, if the transport has one
    pub status: Option<u16>,
}

/// Destination for replayed payloads
#[async_trait]
pub trait DispatchSink: Send + Sync {
    /// Deliver one payload. Implementations must bound their own latency.
    async fn dispatch(&self, payload: &Value) -> Result<DispatchReceipt, DispatchError>;
}

#[async_trait]
impl<S: DispatchSink + ?Sized> DispatchSink for Arc<S> {
    async fn dispatch(&self, payload: &Value) -> Result<DispatchReceipt, DispatchError> {
        (**self).dispatch(payload).await
    }
}
