//! HTTP dispatch sink
//!
//! Posts each replayed payload as JSON to `<server>/control`, the same
//! endpoint the ingestion server exposes, so a replay can feed either a
//! recorder or a live consumer.

use async_trait::async_trait;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::info;

use super::{DispatchError, DispatchReceipt, DispatchSink};

/// Default per-message timeout
const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(1);

/// Default health check timeout
const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

/// The longest response body kept in a `Rejected` error
const MAX_ERROR_BODY: usize = 512;

/// Sink posting payloads to an HTTP consumer
#[derive(Debug, Clone)]
pub struct HttpSink {
    /// HTTP client for requests
    client: reqwest::Client,
    /// Base URL without trailing slash
    base_url: String,
    dispatch_timeout: Duration,
    health_timeout: Duration,
}

impl HttpSink {
    /// Create a sink for the given base URL
    pub fn new(base_url: impl Into<String>) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("tracklog/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            dispatch_timeout: DEFAULT_DISPATCH_TIMEOUT,
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
        })
    }

    /// Override the dispatch and health check timeouts
    pub fn with_timeouts(mut self, dispatch: Duration, health: Duration) -> Self {
        self.dispatch_timeout = dispatch;
        self.health_timeout = health;
        self
    }

    /// Base URL of the consumer
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Query `<server>/health` and return its JSON body
    pub async fn check_health(&self) -> Result<Value, DispatchError> {
        let response = self
            .client
            .get(self.url("health"))
            .timeout(self.health_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejected(response).await);
        }

        let body: Value = response.json().await?;
        info!("Server is healthy: {}", body);
        Ok(body)
    }
}

async fn rejected(response: reqwest::Response) -> DispatchError {
    let status = response.status().as_u16();
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    DispatchError::Rejected { status, body }
}

#[async_trait]
impl DispatchSink for HttpSink {
    async fn dispatch(&self, payload: &Value) -> Result<DispatchReceipt, DispatchError> {
        let started = Instant::now();
        let response = self
            .client
            .post(self.url("control"))
            .json(payload)
            .timeout(self.dispatch_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejected(response).await);
        }

        Ok(DispatchReceipt {
            latency: started.elapsed(),
            status: Some(response.status().as_u16()),
        })
    }
}
