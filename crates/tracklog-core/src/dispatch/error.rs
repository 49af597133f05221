//! Dispatch errors

use thiserror::Error;

/// Errors delivering one message to a sink
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error("Dispatch timed out")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Server returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for DispatchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            DispatchError::Timeout
        } else if e.is_decode() {
            DispatchError::InvalidResponse(e.to_string())
        } else {
            DispatchError::Transport(e.to_string())
        }
    }
}
