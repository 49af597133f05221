//! Session log errors

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors decoding a single log line
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("line is empty")]
    Empty,

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("line is not valid UTF-8")]
    InvalidUtf8,

    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("unknown record type '{0}'")]
    UnknownType(String),
}

/// Errors raised while writing a session log
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors that abort a replay before scheduling begins
#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("Log file not found: {0}")]
    LogNotFound(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}
