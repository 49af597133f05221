//! Configuration
//!
//! Settings for the ingestion server and the replay client. Every struct has
//! defaults matching the command-line defaults, so a config file only needs
//! the values it changes.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors detected before any recording or replay work starts
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid speed multiplier {0}: must be a positive finite number")]
    InvalidSpeed(f64),

    #[error("No log selected: pass a log file or request the latest")]
    NoLogSelected,

    #[error("No log files found in {0}")]
    NoLogsFound(PathBuf),

    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Where and how session logs are written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Directory holding session logs
    pub log_dir: PathBuf,
    /// File name prefix for session logs
    pub file_prefix: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("./logs"),
            file_prefix: "hand_tracking".to_string(),
        }
    }
}

impl RecorderConfig {
    /// Create a config writing to the given directory with the default prefix
    pub fn with_log_dir(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            ..Default::default()
        }
    }
}

/// Ingestion server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,
    /// HTTP port
    pub port: u16,
    /// Optional port for newline-delimited JSON over TCP
    pub tcp_port: Option<u16>,
    /// Log settings
    pub recorder: RecorderConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            tcp_port: None,
            recorder: RecorderConfig::default(),
        }
    }
}

/// Replay client settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Base URL of the consumer receiving replayed messages
    pub server: String,
    /// Speed multiplier (>1 plays faster than recorded)
    pub speed: f64,
    /// Repeat the session until cancelled
    pub loop_playback: bool,
    /// Pause between loop iterations in milliseconds
    pub loop_pause_ms: u64,
    /// Per-message dispatch timeout in milliseconds
    pub dispatch_timeout_ms: u64,
    /// Health check timeout in milliseconds
    pub health_timeout_ms: u64,
    /// Report progress every N messages
    pub progress_interval: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            server: "http://localhost:5000".to_string(),
            speed: 1.0,
            loop_playback: false,
            loop_pause_ms: 2000,
            dispatch_timeout_ms: 1000,
            health_timeout_ms: 2000,
            progress_interval: 10,
        }
    }
}

impl ReplayConfig {
    /// Check the settings before a replay starts
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_speed(self.speed)?;
        if self.progress_interval == 0 {
            return Err(ConfigError::InvalidValue {
                field: "progress_interval".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.dispatch_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "dispatch_timeout_ms".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.server.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "server".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Pause between loop iterations
    pub fn loop_pause(&self) -> Duration {
        Duration::from_millis(self.loop_pause_ms)
    }

    /// Per-message dispatch timeout
    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    /// Health check timeout
    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }
}

/// Reject speeds that would make the schedule meaningless
pub fn validate_speed(speed: f64) -> Result<(), ConfigError> {
    if speed.is_finite() && speed > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidSpeed(speed))
    }
}

/// Top-level config file contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Ingestion server settings
    pub server: ServerConfig,
    /// Replay client settings
    pub replay: ReplayConfig,
}

impl AppConfig {
    /// Load a JSON config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Load a config file if one was given, otherwise use defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    /// Write the config as pretty JSON
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
