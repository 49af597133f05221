//! # Tracklog Core Library
//!
//! Core functionality for capturing and replaying motion-tracking sessions.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - A line-oriented session log format with a tolerant reader
//! - A crash-tolerant session recorder with per-message flush
//! - A drift-corrected replay engine with speed and loop controls
//! - HTTP and TCP ingestion endpoints feeding the recorder
//! - An HTTP dispatch sink for pushing replayed messages to a live consumer
//!
//! ## Example
//!
//! ```rust,ignore
//! use tracklog_core::datalog::{ReplayEngine, ReplayOptions};
//! use tracklog_core::dispatch::HttpSink;
//! use tokio_util::sync::CancellationToken;
//!
//! let sink = HttpSink::new("http://localhost:5000")?;
//! let engine = ReplayEngine::new(sink, ReplayOptions::default().with_speed(2.0));
//! let report = engine
//!     .replay_file("logs/hand_tracking_20250101_120000_000.json", &CancellationToken::new())
//!     .await?;
//! println!("dispatched {} messages", report.dispatched);
//! ```

pub mod config;
pub mod datalog;
pub mod demo;
pub mod dispatch;
pub mod ingest;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{AppConfig, ConfigError, RecorderConfig, ReplayConfig, ServerConfig};
    pub use crate::datalog::{
        LogEntry, LogRecord, MetadataRecord, ReplayEngine, ReplayOptions, ReplayReport,
        SessionLog, SessionRecorder,
    };
    pub use crate::dispatch::{DispatchError, DispatchReceipt, DispatchSink, HttpSink};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log format version written into every `SessionStart` record
pub const LOG_FORMAT_VERSION: &str = "1.0";
