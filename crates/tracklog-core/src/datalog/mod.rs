//! Session Logging
//!
//! Records inbound tracking messages to a per-session log and replays them
//! with their original timing.

mod error;
mod format;
mod playback;
mod recorder;

pub use error::{DecodeError, RecorderError, ReplayError};
pub use format::{
    decode, decode_lines, encode, latest_session, list_sessions, read_log, DecodeIssue,
    SessionFileInfo, SessionLog,
};
pub use playback::{replay, ReplayEngine, ReplayOptions, ReplayProgress, ReplayReport};
pub use recorder::{
    ClosedSession, RecordReceipt, RecorderStatus, ResetOutcome, SessionInfo, SessionRecorder,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single captured message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Recorder-side acceptance time (Unix epoch seconds)
    pub server_timestamp: f64,
    /// Position within the session, starting at 0
    pub message_index: u64,
    /// Opaque payload as received
    pub data: Value,
}

impl LogEntry {
    /// Create a new log entry
    pub fn new(message_index: u64, server_timestamp: f64, data: Value) -> Self {
        Self {
            server_timestamp,
            message_index,
            data,
        }
    }
}

/// First record of every session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStart {
    /// When the session was opened (Unix epoch seconds)
    pub timestamp: f64,
    /// Same instant as an RFC 3339 string, for humans
    pub datetime: String,
    /// Log format version
    pub version: String,
}

/// Last record of a cleanly closed session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEnd {
    /// When the session was closed (Unix epoch seconds)
    pub timestamp: f64,
    /// Same instant as an RFC 3339 string
    pub datetime: String,
    /// Number of entries written during the session
    pub total_messages: u64,
    /// Seconds between session start and end
    pub duration: f64,
}

/// Session boundary marker, discriminated by the `type` field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MetadataRecord {
    /// Session opened
    #[serde(rename = "metadata")]
    SessionStart(SessionStart),
    /// Session closed cleanly
    #[serde(rename = "session_end")]
    SessionEnd(SessionEnd),
}

/// Any record that can appear on a line of a session log
#[derive(Debug, Clone, PartialEq)]
pub enum LogRecord {
    /// Boundary marker (never dispatched)
    Metadata(MetadataRecord),
    /// Captured message
    Entry(LogEntry),
}

impl From<LogEntry> for LogRecord {
    fn from(entry: LogEntry) -> Self {
        LogRecord::Entry(entry)
    }
}

impl From<MetadataRecord> for LogRecord {
    fn from(meta: MetadataRecord) -> Self {
        LogRecord::Metadata(meta)
    }
}

/// Current wall-clock time as Unix epoch seconds
pub(crate) fn epoch_seconds(now: chrono::DateTime<chrono::Local>) -> f64 {
    now.timestamp_micros() as f64 / 1_000_000.0
}

/// RFC 3339 representation used in metadata records
pub(crate) fn iso_datetime(now: chrono::DateTime<chrono::Local>) -> String {
    now.to_rfc3339_opts(chrono::SecondsFormat::Micros, false)
}
