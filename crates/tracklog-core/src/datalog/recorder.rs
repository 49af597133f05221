//! Session recorder
//!
//! Appends inbound messages to the currently open session log. Every write
//! is a complete line followed by a flush, so a crash never costs more than
//! the message being written.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Local};
use serde_json::Value;
use tracing::{debug, info};

use super::format::{create_session_file, encode};
use super::{
    epoch_seconds, iso_datetime, LogEntry, LogRecord, MetadataRecord, RecorderError, SessionEnd,
    SessionStart,
};
use crate::config::RecorderConfig;
use crate::LOG_FORMAT_VERSION;

/// Result of a successful `record` call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordReceipt {
    /// Sequence number assigned to the message
    pub message_index: u64,
    /// Acceptance time written to the log
    pub server_timestamp: f64,
}

/// Description of an open (or just-opened) session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    /// Log file backing the session
    pub path: PathBuf,
    /// Session start (Unix epoch seconds)
    pub start_time: f64,
}

/// Session closed by `shutdown` or `reset`
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedSession {
    /// Log file of the closed session
    pub path: PathBuf,
    /// End record written to it
    pub end: SessionEnd,
}

/// Result of `reset`
#[derive(Debug, Clone, PartialEq)]
pub struct ResetOutcome {
    /// Session that was closed, if one was open
    pub previous: Option<ClosedSession>,
    /// The freshly opened session
    pub current: SessionInfo,
}

impl ResetOutcome {
    /// Number of messages in the closed session (0 if none was open)
    pub fn previous_message_count(&self) -> u64 {
        self.previous
            .as_ref()
            .map(|p| p.end.total_messages)
            .unwrap_or(0)
    }
}

/// Snapshot of recorder state
#[derive(Debug, Clone, PartialEq)]
pub struct RecorderStatus {
    /// Messages written in the current session
    pub message_count: u64,
    /// Current log file
    pub log_file: Option<PathBuf>,
    /// Current session start (Unix epoch seconds)
    pub session_start: Option<f64>,
}

impl RecorderStatus {
    /// Seconds since the current session opened, 0 when closed
    pub fn uptime(&self) -> f64 {
        self.session_start
            .map(|start| (epoch_seconds(Local::now()) - start).max(0.0))
            .unwrap_or(0.0)
    }
}

/// Destination of a session's lines
trait LogWriter: Write + Send {
    /// Push written data through to durable storage
    fn sync(&mut self) -> io::Result<()>;
}

impl LogWriter for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

struct OpenSession<W = File> {
    path: PathBuf,
    file: W,
    start_time: f64,
    message_count: u64,
    last_timestamp: f64,
    /// A previous write failed part-way; the next write must start on a fresh line
    torn: bool,
}

impl OpenSession<File> {
    fn open(config: &RecorderConfig) -> Result<Self, RecorderError> {
        let now = Local::now();
        let (path, file) = create_session_file(&config.log_dir, &config.file_prefix, now)?;
        let session = Self::start(path, file, now)?;
        info!("Started new log: {}", session.path.display());
        Ok(session)
    }
}

impl<W: LogWriter> OpenSession<W> {
    /// Write the start record to a fresh writer
    fn start(path: PathBuf, file: W, now: DateTime<Local>) -> Result<Self, RecorderError> {
        let start_time = epoch_seconds(now);
        let mut session = OpenSession {
            path,
            file,
            start_time,
            message_count: 0,
            last_timestamp: start_time,
            torn: false,
        };
        session.append(&LogRecord::Metadata(MetadataRecord::SessionStart(SessionStart {
            timestamp: start_time,
            datetime: iso_datetime(now),
            version: LOG_FORMAT_VERSION.to_string(),
        })))?;
        Ok(session)
    }

    fn append(&mut self, record: &LogRecord) -> Result<(), RecorderError> {
        let encoded = encode(record)?;
        let mut line = String::with_capacity(encoded.len() + 2);
        if self.torn {
            line.push('\n');
        }
        line.push_str(&encoded);
        line.push('\n');

        match self
            .file
            .write_all(line.as_bytes())
            .and_then(|_| self.file.flush())
        {
            Ok(()) => {
                self.torn = false;
                Ok(())
            }
            Err(e) => {
                self.torn = true;
                Err(e.into())
            }
        }
    }

    /// Append one entry; the counter only advances once the line is written
    fn record(&mut self, payload: Value) -> Result<RecordReceipt, RecorderError> {
        // Keep timestamps non-decreasing even if the wall clock steps back
        let server_timestamp = epoch_seconds(Local::now()).max(self.last_timestamp);
        let message_index = self.message_count;
        self.append(&LogRecord::Entry(LogEntry::new(
            message_index,
            server_timestamp,
            payload,
        )))?;
        self.message_count += 1;
        self.last_timestamp = server_timestamp;
        Ok(RecordReceipt {
            message_index,
            server_timestamp,
        })
    }

    fn info(&self) -> SessionInfo {
        SessionInfo {
            path: self.path.clone(),
            start_time: self.start_time,
        }
    }

    /// Write the end record and sync the file to disk
    fn finish(mut self) -> Result<ClosedSession, RecorderError> {
        let now = Local::now();
        let timestamp = epoch_seconds(now);
        let end = SessionEnd {
            timestamp,
            datetime: iso_datetime(now),
            total_messages: self.message_count,
            duration: (timestamp - self.start_time).max(0.0),
        };
        self.append(&LogRecord::Metadata(MetadataRecord::SessionEnd(end.clone())))?;
        self.file.sync()?;

        info!(
            "Session ended. Total messages: {} ({})",
            end.total_messages,
            self.path.display()
        );
        Ok(ClosedSession {
            path: self.path,
            end,
        })
    }
}

/// Recorder state machine: `Closed -> Open -> Closed`
enum SessionState {
    Closed,
    Open(OpenSession),
}

impl SessionState {
    fn take(&mut self) -> Option<OpenSession> {
        match std::mem::replace(self, SessionState::Closed) {
            SessionState::Open(session) => Some(session),
            SessionState::Closed => None,
        }
    }
}

/// Single-writer recorder for session logs.
///
/// All operations take `&self` and are serialized by one internal lock, so
/// the recorder can be shared between connection handlers behind an `Arc`.
pub struct SessionRecorder {
    config: RecorderConfig,
    state: Mutex<SessionState>,
}

impl SessionRecorder {
    /// Create a recorder; no file is opened until the first message or an
    /// explicit `start_new_session`
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            state: Mutex::new(SessionState::Closed),
        }
    }

    /// Get the recorder configuration
    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Directory holding the session logs
    pub fn log_dir(&self) -> &Path {
        &self.config.log_dir
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        // Every mutation completes a whole line before returning, so the
        // state behind a poisoned lock is still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Close any open log without an end record and open a fresh session
    pub fn start_new_session(&self) -> Result<SessionInfo, RecorderError> {
        let mut state = self.lock();
        if let Some(previous) = state.take() {
            debug!("Closing {} without end record", previous.path.display());
        }
        let session = OpenSession::open(&self.config)?;
        let info = session.info();
        *state = SessionState::Open(session);
        Ok(info)
    }

    /// Append a message to the open session, opening one if needed
    pub fn record(&self, payload: Value) -> Result<RecordReceipt, RecorderError> {
        let mut state = self.lock();
        let mut session = match state.take() {
            Some(session) => session,
            None => OpenSession::open(&self.config)?,
        };

        let written = session.record(payload);
        *state = SessionState::Open(session);
        let receipt = written?;

        debug!("Recorded message #{}", receipt.message_index);
        Ok(receipt)
    }

    /// Close the open session cleanly and start a new one
    pub fn reset(&self) -> Result<ResetOutcome, RecorderError> {
        let mut state = self.lock();
        let previous = state.take().map(OpenSession::finish).transpose()?;
        let session = OpenSession::open(&self.config)?;
        let current = session.info();
        *state = SessionState::Open(session);
        Ok(ResetOutcome { previous, current })
    }

    /// Write the end record and close the log. Calling it again is a no-op.
    pub fn shutdown(&self) -> Result<Option<ClosedSession>, RecorderError> {
        let mut state = self.lock();
        state.take().map(OpenSession::finish).transpose()
    }

    /// Check whether a session is open
    pub fn is_open(&self) -> bool {
        matches!(*self.lock(), SessionState::Open(_))
    }

    /// Current message count, log file and session start
    pub fn status(&self) -> RecorderStatus {
        match &*self.lock() {
            SessionState::Open(session) => RecorderStatus {
                message_count: session.message_count,
                log_file: Some(session.path.clone()),
                session_start: Some(session.start_time),
            },
            SessionState::Closed => RecorderStatus {
                message_count: 0,
                log_file: None,
                session_start: None,
            },
        }
    }
}
