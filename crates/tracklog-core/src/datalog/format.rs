//! Session log format
//!
//! One JSON record per line. Entries carry no `type` field; metadata
//! records are tagged `metadata` (session start) or `session_end`.
//!
//! Reading is tolerant: a malformed line is reported and skipped, so a log
//! truncated by a crash still replays everything written before the crash.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde_json::Value;
use tracing::{info, warn};

use super::{DecodeError, LogEntry, LogRecord, MetadataRecord, ReplayError, SessionEnd, SessionStart};
use crate::config::ConfigError;

/// Suffix of every session log file
const LOG_EXTENSION: &str = "json";

/// Give up creating a uniquely named file after this many collisions
const MAX_NAME_ATTEMPTS: u32 = 100;

/// Encode a record as a single line (without the trailing newline)
pub fn encode(record: &LogRecord) -> Result<String, serde_json::Error> {
    match record {
        LogRecord::Entry(entry) => serde_json::to_string(entry),
        LogRecord::Metadata(meta) => serde_json::to_string(meta),
    }
}

/// Decode one line of a session log
pub fn decode(line: &str) -> Result<LogRecord, DecodeError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(DecodeError::Empty);
    }

    let value: Value = serde_json::from_str(line)?;
    let Some(object) = value.as_object() else {
        return Err(DecodeError::NotAnObject);
    };

    let kind = match object.get("type") {
        None => None,
        Some(Value::String(kind)) => Some(kind.clone()),
        Some(other) => return Err(DecodeError::UnknownType(other.to_string())),
    };

    match kind.as_deref() {
        None => Ok(LogRecord::Entry(serde_json::from_value(value)?)),
        Some("metadata") | Some("session_end") => {
            Ok(LogRecord::Metadata(serde_json::from_value(value)?))
        }
        Some(other) => Err(DecodeError::UnknownType(other.to_string())),
    }
}

/// A line that could not be decoded
#[derive(Debug)]
pub struct DecodeIssue {
    /// 1-based line number
    pub line: usize,
    /// Why the line was rejected
    pub error: DecodeError,
}

/// Decode every line of a reader, yielding records and skipped-line issues.
///
/// Blank lines are dropped silently. I/O errors end the sequence.
pub fn decode_lines<R: BufRead>(
    reader: R,
) -> impl Iterator<Item = io::Result<Result<LogRecord, DecodeIssue>>> {
    reader
        .split(b'\n')
        .enumerate()
        .filter_map(|(idx, raw)| {
            let line = idx + 1;
            let raw = match raw {
                Ok(raw) => raw,
                Err(e) => return Some(Err(e)),
            };
            let Ok(text) = std::str::from_utf8(&raw) else {
                return Some(Ok(Err(DecodeIssue {
                    line,
                    error: DecodeError::InvalidUtf8,
                })));
            };
            match decode(text) {
                Ok(record) => Some(Ok(Ok(record))),
                Err(DecodeError::Empty) => None,
                Err(error) => Some(Ok(Err(DecodeIssue { line, error }))),
            }
        })
}

/// A fully loaded session log
#[derive(Debug, Default)]
pub struct SessionLog {
    /// Source file, if loaded from disk
    pub path: Option<PathBuf>,
    /// Data entries in file order
    pub entries: Vec<LogEntry>,
    /// Boundary markers in file order
    pub metadata: Vec<MetadataRecord>,
    /// Lines that were skipped
    pub issues: Vec<DecodeIssue>,
}

impl SessionLog {
    /// Load a log file, skipping malformed lines with a warning
    pub fn load(path: &Path) -> Result<Self, ReplayError> {
        let file = File::open(path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                ReplayError::LogNotFound(path.to_path_buf())
            } else {
                ReplayError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        let mut log = Self::from_reader(BufReader::new(file)).map_err(|source| ReplayError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log.path = Some(path.to_path_buf());

        info!(
            "Loaded {} entries from {} ({} skipped)",
            log.entries.len(),
            path.display(),
            log.issues.len()
        );
        Ok(log)
    }

    /// Decode a log from any buffered reader
    pub fn from_reader<R: BufRead>(reader: R) -> io::Result<Self> {
        let mut log = SessionLog::default();
        for item in decode_lines(reader) {
            match item? {
                Ok(LogRecord::Entry(entry)) => log.entries.push(entry),
                Ok(LogRecord::Metadata(meta)) => log.metadata.push(meta),
                Err(issue) => {
                    warn!("Skipping line {}: {}", issue.line, issue.error);
                    log.issues.push(issue);
                }
            }
        }
        Ok(log)
    }

    /// Decode a log held in memory
    pub fn parse(content: &str) -> Self {
        // Reading from a byte slice cannot fail
        Self::from_reader(content.as_bytes()).unwrap_or_default()
    }

    /// Number of data entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log holds no data entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The session start record, if present
    pub fn session_start(&self) -> Option<&SessionStart> {
        self.metadata.iter().find_map(|m| match m {
            MetadataRecord::SessionStart(start) => Some(start),
            MetadataRecord::SessionEnd(_) => None,
        })
    }

    /// The session end record, absent when the recorder did not shut down cleanly
    pub fn session_end(&self) -> Option<&SessionEnd> {
        self.metadata.iter().rev().find_map(|m| match m {
            MetadataRecord::SessionEnd(end) => Some(end),
            MetadataRecord::SessionStart(_) => None,
        })
    }

    /// Whether the session was closed with an end record
    pub fn is_terminated(&self) -> bool {
        self.session_end().is_some()
    }

    /// Recorded span between the first and last entry, in seconds
    pub fn span_seconds(&self) -> f64 {
        match (self.entries.first(), self.entries.last()) {
            (Some(first), Some(last)) => (last.server_timestamp - first.server_timestamp).max(0.0),
            _ => 0.0,
        }
    }
}

/// Load a log file (convenience wrapper around [`SessionLog::load`])
pub fn read_log(path: &Path) -> Result<SessionLog, ReplayError> {
    SessionLog::load(path)
}

/// File name for a session opened at `opened`; `attempt > 0` disambiguates collisions
pub(crate) fn session_file_name(prefix: &str, opened: DateTime<Local>, attempt: u32) -> String {
    let stamp = opened.format("%Y%m%d_%H%M%S_%3f");
    if attempt == 0 {
        format!("{prefix}_{stamp}.{LOG_EXTENSION}")
    } else {
        format!("{prefix}_{stamp}_{attempt:02}.{LOG_EXTENSION}")
    }
}

/// Create a new session file without ever truncating an existing one
pub(crate) fn create_session_file(
    dir: &Path,
    prefix: &str,
    opened: DateTime<Local>,
) -> io::Result<(PathBuf, File)> {
    std::fs::create_dir_all(dir)?;

    for attempt in 0..MAX_NAME_ATTEMPTS {
        let path = dir.join(session_file_name(prefix, opened, attempt));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free session file name in {}", dir.display()),
    ))
}

/// Summary of a session log on disk
#[derive(Debug, Clone)]
pub struct SessionFileInfo {
    /// Full path
    pub path: PathBuf,
    /// File size in bytes
    pub size_bytes: u64,
    /// Number of decodable data entries
    pub message_count: usize,
    /// Last modification time
    pub modified: DateTime<Local>,
}

impl SessionFileInfo {
    /// File name without the directory
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// File size in kilobytes
    pub fn size_kb(&self) -> f64 {
        self.size_bytes as f64 / 1024.0
    }
}

fn is_session_file(path: &Path, prefix: &str) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.starts_with(&format!("{prefix}_")) && name.ends_with(&format!(".{LOG_EXTENSION}"))
}

fn session_paths(dir: &Path, prefix: &str) -> io::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_session_file(&path, prefix) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// List session logs in a directory, oldest first
pub fn list_sessions(dir: &Path, prefix: &str) -> io::Result<Vec<SessionFileInfo>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut sessions = Vec::new();
    for path in session_paths(dir, prefix)? {
        let meta = std::fs::metadata(&path)?;
        let modified = meta
            .modified()
            .map(DateTime::<Local>::from)
            .unwrap_or_else(|_| Local::now());
        let message_count = match File::open(&path) {
            Ok(file) => decode_lines(BufReader::new(file))
                .filter(|item| matches!(item, Ok(Ok(LogRecord::Entry(_)))))
                .count(),
            Err(e) => {
                warn!("Could not read {}: {}", path.display(), e);
                0
            }
        };
        sessions.push(SessionFileInfo {
            path,
            size_bytes: meta.len(),
            message_count,
            modified,
        });
    }
    Ok(sessions)
}

/// Most recently created session log in a directory
pub fn latest_session(dir: &Path, prefix: &str) -> Result<PathBuf, ConfigError> {
    if !dir.exists() {
        return Err(ConfigError::NoLogsFound(dir.to_path_buf()));
    }
    session_paths(dir, prefix)?
        .pop()
        .ok_or_else(|| ConfigError::NoLogsFound(dir.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_decode_entry() {
        let line = r#"{"server_timestamp": 1700000000.25, "message_index": 3, "data": {"leftHand": null}}"#;
        match decode(line).unwrap() {
            LogRecord::Entry(entry) => {
                assert_eq!(entry.message_index, 3);
                assert_eq!(entry.server_timestamp, 1700000000.25);
                assert_eq!(entry.data, json!({"leftHand": null}));
            }
            other => panic!("Expected entry, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_metadata() {
        let start = r#"{"type": "metadata", "timestamp": 1.5, "datetime": "2025-01-01T00:00:00", "version": "1.0"}"#;
        assert!(matches!(
            decode(start).unwrap(),
            LogRecord::Metadata(MetadataRecord::SessionStart(SessionStart { ref version, .. })) if version == "1.0"
        ));

        let end = r#"{"type": "session_end", "timestamp": 9.0, "datetime": "x", "total_messages": 4, "duration": 7.5}"#;
        match decode(end).unwrap() {
            LogRecord::Metadata(MetadataRecord::SessionEnd(end)) => {
                assert_eq!(end.total_messages, 4);
                assert_eq!(end.duration, 7.5);
            }
            other => panic!("Expected session end, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(matches!(decode("   "), Err(DecodeError::Empty)));
        assert!(matches!(decode("{not json"), Err(DecodeError::Json(_))));
        assert!(matches!(decode("[1, 2]"), Err(DecodeError::NotAnObject)));
        assert!(matches!(
            decode(r#"{"type": "heartbeat"}"#),
            Err(DecodeError::UnknownType(ref t)) if t == "heartbeat"
        ));
        // entry without payload
        assert!(matches!(
            decode(r#"{"server_timestamp": 1.0, "message_index": 0}"#),
            Err(DecodeError::Json(_))
        ));
    }

    #[test]
    fn test_encode_is_single_line() {
        let entry = LogEntry::new(0, 1.0, json!({"note": "line one\nline two"}));
        let line = encode(&entry.clone().into()).unwrap();
        assert!(!line.contains('\n'));
        assert_eq!(decode(&line).unwrap(), LogRecord::Entry(entry));
    }

    #[test]
    fn test_metadata_tag_comes_first() {
        let meta = MetadataRecord::SessionStart(SessionStart {
            timestamp: 1.0,
            datetime: "now".to_string(),
            version: "1.0".to_string(),
        });
        let line = encode(&meta.into()).unwrap();
        assert!(line.starts_with(r#"{"type":"metadata""#), "{line}");
    }

    #[test]
    fn test_payload_key_order_preserved() {
        let line = r#"{"server_timestamp":1.0,"message_index":0,"data":{"z":1,"a":2,"m":{"y":0,"b":1}}}"#;
        let record = decode(line).unwrap();
        assert_eq!(encode(&record).unwrap(), line);
    }

    #[test]
    fn test_parse_skips_bad_lines() {
        let content = concat!(
            r#"{"type":"metadata","timestamp":1.0,"datetime":"d","version":"1.0"}"#, "\n",
            r#"{"server_timestamp":1.0,"message_index":0,"data":{"a":1}}"#, "\n",
            "garbage\n",
            "\n",
            r#"{"server_timestamp":1.5,"message_index":1,"data":{"a":2}}"#, "\n",
            r#"{"server_timestamp":2.0,"message_ind"#,
        );
        let log = SessionLog::parse(content);
        assert_eq!(log.len(), 2);
        assert_eq!(log.metadata.len(), 1);
        assert_eq!(log.issues.len(), 2);
        assert_eq!(log.issues[0].line, 3);
        assert_eq!(log.issues[1].line, 6);
        assert!(!log.is_terminated());
        assert_eq!(log.span_seconds(), 0.5);
    }

    #[test]
    fn test_invalid_utf8_line_is_skipped() {
        let mut bytes = br#"{"server_timestamp":1.0,"message_index":0,"data":{}}"#.to_vec();
        bytes.extend_from_slice(b"\n\xff\xfe\n");
        let log = SessionLog::from_reader(&bytes[..]).unwrap();
        assert_eq!(log.len(), 1);
        assert!(matches!(log.issues[0].error, DecodeError::InvalidUtf8));
    }

    #[test]
    fn test_session_file_names_sort_by_creation() {
        let opened = Local.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap();
        let first = session_file_name("hand_tracking", opened, 0);
        let second = session_file_name("hand_tracking", opened, 1);
        assert_eq!(first, "hand_tracking_20250304_050607_000.json");
        assert_eq!(second, "hand_tracking_20250304_050607_000_01.json");
        assert!(first < second);
    }

    #[test]
    fn test_create_session_file_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let opened = Local::now();
        let (a, _) = create_session_file(dir.path(), "s", opened).unwrap();
        let (b, _) = create_session_file(dir.path(), "s", opened).unwrap();
        assert_ne!(a, b);
        assert_eq!(latest_session(dir.path(), "s").unwrap(), b);
    }

    #[test]
    fn test_latest_session_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            latest_session(dir.path(), "hand_tracking"),
            Err(ConfigError::NoLogsFound(_))
        ));
        assert!(list_sessions(&dir.path().join("missing"), "hand_tracking")
            .unwrap()
            .is_empty());
    }
}
