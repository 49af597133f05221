//! Log playback
//!
//! Replays a recorded session against a dispatch sink, reproducing the
//! original inter-message timing scaled by a speed multiplier.
//!
//! Every deadline is derived from a fixed per-pass anchor (pass start time,
//! first entry timestamp). Sleeps never chain, so scheduling overhead and
//! slow dispatches cannot accumulate into drift: a late message is followed
//! by messages that go out as soon as their own deadlines allow.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{LogEntry, MetadataRecord, ReplayError, SessionLog};
use crate::config::{validate_speed, ConfigError, ReplayConfig};
use crate::dispatch::DispatchSink;

/// Offsets beyond this are treated as corrupt and capped (about 31 years)
const MAX_SCHEDULE_OFFSET_SECS: f64 = 1.0e9;

/// Replay behaviour
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayOptions {
    /// Playback speed multiplier (2.0 = twice as fast)
    pub speed: f64,
    /// Restart from the beginning after each pass until cancelled
    pub loop_playback: bool,
    /// Pause between loop iterations
    pub loop_pause: Duration,
    /// Report progress every N messages
    pub progress_interval: usize,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            speed: 1.0,
            loop_playback: false,
            loop_pause: Duration::from_secs(2),
            progress_interval: 10,
        }
    }
}

impl ReplayOptions {
    /// Set the speed multiplier
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    /// Enable or disable looping
    pub fn with_loop(mut self, loop_playback: bool) -> Self {
        self.loop_playback = loop_playback;
        self
    }

    /// Set the pause between loop iterations
    pub fn with_loop_pause(mut self, pause: Duration) -> Self {
        self.loop_pause = pause;
        self
    }

    /// Check the options before a run
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_speed(self.speed)?;
        if self.progress_interval == 0 {
            return Err(ConfigError::InvalidValue {
                field: "progress_interval".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl From<&ReplayConfig> for ReplayOptions {
    fn from(config: &ReplayConfig) -> Self {
        Self {
            speed: config.speed,
            loop_playback: config.loop_playback,
            loop_pause: config.loop_pause(),
            progress_interval: config.progress_interval,
        }
    }
}

/// Progress notification, purely observational
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplayProgress {
    /// Loop iteration, starting at 1
    pub iteration: u64,
    /// Index of the entry just dispatched
    pub index: usize,
    /// Entries per pass
    pub total: usize,
    /// Fraction of the pass completed (0.0 to 1.0)
    pub fraction: f64,
}

/// Summary of a replay run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayReport {
    /// Passes completed in full
    pub iterations: u64,
    /// Entries delivered successfully
    pub dispatched: u64,
    /// Entries whose dispatch failed
    pub failed: u64,
    /// Malformed lines skipped while loading
    pub skipped_lines: usize,
    /// Entries timestamped before their predecessor, summed over passes
    pub out_of_order: u64,
    /// Whether the run ended by cancellation
    pub cancelled: bool,
    /// Wall-clock duration of the run
    pub elapsed: Duration,
}

impl ReplayReport {
    /// Total dispatch attempts
    pub fn attempted(&self) -> u64 {
        self.dispatched + self.failed
    }
}

type ProgressObserver = Arc<dyn Fn(&ReplayProgress) + Send + Sync>;

/// Timing anchor for one pass
#[derive(Debug, Clone, Copy)]
struct Anchor {
    started: Instant,
    first_timestamp: f64,
    speed: f64,
}

impl Anchor {
    /// Scaled offset of `timestamp` from the first entry, clamped to `>= 0`
    fn offset(&self, timestamp: f64) -> Duration {
        let scaled = (timestamp - self.first_timestamp) / self.speed;
        if scaled.is_finite() && scaled > 0.0 {
            Duration::from_secs_f64(scaled.min(MAX_SCHEDULE_OFFSET_SECS))
        } else {
            Duration::ZERO
        }
    }

    fn deadline(&self, timestamp: f64) -> Instant {
        self.started + self.offset(timestamp)
    }
}

enum PassOutcome {
    Completed,
    Cancelled,
}

/// Wait until `deadline`; returns `false` if cancelled first
async fn wait_until(deadline: Instant, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep_until(deadline) => true,
    }
}

/// Drift-corrected replay of session logs
pub struct ReplayEngine<S> {
    sink: S,
    options: ReplayOptions,
    observer: Option<ProgressObserver>,
}

impl<S: DispatchSink> ReplayEngine<S> {
    /// Create an engine dispatching to `sink`
    pub fn new(sink: S, options: ReplayOptions) -> Self {
        Self {
            sink,
            options,
            observer: None,
        }
    }

    /// Receive progress notifications
    pub fn with_progress<F>(mut self, observer: F) -> Self
    where
        F: Fn(&ReplayProgress) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Get the sink
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Get the replay options
    pub fn options(&self) -> &ReplayOptions {
        &self.options
    }

    /// Load a log file and replay it
    pub async fn replay_file(
        &self,
        path: impl AsRef<Path>,
        cancel: &CancellationToken,
    ) -> Result<ReplayReport, ReplayError> {
        self.options.validate()?;
        let log = SessionLog::load(path.as_ref())?;
        self.play(&log, cancel).await
    }

    /// Replay an already loaded log
    pub async fn play(
        &self,
        log: &SessionLog,
        cancel: &CancellationToken,
    ) -> Result<ReplayReport, ReplayError> {
        self.options.validate()?;
        let run_started = Instant::now();
        let mut report = ReplayReport {
            skipped_lines: log.issues.len(),
            ..Default::default()
        };

        describe_metadata(log);
        if log.is_empty() {
            warn!("No data entries found in log file");
            return Ok(report);
        }
        if log
            .entries
            .windows(2)
            .any(|pair| pair[1].message_index <= pair[0].message_index)
        {
            warn!("Message indices are not strictly increasing; replaying in file order");
        }

        info!(
            "Replaying {} messages at {}x speed",
            log.len(),
            self.options.speed
        );

        let mut iteration = 0u64;
        loop {
            iteration += 1;
            if self.options.loop_playback {
                info!("Starting replay iteration {}...", iteration);
            } else {
                info!("Starting replay...");
            }

            match self.play_pass(&log.entries, iteration, cancel, &mut report).await {
                PassOutcome::Completed => report.iterations += 1,
                PassOutcome::Cancelled => {
                    report.cancelled = true;
                    break;
                }
            }

            if !self.options.loop_playback {
                break;
            }

            info!(
                "Waiting {:.1} seconds before next iteration...",
                self.options.loop_pause.as_secs_f64()
            );
            if !wait_until(Instant::now() + self.options.loop_pause, cancel).await {
                report.cancelled = true;
                break;
            }
        }

        if report.cancelled {
            info!("Replay cancelled after {} full passes", report.iterations);
        }
        report.elapsed = run_started.elapsed();
        Ok(report)
    }

    async fn play_pass(
        &self,
        entries: &[LogEntry],
        iteration: u64,
        cancel: &CancellationToken,
        report: &mut ReplayReport,
    ) -> PassOutcome {
        let Some(first) = entries.first() else {
            return PassOutcome::Completed;
        };
        let anchor = Anchor {
            started: Instant::now(),
            first_timestamp: first.server_timestamp,
            speed: self.options.speed,
        };
        let total = entries.len();
        let mut warned_out_of_order = false;
        let mut previous_timestamp = first.server_timestamp;

        for (index, entry) in entries.iter().enumerate() {
            if cancel.is_cancelled() {
                return PassOutcome::Cancelled;
            }

            if entry.server_timestamp < previous_timestamp {
                report.out_of_order += 1;
                if !warned_out_of_order {
                    warn!(
                        "Entry {} is timestamped before its predecessor; its deadline has already passed",
                        entry.message_index
                    );
                    warned_out_of_order = true;
                }
            }
            previous_timestamp = entry.server_timestamp;

            if !wait_until(anchor.deadline(entry.server_timestamp), cancel).await {
                return PassOutcome::Cancelled;
            }

            match self.sink.dispatch(&entry.data).await {
                Ok(receipt) => {
                    report.dispatched += 1;
                    debug!(
                        "Dispatched message {} in {:?}",
                        entry.message_index, receipt.latency
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    warn!("Failed to send message {}: {}", index + 1, e);
                }
            }

            if index == 0 || (index + 1) % self.options.progress_interval == 0 || index + 1 == total {
                let progress = ReplayProgress {
                    iteration,
                    index,
                    total,
                    fraction: (index + 1) as f64 / total as f64,
                };
                info!(
                    "Progress: {}/{} ({:.1}%)",
                    index + 1,
                    total,
                    progress.fraction * 100.0
                );
                if let Some(observer) = &self.observer {
                    observer(&progress);
                }
            }
        }

        info!(
            "Replay completed in {:.2}s",
            anchor.started.elapsed().as_secs_f64()
        );
        PassOutcome::Completed
    }
}

fn describe_metadata(log: &SessionLog) {
    for meta in &log.metadata {
        match meta {
            MetadataRecord::SessionStart(start) => {
                info!("Log session started at: {}", start.datetime);
            }
            MetadataRecord::SessionEnd(end) => {
                info!(
                    "Log session ended with {} messages, duration: {:.2}s",
                    end.total_messages, end.duration
                );
            }
        }
    }
    if !log.is_terminated() {
        info!("Log has no session end record; recorder did not shut down cleanly");
    }
}

/// Replay a log file against `sink`
pub async fn replay<S: DispatchSink>(
    log_path: impl AsRef<Path>,
    speed: f64,
    loop_playback: bool,
    sink: S,
    cancel: &CancellationToken,
) -> Result<ReplayReport, ReplayError> {
    let options = ReplayOptions::default()
        .with_speed(speed)
        .with_loop(loop_playback);
    ReplayEngine::new(sink, options)
        .replay_file(log_path, cancel)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{DispatchError, DispatchReceipt};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TimingSink {
        times: Mutex<Vec<Instant>>,
    }

    #[async_trait]
    impl DispatchSink for TimingSink {
        async fn dispatch(&self, _payload: &Value) -> Result<DispatchReceipt, DispatchError> {
            self.times.lock().unwrap().push(Instant::now());
            Ok(DispatchReceipt {
                latency: Duration::ZERO,
                status: None,
            })
        }
    }

    fn log_at(offsets: &[f64]) -> SessionLog {
        SessionLog {
            entries: offsets
                .iter()
                .enumerate()
                .map(|(i, t)| LogEntry::new(i as u64, 1_700_000_000.0 + t, json!({ "i": i })))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_anchor_clamps_negative_offsets() {
        let anchor = Anchor {
            started: Instant::now(),
            first_timestamp: 10.0,
            speed: 2.0,
        };
        assert_eq!(anchor.offset(9.0), Duration::ZERO);
        assert_eq!(anchor.offset(12.0), Duration::from_secs(1));
        assert_eq!(anchor.offset(f64::MAX), Duration::from_secs_f64(MAX_SCHEDULE_OFFSET_SECS));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_dispatch_is_immediate() {
        let engine = ReplayEngine::new(TimingSink::default(), ReplayOptions::default());
        let start = Instant::now();
        engine
            .play(&log_at(&[0.0, 1.0]), &CancellationToken::new())
            .await
            .unwrap();
        let times = engine.sink().times.lock().unwrap();
        assert_eq!(times[0], start);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_log_is_noop() {
        let engine = ReplayEngine::new(TimingSink::default(), ReplayOptions::default());
        let report = engine
            .play(&SessionLog::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.iterations, 0);
        assert_eq!(report.attempted(), 0);
        assert!(!report.cancelled);
    }

    #[tokio::test]
    async fn test_invalid_speed_rejected() {
        let engine = ReplayEngine::new(
            TimingSink::default(),
            ReplayOptions::default().with_speed(0.0),
        );
        let result = engine
            .play(&log_at(&[0.0]), &CancellationToken::new())
            .await;
        assert!(matches!(
            result,
            Err(ReplayError::Config(ConfigError::InvalidSpeed(_)))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_start_dispatches_nothing() {
        let engine = ReplayEngine::new(TimingSink::default(), ReplayOptions::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = engine.play(&log_at(&[0.0, 0.1]), &cancel).await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.attempted(), 0);
    }
}
