//! Tests for timed replay
//!
//! All timing tests run on tokio's paused clock, which jumps straight to the
//! next pending deadline, so the measured offsets are exact up to the timer's
//! millisecond resolution.

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;
    use tracklog_core::config::RecorderConfig;
    use tracklog_core::datalog::{
        replay, LogEntry, ReplayEngine, ReplayError, ReplayOptions, SessionLog, SessionRecorder,
    };
    use tracklog_core::dispatch::{DispatchError, DispatchReceipt, DispatchSink};

    const BASE: f64 = 1_700_000_000.0;

    /// Records what was dispatched and when, with optional misbehaviour
    #[derive(Default)]
    struct ScriptedSink {
        calls: Mutex<Vec<(Instant, Value)>>,
        /// Zero-based call numbers that fail
        fail_on: Vec<usize>,
        /// Artificial latency per call number
        delay_on: Vec<(usize, Duration)>,
        /// Cancel this token after the given number of calls
        cancel_after: Option<(usize, CancellationToken)>,
        count: AtomicUsize,
    }

    impl ScriptedSink {
        fn offsets(&self, start: Instant) -> Vec<f64> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(at, _)| at.duration_since(start).as_secs_f64())
                .collect()
        }

        fn payloads(&self) -> Vec<Value> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(_, v)| v.clone())
                .collect()
        }
    }

    #[async_trait]
    impl DispatchSink for ScriptedSink {
        async fn dispatch(&self, payload: &Value) -> Result<DispatchReceipt, DispatchError> {
            let call = self.count.fetch_add(1, Ordering::SeqCst);
            self.calls
                .lock()
                .unwrap()
                .push((Instant::now(), payload.clone()));

            if let Some((_, delay)) = self.delay_on.iter().find(|(n, _)| *n == call) {
                tokio::time::sleep(*delay).await;
            }
            if let Some((after, token)) = &self.cancel_after {
                if call + 1 == *after {
                    token.cancel();
                }
            }
            if self.fail_on.contains(&call) {
                return Err(DispatchError::Transport("connection refused".to_string()));
            }
            Ok(DispatchReceipt {
                latency: Duration::ZERO,
                status: Some(200),
            })
        }
    }

    fn log_at(offsets: &[f64]) -> SessionLog {
        SessionLog {
            entries: offsets
                .iter()
                .enumerate()
                .map(|(i, t)| LogEntry::new(i as u64, BASE + t, json!({ "n": i })))
                .collect(),
            ..Default::default()
        }
    }

    fn assert_offsets(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len(), "offsets {actual:?}");
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 0.003, "expected {expected:?}, got {actual:?}");
        }
    }

    async fn run(sink: ScriptedSink, options: ReplayOptions, log: &SessionLog) -> Vec<f64> {
        let engine = ReplayEngine::new(sink, options);
        let start = Instant::now();
        let report = engine.play(log, &CancellationToken::new()).await.unwrap();
        assert!(!report.cancelled);
        engine.sink().offsets(start)
    }

    #[tokio::test(start_paused = true)]
    async fn test_original_spacing_at_normal_speed() {
        let log = log_at(&[0.0, 0.1, 0.3]);
        let offsets = run(ScriptedSink::default(), ReplayOptions::default(), &log).await;
        assert_offsets(&offsets, &[0.0, 0.1, 0.3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_speed_scales_spacing() {
        let log = log_at(&[0.0, 0.1, 0.3]);

        let fast = run(
            ScriptedSink::default(),
            ReplayOptions::default().with_speed(2.0),
            &log,
        )
        .await;
        assert_offsets(&fast, &[0.0, 0.05, 0.15]);

        let slow = run(
            ScriptedSink::default(),
            ReplayOptions::default().with_speed(0.5),
            &log,
        )
        .await;
        assert_offsets(&slow, &[0.0, 0.2, 0.6]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_payloads_dispatched_in_file_order() {
        let log = log_at(&[0.0, 0.01, 0.02, 0.03]);
        let engine = ReplayEngine::new(ScriptedSink::default(), ReplayOptions::default());
        let report = engine.play(&log, &CancellationToken::new()).await.unwrap();

        assert_eq!(report.dispatched, 4);
        assert_eq!(report.iterations, 1);
        let expected: Vec<Value> = (0..4).map(|n| json!({ "n": n })).collect();
        assert_eq!(engine.sink().payloads(), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_lines_do_not_shift_schedule() {
        let clean = format!(
            "{}\n{}\n{}\n",
            json!({"server_timestamp": BASE, "message_index": 0, "data": {"id": "A"}}),
            json!({"server_timestamp": BASE + 0.1, "message_index": 1, "data": {"id": "B"}}),
            json!({"server_timestamp": BASE + 0.3, "message_index": 2, "data": {"id": "C"}}),
        );
        let mut lines: Vec<&str> = clean.lines().collect();
        lines.insert(1, "{not json at all");
        lines.insert(3, "");
        lines.insert(4, r#"{"server_timestamp": 5"#);
        let dirty = lines.join("\n");

        let clean_log = SessionLog::parse(&clean);
        let dirty_log = SessionLog::parse(&dirty);
        assert_eq!(dirty_log.len(), 3);
        assert_eq!(dirty_log.issues.len(), 2);

        let a = run(ScriptedSink::default(), ReplayOptions::default(), &clean_log).await;
        let b = run(ScriptedSink::default(), ReplayOptions::default(), &dirty_log).await;
        assert_offsets(&a, &[0.0, 0.1, 0.3]);
        assert_offsets(&b, &a);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_dispatch_keeps_schedule() {
        let log = log_at(&[0.0, 0.1, 0.3]);
        let sink = ScriptedSink {
            fail_on: vec![1],
            ..Default::default()
        };
        let engine = ReplayEngine::new(sink, ReplayOptions::default());
        let start = Instant::now();
        let report = engine.play(&log, &CancellationToken::new()).await.unwrap();

        assert_eq!(report.dispatched, 2);
        assert_eq!(report.failed, 1);
        assert_offsets(&engine.sink().offsets(start), &[0.0, 0.1, 0.3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_dispatch_does_not_accumulate_drift() {
        let log = log_at(&[0.0, 0.1, 0.3, 0.4]);
        let sink = ScriptedSink {
            delay_on: vec![(0, Duration::from_millis(150))],
            ..Default::default()
        };
        let offsets = run(sink, ReplayOptions::default(), &log).await;
        // The second message is late, the rest are back on schedule
        assert_offsets(&offsets, &[0.0, 0.15, 0.3, 0.4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_earlier_timestamps_go_out_immediately() {
        let log = log_at(&[0.0, -0.5, 0.2]);
        let offsets = run(ScriptedSink::default(), ReplayOptions::default(), &log).await;
        assert_offsets(&offsets, &[0.0, 0.0, 0.2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backward_step_mid_log_is_counted() {
        let engine = ReplayEngine::new(ScriptedSink::default(), ReplayOptions::default());
        let start = Instant::now();
        let report = engine
            .play(&log_at(&[0.0, 5.0, 3.0, 6.0]), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.out_of_order, 1);
        assert_eq!(report.dispatched, 4);
        // The late entry goes out right after its predecessor
        assert_offsets(&engine.sink().offsets(start), &[0.0, 5.0, 5.0, 6.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ordered_log_has_no_backward_steps() {
        let engine = ReplayEngine::new(ScriptedSink::default(), ReplayOptions::default());
        let report = engine
            .play(&log_at(&[0.0, 0.1, 0.1, 0.3]), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.out_of_order, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_stops_exactly_at_cancellation() {
        let cancel = CancellationToken::new();
        let sink = ScriptedSink {
            cancel_after: Some((3, cancel.clone())),
            ..Default::default()
        };
        let engine = ReplayEngine::new(
            sink,
            ReplayOptions::default()
                .with_loop(true)
                .with_loop_pause(Duration::from_secs(2)),
        );
        let start = Instant::now();
        let report = engine.play(&log_at(&[0.0, 0.5]), &cancel).await.unwrap();

        assert!(report.cancelled);
        assert_eq!(report.attempted(), 3);
        assert_eq!(report.iterations, 1);
        assert_offsets(&engine.sink().offsets(start), &[0.0, 0.5, 2.5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_cancelled_after_first_pass_sends_whole_pass() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let engine = ReplayEngine::new(
            ScriptedSink::default(),
            ReplayOptions::default().with_loop(true),
        )
        .with_progress(move |p| {
            if p.iteration == 1 && p.index + 1 == p.total {
                trigger.cancel();
            }
        });

        let report = engine.play(&log_at(&[0.0, 0.1, 0.3]), &cancel).await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.iterations, 1);
        assert_eq!(report.dispatched, 3);
        assert_eq!(engine.sink().payloads().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_wait() {
        let cancel = CancellationToken::new();
        let engine = ReplayEngine::new(ScriptedSink::default(), ReplayOptions::default());
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let report = engine.play(&log_at(&[0.0, 10.0]), &cancel).await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.dispatched, 1);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_observer() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let engine = ReplayEngine::new(ScriptedSink::default(), ReplayOptions::default())
            .with_progress(move |p| sink_seen.lock().unwrap().push(p.index));

        let offsets: Vec<f64> = (0..25).map(|i| i as f64 * 0.01).collect();
        engine
            .play(&log_at(&offsets), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![0, 9, 19, 24]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_recorded_file() {
        let dir = tempfile::tempdir().unwrap();
        let rec = SessionRecorder::new(RecorderConfig::with_log_dir(dir.path()));
        for n in 0..3 {
            rec.record(json!({ "n": n })).unwrap();
        }
        let closed = rec.shutdown().unwrap().unwrap();

        let sink = Arc::new(ScriptedSink::default());
        let report = replay(
            &closed.path,
            50.0,
            false,
            Arc::clone(&sink),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(report.dispatched, 3);
        assert_eq!(report.skipped_lines, 0);
        assert_eq!(sink.payloads()[2], json!({"n": 2}));
    }

    #[tokio::test]
    async fn test_missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let result = replay(
            dir.path().join("missing.json"),
            1.0,
            false,
            ScriptedSink::default(),
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(ReplayError::LogNotFound(_))));
    }
}
