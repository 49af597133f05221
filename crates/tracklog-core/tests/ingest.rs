//! End-to-end tests: record over HTTP, replay through the HTTP sink

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;
    use tracklog_core::config::RecorderConfig;
    use tracklog_core::datalog::{ReplayEngine, ReplayOptions, SessionLog, SessionRecorder};
    use tracklog_core::dispatch::{DispatchError, DispatchSink, HttpSink};
    use tracklog_core::ingest::serve_http;

    fn start_server(
        recorder: Arc<SessionRecorder>,
    ) -> (SocketAddr, CancellationToken, tokio::task::JoinHandle<()>) {
        let shutdown = CancellationToken::new();
        let (addr, server) = serve_http(
            "127.0.0.1:0".parse().unwrap(),
            recorder,
            shutdown.clone(),
        )
        .unwrap();
        (addr, shutdown, tokio::spawn(server))
    }

    #[tokio::test]
    async fn test_replay_into_live_server() {
        let source_dir = tempfile::tempdir().unwrap();
        let source = SessionRecorder::new(RecorderConfig::with_log_dir(source_dir.path()));
        let payloads: Vec<_> = (0..5)
            .map(|n| json!({"leftHand": {"joints": [[n, 0.5, -0.3]]}, "seq": n}))
            .collect();
        for p in &payloads {
            source.record(p.clone()).unwrap();
        }
        let recorded = source.shutdown().unwrap().unwrap();

        let target_dir = tempfile::tempdir().unwrap();
        let target = Arc::new(SessionRecorder::new(RecorderConfig::with_log_dir(
            target_dir.path(),
        )));
        let (addr, shutdown, server) = start_server(Arc::clone(&target));

        let sink = HttpSink::new(format!("http://{addr}/")).unwrap();
        let health = sink.check_health().await.unwrap();
        assert_eq!(health["status"], "ok");

        let engine = ReplayEngine::new(sink, ReplayOptions::default().with_speed(100.0));
        let report = engine
            .replay_file(&recorded.path, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.dispatched, 5);
        assert_eq!(report.failed, 0);

        let replayed = target.shutdown().unwrap().unwrap();
        let log = SessionLog::load(&replayed.path).unwrap();
        let data: Vec<_> = log.entries.iter().map(|e| e.data.clone()).collect();
        assert_eq!(data, payloads);

        shutdown.cancel();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_payload_surfaces_status() {
        let dir = tempfile::tempdir().unwrap();
        let target = Arc::new(SessionRecorder::new(RecorderConfig::with_log_dir(dir.path())));
        let (addr, shutdown, server) = start_server(Arc::clone(&target));

        let sink = HttpSink::new(format!("http://{addr}")).unwrap();
        match sink.dispatch(&json!({})).await {
            Err(DispatchError::Rejected { status, body }) => {
                assert_eq!(status, 400);
                assert!(body.contains("No JSON data provided"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        let receipt = sink.dispatch(&json!({"ok": true})).await.unwrap();
        assert_eq!(receipt.status, Some(200));
        assert_eq!(target.status().message_count, 1);

        shutdown.cancel();
        server.await.unwrap();
    }
}
