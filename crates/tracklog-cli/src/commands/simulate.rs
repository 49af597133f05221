//! `tracklog simulate`
//!
//! Posts synthetic frames at a fixed rate. Ticks are anchored to the start
//! time, so a slow request delays one frame without shifting the rest.
//! With `--clients N` several simulators share one sink, which drives the
//! recorder from many concurrent requests.

use std::ops::AddAssign;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracklog_core::demo::MotionSimulator;
use tracklog_core::dispatch::{DispatchSink, HttpSink};

use super::ctrl_c_token;
use crate::args::SimulateArgs;

/// Delay between starting successive clients
const CLIENT_STAGGER: Duration = Duration::from_millis(100);

/// Frames sent by one client or by all of them
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Totals {
    sent: u64,
    failed: u64,
}

impl AddAssign for Totals {
    fn add_assign(&mut self, other: Self) {
        self.sent += other.sent;
        self.failed += other.failed;
    }
}

fn frame_interval(rate: f64) -> Result<Duration> {
    if !(rate.is_finite() && rate > 0.0) {
        anyhow::bail!("Invalid rate {rate}: must be a positive number of frames per second");
    }
    Ok(Duration::from_secs_f64(1.0 / rate))
}

fn frame_limit(rate: f64, duration: Option<f64>) -> Option<u64> {
    duration.map(|secs| (secs.max(0.0) * rate).round() as u64)
}

/// Send frames from one simulator until `limit` or cancellation
async fn run_client<S: DispatchSink>(
    client: u32,
    sink: Arc<S>,
    mut simulator: MotionSimulator,
    interval: Duration,
    limit: Option<u64>,
    cancel: CancellationToken,
) -> Totals {
    let started = Instant::now();
    let mut totals = Totals::default();
    let mut frame = 0u64;
    while limit.map_or(true, |limit| frame < limit) {
        let deadline = started + interval.mul_f64(frame as f64);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep_until(deadline) => {}
        }

        let timestamp = Local::now().timestamp_micros() as f64 / 1_000_000.0;
        let payload = simulator.next_frame(timestamp);
        match sink.dispatch(&payload).await {
            Ok(_) => totals.sent += 1,
            Err(e) => {
                totals.failed += 1;
                warn!("Client {}: failed to send frame {}: {}", client, frame, e);
            }
        }
        frame += 1;
    }
    info!(
        "Client {} finished: {} sent, {} failed",
        client, totals.sent, totals.failed
    );
    totals
}

/// Start `clients` simulators against one sink and add up their totals
async fn run_clients<S, F>(
    clients: u32,
    sink: Arc<S>,
    mut make_simulator: F,
    interval: Duration,
    limit: Option<u64>,
    cancel: &CancellationToken,
) -> Totals
where
    S: DispatchSink + 'static,
    F: FnMut(u32) -> MotionSimulator,
{
    let mut tasks = JoinSet::new();
    for client in 0..clients {
        if client > 0 {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(CLIENT_STAGGER) => {}
            }
        }
        tasks.spawn(run_client(
            client,
            Arc::clone(&sink),
            make_simulator(client),
            interval,
            limit,
            cancel.clone(),
        ));
    }

    let mut totals = Totals::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(client) => totals += client,
            Err(e) => warn!("Client task failed: {}", e),
        }
    }
    totals
}

pub async fn execute(args: SimulateArgs) -> Result<()> {
    let interval = frame_interval(args.rate)?;
    let limit = frame_limit(args.rate, args.duration);
    let sink = Arc::new(HttpSink::new(&args.server).context("Failed to create HTTP client")?);

    sink.check_health()
        .await
        .with_context(|| format!("Server at {} is not reachable", args.server))?;

    let cancel = ctrl_c_token();
    info!(
        "Sending {} frames at {} Hz to {} from {} client(s)",
        args.mode, args.rate, args.server, args.clients
    );

    let started = Instant::now();
    let mode = args.mode;
    let seed = args.seed;
    let totals = run_clients(
        args.clients,
        sink,
        |client| match seed {
            Some(seed) => MotionSimulator::with_seed(mode, seed.wrapping_add(u64::from(client))),
            None => MotionSimulator::new(mode),
        },
        interval,
        limit,
        &cancel,
    )
    .await;

    let elapsed = started.elapsed().as_secs_f64();
    info!(
        "Simulation finished: {} frames sent, {} failed in {:.1}s ({:.1} frames/s)",
        totals.sent,
        totals.failed,
        elapsed,
        if elapsed > 0.0 { totals.sent as f64 / elapsed } else { 0.0 }
    );
    Ok(())
}
