//! `tracklog replay`

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracklog_core::config::{AppConfig, ConfigError, ReplayConfig};
use tracklog_core::datalog::{latest_session, ReplayEngine, ReplayOptions};
use tracklog_core::dispatch::HttpSink;

use super::ctrl_c_token;
use crate::args::ReplayArgs;

/// Replay settings after applying flags over the config file
#[derive(Debug)]
struct ReplayPlan {
    log_file: PathBuf,
    config: ReplayConfig,
}

fn resolve(args: &ReplayArgs) -> Result<ReplayPlan> {
    let app = AppConfig::load_or_default(args.config.as_deref()).context("Failed to load config")?;
    let mut config = app.replay;
    if let Some(server) = &args.server {
        config.server = server.clone();
    }
    if let Some(speed) = args.speed {
        config.speed = speed;
    }
    if args.loop_playback {
        config.loop_playback = true;
    }
    config.validate()?;

    let recorder = app.server.recorder;
    let log_dir = args.log_dir.clone().unwrap_or(recorder.log_dir);
    let log_file = match (&args.log_file, args.latest) {
        (Some(path), _) => path.clone(),
        (None, true) => {
            let path = latest_session(&log_dir, &recorder.file_prefix)?;
            info!("Using latest log file: {}", path.display());
            path
        }
        (None, false) => return Err(ConfigError::NoLogSelected.into()),
    };
    if !log_file.exists() {
        anyhow::bail!("Log file not found: {}", log_file.display());
    }

    Ok(ReplayPlan { log_file, config })
}

pub async fn execute(args: ReplayArgs) -> Result<()> {
    let plan = resolve(&args)?;
    let config = &plan.config;

    let sink = HttpSink::new(&config.server)
        .context("Failed to create HTTP client")?
        .with_timeouts(config.dispatch_timeout(), config.health_timeout());

    if let Err(e) = sink.check_health().await {
        error!("Cannot connect to server at {}: {}", config.server, e);
        anyhow::bail!("Server at {} is not reachable", config.server);
    }

    let cancel = ctrl_c_token();
    let engine = ReplayEngine::new(sink, ReplayOptions::from(config));
    let report = engine
        .replay_file(&plan.log_file, &cancel)
        .await
        .with_context(|| format!("Replay of {} failed", plan.log_file.display()))?;

    info!(
        "Replay finished: {} sent, {} failed, {} lines skipped, {} passes in {:.2}s",
        report.dispatched,
        report.failed,
        report.skipped_lines,
        report.iterations,
        report.elapsed.as_secs_f64()
    );
    Ok(())
}
