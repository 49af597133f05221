//! `tracklog list`

use anyhow::{Context, Result};
use tracklog_core::config::AppConfig;
use tracklog_core::datalog::{list_sessions, SessionFileInfo};

use crate::args::ListArgs;

fn format_line(position: usize, info: &SessionFileInfo) -> String {
    format!(
        "{:3}. {} - {:.1} KB, {} messages, {}",
        position,
        info.file_name(),
        info.size_kb(),
        info.message_count,
        info.modified.format("%Y-%m-%d %H:%M:%S")
    )
}

pub fn execute(args: ListArgs) -> Result<()> {
    let recorder = AppConfig::load_or_default(args.config.as_deref())
        .context("Failed to load config")?
        .server
        .recorder;
    let log_dir = args.log_dir.unwrap_or(recorder.log_dir);

    let sessions = list_sessions(&log_dir, &recorder.file_prefix)
        .with_context(|| format!("Failed to read {}", log_dir.display()))?;

    if sessions.is_empty() {
        println!("No log files found in {}", log_dir.display());
        return Ok(());
    }

    println!("Available log files in {}:", log_dir.display());
    for (i, info) in sessions.iter().enumerate() {
        println!("{}", format_line(i + 1, info));
    }
    Ok(())
}
