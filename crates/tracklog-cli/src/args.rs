//! CLI argument definitions using clap
//!
//! - tracklog serve                # Record incoming messages until Ctrl-C
//! - tracklog replay --latest      # Replay the newest session
//! - tracklog list                 # Show recorded sessions
//! - tracklog simulate             # Post synthetic frames to a server

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracklog_core::demo::SimulationMode;

#[derive(Parser, Debug)]
#[command(name = "tracklog")]
#[command(about = "Record and replay live motion-tracking message streams")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Accept messages over HTTP (and optionally TCP) and record them
    Serve(ServeArgs),

    /// Replay a recorded session against a server
    Replay(ReplayArgs),

    /// List recorded sessions
    List(ListArgs),

    /// Send synthetic hand-tracking frames to a server
    Simulate(SimulateArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind the HTTP endpoint to
    #[arg(long)]
    pub host: Option<String>,

    /// HTTP port
    #[arg(long, short)]
    pub port: Option<u16>,

    /// Also accept newline-delimited JSON over TCP on this port
    #[arg(long)]
    pub tcp_port: Option<u16>,

    /// Directory for session logs
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, env = "TRACKLOG_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Log file to replay
    #[arg(long, conflicts_with = "latest")]
    pub log_file: Option<PathBuf>,

    /// Replay the most recent log in the log directory
    #[arg(long)]
    pub latest: bool,

    /// Directory searched by --latest
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Base URL of the receiving server
    #[arg(long)]
    pub server: Option<String>,

    /// Playback speed multiplier (2.0 = twice as fast)
    #[arg(long)]
    pub speed: Option<f64>,

    /// Loop playback until interrupted
    #[arg(long = "loop")]
    pub loop_playback: bool,

    /// JSON configuration file
    #[arg(long, env = "TRACKLOG_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Directory holding session logs
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, env = "TRACKLOG_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Base URL of the receiving server
    #[arg(long, default_value = "http://localhost:5000")]
    pub server: String,

    /// Frames per second
    #[arg(long, default_value_t = 30.0)]
    pub rate: f64,

    /// Seconds to run (runs until Ctrl-C when omitted)
    #[arg(long)]
    pub duration: Option<f64>,

    /// Which hands to send: both, left, right or alternate
    #[arg(long, default_value = "both")]
    pub mode: SimulationMode,

    /// Seed for reproducible frames (client N uses seed + N)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Concurrent clients posting to the server (stress test)
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub clients: u32,
}
