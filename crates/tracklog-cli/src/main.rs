//! Tracklog CLI
//!
//! Records live tracking message streams to session logs and replays them
//! with their original timing.

mod args;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use args::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Serve(args) => commands::serve::execute(args).await,
        Commands::Replay(args) => commands::replay::execute(args).await,
        Commands::List(args) => commands::list::execute(args),
        Commands::Simulate(args) => commands::simulate::execute(args).await,
    }
}
