//! CLI commands

pub mod list;
pub mod replay;
pub mod serve;
pub mod simulate;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Token cancelled on the first Ctrl-C
pub fn ctrl_c_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupted, shutting down...");
                trigger.cancel();
            }
            Err(e) => warn!("Could not listen for Ctrl-C: {}", e),
        }
    });
    token
}
