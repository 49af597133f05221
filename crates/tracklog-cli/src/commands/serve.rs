//! `tracklog serve`

use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracklog_core::config::{AppConfig, ServerConfig};
use tracklog_core::datalog::SessionRecorder;
use tracklog_core::ingest::{serve_http, serve_tcp};

use super::ctrl_c_token;
use crate::args::ServeArgs;

fn resolve(args: &ServeArgs) -> Result<ServerConfig> {
    let mut config = AppConfig::load_or_default(args.config.as_deref())
        .context("Failed to load config")?
        .server;
    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if args.tcp_port.is_some() {
        config.tcp_port = args.tcp_port;
    }
    if let Some(dir) = &args.log_dir {
        config.recorder.log_dir = dir.clone();
    }
    Ok(config)
}

fn socket_addr(host: &str, port: u16) -> Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .with_context(|| format!("Invalid listen address {host}:{port}"))?
        .next()
        .with_context(|| format!("No address found for {host}"))
}

pub async fn execute(args: ServeArgs) -> Result<()> {
    let config = resolve(&args)?;
    let shutdown = ctrl_c_token();
    let recorder = Arc::new(SessionRecorder::new(config.recorder.clone()));

    info!("Logs will be saved to: {}", config.recorder.log_dir.display());

    let (_, http) = serve_http(
        socket_addr(&config.host, config.port)?,
        Arc::clone(&recorder),
        shutdown.clone(),
    )
    .context("Failed to start HTTP server")?;
    let http = tokio::spawn(http);

    let tcp = match config.tcp_port {
        Some(port) => {
            let addr = socket_addr(&config.host, port)?;
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind TCP port {port}"))?;
            Some(tokio::spawn(serve_tcp(
                listener,
                Arc::clone(&recorder),
                shutdown.clone(),
            )))
        }
        None => None,
    };

    info!("Press Ctrl+C to stop");
    shutdown.cancelled().await;

    if let Err(e) = http.await {
        warn!("HTTP server task failed: {}", e);
    }
    if let Some(tcp) = tcp {
        match tcp.await {
            Ok(Err(e)) => warn!("TCP server stopped with error: {}", e),
            Err(e) => warn!("TCP server task failed: {}", e),
            Ok(Ok(())) => {}
        }
    }

    match recorder.shutdown().context("Failed to close session log")? {
        Some(closed) => info!(
            "Saved {} messages to {}",
            closed.end.total_messages,
            closed.path.display()
        ),
        None => info!("No messages were recorded"),
    }
    Ok(())
}
