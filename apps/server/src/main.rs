//! Tandem Server - standalone headless server for shared playback sessions.
//!
//! Serves the session HTTP/WebSocket API and drives each session's device
//! through the player Web API.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tandem_core::{bootstrap_services, create_player, start_server};
use tokio::signal;

use crate::config::ServerConfig;

/// Tandem Server - shared playback sessions on a remote player.
#[derive(Parser, Debug)]
#[command(name = "tandem-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "TANDEM_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "TANDEM_BIND_PORT")]
    port: Option<u16>,

    /// Bearer token for the player API (overrides config file).
    #[arg(short = 't', long, env = "TANDEM_PLAYER_TOKEN", hide_env_values = true)]
    player_token: Option<String>,

    /// Player API base URL (overrides config file).
    #[arg(long, env = "TANDEM_PLAYER_BASE_URL")]
    player_base_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Tandem Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(token) = args.player_token {
        config.player_token = token;
    }
    if let Some(url) = args.player_base_url {
        config.player_base_url = url;
    }

    if config.player_token.is_empty() {
        log::warn!("No player token configured - every device call will be rejected");
    }
    log::info!(
        "Configuration: bind_port={}, player_api={}",
        config.bind_port,
        config.player_base_url
    );

    let player = create_player(&config.player_base_url, &config.player_token)
        .context("Failed to create player client")?;

    let core_config = config.to_core_config();
    let services = bootstrap_services(&core_config, Arc::new(player))
        .context("Failed to bootstrap services")?;

    log::info!("Services bootstrapped successfully");

    let app_state = services.app_state();
    let server_shutdown = services.cancel_token.child_token();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(app_state, server_shutdown).await {
            log::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");

    // Graceful shutdown: cancelling the services also stops the listener
    services.shutdown().await;

    if server_handle.await.is_err() {
        log::warn!("Server task did not exit cleanly");
    }

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
