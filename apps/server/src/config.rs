//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tandem_core::protocol_constants::{
    DEFAULT_ARCHIVE_SWEEP_INTERVAL_SECS, DEFAULT_CONNECTION_BUFFER, DEFAULT_PLAYER_API_BASE_URL,
    DEFAULT_SESSION_TTL_HOURS, DEFAULT_WS_PING_INTERVAL_SECS, DEFAULT_WS_PONG_TIMEOUT_SECS,
};
use tandem_core::SyncConfig;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the HTTP server to.
    /// Override: `TANDEM_BIND_PORT`
    pub bind_port: u16,

    /// Base URL of the player Web API.
    /// Override: `TANDEM_PLAYER_BASE_URL`
    pub player_base_url: String,

    /// Bearer token sent with every player API request.
    /// Override: `TANDEM_PLAYER_TOKEN`
    pub player_token: String,

    /// Track-end loop timings (milliseconds).
    pub sync: SyncConfig,

    /// Hours until an idle session may be archived.
    /// Override: `TANDEM_SESSION_TTL_HOURS`
    pub session_ttl_hours: u64,

    /// Seconds between archive sweeps (0 disables the sweeper).
    /// Override: `TANDEM_ARCHIVE_SWEEP_INTERVAL`
    pub archive_sweep_interval_secs: u64,

    /// Outgoing event buffer per WebSocket connection.
    pub connection_buffer: usize,

    pub ws_ping_interval_secs: u64,

    pub ws_pong_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_port: 8080,
            player_base_url: DEFAULT_PLAYER_API_BASE_URL.to_string(),
            player_token: String::new(),
            sync: SyncConfig::default(),
            session_ttl_hours: DEFAULT_SESSION_TTL_HOURS,
            archive_sweep_interval_secs: DEFAULT_ARCHIVE_SWEEP_INTERVAL_SECS,
            connection_buffer: DEFAULT_CONNECTION_BUFFER,
            ws_ping_interval_secs: DEFAULT_WS_PING_INTERVAL_SECS,
            ws_pong_timeout_secs: DEFAULT_WS_PONG_TIMEOUT_SECS,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_yaml(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("TANDEM_BIND_PORT") {
            if let Ok(port) = val.parse() {
                self.bind_port = port;
            }
        }

        if let Ok(val) = std::env::var("TANDEM_PLAYER_BASE_URL") {
            self.player_base_url = val;
        }

        if let Ok(val) = std::env::var("TANDEM_SESSION_TTL_HOURS") {
            if let Ok(hours) = val.parse() {
                self.session_ttl_hours = hours;
            }
        }

        if let Ok(val) = std::env::var("TANDEM_ARCHIVE_SWEEP_INTERVAL") {
            if let Ok(secs) = val.parse() {
                self.archive_sweep_interval_secs = secs;
            }
        }

        // Note: TANDEM_PLAYER_TOKEN is handled by clap via #[arg(env = ...)] in main.rs
    }

    /// Converts to tandem-core's Config type.
    pub fn to_core_config(&self) -> tandem_core::Config {
        tandem_core::Config {
            bind_port: self.bind_port,
            sync: self.sync.clone(),
            session_ttl_hours: self.session_ttl_hours,
            archive_sweep_interval_secs: self.archive_sweep_interval_secs,
            connection_buffer: self.connection_buffer,
            ws_ping_interval_secs: self.ws_ping_interval_secs,
            ws_pong_timeout_secs: self.ws_pong_timeout_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = ServerConfig::from_yaml(
            "bind_port: 9000\nsync:\n  settle_delay_ms: 1000\n",
        )
        .unwrap();

        assert_eq!(config.bind_port, 9000);
        assert_eq!(config.sync.settle_delay_ms, 1000);
        assert_eq!(config.sync.skip_settle_ms, SyncConfig::default().skip_settle_ms);
        assert_eq!(config.session_ttl_hours, DEFAULT_SESSION_TTL_HOURS);
    }

    #[test]
    fn core_config_carries_every_setting() {
        let config = ServerConfig {
            bind_port: 1234,
            archive_sweep_interval_secs: 0,
            ..ServerConfig::default()
        };
        let core = config.to_core_config();

        assert_eq!(core.bind_port, 1234);
        assert_eq!(core.archive_sweep_interval_secs, 0);
        assert!(core.validate().is_ok());
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        assert!(ServerConfig::from_yaml("bind_port: [oops").is_err());
    }
}
