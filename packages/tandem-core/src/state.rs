//! Core configuration types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol_constants::{
    DEFAULT_ARCHIVE_SWEEP_INTERVAL_SECS, DEFAULT_CONNECTION_BUFFER, DEFAULT_SESSION_TTL_HOURS,
    DEFAULT_SETTLE_DELAY_MS, DEFAULT_SKIP_SETTLE_MS, DEFAULT_TRACK_END_GRACE_MS,
    DEFAULT_TRACK_END_MARGIN_MS, DEFAULT_WS_PING_INTERVAL_SECS, DEFAULT_WS_PONG_TIMEOUT_SECS,
};

/// Timings for the track-end reconciliation loop.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SyncConfig {
    /// Wait after entering PLAY before the first device check (milliseconds).
    pub settle_delay_ms: u64,

    /// Wait after a track-end tick before re-reading state (milliseconds).
    pub track_end_grace_ms: u64,

    /// Wait after a device skip before verifying (milliseconds).
    pub skip_settle_ms: u64,

    /// Safety margin subtracted from the remaining track time (milliseconds).
    pub track_end_margin_ms: u64,
}

impl SyncConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn track_end_grace(&self) -> Duration {
        Duration::from_millis(self.track_end_grace_ms)
    }

    pub fn skip_settle(&self) -> Duration {
        Duration::from_millis(self.skip_settle_ms)
    }

    pub fn track_end_margin(&self) -> Duration {
        Duration::from_millis(self.track_end_margin_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            track_end_grace_ms: DEFAULT_TRACK_END_GRACE_MS,
            skip_settle_ms: DEFAULT_SKIP_SETTLE_MS,
            track_end_margin_ms: DEFAULT_TRACK_END_MARGIN_MS,
        }
    }
}

/// Configuration for the Tandem core.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    // Server
    /// Port for the HTTP/WS server.
    pub bind_port: u16,

    // Sync
    pub sync: SyncConfig,

    // Sessions
    /// Hours until an idle session becomes eligible for archival.
    pub session_ttl_hours: u64,

    /// Interval between archive sweeps (seconds, 0 = disabled).
    pub archive_sweep_interval_secs: u64,

    // WebSocket
    /// Outgoing message buffer per connection.
    pub connection_buffer: usize,

    /// Ping cadence (seconds).
    pub ws_ping_interval_secs: u64,

    /// Pong timeout (seconds).
    pub ws_pong_timeout_secs: u64,
}

impl Config {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_hours * 3600)
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.connection_buffer == 0 {
            return Err("connection_buffer must be >= 1 (mpsc::channel panics on 0)".to_string());
        }
        if self.ws_ping_interval_secs == 0 {
            return Err("ws_ping_interval_secs must be >= 1".to_string());
        }
        if self.ws_ping_interval_secs >= self.ws_pong_timeout_secs {
            return Err(format!(
                "ws_ping_interval_secs ({}) must be shorter than ws_pong_timeout_secs ({})",
                self.ws_ping_interval_secs, self.ws_pong_timeout_secs
            ));
        }
        if self.session_ttl_hours == 0 {
            return Err("session_ttl_hours must be >= 1".to_string());
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_port: 8080,
            sync: SyncConfig::default(),
            session_ttl_hours: DEFAULT_SESSION_TTL_HOURS,
            archive_sweep_interval_secs: DEFAULT_ARCHIVE_SWEEP_INTERVAL_SECS,
            connection_buffer: DEFAULT_CONNECTION_BUFFER,
            ws_ping_interval_secs: DEFAULT_WS_PING_INTERVAL_SECS,
            ws_pong_timeout_secs: DEFAULT_WS_PONG_TIMEOUT_SECS,
        }
    }
}
