//! Fixed constants shared by the player client, sync engine and transports.
//!
//! Tunable timings live in [`Config`](crate::Config); the values here are
//! either defaults for those settings or limits that are not meant to change.

// ─────────────────────────────────────────────────────────────────────────────
// Sync Engine
// ─────────────────────────────────────────────────────────────────────────────

/// Wait after entering PLAY before the first device check (milliseconds).
///
/// The remote API applies play commands asynchronously; checking earlier
/// reports the previous track and triggers a false interrupt.
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 5000;

/// Wait after the track-end timer fires before re-reading state (milliseconds).
pub const DEFAULT_TRACK_END_GRACE_MS: u64 = 2000;

/// Wait after a device skip before verifying the new track (milliseconds).
pub const DEFAULT_SKIP_SETTLE_MS: u64 = 300;

/// Subtracted from the remaining track time when arming the track-end timer
/// (milliseconds).
///
/// The device reports progress with some lag. A timer that fires exactly at
/// the reported end lands after the device has moved on.
pub const DEFAULT_TRACK_END_MARGIN_MS: u64 = 2000;

// ─────────────────────────────────────────────────────────────────────────────
// Session Lifecycle
// ─────────────────────────────────────────────────────────────────────────────

/// Hours a stopped session stays live before the archive sweep collects it.
pub const DEFAULT_SESSION_TTL_HOURS: u64 = 72;

/// Interval between archive sweeps (seconds).
pub const DEFAULT_ARCHIVE_SWEEP_INTERVAL_SECS: u64 = 3600;

// ─────────────────────────────────────────────────────────────────────────────
// Event Hub / WebSocket
// ─────────────────────────────────────────────────────────────────────────────

/// Outgoing message buffer per WebSocket connection.
pub const DEFAULT_CONNECTION_BUFFER: usize = 256;

/// Time allowed without a pong before a connection is considered dead (seconds).
pub const DEFAULT_WS_PONG_TIMEOUT_SECS: u64 = 60;

/// Ping cadence (seconds). Must be shorter than the pong timeout.
pub const DEFAULT_WS_PING_INTERVAL_SECS: u64 = DEFAULT_WS_PONG_TIMEOUT_SECS * 9 / 10;

/// Time allowed for a single frame write (seconds).
pub const WS_WRITE_TIMEOUT_SECS: u64 = 10;

/// Largest inbound frame accepted from a client (bytes).
///
/// Clients only listen; anything bigger than a control frame is unexpected.
pub const WS_MAX_MESSAGE_SIZE: usize = 512;

// ─────────────────────────────────────────────────────────────────────────────
// Player API
// ─────────────────────────────────────────────────────────────────────────────

/// Timeout for a single player API request (seconds).
pub const PLAYER_TIMEOUT_SECS: u64 = 10;

/// Upper bound on skips while draining the device queue.
pub const MAX_SKIP_ALL_ITERATIONS: usize = 50;

/// Default player API base URL.
pub const DEFAULT_PLAYER_API_BASE_URL: &str = "https://api.spotify.com/v1";

// ─────────────────────────────────────────────────────────────────────────────
// HTTP
// ─────────────────────────────────────────────────────────────────────────────

/// Header carrying the acting user's identity.
///
/// Authentication happens upstream; the core trusts this value.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Application name for logs and health responses.
pub const APP_NAME: &str = "tandem";
