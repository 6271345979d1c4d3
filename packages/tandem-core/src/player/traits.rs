//! Trait abstractions for remote player operations.
//!
//! Services depend on these traits rather than on [`WebApiPlayer`](super::WebApiPlayer),
//! so tests can substitute scripted players.

use std::time::Duration;

use async_trait::async_trait;

use super::client::PlayerResult;
use crate::domain::CurrentPlayingInfo;

/// Explicit track list and seek position for a play request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayRequest {
    /// Tracks to load, first one starts immediately.
    pub uris: Vec<String>,
    /// Seek position within the first track.
    pub position: Option<Duration>,
}

/// Read-only view of device playback.
#[async_trait]
pub trait PlaybackQuery: Send + Sync {
    /// Gets what the device is playing right now.
    ///
    /// Fails with [`PlayerError::NoActiveDevice`](super::PlayerError::NoActiveDevice)
    /// when the device is offline or idle.
    async fn currently_playing(&self, device_id: &str) -> PlayerResult<CurrentPlayingInfo>;
}

/// Transport control of a device.
#[async_trait]
pub trait PlaybackControl: Send + Sync {
    /// Resumes whatever the device has loaded.
    async fn play(&self, device_id: &str) -> PlayerResult<()>;

    /// Loads an explicit track list, optionally seeking into the first track.
    async fn play_tracks(&self, device_id: &str, request: &PlayRequest) -> PlayerResult<()>;

    async fn pause(&self, device_id: &str) -> PlayerResult<()>;

    /// Skips the device to its next queued track.
    async fn skip(&self, device_id: &str) -> PlayerResult<()>;
}

/// Manipulation of the device-side queue.
#[async_trait]
pub trait QueueControl: Send + Sync {
    /// Appends one track to the device queue.
    async fn enqueue(&self, device_id: &str, uri: &str) -> PlayerResult<()>;

    /// Drains the device queue so that `uri` becomes the current track.
    ///
    /// The remote API offers no way to clear its queue, so tracks left over
    /// from earlier playback are skipped through instead.
    async fn skip_all_tracks(&self, device_id: &str, uri: &str) -> PlayerResult<()>;
}

/// Repeat and shuffle settings of a device.
#[async_trait]
pub trait PlaybackModes: Send + Sync {
    async fn set_repeat_mode(&self, device_id: &str, on: bool) -> PlayerResult<()>;

    async fn set_shuffle_mode(&self, device_id: &str, on: bool) -> PlayerResult<()>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Combined Traits (for trait objects)
// ─────────────────────────────────────────────────────────────────────────────

/// Everything the session services need from a remote player.
#[async_trait]
pub trait Player: PlaybackQuery + PlaybackControl + QueueControl + PlaybackModes {}

impl<T: PlaybackQuery + PlaybackControl + QueueControl + PlaybackModes> Player for T {}
