//! Track and device playback snapshot types.

use std::time::Duration;

use serde::Serialize;

/// A single track as reported by the remote player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    /// Streaming-service URI (e.g. `spotify:track:...`).
    pub uri: String,
    /// Display name, if the player reported one.
    pub name: Option<String>,
    /// Total track length.
    #[serde(rename = "durationMs", serialize_with = "serialize_millis")]
    pub duration: Duration,
}

/// Snapshot of what a playback device is doing right now.
///
/// The remote API is eventually consistent, so this is only ever a
/// best-effort observation taken at the time of the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentPlayingInfo {
    /// Whether the device reports active playback.
    pub playing: bool,
    /// Elapsed time within the current track.
    #[serde(rename = "progressMs", serialize_with = "serialize_millis")]
    pub progress: Duration,
    /// Current track, absent when the device has nothing loaded.
    pub track: Option<Track>,
    /// Device reporting this state.
    pub device_id: Option<String>,
}

impl CurrentPlayingInfo {
    /// Time left until the current track ends.
    ///
    /// Saturates at zero when the device reports a progress past the track
    /// length, which happens briefly around track boundaries.
    #[must_use]
    pub fn remain(&self) -> Duration {
        self.track
            .as_ref()
            .map(|t| t.duration.saturating_sub(self.progress))
            .unwrap_or(Duration::ZERO)
    }

    /// URI of the current track, if any.
    pub fn track_uri(&self) -> Option<&str> {
        self.track.as_ref().map(|t| t.uri.as_str())
    }
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}
