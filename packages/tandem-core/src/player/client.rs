//! HTTP client for a Web-API style remote player.
//!
//! Talks JSON over HTTPS with bearer auth. Every response status is
//! classified here into [`PlayerError`]; nothing above this module inspects
//! raw status codes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use super::retry::with_retry;
use super::traits::{PlayRequest, PlaybackControl, PlaybackModes, PlaybackQuery, QueueControl};
use crate::domain::{CurrentPlayingInfo, Track};
use crate::protocol_constants::{MAX_SKIP_ALL_ITERATIONS, PLAYER_TIMEOUT_SECS};

// ─────────────────────────────────────────────────────────────────────────────
// Error Types
// ─────────────────────────────────────────────────────────────────────────────

/// Closed classification of remote player failures.
#[derive(Debug, Error)]
pub enum PlayerError {
    /// No device is active (offline, idle, or unknown device ID).
    #[error("no active device")]
    NoActiveDevice,

    /// The account behind the token cannot control playback.
    #[error("player control requires a premium account")]
    NotPremium,

    /// The access token was rejected.
    #[error("player API rejected the access token")]
    Unauthorized,

    /// Too many requests; safe to retry later.
    #[error("player API rate limit exceeded")]
    RateLimited,

    /// Any other non-success status.
    #[error("HTTP error {0}: {1}")]
    HttpStatus(u16, String),

    /// Transport-level failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body did not have the expected shape.
    #[error("failed to decode player response: {0}")]
    Decode(String),

    /// Skipping through the device queue never reached the requested track.
    #[error("track {0} did not become current after draining the device queue")]
    SkipLimitExceeded(String),
}

/// Convenient Result alias for player operations.
pub type PlayerResult<T> = Result<T, PlayerError>;

impl PlayerError {
    /// Returns true if the request may succeed when repeated.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            PlayerError::RateLimited => true,
            PlayerError::Http(e) => e.is_timeout(),
            _ => false,
        }
    }
}

/// Maps an HTTP status (and body, for disambiguation) to a player outcome.
///
/// A 403 carrying "Restriction violated" means the device is already in the
/// requested state (e.g. pausing a paused device) and is treated as success.
pub(crate) fn classify_status(status: StatusCode, body: &str) -> PlayerResult<()> {
    if status.is_success() {
        return Ok(());
    }
    match status {
        StatusCode::FORBIDDEN if body.contains("Restriction violated") => {
            log::debug!("[Player] Already in requested state: {}", body);
            Ok(())
        }
        StatusCode::FORBIDDEN => Err(PlayerError::NotPremium),
        StatusCode::NOT_FOUND => Err(PlayerError::NoActiveDevice),
        StatusCode::UNAUTHORIZED => Err(PlayerError::Unauthorized),
        StatusCode::TOO_MANY_REQUESTS => Err(PlayerError::RateLimited),
        other => Err(PlayerError::HttpStatus(other.as_u16(), body.to_string())),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Response DTOs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct PlayerStateDto {
    #[serde(default)]
    is_playing: bool,
    #[serde(default)]
    progress_ms: Option<u64>,
    #[serde(default)]
    item: Option<TrackDto>,
    #[serde(default)]
    device: Option<DeviceDto>,
}

#[derive(Deserialize)]
struct TrackDto {
    uri: String,
    #[serde(default)]
    name: Option<String>,
    duration_ms: u64,
}

#[derive(Deserialize)]
struct DeviceDto {
    #[serde(default)]
    id: Option<String>,
}

impl From<PlayerStateDto> for CurrentPlayingInfo {
    fn from(dto: PlayerStateDto) -> Self {
        Self {
            playing: dto.is_playing,
            progress: Duration::from_millis(dto.progress_ms.unwrap_or(0)),
            track: dto.item.map(|t| Track {
                uri: t.uri,
                name: t.name,
                duration: Duration::from_millis(t.duration_ms),
            }),
            device_id: dto.device.and_then(|d| d.id),
        }
    }
}

/// Parses a `GET /me/player` response body.
///
/// An empty body (the API answers 204) means nothing is active.
pub(crate) fn parse_player_state(body: &str) -> PlayerResult<CurrentPlayingInfo> {
    if body.trim().is_empty() {
        return Err(PlayerError::NoActiveDevice);
    }
    serde_json::from_str::<PlayerStateDto>(body)
        .map(Into::into)
        .map_err(|e| PlayerError::Decode(e.to_string()))
}

/// Rejects playback state reported by a device other than `device_id`.
///
/// Another active device means the session's device is not playing.
pub(crate) fn ensure_device(
    info: CurrentPlayingInfo,
    device_id: &str,
) -> PlayerResult<CurrentPlayingInfo> {
    match info.device_id.as_deref() {
        Some(active) if !device_id.is_empty() && active != device_id => {
            log::debug!(
                "[Player] Active device {} differs from session device {}",
                active,
                device_id
            );
            Err(PlayerError::NoActiveDevice)
        }
        _ => Ok(info),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────────────────

/// Remote player client backed by `reqwest`.
pub struct WebApiPlayer {
    client: Client,
    base_url: String,
    access_token: String,
}

impl WebApiPlayer {
    /// Creates a client against `base_url` (e.g. `https://api.spotify.com/v1`).
    pub fn new(client: Client, base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        }
    }

    fn url(&self, path: &str, params: &[(&str, &str)]) -> PlayerResult<Url> {
        let raw = format!("{}{}", self.base_url, path);
        let url = if params.is_empty() {
            Url::parse(&raw)
        } else {
            Url::parse_with_params(&raw, params)
        };
        url.map_err(|e| PlayerError::Decode(format!("invalid URL {raw}: {e}")))
    }

    /// Sends one request and returns the body of a successful response.
    async fn send(
        &self,
        action: &str,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
    ) -> PlayerResult<String> {
        with_retry(action, || {
            let method = method.clone();
            let url = url.clone();
            let body = body.clone();
            async move {
                log::debug!("[Player] {} -> {} {}", action, method, url.path());
                let mut request = self
                    .client
                    .request(method, url)
                    .bearer_auth(&self.access_token)
                    .timeout(Duration::from_secs(PLAYER_TIMEOUT_SECS));
                request = match body {
                    Some(b) => request.json(&b),
                    None => request.header(reqwest::header::CONTENT_LENGTH, "0"),
                };

                let res = request.send().await?;
                let status = res.status();
                let text = res.text().await?;
                classify_status(status, &text)?;
                Ok(text)
            }
        })
        .await
    }

    async fn put(&self, action: &str, path: &str, params: &[(&str, &str)]) -> PlayerResult<()> {
        let url = self.url(path, params)?;
        self.send(action, Method::PUT, url, None).await.map(|_| ())
    }

    async fn post(&self, action: &str, path: &str, params: &[(&str, &str)]) -> PlayerResult<()> {
        let url = self.url(path, params)?;
        self.send(action, Method::POST, url, None).await.map(|_| ())
    }
}

#[async_trait]
impl PlaybackQuery for WebApiPlayer {
    async fn currently_playing(&self, device_id: &str) -> PlayerResult<CurrentPlayingInfo> {
        let url = self.url("/me/player", &[])?;
        let body = self.send("CurrentlyPlaying", Method::GET, url, None).await?;
        ensure_device(parse_player_state(&body)?, device_id)
    }
}

#[async_trait]
impl PlaybackControl for WebApiPlayer {
    async fn play(&self, device_id: &str) -> PlayerResult<()> {
        self.put("Play", "/me/player/play", &[("device_id", device_id)])
            .await
    }

    async fn play_tracks(&self, device_id: &str, request: &PlayRequest) -> PlayerResult<()> {
        let url = self.url("/me/player/play", &[("device_id", device_id)])?;
        let mut body = json!({ "uris": request.uris });
        if let Some(position) = request.position {
            body["position_ms"] = json!(position.as_millis() as u64);
        }
        self.send("PlayTracks", Method::PUT, url, Some(body))
            .await
            .map(|_| ())
    }

    async fn pause(&self, device_id: &str) -> PlayerResult<()> {
        self.put("Pause", "/me/player/pause", &[("device_id", device_id)])
            .await
    }

    async fn skip(&self, device_id: &str) -> PlayerResult<()> {
        self.post("Skip", "/me/player/next", &[("device_id", device_id)])
            .await
    }
}

#[async_trait]
impl QueueControl for WebApiPlayer {
    async fn enqueue(&self, device_id: &str, uri: &str) -> PlayerResult<()> {
        self.post(
            "Enqueue",
            "/me/player/queue",
            &[("uri", uri), ("device_id", device_id)],
        )
        .await
    }

    async fn skip_all_tracks(&self, device_id: &str, uri: &str) -> PlayerResult<()> {
        self.enqueue(device_id, uri).await?;
        for _ in 0..MAX_SKIP_ALL_ITERATIONS {
            self.skip(device_id).await?;
            let info = self.currently_playing(device_id).await?;
            if info.track_uri() == Some(uri) {
                return Ok(());
            }
        }
        log::warn!(
            "[Player] Gave up draining device queue for {} after {} skips",
            uri,
            MAX_SKIP_ALL_ITERATIONS
        );
        Err(PlayerError::SkipLimitExceeded(uri.to_string()))
    }
}

#[async_trait]
impl PlaybackModes for WebApiPlayer {
    async fn set_repeat_mode(&self, device_id: &str, on: bool) -> PlayerResult<()> {
        let state = if on { "context" } else { "off" };
        self.put(
            "SetRepeatMode",
            "/me/player/repeat",
            &[("state", state), ("device_id", device_id)],
        )
        .await
    }

    async fn set_shuffle_mode(&self, device_id: &str, on: bool) -> PlayerResult<()> {
        let state = if on { "true" } else { "false" };
        self.put(
            "SetShuffleMode",
            "/me/player/shuffle",
            &[("state", state), ("device_id", device_id)],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_statuses_pass() {
        assert!(classify_status(StatusCode::OK, "").is_ok());
        assert!(classify_status(StatusCode::NO_CONTENT, "").is_ok());
    }

    #[test]
    fn restriction_violated_is_treated_as_success() {
        let body = r#"{"error":{"status":403,"message":"Player command failed: Restriction violated"}}"#;
        assert!(classify_status(StatusCode::FORBIDDEN, body).is_ok());
    }

    #[test]
    fn statuses_map_to_closed_error_kinds() {
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, "Premium required"),
            Err(PlayerError::NotPremium)
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, ""),
            Err(PlayerError::NoActiveDevice)
        ));
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, ""),
            Err(PlayerError::Unauthorized)
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, ""),
            Err(PlayerError::RateLimited)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, "upstream"),
            Err(PlayerError::HttpStatus(502, ref b)) if b == "upstream"
        ));
    }

    #[test]
    fn only_rate_limit_is_transient_among_classified() {
        assert!(PlayerError::RateLimited.is_transient());
        assert!(!PlayerError::NoActiveDevice.is_transient());
        assert!(!PlayerError::NotPremium.is_transient());
        assert!(!PlayerError::HttpStatus(500, String::new()).is_transient());
    }

    #[test]
    fn parses_player_state() {
        let body = r#"{
            "device": {"id": "dev-1", "name": "Kitchen"},
            "progress_ms": 12000,
            "is_playing": true,
            "item": {"uri": "spotify:track:abc", "name": "Song", "duration_ms": 180000}
        }"#;
        let info = parse_player_state(body).unwrap();
        assert!(info.playing);
        assert_eq!(info.progress, Duration::from_secs(12));
        assert_eq!(info.track_uri(), Some("spotify:track:abc"));
        assert_eq!(info.device_id.as_deref(), Some("dev-1"));
        assert_eq!(info.remain(), Duration::from_secs(168));
    }

    #[test]
    fn empty_player_state_means_no_active_device() {
        assert!(matches!(
            parse_player_state(""),
            Err(PlayerError::NoActiveDevice)
        ));
    }

    #[test]
    fn malformed_player_state_is_a_decode_error() {
        assert!(matches!(
            parse_player_state("{\"item\": 3}"),
            Err(PlayerError::Decode(_))
        ));
    }

    #[test]
    fn state_from_another_device_means_no_active_device() {
        let body = r#"{
            "device": {"id": "phone"},
            "is_playing": true,
            "item": {"uri": "spotify:track:abc", "duration_ms": 180000}
        }"#;
        let info = parse_player_state(body).unwrap();
        assert!(matches!(
            ensure_device(info.clone(), "kitchen"),
            Err(PlayerError::NoActiveDevice)
        ));
        assert!(ensure_device(info.clone(), "phone").is_ok());
        assert!(ensure_device(info, "").is_ok());
    }

    #[test]
    fn url_encodes_query_params() {
        let player = WebApiPlayer::new(Client::new(), "https://api.example.com/v1/", "t");
        let url = player
            .url("/me/player/queue", &[("uri", "spotify:track:a b"), ("device_id", "d")])
            .unwrap();
        assert_eq!(url.path(), "/v1/me/player/queue");
        assert_eq!(
            url.query(),
            Some("uri=spotify%3Atrack%3Aa+b&device_id=d")
        );
    }
}
