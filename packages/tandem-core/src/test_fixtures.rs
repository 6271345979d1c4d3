//! Shared test doubles for service and API tests.
//!
//! [`MockPlayer`] simulates a single device with its own play queue, so sync
//! loop tests can drive track changes the same way a real device would.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::{CurrentPlayingInfo, Session, StateType, Track};
use crate::events::{EventPusher, PushMessage, SessionEvent};
use crate::player::{
    PlayRequest, PlaybackControl, PlaybackModes, PlaybackQuery, PlayerError, PlayerResult,
    QueueControl,
};

pub const DEVICE: &str = "device-1";
pub const CREATOR: &str = "creator";
pub const TRACK_LENGTH: Duration = Duration::from_secs(180);

pub fn track_uri(index: usize) -> String {
    format!("spotify:track:{index}")
}

/// A session with `tracks` queued, in `state`, with the head at `head`.
pub fn session_with_tracks(id: &str, tracks: usize, state: StateType, head: usize) -> Session {
    let mut session = Session::new(id, "Friday mix", CREATOR, DEVICE, true);
    for i in 0..tracks {
        session.add_queue_track(track_uri(i));
    }
    session.state = state;
    session.queue_head = head;
    session
}

/// Every call the services made against the player, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerCall {
    CurrentlyPlaying,
    Play,
    PlayTracks(Vec<String>, Option<Duration>),
    Pause,
    Skip,
    Enqueue(String),
    SkipAllTracks(String),
    SetRepeat(bool),
    SetShuffle(bool),
}

#[derive(Default)]
struct MockDevice {
    offline: bool,
    playing: bool,
    current: Option<String>,
    queue: VecDeque<String>,
    progress: Duration,
}

/// Scripted single-device player.
#[derive(Default)]
pub struct MockPlayer {
    device: Mutex<MockDevice>,
    calls: Mutex<Vec<PlayerCall>>,
    failures: Mutex<HashMap<&'static str, PlayerError>>,
}

impl MockPlayer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A device already playing `uri` with `queued` lined up behind it.
    pub fn playing(uri: &str, queued: &[String], progress: Duration) -> Arc<Self> {
        let player = Self::new();
        {
            let mut device = player.device.lock();
            device.playing = true;
            device.current = Some(uri.to_string());
            device.queue = queued.iter().cloned().collect();
            device.progress = progress;
        }
        player
    }

    pub fn set_offline(&self, offline: bool) {
        self.device.lock().offline = offline;
    }

    /// Loads `uri` as the current track, as if the user picked it on the device.
    pub fn set_current(&self, uri: &str) {
        let mut device = self.device.lock();
        device.current = Some(uri.to_string());
        device.progress = Duration::ZERO;
    }

    /// Natural end of the current track: the device moves to its next queued one.
    pub fn finish_track(&self) {
        let mut device = self.device.lock();
        device.current = device.queue.pop_front();
        device.progress = Duration::ZERO;
    }

    pub fn current(&self) -> Option<String> {
        self.device.lock().current.clone()
    }

    pub fn queued(&self) -> Vec<String> {
        self.device.lock().queue.iter().cloned().collect()
    }

    /// Makes the next call to `operation` fail with `err`.
    pub fn fail_once(&self, operation: &'static str, err: PlayerError) {
        self.failures.lock().insert(operation, err);
    }

    pub fn calls(&self) -> Vec<PlayerCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &PlayerCall) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    pub fn enqueued(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                PlayerCall::Enqueue(uri) => Some(uri.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, operation: &'static str, call: PlayerCall) -> PlayerResult<()> {
        self.calls.lock().push(call);
        if let Some(err) = self.failures.lock().remove(operation) {
            return Err(err);
        }
        if self.device.lock().offline {
            return Err(PlayerError::NoActiveDevice);
        }
        Ok(())
    }
}

#[async_trait]
impl PlaybackQuery for MockPlayer {
    async fn currently_playing(&self, device_id: &str) -> PlayerResult<CurrentPlayingInfo> {
        self.record("currently_playing", PlayerCall::CurrentlyPlaying)?;
        let device = self.device.lock();
        Ok(CurrentPlayingInfo {
            playing: device.playing,
            progress: device.progress,
            track: device.current.as_ref().map(|uri| Track {
                uri: uri.clone(),
                name: None,
                duration: TRACK_LENGTH,
            }),
            device_id: Some(device_id.to_string()),
        })
    }
}

#[async_trait]
impl PlaybackControl for MockPlayer {
    async fn play(&self, _device_id: &str) -> PlayerResult<()> {
        self.record("play", PlayerCall::Play)?;
        self.device.lock().playing = true;
        Ok(())
    }

    async fn play_tracks(&self, _device_id: &str, request: &PlayRequest) -> PlayerResult<()> {
        self.record(
            "play_tracks",
            PlayerCall::PlayTracks(request.uris.clone(), request.position),
        )?;
        // The device's own queue survives a play request.
        let mut device = self.device.lock();
        let mut uris = request.uris.iter().cloned();
        device.current = uris.next();
        for (i, uri) in uris.enumerate() {
            device.queue.insert(i, uri);
        }
        device.progress = request.position.unwrap_or(Duration::ZERO);
        device.playing = true;
        Ok(())
    }

    async fn pause(&self, _device_id: &str) -> PlayerResult<()> {
        self.record("pause", PlayerCall::Pause)?;
        self.device.lock().playing = false;
        Ok(())
    }

    async fn skip(&self, _device_id: &str) -> PlayerResult<()> {
        self.record("skip", PlayerCall::Skip)?;
        self.finish_track();
        Ok(())
    }
}

#[async_trait]
impl QueueControl for MockPlayer {
    async fn enqueue(&self, _device_id: &str, uri: &str) -> PlayerResult<()> {
        self.record("enqueue", PlayerCall::Enqueue(uri.to_string()))?;
        self.device.lock().queue.push_back(uri.to_string());
        Ok(())
    }

    async fn skip_all_tracks(&self, _device_id: &str, uri: &str) -> PlayerResult<()> {
        self.record("skip_all_tracks", PlayerCall::SkipAllTracks(uri.to_string()))?;
        let mut device = self.device.lock();
        device.queue.clear();
        device.current = Some(uri.to_string());
        device.progress = Duration::ZERO;
        Ok(())
    }
}

#[async_trait]
impl PlaybackModes for MockPlayer {
    async fn set_repeat_mode(&self, _device_id: &str, on: bool) -> PlayerResult<()> {
        self.record("set_repeat_mode", PlayerCall::SetRepeat(on))
    }

    async fn set_shuffle_mode(&self, _device_id: &str, on: bool) -> PlayerResult<()> {
        self.record("set_shuffle_mode", PlayerCall::SetShuffle(on))
    }
}

/// Pusher that keeps every message for later assertions.
#[derive(Default)]
pub struct RecordingPusher {
    messages: Mutex<Vec<PushMessage>>,
}

impl RecordingPusher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.messages.lock().iter().map(|m| m.event.clone()).collect()
    }

    pub fn messages(&self) -> Vec<PushMessage> {
        self.messages.lock().clone()
    }
}

impl EventPusher for RecordingPusher {
    fn push(&self, message: PushMessage) {
        self.messages.lock().push(message);
    }
}
