//! Session entity: the playback state machine and its ordered track queue.
//!
//! All mutation of a session goes through the methods here. Services own the
//! side effects (device calls, persistence, events); this module only decides
//! what is legal and what the resulting record looks like.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::track::CurrentPlayingInfo;

/// Tracks handed to the device when playback starts at the queue head.
const TRACKS_STAGED_ON_START: usize = 3;

/// Distance past the head of the track staged after each advance.
const LOOK_AHEAD_OFFSET: usize = 2;

// ─────────────────────────────────────────────────────────────────────────────
// Error Types
// ─────────────────────────────────────────────────────────────────────────────

/// Rule violations raised by the session state machine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Requested state is not reachable from the current one.
    #[error("cannot change session state from {from} to {to}")]
    InvalidTransition { from: StateType, to: StateType },

    /// User may not control this session (or this transition is creator-only).
    #[error("user {0} is not allowed to control this session")]
    NotAllowed(String),

    /// No track exists at the given queue position.
    #[error("no queue track at position {0}")]
    QueueTrackNotFound(usize),

    /// The queue head is already past the last track.
    #[error("all tracks in the queue have finished")]
    AllTracksFinished,

    /// The device is not playing the track the session expects.
    #[error("device is playing {actual:?}, expected {expected:?}")]
    PlayingDifferentTrack {
        expected: Option<String>,
        actual: Option<String>,
    },

    /// A state name could not be parsed.
    #[error("unknown state type: {0}")]
    UnknownState(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// State Type
// ─────────────────────────────────────────────────────────────────────────────

/// Playback state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StateType {
    Stop,
    Play,
    Pause,
    Archived,
}

impl StateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "STOP",
            Self::Play => "PLAY",
            Self::Pause => "PAUSE",
            Self::Archived => "ARCHIVED",
        }
    }
}

impl fmt::Display for StateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StateType {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STOP" => Ok(Self::Stop),
            "PLAY" => Ok(Self::Play),
            "PAUSE" => Ok(Self::Pause),
            "ARCHIVED" => Ok(Self::Archived),
            other => Err(SessionError::UnknownState(other.to_string())),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// One entry of a session queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueTrack {
    /// Zero-based, contiguous position in the queue.
    pub index: usize,
    pub uri: String,
    pub session_id: String,
}

/// A shared playback session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub name: String,
    pub creator_id: String,
    /// Device the session drives on the remote player.
    pub device_id: String,
    pub state: StateType,
    pub queue_tracks: Vec<QueueTrack>,
    /// Index of the track considered "now playing". Equal to the queue
    /// length when every track has been consumed.
    pub queue_head: usize,
    /// If false only the creator may issue commands.
    pub allow_to_control_by_others: bool,
    /// Device progress captured on pause. Zero outside of `Pause`.
    pub progress_when_paused: Duration,
    /// Unix millis after which the session is eligible for archival.
    pub expired_at: Option<u64>,
}

impl Session {
    /// Creates a session in `Stop` with an empty queue.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        creator_id: impl Into<String>,
        device_id: impl Into<String>,
        allow_to_control_by_others: bool,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            creator_id: creator_id.into(),
            device_id: device_id.into(),
            state: StateType::Stop,
            queue_tracks: Vec::new(),
            queue_head: 0,
            allow_to_control_by_others,
            progress_when_paused: Duration::ZERO,
            expired_at: None,
        }
    }

    pub fn is_creator(&self, user_id: &str) -> bool {
        self.creator_id == user_id
    }

    /// Checks that `user_id` may issue commands against this session.
    pub fn authorize(&self, user_id: &str) -> Result<(), SessionError> {
        if self.is_creator(user_id) || self.allow_to_control_by_others {
            Ok(())
        } else {
            Err(SessionError::NotAllowed(user_id.to_string()))
        }
    }

    /// Checks that `user_id` may request a change to `target`.
    ///
    /// Entering or leaving `Archived` is reserved for the creator regardless
    /// of `allow_to_control_by_others`.
    pub fn authorize_transition(&self, user_id: &str, target: StateType) -> Result<(), SessionError> {
        self.authorize(user_id)?;
        let creator_only = target == StateType::Archived || self.state == StateType::Archived;
        if creator_only && !self.is_creator(user_id) {
            return Err(SessionError::NotAllowed(user_id.to_string()));
        }
        Ok(())
    }

    /// Whether a user-requested change from the current state to `target` is legal.
    pub fn is_valid_next_state(&self, target: StateType) -> bool {
        use StateType::*;
        matches!(
            (self.state, target),
            (Stop, Play)
                | (Pause, Play)
                | (Play, Pause)
                | (Pause, Pause)
                | (Stop | Play | Pause, Archived)
                | (Archived, Stop)
                | (Archived, Archived)
        )
    }

    /// Like [`is_valid_next_state`](Self::is_valid_next_state) but reports the failure.
    pub fn ensure_valid_next_state(&self, target: StateType) -> Result<(), SessionError> {
        if self.is_valid_next_state(target) {
            Ok(())
        } else {
            Err(self.invalid(target))
        }
    }

    /// True when a request to play resumes a paused session.
    pub fn is_resume(&self, target: StateType) -> bool {
        self.state == StateType::Pause && target == StateType::Play
    }

    pub fn move_to_play(&mut self) -> Result<(), SessionError> {
        match self.state {
            StateType::Stop if self.is_queue_exhausted() => {
                Err(SessionError::QueueTrackNotFound(self.queue_head))
            }
            StateType::Stop | StateType::Pause => {
                self.state = StateType::Play;
                self.progress_when_paused = Duration::ZERO;
                Ok(())
            }
            _ => Err(self.invalid(StateType::Play)),
        }
    }

    pub fn move_to_pause(&mut self, progress: Duration) -> Result<(), SessionError> {
        match self.state {
            StateType::Play | StateType::Pause => {
                self.state = StateType::Pause;
                self.progress_when_paused = progress;
                Ok(())
            }
            _ => Err(self.invalid(StateType::Pause)),
        }
    }

    /// Moves to `Stop` unconditionally.
    ///
    /// Used by internal paths (drift, queue exhaustion, unarchive) which have
    /// already decided the transition is appropriate.
    pub fn move_to_stop(&mut self) {
        self.state = StateType::Stop;
        self.progress_when_paused = Duration::ZERO;
    }

    pub fn move_to_archived(&mut self) {
        self.state = StateType::Archived;
        self.progress_when_paused = Duration::ZERO;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queue
    // ─────────────────────────────────────────────────────────────────────────

    /// Advances the queue head by one.
    ///
    /// Fails with [`SessionError::AllTracksFinished`] without touching the head
    /// when it already sits at the end of the queue. A saved pause position
    /// belongs to the old head and is cleared.
    pub fn go_next_track(&mut self) -> Result<(), SessionError> {
        if self.is_queue_exhausted() {
            return Err(SessionError::AllTracksFinished);
        }
        self.queue_head += 1;
        self.progress_when_paused = Duration::ZERO;
        Ok(())
    }

    pub fn is_queue_exhausted(&self) -> bool {
        self.queue_head >= self.queue_tracks.len()
    }

    pub fn head_track(&self) -> Option<&QueueTrack> {
        self.queue_tracks.get(self.queue_head)
    }

    /// URIs handed to the device when playback starts at the head.
    pub fn track_uris_to_start(&self) -> Result<Vec<String>, SessionError> {
        let end = (self.queue_head + TRACKS_STAGED_ON_START).min(self.queue_tracks.len());
        let uris: Vec<String> = self
            .queue_tracks
            .get(self.queue_head..end)
            .unwrap_or_default()
            .iter()
            .map(|t| t.uri.clone())
            .collect();
        if uris.is_empty() {
            return Err(SessionError::QueueTrackNotFound(self.queue_head));
        }
        Ok(uris)
    }

    /// Track to pre-stage on the device after the head has advanced.
    pub fn look_ahead_track_uri(&self) -> Option<&str> {
        self.queue_tracks
            .get(self.queue_head + LOOK_AHEAD_OFFSET)
            .map(|t| t.uri.as_str())
    }

    /// Appends a track with the next contiguous index.
    pub fn add_queue_track(&mut self, uri: impl Into<String>) -> &QueueTrack {
        let index = self.queue_tracks.len();
        self.queue_tracks.push(QueueTrack {
            index,
            uri: uri.into(),
            session_id: self.id.clone(),
        });
        &self.queue_tracks[index]
    }

    /// Whether a just-appended track falls inside the window already staged
    /// on the device and must be enqueued there immediately.
    pub fn should_enqueue_added_track(&self) -> bool {
        matches!(self.state, StateType::Play | StateType::Pause)
            && self.queue_tracks.len().saturating_sub(self.queue_head) <= TRACKS_STAGED_ON_START
    }

    /// Compares the device's current track against the queue head.
    pub fn is_playing_correct_track(&self, info: &CurrentPlayingInfo) -> Result<(), SessionError> {
        let expected = self.head_track().map(|t| t.uri.as_str());
        let actual = info.track_uri();
        match (expected, actual) {
            (Some(e), Some(a)) if e == a => Ok(()),
            _ => Err(SessionError::PlayingDifferentTrack {
                expected: expected.map(str::to_string),
                actual: actual.map(str::to_string),
            }),
        }
    }

    fn invalid(&self, to: StateType) -> SessionError {
        SessionError::InvalidTransition {
            from: self.state,
            to,
        }
    }
}
