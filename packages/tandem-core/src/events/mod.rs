//! Event system for real-time session updates.
//!
//! This module provides:
//! - [`SessionEvent`], the closed set of tags sent to watching clients
//! - [`EventPusher`] trait for services to publish events
//! - [`EventHub`], the actor that fans events out to connections

mod hub;
mod pusher;

pub use hub::{Connection, ConnectionGuard, ConnectionId, EventHub, HubActor};
pub use pusher::EventPusher;

use serde::Serialize;

/// Events broadcast to clients watching a session.
///
/// Serialized as `{"type":"PLAY"}` or `{"type":"NEXTTRACK","head":3}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    /// Playback started or resumed.
    #[serde(rename = "PLAY")]
    Play,

    #[serde(rename = "PAUSE")]
    Pause,

    /// Every queued track has been played.
    #[serde(rename = "STOP")]
    Stop,

    #[serde(rename = "ARCHIVED")]
    Archived,

    /// An archived session was brought back to STOP.
    #[serde(rename = "UNARCHIVE")]
    Unarchive,

    /// The queue head moved.
    #[serde(rename = "NEXTTRACK")]
    NextTrack {
        /// New queue head index.
        head: usize,
    },

    /// The device drifted from the session; clients should refetch state.
    #[serde(rename = "INTERRUPT")]
    Interrupt,

    /// A track was appended to the queue.
    #[serde(rename = "ADDTRACK")]
    AddTrack,
}

/// An event addressed to every connection watching one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushMessage {
    pub session_id: String,
    pub event: SessionEvent,
}

impl PushMessage {
    pub fn new(session_id: impl Into<String>, event: SessionEvent) -> Self {
        Self {
            session_id: session_id.into(),
            event,
        }
    }
}
