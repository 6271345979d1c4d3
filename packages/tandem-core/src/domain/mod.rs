//! Domain model: sessions, their queue, and device playback snapshots.

pub mod session;
pub mod track;

pub use session::{QueueTrack, Session, SessionError, StateType};
pub use track::{CurrentPlayingInfo, Track};
