//! Tandem Core - shared playback sessions kept in step with a remote player.
//!
//! A session owns an ordered track queue and drives one playback device
//! through a streaming service's Web API. Every participant sees the same
//! queue and state, and a background loop per playing session follows the
//! device from track to track.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`domain`]: The session state machine and track types
//! - [`repository`]: Session storage with per-session locking
//! - [`player`]: Remote player client (reqwest)
//! - [`services`]: Sync engine, timers, state transitions and session operations
//! - [`events`]: Event hub fanning session events out to WebSocket clients
//! - [`api`]: HTTP/WebSocket handlers
//! - [`runtime`]: Task spawning abstraction for tracked background work
//! - [`state`]: Configuration
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! - [`Player`](player::Player): The remote device API
//! - [`SessionRepository`](repository::SessionRepository): Session storage
//! - [`EventPusher`](events::EventPusher): Publishing session events
//! - [`TaskSpawner`](runtime::TaskSpawner): Spawning background tasks

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod domain;
pub mod error;
pub mod events;
pub mod player;
pub mod protocol_constants;
pub mod repository;
pub mod runtime;
pub mod services;
pub mod state;
pub mod utils;

#[cfg(test)]
mod test_fixtures;

// Re-export commonly used types at the crate root
pub use domain::{CurrentPlayingInfo, QueueTrack, Session, SessionError, StateType, Track};
pub use error::{ErrorCode, TandemError, TandemResult};
pub use events::{EventHub, EventPusher, PushMessage, SessionEvent};
pub use player::{Player, PlayerError, PlayerResult, WebApiPlayer};
pub use repository::{InMemorySessionRepository, RepositoryError, SessionRepository};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use services::{SessionService, StateController, SyncEngine, TimerRegistry};
pub use state::{Config, SyncConfig};
pub use utils::now_millis;

// Re-export bootstrap types
pub use bootstrap::{bootstrap_services, create_player, BootstrappedServices};

// Re-export API types
pub use api::{start_server, AppState, AppStateBuilder, ServerError};
