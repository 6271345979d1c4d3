//! Application services layer.
//!
//! This module contains the session logic that sits between the API layer
//! and the infrastructure (player/, repository/, events/).

pub mod session_service;
pub mod state_controller;
pub mod sync_engine;
pub mod timer_registry;

pub use session_service::{SessionService, SessionSnapshot};
pub use state_controller::StateController;
pub use sync_engine::SyncEngine;
pub use timer_registry::{SyncTimer, TimerId, TimerOwnership, TimerRegistry};
