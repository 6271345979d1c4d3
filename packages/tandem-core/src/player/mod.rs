//! Remote player integration.
//!
//! - [`traits`]: the capabilities services depend on
//! - [`client`]: `reqwest` implementation with error classification
//! - [`retry`]: backoff for transient HTTP failures

pub mod client;
mod retry;
pub mod traits;

pub use client::{PlayerError, PlayerResult, WebApiPlayer};
pub use traits::{PlayRequest, PlaybackControl, PlaybackModes, PlaybackQuery, Player, QueueControl};
