//! Centralized error types for the Tandem core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::domain::SessionError;
use crate::player::PlayerError;
use crate::repository::RepositoryError;

/// Trait for error types that provide machine-readable error codes.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

impl ErrorCode for SessionError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::NotAllowed(_) => "not_allowed",
            Self::QueueTrackNotFound(_) => "queue_track_not_found",
            Self::AllTracksFinished => "all_tracks_finished",
            Self::PlayingDifferentTrack { .. } => "playing_different_track",
            Self::UnknownState(_) => "unknown_state",
        }
    }
}

impl ErrorCode for PlayerError {
    fn code(&self) -> &'static str {
        match self {
            Self::NoActiveDevice => "no_active_device",
            Self::NotPremium => "not_premium",
            Self::Unauthorized => "player_unauthorized",
            Self::RateLimited => "player_rate_limited",
            Self::HttpStatus(_, _) => "player_http_status",
            Self::Http(_) => "player_request_failed",
            Self::Decode(_) => "player_decode_failed",
            Self::SkipLimitExceeded(_) => "skip_limit_exceeded",
        }
    }
}

impl ErrorCode for RepositoryError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "session_not_found",
            Self::AlreadyExists(_) => "session_already_exists",
        }
    }
}

/// Application-wide error type for the Tandem server.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum TandemError {
    /// Requested session ID does not exist.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// State change or command not legal in the session's current state.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Acting user may not control the session.
    #[error("Not allowed: {0}")]
    NotAllowed(String),

    /// Playback requested but no track sits at the queue head.
    #[error("Empty queue: {0}")]
    EmptyQueue(String),

    /// Client sent an invalid or malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The session's device is not active on the remote player.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// The remote account cannot be controlled through the API.
    #[error("Not premium: {0}")]
    NotPremium(String),

    /// Any other remote player failure.
    #[error("Player error: {0}")]
    Player(String),

    /// Storage failure.
    #[error("Repository error: {0}")]
    Repository(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TandemError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => "session_not_found",
            Self::InvalidTransition(_) => "invalid_transition",
            Self::NotAllowed(_) => "not_allowed",
            Self::EmptyQueue(_) => "empty_queue",
            Self::InvalidRequest(_) => "invalid_request",
            Self::DeviceNotFound(_) => "device_not_found",
            Self::NotPremium(_) => "not_premium",
            Self::Player(_) => "player_error",
            Self::Repository(_) => "repository_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidTransition(_)
            | Self::NotAllowed(_)
            | Self::EmptyQueue(_)
            | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::DeviceNotFound(_) | Self::NotPremium(_) => StatusCode::FORBIDDEN,
            Self::Player(_) => StatusCode::BAD_GATEWAY,
            Self::Repository(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type TandemResult<T> = Result<T, TandemError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for TandemError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<SessionError> for TandemError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotAllowed(_) => Self::NotAllowed(err.to_string()),
            SessionError::QueueTrackNotFound(_) | SessionError::AllTracksFinished => {
                Self::EmptyQueue(err.to_string())
            }
            SessionError::UnknownState(_) => Self::InvalidRequest(err.to_string()),
            SessionError::InvalidTransition { .. } | SessionError::PlayingDifferentTrack { .. } => {
                Self::InvalidTransition(err.to_string())
            }
        }
    }
}

impl From<PlayerError> for TandemError {
    fn from(err: PlayerError) -> Self {
        match err {
            PlayerError::NoActiveDevice => Self::DeviceNotFound(err.to_string()),
            PlayerError::NotPremium => Self::NotPremium(err.to_string()),
            _ => Self::Player(err.to_string()),
        }
    }
}

impl From<RepositoryError> for TandemError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(id) => Self::SessionNotFound(id),
            RepositoryError::AlreadyExists(_) => Self::Repository(err.to_string()),
        }
    }
}
