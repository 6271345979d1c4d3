//! HTTP route handlers.
//!
//! All handlers are thin - they delegate to services for business logic.
//! The acting user is taken from the `X-User-Id` header.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderName, Method},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::response::{api_ok, api_success};
use crate::api::ws::ws_handler;
use crate::api::AppState;
use crate::domain::{CurrentPlayingInfo, QueueTrack, Session, StateType};
use crate::error::{TandemError, TandemResult};
use crate::protocol_constants::{APP_NAME, USER_ID_HEADER};
use crate::services::SessionSnapshot;

// ─────────────────────────────────────────────────────────────────────────────
// Request Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest {
    name: String,
    #[serde(alias = "device_id")]
    device_id: String,
    #[serde(default, alias = "allow_to_control_by_others")]
    allow_to_control_by_others: bool,
}

#[derive(Deserialize)]
struct ChangeStateRequest {
    state: String,
}

#[derive(Deserialize)]
struct AddTrackRequest {
    uri: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetDeviceRequest {
    #[serde(alias = "device_id")]
    device_id: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Response Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    id: String,
    name: String,
    creator_id: String,
    device_id: String,
    state: StateType,
    queue_tracks: Vec<QueueTrack>,
    queue_head: usize,
    allow_to_control_by_others: bool,
    progress_when_paused_ms: u64,
    expired_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    playing: Option<CurrentPlayingInfo>,
}

impl SessionResponse {
    fn new(session: Session, playing: Option<CurrentPlayingInfo>) -> Self {
        Self {
            progress_when_paused_ms: session.progress_when_paused.as_millis() as u64,
            id: session.id,
            name: session.name,
            creator_id: session.creator_id,
            device_id: session.device_id,
            state: session.state,
            queue_tracks: session.queue_tracks,
            queue_head: session.queue_head,
            allow_to_control_by_others: session.allow_to_control_by_others,
            expired_at: session.expired_at,
            playing,
        }
    }
}

impl From<Session> for SessionResponse {
    fn from(session: Session) -> Self {
        Self::new(session, None)
    }
}

impl From<SessionSnapshot> for SessionResponse {
    fn from(snapshot: SessionSnapshot) -> Self {
        Self::new(snapshot.session, snapshot.playing)
    }
}

/// Extracts the acting user from the request headers.
fn user_id(headers: &HeaderMap) -> TandemResult<String> {
    match headers.get(USER_ID_HEADER).and_then(|v| v.to_str().ok()) {
        Some(user) if !user.trim().is_empty() => Ok(user.trim().to_string()),
        _ => Err(TandemError::InvalidRequest(format!(
            "missing {} header",
            USER_ID_HEADER
        ))),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(USER_ID_HEADER)]);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/{id}", get(get_session))
        .route("/api/sessions/{id}/state", put(change_state))
        .route("/api/sessions/{id}/next", post(next_track))
        .route("/api/sessions/{id}/queue", post(add_queue_track))
        .route("/api/sessions/{id}/device", put(set_device))
        .route("/api/batch/archive", post(archive_expired))
        .route("/ws/{id}", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Liveness probe.
async fn health_check() -> impl IntoResponse {
    api_success(json!({
        "status": "ok",
        "service": APP_NAME,
    }))
}

async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateSessionRequest>,
) -> TandemResult<impl IntoResponse> {
    let creator = user_id(&headers)?;
    let session = state
        .session_service
        .create_session(
            &payload.name,
            &creator,
            &payload.device_id,
            payload.allow_to_control_by_others,
        )
        .await?;
    Ok(api_success(SessionResponse::from(session)))
}

/// Returns the session, reconciled against its device when playing.
async fn get_session(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> TandemResult<impl IntoResponse> {
    let snapshot = state.session_service.get_session(&id).await?;
    Ok(api_success(SessionResponse::from(snapshot)))
}

async fn change_state(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ChangeStateRequest>,
) -> TandemResult<impl IntoResponse> {
    let user = user_id(&headers)?;
    let target: StateType = payload.state.parse()?;
    let session = state
        .state_controller
        .change_state(&id, &user, target)
        .await?;
    Ok(api_success(SessionResponse::from(session)))
}

async fn next_track(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> TandemResult<impl IntoResponse> {
    let user = user_id(&headers)?;
    let session = state.session_service.next_track(&id, &user).await?;
    Ok(api_success(SessionResponse::from(session)))
}

async fn add_queue_track(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<AddTrackRequest>,
) -> TandemResult<impl IntoResponse> {
    let user = user_id(&headers)?;
    let session = state
        .session_service
        .add_queue_track(&id, &user, &payload.uri)
        .await?;
    Ok(api_success(SessionResponse::from(session)))
}

async fn set_device(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SetDeviceRequest>,
) -> TandemResult<impl IntoResponse> {
    let user = user_id(&headers)?;
    state
        .session_service
        .set_device(&id, &user, &payload.device_id)
        .await?;
    Ok(api_ok())
}

async fn archive_expired(State(state): State<AppState>) -> TandemResult<impl IntoResponse> {
    let archived = state.session_service.archive_expired().await?;
    Ok(api_success(json!({
        "archived": archived.len(),
        "sessionIds": archived,
    })))
}
