//! WebSocket endpoint for watching one session.
//!
//! Clients connect to `/ws/{id}` and receive every event pushed for that
//! session. The connection is registered with the hub before the upgrade
//! completes, so no event sent after the handshake can be missed.

use std::time::Duration;

use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
};
use futures::StreamExt;

use crate::api::ws_connection::{run_read_loop, run_send_loop};
use crate::api::AppState;
use crate::error::{TandemError, TandemResult};
use crate::events::Connection;
use crate::protocol_constants::{WS_MAX_MESSAGE_SIZE, WS_WRITE_TIMEOUT_SECS};

/// WebSocket upgrade handler.
///
/// Unknown sessions are rejected with 404 before upgrading. A session still
/// marked PLAY without a running loop (e.g. after a restart) gets one here.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> TandemResult<impl IntoResponse> {
    state
        .session_service
        .ensure_sync_running(&session_id)
        .await?;

    let connection = state
        .hub
        .register(&session_id)
        .await
        .ok_or_else(|| TandemError::Internal("event hub is not running".into()))?;

    let ping_interval = Duration::from_secs(state.config.ws_ping_interval_secs);
    let pong_timeout = Duration::from_secs(state.config.ws_pong_timeout_secs);

    Ok(ws
        .max_message_size(WS_MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_ws(socket, connection, ping_interval, pong_timeout)))
}

/// Runs both halves of the socket until either one stops.
async fn handle_ws(
    socket: WebSocket,
    connection: Connection,
    ping_interval: Duration,
    pong_timeout: Duration,
) {
    let session_id = connection.session_id().to_string();
    let (mut events, guard) = connection.into_parts();
    let (mut sender, mut receiver) = socket.split();

    log::info!(
        "[WS] Connection {} watching session {}",
        guard.id(),
        session_id
    );

    tokio::select! {
        exit = run_send_loop(
            &mut sender,
            &mut events,
            ping_interval,
            Duration::from_secs(WS_WRITE_TIMEOUT_SECS),
        ) => {
            log::info!("[WS] Connection {} send side ended: {:?}", guard.id(), exit);
        }
        exit = run_read_loop(&mut receiver, pong_timeout) => {
            log::info!("[WS] Connection {} read side ended: {:?}", guard.id(), exit);
        }
    }

    // Dropping the guard unregisters from the hub.
    drop(guard);
}
