//! The two halves of a session WebSocket.
//!
//! - [`run_send_loop`]: writes hub events as JSON text frames and pings
//! - [`run_read_loop`]: drains client frames and enforces the pong deadline
//!
//! Both are generic over the socket halves so they can be driven by plain
//! channels in tests.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use crate::events::SessionEvent;

/// Why the send half stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendExit {
    /// The hub dropped this connection (shutdown); a Close frame was sent.
    HubClosed,
    /// The socket rejected a write.
    WriteFailed,
    /// A write did not complete within the write timeout.
    WriteTimeout,
}

/// Why the read half stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadExit {
    /// The client closed the socket.
    Closed,
    /// No pong arrived before the deadline.
    PongTimeout,
    /// The socket reported a protocol or transport error.
    Error,
}

/// Writes one frame, bounded by `write_timeout`.
async fn write<S>(sink: &mut S, message: Message, write_timeout: Duration) -> Result<(), SendExit>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    match tokio::time::timeout(write_timeout, sink.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            log::debug!("[WS] Write failed: {}", e);
            Err(SendExit::WriteFailed)
        }
        Err(_) => Err(SendExit::WriteTimeout),
    }
}

/// Forwards events to the client until the hub closes the channel or a write fails.
pub async fn run_send_loop<S>(
    sink: &mut S,
    events: &mut mpsc::Receiver<Arc<SessionEvent>>,
    ping_interval: Duration,
    write_timeout: Duration,
) -> SendExit
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let mut ping = tokio::time::interval_at(Instant::now() + ping_interval, ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let result = tokio::select! {
            event = events.recv() => match event {
                Some(event) => match serde_json::to_string(&*event) {
                    Ok(json) => write(sink, Message::Text(json.into()), write_timeout).await,
                    Err(e) => {
                        log::warn!("[WS] Failed to serialize {:?}: {}", event, e);
                        Ok(())
                    }
                },
                None => {
                    // Peer may already be gone; the loop ends either way.
                    let _ = write(sink, Message::Close(None), write_timeout).await;
                    return SendExit::HubClosed;
                }
            },
            _ = ping.tick() => write(sink, Message::Ping(Default::default()), write_timeout).await,
        };

        if let Err(exit) = result {
            return exit;
        }
    }
}

/// Reads client frames until close, error or a missed pong.
///
/// Clients only ever send control frames; anything else is ignored. Only a
/// pong pushes the deadline forward.
pub async fn run_read_loop<S, E>(stream: &mut S, pong_timeout: Duration) -> ReadExit
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let mut deadline = Instant::now() + pong_timeout;

    loop {
        match tokio::time::timeout_at(deadline, stream.next()).await {
            Err(_) => return ReadExit::PongTimeout,
            Ok(None) | Ok(Some(Ok(Message::Close(_)))) => return ReadExit::Closed,
            Ok(Some(Err(e))) => {
                log::debug!("[WS] Read failed: {}", e);
                return ReadExit::Error;
            }
            Ok(Some(Ok(Message::Pong(_)))) => deadline = Instant::now() + pong_timeout,
            Ok(Some(Ok(_))) => {}
        }
    }
}
