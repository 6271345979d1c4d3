//! Event hub: a single-task actor fanning session events out to connections.
//!
//! The actor owns the session → connections map outright. Handles talk to it
//! over three mailboxes (register, unregister, push) and never touch the map,
//! so no lock is needed. Pushes for one session reach every registered
//! connection in the order they were sent.
//!
//! Each [`Connection`] owns a bounded receiver and a [`ConnectionGuard`]; the
//! guard sends exactly one unregister when the connection is dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::{EventPusher, PushMessage, SessionEvent};
use crate::runtime::TaskSpawner;

/// Identifier of one registered connection.
pub type ConnectionId = u64;

type Outgoing = mpsc::Sender<Arc<SessionEvent>>;

struct Registration {
    session_id: String,
    connection_id: ConnectionId,
    outgoing: Outgoing,
    registered: oneshot::Sender<()>,
}

struct Unregistration {
    session_id: String,
    connection_id: ConnectionId,
}

// ─────────────────────────────────────────────────────────────────────────────
// Handle
// ─────────────────────────────────────────────────────────────────────────────

/// Cloneable handle to the hub actor.
#[derive(Clone)]
pub struct EventHub {
    register_tx: mpsc::UnboundedSender<Registration>,
    unregister_tx: mpsc::UnboundedSender<Unregistration>,
    push_tx: mpsc::UnboundedSender<PushMessage>,
    next_id: Arc<AtomicU64>,
    connection_buffer: usize,
}

impl EventHub {
    /// Creates a hub handle and the actor that must be run for it to work.
    pub fn new(connection_buffer: usize) -> (Self, HubActor) {
        let (register_tx, register_rx) = mpsc::unbounded_channel();
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();
        let (push_tx, push_rx) = mpsc::unbounded_channel();

        let hub = Self {
            register_tx,
            unregister_tx,
            push_tx,
            next_id: Arc::new(AtomicU64::new(1)),
            connection_buffer: connection_buffer.max(1),
        };
        let actor = HubActor {
            register_rx,
            unregister_rx,
            push_rx,
            sessions: HashMap::new(),
        };
        (hub, actor)
    }

    /// Creates a hub and spawns its actor, which runs until `cancel` fires.
    pub fn start(
        connection_buffer: usize,
        spawner: &impl TaskSpawner,
        cancel: CancellationToken,
    ) -> Self {
        let (hub, actor) = Self::new(connection_buffer);
        spawner.spawn(actor.run(cancel));
        hub
    }

    /// Registers a new connection watching `session_id`.
    ///
    /// Resolves once the actor has recorded the connection, so any push
    /// sent afterwards is delivered to it. Returns `None` if the actor has
    /// stopped.
    pub async fn register(&self, session_id: &str) -> Option<Connection> {
        let connection_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (outgoing, receiver) = mpsc::channel(self.connection_buffer);
        let (registered, ack) = oneshot::channel();

        self.register_tx
            .send(Registration {
                session_id: session_id.to_string(),
                connection_id,
                outgoing,
                registered,
            })
            .ok()?;
        ack.await.ok()?;

        Some(Connection {
            receiver,
            guard: ConnectionGuard {
                id: connection_id,
                session_id: session_id.to_string(),
                unregister_tx: self.unregister_tx.clone(),
            },
        })
    }
}

impl EventPusher for EventHub {
    fn push(&self, message: PushMessage) {
        tracing::debug!(session_id = %message.session_id, event = ?message.event, "session_event");
        if self.push_tx.send(message).is_err() {
            log::warn!("[Hub] Push dropped: hub is not running");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection
// ─────────────────────────────────────────────────────────────────────────────

/// A registered watcher of one session.
pub struct Connection {
    receiver: mpsc::Receiver<Arc<SessionEvent>>,
    guard: ConnectionGuard,
}

impl Connection {
    pub fn id(&self) -> ConnectionId {
        self.guard.id
    }

    pub fn session_id(&self) -> &str {
        &self.guard.session_id
    }

    /// Waits for the next event. `None` once the hub has dropped this
    /// connection's sender (hub shutdown).
    pub async fn recv(&mut self) -> Option<Arc<SessionEvent>> {
        self.receiver.recv().await
    }

    /// Splits into the outgoing receiver and the guard that keeps the
    /// registration alive.
    pub fn into_parts(self) -> (mpsc::Receiver<Arc<SessionEvent>>, ConnectionGuard) {
        (self.receiver, self.guard)
    }
}

/// RAII guard that unregisters a connection when dropped.
///
/// This ensures connections are always cleaned up, even if the handler
/// panics or exits early.
pub struct ConnectionGuard {
    id: ConnectionId,
    session_id: String,
    unregister_tx: mpsc::UnboundedSender<Unregistration>,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        // Hub may already be gone during shutdown; nothing left to clean.
        let _ = self.unregister_tx.send(Unregistration {
            session_id: std::mem::take(&mut self.session_id),
            connection_id: self.id,
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Actor
// ─────────────────────────────────────────────────────────────────────────────

/// The hub's message loop. Owns the registration map.
pub struct HubActor {
    register_rx: mpsc::UnboundedReceiver<Registration>,
    unregister_rx: mpsc::UnboundedReceiver<Unregistration>,
    push_rx: mpsc::UnboundedReceiver<PushMessage>,
    sessions: HashMap<String, HashMap<ConnectionId, Outgoing>>,
}

impl HubActor {
    /// Services one mailbox message per iteration until cancelled or every
    /// handle is dropped.
    pub async fn run(mut self, cancel: CancellationToken) {
        log::info!("[Hub] Started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(registration) = self.register_rx.recv() => self.register(registration),
                Some(unregistration) = self.unregister_rx.recv() => self.unregister(unregistration),
                Some(message) = self.push_rx.recv() => self.push(message),
                else => break,
            }
        }
        log::info!(
            "[Hub] Stopped ({} connection(s) dropped)",
            self.connection_total()
        );
    }

    fn register(&mut self, registration: Registration) {
        let Registration {
            session_id,
            connection_id,
            outgoing,
            registered,
        } = registration;

        let connections = self.sessions.entry(session_id.clone()).or_default();
        connections.insert(connection_id, outgoing);
        log::info!(
            "[Hub] Connection {} registered for session {} (watching: {})",
            connection_id,
            session_id,
            connections.len()
        );
        // Caller may have given up waiting; the guard will unregister.
        let _ = registered.send(());
    }

    fn unregister(&mut self, unregistration: Unregistration) {
        let Unregistration {
            session_id,
            connection_id,
        } = unregistration;

        let Some(connections) = self.sessions.get_mut(&session_id) else {
            return;
        };
        if connections.remove(&connection_id).is_some() {
            log::info!(
                "[Hub] Connection {} unregistered from session {} (remaining: {})",
                connection_id,
                session_id,
                connections.len()
            );
        }
        if connections.is_empty() {
            self.sessions.remove(&session_id);
        }
    }

    fn push(&mut self, message: PushMessage) {
        let Some(connections) = self.sessions.get(&message.session_id) else {
            log::debug!(
                "[Hub] No watchers for session {}, dropping {:?}",
                message.session_id,
                message.event
            );
            return;
        };

        let event = Arc::new(message.event);
        for (connection_id, outgoing) in connections {
            match outgoing.try_send(Arc::clone(&event)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    log::warn!(
                        "[Hub] Connection {} buffer full, dropping {:?}",
                        connection_id,
                        event
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    // Its guard unregisters it shortly.
                    log::debug!("[Hub] Connection {} already closed", connection_id);
                }
            }
        }
    }

    /// Number of connections watching `session_id`.
    pub fn connection_count(&self, session_id: &str) -> usize {
        self.sessions.get(session_id).map_or(0, HashMap::len)
    }

    fn connection_total(&self) -> usize {
        self.sessions.values().map(HashMap::len).sum()
    }
}
