//! Event pusher abstraction for decoupling services from transport.
//!
//! Services depend on the [`EventPusher`] trait rather than on the hub, so
//! they can be tested with a recording pusher.

use super::PushMessage;

/// Trait for publishing session events without knowledge of transport.
///
/// `push` never blocks: implementations must hand the message off (or drop
/// it) synchronously, since it is called while a session lock is held.
///
/// # Example
///
/// ```ignore
/// struct MyService {
///     pusher: Arc<dyn EventPusher>,
/// }
///
/// impl MyService {
///     fn on_paused(&self, session_id: &str) {
///         self.pusher.push(PushMessage::new(session_id, SessionEvent::Pause));
///     }
/// }
/// ```
pub trait EventPusher: Send + Sync {
    /// Publishes an event to everyone watching `message.session_id`.
    fn push(&self, message: PushMessage);
}
