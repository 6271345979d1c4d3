//! Per-session cancellable timers driving the sync loop.
//!
//! Each playing session owns at most one [`SyncTimer`]. The timer carries
//! three signals the loop selects on: expiry of the current deadline, a
//! sticky stop, and a coalescing skip request. The loop re-arms the same
//! timer for each phase, so the registry entry identifies the loop that owns
//! the session for as long as that loop lives.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Identifier distinguishing successive timers of the same session.
pub type TimerId = u64;

struct TimerInner {
    id: TimerId,
    deadline: Mutex<Instant>,
    expired: AtomicBool,
    stop: CancellationToken,
    skip: Notify,
}

/// A cancellable countdown owned by one sync loop.
#[derive(Clone)]
pub struct SyncTimer {
    inner: Arc<TimerInner>,
}

impl SyncTimer {
    fn new(id: TimerId, duration: Duration) -> Self {
        Self {
            inner: Arc::new(TimerInner {
                id,
                deadline: Mutex::new(Instant::now() + duration),
                expired: AtomicBool::new(false),
                stop: CancellationToken::new(),
                skip: Notify::new(),
            }),
        }
    }

    pub fn id(&self) -> TimerId {
        self.inner.id
    }

    pub fn deadline(&self) -> Instant {
        *self.inner.deadline.lock()
    }

    /// Resolves when the current deadline passes.
    ///
    /// The deadline is read once per call; callers re-arm and then call again.
    pub async fn expired(&self) {
        tokio::time::sleep_until(self.deadline()).await;
    }

    /// Resolves once the timer has been stopped. Stays resolved afterwards.
    pub async fn stopped(&self) {
        self.inner.stop.cancelled().await;
    }

    /// Resolves when a skip has been requested.
    ///
    /// Requests made while nobody is waiting are kept (at most one), so a
    /// skip issued mid-tick is picked up on the next wait.
    pub async fn skip_requested(&self) {
        self.inner.skip.notified().await;
    }

    /// Starts a new countdown of `duration` from now.
    pub fn rearm(&self, duration: Duration) {
        *self.inner.deadline.lock() = Instant::now() + duration;
        self.inner.expired.store(false, Ordering::SeqCst);
    }

    /// Marks the current countdown as consumed.
    pub fn mark_expired(&self) {
        self.inner.expired.store(true, Ordering::SeqCst);
    }

    pub fn is_expired(&self) -> bool {
        self.inner.expired.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stop.is_cancelled()
    }

    /// Stops the timer. Idempotent.
    fn stop(&self) {
        self.inner.stop.cancel();
    }

    fn request_skip(&self) {
        self.inner.skip.notify_one();
    }
}

impl std::fmt::Debug for SyncTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncTimer")
            .field("id", &self.id())
            .field("expired", &self.is_expired())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// How a timer relates to the session's current registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOwnership {
    /// The entry is this timer.
    Owned,
    /// No entry exists (the loop's bookkeeping was deleted, e.g. on archival).
    Detached,
    /// Another timer has replaced this one.
    Superseded,
}

/// Registry of live sync timers keyed by session ID.
///
/// All operations are synchronous and safe to call from any task.
pub struct TimerRegistry {
    timers: Mutex<HashMap<String, SyncTimer>>,
    next_id: AtomicU64,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self {
            timers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a new timer for `session_id`, stopping any existing one.
    pub fn create_timer(&self, session_id: &str, duration: Duration) -> SyncTimer {
        let timer = SyncTimer::new(self.next_id.fetch_add(1, Ordering::Relaxed), duration);
        let previous = self
            .timers
            .lock()
            .insert(session_id.to_string(), timer.clone());
        if let Some(previous) = previous {
            log::debug!(
                "[Sync] Replacing timer {} for session {}",
                previous.id(),
                session_id
            );
            previous.stop();
        }
        timer
    }

    pub fn get_timer(&self, session_id: &str) -> Option<SyncTimer> {
        self.timers.lock().get(session_id).cloned()
    }

    pub fn exists(&self, session_id: &str) -> bool {
        self.timers.lock().contains_key(session_id)
    }

    /// Stops and removes the session's timer. No-op when none exists.
    pub fn stop_timer(&self, session_id: &str) -> bool {
        match self.timers.lock().remove(session_id) {
            Some(timer) => {
                timer.stop();
                true
            }
            None => false,
        }
    }

    /// Removes the session's timer without signalling its loop.
    ///
    /// The loop keeps running until its next wake-up, where it finds its
    /// entry gone and re-reads the session before deciding what to do.
    pub fn delete_timer(&self, session_id: &str) -> bool {
        self.timers.lock().remove(session_id).is_some()
    }

    /// Asks the session's loop to skip to the next track.
    ///
    /// Returns `false` when no loop is registered for the session.
    pub fn request_skip(&self, session_id: &str) -> bool {
        match self.timers.lock().get(session_id) {
            Some(timer) => {
                timer.request_skip();
                true
            }
            None => false,
        }
    }

    pub fn ownership(&self, session_id: &str, timer: &SyncTimer) -> TimerOwnership {
        match self.timers.lock().get(session_id) {
            Some(current) if current.id() == timer.id() => TimerOwnership::Owned,
            Some(_) => TimerOwnership::Superseded,
            None => TimerOwnership::Detached,
        }
    }

    /// Retires the timer's current countdown after it fired.
    ///
    /// Returns `false` if the loop that owns `timer` must exit instead of
    /// acting on the expiry: the timer was stopped or another timer now owns
    /// the session.
    pub fn retire(&self, session_id: &str, timer: &SyncTimer) -> bool {
        timer.mark_expired();
        !timer.is_stopped() && self.ownership(session_id, timer) != TimerOwnership::Superseded
    }

    /// Removes `timer`'s entry if it is still the registered one.
    pub fn release(&self, session_id: &str, timer: &SyncTimer) {
        let mut timers = self.timers.lock();
        if timers.get(session_id).map(SyncTimer::id) == Some(timer.id()) {
            timers.remove(session_id);
        }
    }

    /// Stops every registered timer. Returns how many were stopped.
    pub fn stop_all(&self) -> usize {
        let drained: Vec<SyncTimer> = self.timers.lock().drain().map(|(_, t)| t).collect();
        for timer in &drained {
            timer.stop();
        }
        drained.len()
    }

    pub fn len(&self) -> usize {
        self.timers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.lock().is_empty()
    }
}

impl Default for TimerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn timer_expires_after_duration() {
        let registry = TimerRegistry::new();
        let timer = registry.create_timer("s1", Duration::from_secs(10));
        let start = Instant::now();

        timer.expired().await;

        assert!(start.elapsed() >= Duration::from_secs(10));
        assert!(registry.exists("s1"));
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_wins_over_later_expiry() {
        let registry = TimerRegistry::new();
        let timer = registry.create_timer("s1", Duration::from_secs(10));
        registry.stop_timer("s1");

        let fired = tokio::select! {
            _ = timer.stopped() => "stopped",
            _ = timer.expired() => "expired",
        };

        assert_eq!(fired, "stopped");
        assert!(!registry.exists("s1"));
    }

    #[test]
    fn stop_twice_is_safe() {
        let registry = TimerRegistry::new();
        let timer = registry.create_timer("s1", Duration::from_secs(1));

        assert!(registry.stop_timer("s1"));
        assert!(!registry.stop_timer("s1"));
        assert!(timer.is_stopped());
    }

    #[test]
    fn create_replaces_and_stops_previous() {
        let registry = TimerRegistry::new();
        let first = registry.create_timer("s1", Duration::from_secs(1));
        let second = registry.create_timer("s1", Duration::from_secs(1));

        assert!(first.is_stopped());
        assert!(!second.is_stopped());
        assert_ne!(first.id(), second.id());
        assert_eq!(registry.get_timer("s1").map(|t| t.id()), Some(second.id()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn delete_does_not_stop() {
        let registry = TimerRegistry::new();
        let timer = registry.create_timer("s1", Duration::from_secs(1));

        assert!(registry.delete_timer("s1"));

        assert!(!timer.is_stopped());
        assert_eq!(registry.ownership("s1", &timer), TimerOwnership::Detached);
        assert!(registry.retire("s1", &timer));
    }

    #[test]
    fn retire_fails_for_superseded_or_stopped_timers() {
        let registry = TimerRegistry::new();
        let old = registry.create_timer("s1", Duration::from_secs(1));
        let new = registry.create_timer("s1", Duration::from_secs(1));

        assert!(!registry.retire("s1", &old));
        assert!(registry.retire("s1", &new));
        assert!(new.is_expired());

        new.rearm(Duration::from_secs(1));
        assert!(!new.is_expired());

        registry.stop_timer("s1");
        assert!(!registry.retire("s1", &new));
    }

    #[test]
    fn release_only_removes_own_entry() {
        let registry = TimerRegistry::new();
        let old = registry.create_timer("s1", Duration::from_secs(1));
        let new = registry.create_timer("s1", Duration::from_secs(1));

        registry.release("s1", &old);
        assert!(registry.exists("s1"));

        registry.release("s1", &new);
        assert!(!registry.exists("s1"));
    }

    #[tokio::test(start_paused = true)]
    async fn skip_requests_coalesce() {
        let registry = TimerRegistry::new();
        let timer = registry.create_timer("s1", Duration::from_secs(60));

        assert!(registry.request_skip("s1"));
        assert!(registry.request_skip("s1"));
        assert!(!registry.request_skip("other"));

        timer.skip_requested().await;
        let second = tokio::time::timeout(Duration::from_secs(1), timer.skip_requested()).await;
        assert!(second.is_err());
    }

    #[test]
    fn stop_all_drains_registry() {
        let registry = TimerRegistry::new();
        let a = registry.create_timer("a", Duration::from_secs(1));
        let b = registry.create_timer("b", Duration::from_secs(1));

        assert_eq!(registry.stop_all(), 2);

        assert!(a.is_stopped() && b.is_stopped());
        assert!(registry.is_empty());
    }
}
