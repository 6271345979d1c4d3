//! Track-end reconciliation loop.
//!
//! One loop runs per session in PLAY. It waits on the session's
//! [`SyncTimer`], advances the queue when the device should have finished
//! the current track, and checks that the device really is playing what the
//! session expects. Any mismatch stops the session and broadcasts INTERRUPT
//! instead of fighting the user over the device.
//!
//! Phases of one loop:
//!
//! ```text
//! Verify ──(remain − margin)──> TrackEnd ──(grace)──> Advance ──┐
//!   ^                                                           │
//!   └────────────── re-arm with fresh remaining time ───────────┘
//! ```
//!
//! A skip request jumps straight to the device skip and advance, then
//! verifies after a short settle delay.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::StateType;
use crate::error::TandemResult;
use crate::events::{EventPusher, PushMessage, SessionEvent};
use crate::player::{Player, PlayerError};
use crate::repository::{LockedSession, SessionRepository};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::state::SyncConfig;
use crate::utils::expiry_from_now;

use super::timer_registry::{SyncTimer, TimerOwnership, TimerRegistry};

/// What the loop waits for on its current countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Check the device; push NEXTTRACK first if `announce`.
    Verify { announce: bool },
    /// The current track is about to end.
    TrackEnd,
    /// Grace period after track end has passed; move the queue forward.
    Advance,
}

#[derive(Debug)]
enum Tick {
    Continue(Phase),
    Exit(&'static str),
}

/// Spawns and runs the per-session reconciliation loops.
pub struct SyncEngine {
    repo: Arc<dyn SessionRepository>,
    player: Arc<dyn Player>,
    pusher: Arc<dyn EventPusher>,
    timers: Arc<TimerRegistry>,
    spawner: TokioSpawner,
    config: SyncConfig,
    session_ttl: Duration,
}

impl SyncEngine {
    pub fn new(
        repo: Arc<dyn SessionRepository>,
        player: Arc<dyn Player>,
        pusher: Arc<dyn EventPusher>,
        timers: Arc<TimerRegistry>,
        spawner: TokioSpawner,
        config: SyncConfig,
        session_ttl: Duration,
    ) -> Self {
        Self {
            repo,
            player,
            pusher,
            timers,
            spawner,
            config,
            session_ttl,
        }
    }

    /// Launches a loop for `session_id`, replacing any loop already running.
    ///
    /// The timer is registered before this returns, so callers holding the
    /// session lock know the new loop owns the session once they release it.
    pub fn start(self: &Arc<Self>, session_id: &str) {
        let timer = self
            .timers
            .create_timer(session_id, self.config.settle_delay());
        log::debug!(
            "[Sync] Starting loop {} for session {}",
            timer.id(),
            session_id
        );

        let engine = Arc::clone(self);
        let session_id = session_id.to_string();
        self.spawner.spawn(async move {
            engine.run(session_id, timer).await;
        });
    }

    async fn run(&self, session_id: String, timer: SyncTimer) {
        let mut phase = Phase::Verify { announce: false };

        loop {
            let result = tokio::select! {
                biased;
                _ = timer.stopped() => Ok(Tick::Exit("stopped")),
                _ = timer.skip_requested(), if phase != Phase::Advance => {
                    self.on_skip(&session_id, &timer).await
                }
                _ = timer.expired() => self.on_expired(&session_id, &timer, phase).await,
            };

            match result {
                Ok(Tick::Continue(next)) => phase = next,
                Ok(Tick::Exit(reason)) => {
                    log::debug!("[Sync] Loop for session {} ended: {}", session_id, reason);
                    break;
                }
                Err(e) => {
                    log::error!("[Sync] Loop for session {} aborted: {}", session_id, e);
                    break;
                }
            }
        }

        self.timers.release(&session_id, &timer);
    }

    async fn on_expired(
        &self,
        session_id: &str,
        timer: &SyncTimer,
        phase: Phase,
    ) -> TandemResult<Tick> {
        if !self.timers.retire(session_id, timer) {
            return Ok(Tick::Exit("superseded"));
        }

        if phase == Phase::TrackEnd {
            log::debug!("[Sync] Track ending for session {}", session_id);
            timer.rearm(self.config.track_end_grace());
            return Ok(Tick::Continue(Phase::Advance));
        }

        let Some(mut locked) = self.lock_owned(session_id, timer).await? else {
            return Ok(Tick::Exit("superseded"));
        };
        if let Some(exit) = self.check_playing(&locked) {
            return Ok(exit);
        }

        match phase {
            Phase::Verify { announce } => self.verify(&mut locked, timer, announce).await,
            _ => {
                if let Some(exit) = self.advance(&mut locked).await? {
                    return Ok(exit);
                }
                self.verify(&mut locked, timer, true).await
            }
        }
    }

    async fn on_skip(&self, session_id: &str, timer: &SyncTimer) -> TandemResult<Tick> {
        if !self.timers.retire(session_id, timer) {
            return Ok(Tick::Exit("superseded"));
        }
        let Some(mut locked) = self.lock_owned(session_id, timer).await? else {
            return Ok(Tick::Exit("superseded"));
        };
        if let Some(exit) = self.check_playing(&locked) {
            return Ok(exit);
        }

        log::debug!("[Sync] Skipping track for session {}", session_id);
        match self.player.skip(&locked.device_id).await {
            Ok(()) => {}
            Err(PlayerError::NoActiveDevice) => return self.interrupt(&mut locked).await,
            Err(e) => return Err(e.into()),
        }

        if let Some(exit) = self.advance(&mut locked).await? {
            return Ok(exit);
        }
        timer.rearm(self.config.skip_settle());
        Ok(Tick::Continue(Phase::Verify { announce: true }))
    }

    /// Takes the session lock, then confirms this loop still owns the session.
    async fn lock_owned(
        &self,
        session_id: &str,
        timer: &SyncTimer,
    ) -> TandemResult<Option<LockedSession>> {
        let locked = self.repo.find_by_id_for_update(session_id).await?;
        if timer.is_stopped()
            || self.timers.ownership(session_id, timer) == TimerOwnership::Superseded
        {
            return Ok(None);
        }
        Ok(Some(locked))
    }

    fn check_playing(&self, locked: &LockedSession) -> Option<Tick> {
        match locked.state {
            StateType::Play => None,
            StateType::Archived => {
                self.push(&locked.id, SessionEvent::Archived);
                Some(Tick::Exit("archived"))
            }
            _ => Some(Tick::Exit("no longer playing")),
        }
    }

    /// Moves the head forward, stages the look-ahead track and persists.
    ///
    /// Returns an exit tick when the queue ran out or staging failed.
    async fn advance(&self, locked: &mut LockedSession) -> TandemResult<Option<Tick>> {
        let exhausted = locked.go_next_track().is_err() || locked.is_queue_exhausted();
        if exhausted {
            log::info!("[Sync] Queue finished for session {}", locked.id);
            self.stop_session(locked, SessionEvent::Stop).await?;
            return Ok(Some(Tick::Exit("queue finished")));
        }

        if let Some(uri) = locked.look_ahead_track_uri().map(str::to_owned) {
            if let Err(e) = self.player.enqueue(&locked.device_id, &uri).await {
                log::info!(
                    "[Sync] Could not stage {} for session {}: {}",
                    uri,
                    locked.id,
                    e
                );
                return self.interrupt(locked).await.map(Some);
            }
        }

        self.repo.update(locked).await?;
        log::debug!(
            "[Sync] Session {} advanced to head {}",
            locked.id,
            locked.queue_head
        );
        Ok(None)
    }

    /// Compares the device with the queue head and re-arms for the track end.
    async fn verify(
        &self,
        locked: &mut LockedSession,
        timer: &SyncTimer,
        announce: bool,
    ) -> TandemResult<Tick> {
        let info = match self.player.currently_playing(&locked.device_id).await {
            Ok(info) => info,
            Err(PlayerError::NoActiveDevice) => {
                log::info!("[Sync] Device for session {} went away", locked.id);
                return self.interrupt(locked).await;
            }
            Err(e) => return Err(e.into()),
        };

        if let Err(drift) = locked.is_playing_correct_track(&info) {
            log::info!("[Sync] Session {} drifted: {}", locked.id, drift);
            return self.interrupt(locked).await;
        }

        if announce {
            self.push(
                &locked.id,
                SessionEvent::NextTrack {
                    head: locked.queue_head,
                },
            );
        }

        let wait = info.remain().saturating_sub(self.config.track_end_margin());
        log::debug!(
            "[Sync] Session {} track ends in {:?}",
            locked.id,
            wait
        );
        timer.rearm(wait);
        Ok(Tick::Continue(Phase::TrackEnd))
    }

    async fn interrupt(&self, locked: &mut LockedSession) -> TandemResult<Tick> {
        self.stop_session(locked, SessionEvent::Interrupt).await?;
        Ok(Tick::Exit("interrupted"))
    }

    async fn stop_session(
        &self,
        locked: &mut LockedSession,
        event: SessionEvent,
    ) -> TandemResult<()> {
        locked.move_to_stop();
        self.repo
            .update_with_expired_at(locked, expiry_from_now(self.session_ttl))
            .await?;
        self.push(&locked.id, event);
        Ok(())
    }

    fn push(&self, session_id: &str, event: SessionEvent) {
        self.pusher.push(PushMessage::new(session_id, event));
    }
}
