//! Session operations outside the play/pause/archive state machine.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::{CurrentPlayingInfo, Session, StateType};
use crate::error::{TandemError, TandemResult};
use crate::events::{EventPusher, PushMessage, SessionEvent};
use crate::player::{Player, PlayerError};
use crate::repository::{LockedSession, SessionRepository};
use crate::utils::{expiry_from_now, new_session_id, now_millis};

use super::state_controller::benign_if_offline;
use super::sync_engine::SyncEngine;
use super::timer_registry::TimerRegistry;

/// A session together with what its device reported while it was read.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub session: Session,
    pub playing: Option<CurrentPlayingInfo>,
}

/// Creation, lookup, queue editing, explicit skips and batch archival.
pub struct SessionService {
    repo: Arc<dyn SessionRepository>,
    player: Arc<dyn Player>,
    pusher: Arc<dyn EventPusher>,
    timers: Arc<TimerRegistry>,
    engine: Arc<SyncEngine>,
    session_ttl: Duration,
}

impl SessionService {
    pub fn new(
        repo: Arc<dyn SessionRepository>,
        player: Arc<dyn Player>,
        pusher: Arc<dyn EventPusher>,
        timers: Arc<TimerRegistry>,
        engine: Arc<SyncEngine>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            repo,
            player,
            pusher,
            timers,
            engine,
            session_ttl,
        }
    }

    pub async fn create_session(
        &self,
        name: &str,
        creator_id: &str,
        device_id: &str,
        allow_to_control_by_others: bool,
    ) -> TandemResult<Session> {
        if name.trim().is_empty() {
            return Err(TandemError::InvalidRequest("session name is empty".into()));
        }

        let mut session = Session::new(
            new_session_id(),
            name,
            creator_id,
            device_id,
            allow_to_control_by_others,
        );
        session.expired_at = Some(expiry_from_now(self.session_ttl));
        self.repo.store(&session).await?;

        log::info!(
            "[State] Created session {} ({}) for {}",
            session.id,
            session.name,
            creator_id
        );
        Ok(session)
    }

    /// Reads a session. A playing session is checked against its device first.
    ///
    /// Drift found here takes the same path as in the sync loop: STOP, persist,
    /// INTERRUPT. The check is skipped while the loop is between its track-end
    /// tick and its own verification, since the device is expected to be one
    /// track ahead then.
    pub async fn get_session(&self, session_id: &str) -> TandemResult<SessionSnapshot> {
        let session = self.repo.find_by_id(session_id).await?;
        if session.state != StateType::Play {
            return Ok(SessionSnapshot {
                session,
                playing: None,
            });
        }

        let mut locked = self.repo.find_by_id_for_update(session_id).await?;
        if locked.state != StateType::Play {
            return Ok(SessionSnapshot {
                session: Session::clone(&locked),
                playing: None,
            });
        }

        let playing = match self.player.currently_playing(&locked.device_id).await {
            Ok(info) => Some(info),
            Err(PlayerError::NoActiveDevice) => None,
            Err(e) => return Err(e.into()),
        };

        let mid_tick = self
            .timers
            .get_timer(session_id)
            .is_some_and(|timer| timer.is_expired());
        let in_sync = playing
            .as_ref()
            .is_some_and(|info| locked.is_playing_correct_track(info).is_ok());

        if !in_sync && !mid_tick {
            log::info!(
                "[State] Session {} is out of sync with its device",
                session_id
            );
            self.timers.stop_timer(session_id);
            locked.move_to_stop();
            self.repo
                .update_with_expired_at(&mut locked, expiry_from_now(self.session_ttl))
                .await?;
            self.push(session_id, SessionEvent::Interrupt);
        }

        Ok(SessionSnapshot {
            session: Session::clone(&locked),
            playing,
        })
    }

    /// Appends a track, staging it on the device if it falls in the staged window.
    pub async fn add_queue_track(
        &self,
        session_id: &str,
        user_id: &str,
        uri: &str,
    ) -> TandemResult<Session> {
        if uri.trim().is_empty() {
            return Err(TandemError::InvalidRequest("track uri is empty".into()));
        }

        let mut locked = self.repo.find_by_id_for_update(session_id).await?;
        locked.authorize(user_id)?;
        if locked.state == StateType::Archived {
            return Err(TandemError::InvalidTransition(format!(
                "session {} is archived",
                session_id
            )));
        }

        locked.add_queue_track(uri);
        self.repo.update(&locked).await?;

        if locked.should_enqueue_added_track() {
            self.player.enqueue(&locked.device_id, uri).await?;
        }

        log::debug!(
            "[State] Session {} queued {} at {}",
            session_id,
            uri,
            locked.queue_tracks.len() - 1
        );
        self.push(session_id, SessionEvent::AddTrack);
        Ok(Session::clone(&locked))
    }

    /// Skips to the next queued track.
    ///
    /// In PLAY the running loop performs the skip; the returned session still
    /// shows the old head and NEXTTRACK follows once the device confirms.
    pub async fn next_track(&self, session_id: &str, user_id: &str) -> TandemResult<Session> {
        let mut locked = self.repo.find_by_id_for_update(session_id).await?;
        locked.authorize(user_id)?;

        match locked.state {
            StateType::Play => {
                if !self.timers.request_skip(session_id) {
                    return Err(TandemError::InvalidTransition(format!(
                        "session {} has no running playback loop",
                        session_id
                    )));
                }
            }
            StateType::Pause => self.skip_while_paused(&mut locked).await?,
            StateType::Stop => {
                locked.go_next_track()?;
                self.repo.update(&locked).await?;
                self.push_head(&locked);
            }
            StateType::Archived => {
                return Err(TandemError::InvalidTransition(format!(
                    "session {} is archived",
                    session_id
                )));
            }
        }

        Ok(Session::clone(&locked))
    }

    async fn skip_while_paused(&self, locked: &mut LockedSession) -> TandemResult<()> {
        locked.go_next_track()?;

        if locked.is_queue_exhausted() {
            log::info!("[State] Session {} skipped past its last track", locked.id);
            locked.move_to_stop();
            self.repo
                .update_with_expired_at(locked, expiry_from_now(self.session_ttl))
                .await?;
            self.push(&locked.id, SessionEvent::Stop);
            return Ok(());
        }

        let device = locked.device_id.clone();
        benign_if_offline(self.player.skip(&device).await)?;
        benign_if_offline(self.player.pause(&device).await)?;
        if let Some(uri) = locked.look_ahead_track_uri() {
            self.player.enqueue(&device, uri).await?;
        }

        self.repo.update(locked).await?;
        self.push_head(locked);
        Ok(())
    }

    /// Rebinds the device the session drives.
    pub async fn set_device(
        &self,
        session_id: &str,
        user_id: &str,
        device_id: &str,
    ) -> TandemResult<Session> {
        if device_id.trim().is_empty() {
            return Err(TandemError::InvalidRequest("device id is empty".into()));
        }

        let mut locked = self.repo.find_by_id_for_update(session_id).await?;
        locked.authorize(user_id)?;
        locked.device_id = device_id.to_string();
        self.repo.update(&locked).await?;

        log::info!("[State] Session {} now plays on {}", session_id, device_id);
        Ok(Session::clone(&locked))
    }

    /// Restarts the sync loop of a playing session that has none.
    ///
    /// Loops do not survive a restart, so a client connecting to a session
    /// still marked PLAY brings its loop back.
    pub async fn ensure_sync_running(&self, session_id: &str) -> TandemResult<()> {
        let session = self.repo.find_by_id(session_id).await?;
        if session.state != StateType::Play || self.timers.exists(session_id) {
            return Ok(());
        }

        let locked = self.repo.find_by_id_for_update(session_id).await?;
        if locked.state == StateType::Play && !self.timers.exists(session_id) {
            log::info!("[Sync] No loop for playing session {}, starting one", session_id);
            self.engine.start(session_id);
        }
        Ok(())
    }

    /// Archives every live session whose expiry has passed.
    pub async fn archive_expired(&self) -> TandemResult<Vec<String>> {
        let archived = self.repo.archive_expired(now_millis()).await?;
        for session_id in &archived {
            self.timers.stop_timer(session_id);
            self.push(session_id, SessionEvent::Archived);
        }
        if !archived.is_empty() {
            log::info!("[State] Archived {} expired session(s)", archived.len());
        }
        Ok(archived)
    }

    fn push_head(&self, session: &Session) {
        self.push(
            &session.id,
            SessionEvent::NextTrack {
                head: session.queue_head,
            },
        );
    }

    fn push(&self, session_id: &str, event: SessionEvent) {
        self.pusher.push(PushMessage::new(session_id, event));
    }
}
