//! User-requested state transitions.
//!
//! Every transition runs under the session lock:
//! authorize → validate → device calls → mutate → persist → push → loop control.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::{Session, StateType};
use crate::error::TandemResult;
use crate::events::{EventPusher, PushMessage, SessionEvent};
use crate::player::{PlayRequest, Player, PlayerError, PlayerResult};
use crate::repository::{LockedSession, SessionRepository};
use crate::utils::expiry_from_now;

use super::sync_engine::SyncEngine;
use super::timer_registry::TimerRegistry;

/// Treats a missing device as success for calls whose goal it already implies.
pub(crate) fn benign_if_offline(result: PlayerResult<()>) -> PlayerResult<()> {
    match result {
        Err(PlayerError::NoActiveDevice) => Ok(()),
        other => other,
    }
}

/// Applies play, pause, archive and unarchive requests.
pub struct StateController {
    repo: Arc<dyn SessionRepository>,
    player: Arc<dyn Player>,
    pusher: Arc<dyn EventPusher>,
    timers: Arc<TimerRegistry>,
    engine: Arc<SyncEngine>,
    session_ttl: Duration,
}

impl StateController {
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

    /// Moves `session_id` to `target` on behalf of `user_id`.
    ///
    /// Returns the session as persisted after the transition.
    pub async fn change_state(
        &self,
        session_id: &str,
        user_id: &str,
        target: StateType,
    ) -> TandemResult<Session> {
        let mut locked = self.repo.find_by_id_for_update(session_id).await?;
        locked.authorize_transition(user_id, target)?;
        locked.ensure_valid_next_state(target)?;

        log::info!(
            "[State] Session {}: {} -> {} requested by {}",
            session_id,
            locked.state,
            target,
            user_id
        );

        match target {
            StateType::Play => self.play(&mut locked).await?,
            StateType::Pause => self.pause(&mut locked).await?,
            StateType::Archived => self.archive(&mut locked).await?,
            StateType::Stop => self.unarchive(&mut locked).await?,
        }

        Ok(Session::clone(&locked))
    }

    /// STOP → PLAY starts the head track; PAUSE → PLAY resumes where the device paused.
    ///
    /// A paused device keeps its own queue, so only a start stages head+1 and head+2.
    async fn play(&self, locked: &mut LockedSession) -> TandemResult<()> {
        let device = locked.device_id.clone();
        let uris = locked.track_uris_to_start()?;
        let resume = locked.is_resume(StateType::Play);

        self.player.set_repeat_mode(&device, false).await?;
        self.player.set_shuffle_mode(&device, false).await?;

        if resume {
            self.player.play(&device).await?;
        } else {
            let (head, rest) = uris.split_at(1);
            self.player.skip_all_tracks(&device, &head[0]).await?;
            self.player
                .play_tracks(
                    &device,
                    &PlayRequest {
                        uris: head.to_vec(),
                        position: None,
                    },
                )
                .await?;
            for uri in rest {
                self.player.enqueue(&device, uri).await?;
            }
        }

        locked.move_to_play()?;
        self.repo.update(locked).await?;
        self.push(&locked.id, SessionEvent::Play);
        self.engine.start(&locked.id);
        Ok(())
    }

    async fn pause(&self, locked: &mut LockedSession) -> TandemResult<()> {
        if locked.state == StateType::Pause {
            return Ok(());
        }

        let progress = match self.player.currently_playing(&locked.device_id).await {
            Ok(info) => info.progress,
            Err(PlayerError::NoActiveDevice) => Duration::ZERO,
            Err(e) => return Err(e.into()),
        };
        benign_if_offline(self.player.pause(&locked.device_id).await)?;

        self.timers.stop_timer(&locked.id);
        locked.move_to_pause(progress)?;
        self.repo.update(locked).await?;
        self.push(&locked.id, SessionEvent::Pause);
        Ok(())
    }

    async fn archive(&self, locked: &mut LockedSession) -> TandemResult<()> {
        match locked.state {
            StateType::Archived => return Ok(()),
            StateType::Play => benign_if_offline(self.player.pause(&locked.device_id).await)?,
            _ => {}
        }

        self.timers.delete_timer(&locked.id);
        locked.move_to_archived();
        self.repo.update(locked).await?;
        self.push(&locked.id, SessionEvent::Archived);
        Ok(())
    }

    async fn unarchive(&self, locked: &mut LockedSession) -> TandemResult<()> {
        locked.move_to_stop();
        self.repo
            .update_with_expired_at(locked, expiry_from_now(self.session_ttl))
            .await?;
        self.push(&locked.id, SessionEvent::Unarchive);
        Ok(())
    }

    fn push(&self, session_id: &str, event: SessionEvent) {
        self.pusher.push(PushMessage::new(session_id, event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TandemError;
    use crate::repository::InMemorySessionRepository;
    use crate::runtime::TokioSpawner;
    use crate::state::SyncConfig;
    use crate::test_fixtures::{
        session_with_tracks, track_uri, MockPlayer, PlayerCall, RecordingPusher, CREATOR,
    };

    const SID: &str = "s1";

    struct Harness {
        repo: Arc<InMemorySessionRepository>,
        player: Arc<MockPlayer>,
        pusher: Arc<RecordingPusher>,
        timers: Arc<TimerRegistry>,
        controller: Arc<StateController>,
    }

    impl Harness {
        async fn new(session: Session, player: Arc<MockPlayer>) -> Self {
            let repo = Arc::new(InMemorySessionRepository::new());
            repo.store(&session).await.unwrap();
            let pusher = RecordingPusher::new();
            let timers = Arc::new(TimerRegistry::new());
            let ttl = Duration::from_secs(3600);
            let engine = Arc::new(SyncEngine::new(
                repo.clone(),
                player.clone(),
                pusher.clone(),
                timers.clone(),
                TokioSpawner::current(),
                SyncConfig::default(),
                ttl,
            ));
            let controller = Arc::new(StateController::new(
                repo.clone(),
                player.clone(),
                pusher.clone(),
                timers.clone(),
                engine,
                ttl,
            ));
            Self {
                repo,
                player,
                pusher,
                timers,
                controller,
            }
        }

        async fn session(&self) -> Session {
            self.repo.find_by_id(SID).await.unwrap()
        }
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[tokio::test(start_paused = true)]
    async fn play_from_stop_drains_device_and_stages_three_tracks() {
        let h = Harness::new(session_with_tracks(SID, 5, StateType::Stop, 1), MockPlayer::new()).await;

        let session = h
            .controller
            .change_state(SID, CREATOR, StateType::Play)
            .await
            .unwrap();

        assert_eq!(session.state, StateType::Play);
        assert_eq!(
            h.player.calls(),
            vec![
                PlayerCall::SetRepeat(false),
                PlayerCall::SetShuffle(false),
                PlayerCall::SkipAllTracks(track_uri(1)),
                PlayerCall::PlayTracks(vec![track_uri(1)], None),
                PlayerCall::Enqueue(track_uri(2)),
                PlayerCall::Enqueue(track_uri(3)),
            ]
        );
        assert_eq!(h.pusher.events(), vec![SessionEvent::Play]);
        assert!(h.timers.exists(SID));
    }

    #[tokio::test(start_paused = true)]
    async fn resume_continues_device_without_restaging() {
        let mut paused = session_with_tracks(SID, 3, StateType::Pause, 0);
        paused.progress_when_paused = secs(42);
        let player = MockPlayer::playing(&track_uri(0), &[track_uri(1), track_uri(2)], secs(42));
        let h = Harness::new(paused, player).await;

        let session = h
            .controller
            .change_state(SID, CREATOR, StateType::Play)
            .await
            .unwrap();

        assert_eq!(session.progress_when_paused, Duration::ZERO);
        assert_eq!(
            h.player.calls(),
            vec![
                PlayerCall::SetRepeat(false),
                PlayerCall::SetShuffle(false),
                PlayerCall::Play,
            ]
        );
        assert_eq!(h.player.queued(), vec![track_uri(1), track_uri(2)]);
        assert_eq!(h.pusher.events(), vec![SessionEvent::Play]);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_then_resume_follows_two_track_ends_without_interrupt() {
        let h = Harness::new(session_with_tracks(SID, 5, StateType::Stop, 0), MockPlayer::new()).await;
        h.controller
            .change_state(SID, CREATOR, StateType::Play)
            .await
            .unwrap();
        h.controller
            .change_state(SID, CREATOR, StateType::Pause)
            .await
            .unwrap();
        h.controller
            .change_state(SID, CREATOR, StateType::Play)
            .await
            .unwrap();
        assert_eq!(h.player.queued(), vec![track_uri(1), track_uri(2)]);

        // settle 5s + remain 178s + grace 2s for each track end
        tokio::time::sleep(secs(184)).await;
        h.player.finish_track();
        tokio::time::sleep(secs(170)).await;
        h.player.finish_track();
        tokio::time::sleep(secs(10)).await;

        let session = h.session().await;
        assert_eq!(session.state, StateType::Play);
        assert_eq!(session.queue_head, 2);
        assert_eq!(h.player.current(), Some(track_uri(2)));
        let events = h.pusher.events();
        assert!(!events.contains(&SessionEvent::Interrupt));
        assert!(events.contains(&SessionEvent::NextTrack { head: 2 }));
    }

    #[tokio::test(start_paused = true)]
    async fn play_without_device_is_forbidden_and_leaves_session_alone() {
        let player = MockPlayer::new();
        player.set_offline(true);
        let h = Harness::new(session_with_tracks(SID, 2, StateType::Stop, 0), player).await;

        let err = h
            .controller
            .change_state(SID, CREATOR, StateType::Play)
            .await
            .unwrap_err();

        assert!(matches!(err, TandemError::DeviceNotFound(_)));
        assert_eq!(h.session().await.state, StateType::Stop);
        assert!(h.pusher.events().is_empty());
        assert!(!h.timers.exists(SID));
    }

    #[tokio::test(start_paused = true)]
    async fn play_with_empty_queue_fails_before_device_calls() {
        let h = Harness::new(session_with_tracks(SID, 0, StateType::Stop, 0), MockPlayer::new()).await;

        let err = h
            .controller
            .change_state(SID, CREATOR, StateType::Play)
            .await
            .unwrap_err();

        assert!(matches!(err, TandemError::EmptyQueue(_)));
        assert!(h.player.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn pause_captures_progress_and_stops_loop() {
        let session = session_with_tracks(SID, 3, StateType::Play, 0);
        let player = MockPlayer::playing(&track_uri(0), &[track_uri(1)], secs(30));
        let h = Harness::new(session, player).await;
        let timer = h.timers.create_timer(SID, secs(100));

        let session = h
            .controller
            .change_state(SID, "guest", StateType::Pause)
            .await
            .unwrap();

        assert_eq!(session.state, StateType::Pause);
        assert_eq!(session.progress_when_paused, secs(30));
        assert!(timer.is_stopped());
        assert!(!h.timers.exists(SID));
        assert_eq!(h.pusher.events(), vec![SessionEvent::Pause]);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_with_offline_device_still_pauses() {
        let player = MockPlayer::new();
        player.set_offline(true);
        let h = Harness::new(session_with_tracks(SID, 3, StateType::Play, 0), player).await;

        let session = h
            .controller
            .change_state(SID, CREATOR, StateType::Pause)
            .await
            .unwrap();

        assert_eq!(session.state, StateType::Pause);
        assert_eq!(session.progress_when_paused, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_while_paused_is_a_no_op() {
        let h = Harness::new(session_with_tracks(SID, 3, StateType::Pause, 0), MockPlayer::new()).await;

        h.controller
            .change_state(SID, CREATOR, StateType::Pause)
            .await
            .unwrap();

        assert!(h.player.calls().is_empty());
        assert!(h.pusher.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn illegal_transition_performs_no_mutation() {
        let h = Harness::new(session_with_tracks(SID, 3, StateType::Stop, 0), MockPlayer::new()).await;

        let err = h
            .controller
            .change_state(SID, CREATOR, StateType::Pause)
            .await
            .unwrap_err();

        assert!(matches!(err, TandemError::InvalidTransition(_)));
        assert!(h.player.calls().is_empty());
        assert_eq!(h.session().await.state, StateType::Stop);
    }

    #[tokio::test(start_paused = true)]
    async fn only_creator_may_archive() {
        let h = Harness::new(session_with_tracks(SID, 1, StateType::Stop, 0), MockPlayer::new()).await;

        let err = h
            .controller
            .change_state(SID, "guest", StateType::Archived)
            .await
            .unwrap_err();

        assert!(matches!(err, TandemError::NotAllowed(_)));
        assert!(h.pusher.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn archive_from_play_pauses_device_and_deletes_timer() {
        let h = Harness::new(session_with_tracks(SID, 2, StateType::Play, 0), MockPlayer::new()).await;
        let timer = h.timers.create_timer(SID, secs(100));

        let session = h
            .controller
            .change_state(SID, CREATOR, StateType::Archived)
            .await
            .unwrap();

        assert_eq!(session.state, StateType::Archived);
        assert_eq!(h.player.calls(), vec![PlayerCall::Pause]);
        assert!(!h.timers.exists(SID));
        assert!(!timer.is_stopped());
        assert_eq!(h.pusher.events(), vec![SessionEvent::Archived]);
    }

    #[tokio::test(start_paused = true)]
    async fn archive_twice_is_a_no_op() {
        let h = Harness::new(session_with_tracks(SID, 1, StateType::Archived, 0), MockPlayer::new()).await;

        h.controller
            .change_state(SID, CREATOR, StateType::Archived)
            .await
            .unwrap();

        assert!(h.pusher.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unarchive_returns_to_stop_with_fresh_expiry() {
        let mut archived = session_with_tracks(SID, 1, StateType::Archived, 0);
        archived.expired_at = Some(1);
        let h = Harness::new(archived, MockPlayer::new()).await;

        let session = h
            .controller
            .change_state(SID, CREATOR, StateType::Stop)
            .await
            .unwrap();

        assert_eq!(session.state, StateType::Stop);
        assert!(session.expired_at.unwrap() > 1);
        assert_eq!(h.pusher.events(), vec![SessionEvent::Unarchive]);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_session_is_not_found() {
        let h = Harness::new(session_with_tracks(SID, 1, StateType::Stop, 0), MockPlayer::new()).await;

        let err = h
            .controller
            .change_state("missing", CREATOR, StateType::Play)
            .await
            .unwrap_err();

        assert!(matches!(err, TandemError::SessionNotFound(_)));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Pause racing a track-end tick
    // ─────────────────────────────────────────────────────────────────────────

    /// Plays four tracks from STOP and runs the clock up to the point where
    /// the loop is about to advance (settle 5s + 178s + grace 2s = 185s),
    /// with the test holding the session lock so the loop blocks on it.
    async fn loop_blocked_on_advance() -> (Harness, LockedSession) {
        let h = Harness::new(session_with_tracks(SID, 4, StateType::Stop, 0), MockPlayer::new()).await;
        h.controller
            .change_state(SID, CREATOR, StateType::Play)
            .await
            .unwrap();

        tokio::time::sleep(secs(184)).await;
        h.player.finish_track();
        let guard = h.repo.find_by_id_for_update(SID).await.unwrap();
        tokio::time::sleep(secs(2)).await;
        (h, guard)
    }

    #[tokio::test(start_paused = true)]
    async fn track_end_then_pause_applies_both_in_order() {
        let (h, guard) = loop_blocked_on_advance().await;

        let controller = h.controller.clone();
        let pause = tokio::spawn(async move {
            controller
                .change_state(SID, CREATOR, StateType::Pause)
                .await
        });
        tokio::task::yield_now().await;
        drop(guard);

        let session = pause.await.unwrap().unwrap();

        assert_eq!(session.state, StateType::Pause);
        assert_eq!(session.queue_head, 1);
        assert_eq!(h.session().await, session);
        assert_eq!(
            h.pusher.events(),
            vec![
                SessionEvent::Play,
                SessionEvent::NextTrack { head: 1 },
                SessionEvent::Pause
            ]
        );
        assert!(!h.timers.exists(SID));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_winning_the_lock_leaves_track_end_without_effect() {
        let h = Harness::new(session_with_tracks(SID, 4, StateType::Stop, 0), MockPlayer::new()).await;
        h.controller
            .change_state(SID, CREATOR, StateType::Play)
            .await
            .unwrap();
        tokio::time::sleep(secs(184)).await;

        // Pause lands during the grace period, before the loop takes the lock.
        let session = h
            .controller
            .change_state(SID, CREATOR, StateType::Pause)
            .await
            .unwrap();
        tokio::time::sleep(secs(10)).await;

        assert_eq!(session.queue_head, 0);
        assert_eq!(h.session().await, session);
        assert_eq!(
            h.pusher.events(),
            vec![SessionEvent::Play, SessionEvent::Pause]
        );
        assert_eq!(h.player.enqueued(), vec![track_uri(1), track_uri(2)]);
    }
}
