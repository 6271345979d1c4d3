//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where all
//! services are instantiated and wired together. The binary supplies the
//! player implementation; everything else is created here.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::api::AppState;
use crate::error::{TandemError, TandemResult};
use crate::events::{EventHub, EventPusher};
use crate::player::{Player, WebApiPlayer};
use crate::protocol_constants::PLAYER_TIMEOUT_SECS;
use crate::repository::{InMemorySessionRepository, SessionRepository};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::services::{SessionService, StateController, SyncEngine, TimerRegistry};
use crate::state::Config;

/// How long shutdown waits for background loops to finish.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Container for all bootstrapped services.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// Session storage.
    pub repository: Arc<InMemorySessionRepository>,
    /// One sync timer per playing session.
    pub timers: Arc<TimerRegistry>,
    /// Handle to the event hub actor.
    pub hub: EventHub,
    pub sync_engine: Arc<SyncEngine>,
    pub state_controller: Arc<StateController>,
    pub session_service: Arc<SessionService>,
    /// Validated configuration.
    pub config: Arc<Config>,
    /// Task spawner for background operations.
    pub spawner: TokioSpawner,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
}

impl BootstrappedServices {
    /// Builds the API state from the wired services.
    pub fn app_state(&self) -> AppState {
        AppState::builder()
            .session_service(Arc::clone(&self.session_service))
            .state_controller(Arc::clone(&self.state_controller))
            .hub(self.hub.clone())
            .config(Arc::clone(&self.config))
            .build()
    }

    /// Initiates graceful shutdown of all services.
    ///
    /// Stopping the hub closes every WebSocket; stopping the timers ends
    /// every sync loop at its next wake-up.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");

        self.cancel_token.cancel();

        let stopped = self.timers.stop_all();
        log::info!("[Bootstrap] Stopped {} sync loop(s)", stopped);

        if !self.spawner.close_and_wait(SHUTDOWN_GRACE).await {
            log::warn!(
                "[Bootstrap] {} task(s) still running after {:?}",
                self.spawner.active_tasks(),
                SHUTDOWN_GRACE
            );
        }

        log::info!("[Bootstrap] Shutdown complete");
    }
}

/// Creates the shared HTTP client for all player API communication.
fn create_http_client() -> TandemResult<Client> {
    Client::builder()
        .timeout(Duration::from_secs(PLAYER_TIMEOUT_SECS))
        .build()
        .map_err(|e| TandemError::Internal(format!("failed to create HTTP client: {e}")))
}

/// Creates the reqwest-backed player client.
pub fn create_player(base_url: &str, access_token: &str) -> TandemResult<WebApiPlayer> {
    Ok(WebApiPlayer::new(
        create_http_client()?,
        base_url,
        access_token,
    ))
}

/// Bootstraps all application services with their dependencies.
///
/// Services are created in dependency order:
///
/// 1. Shared infrastructure (spawner, cancellation token, repository, timers)
/// 2. Event hub actor
/// 3. Sync engine
/// 4. State controller and session service
/// 5. Archive sweeper
///
/// Must be called from within a Tokio runtime.
pub fn bootstrap_services(
    config: &Config,
    player: Arc<dyn Player>,
) -> TandemResult<BootstrappedServices> {
    config.validate().map_err(TandemError::Internal)?;

    let config = Arc::new(config.clone());
    let spawner = TokioSpawner::current();
    let cancel_token = CancellationToken::new();
    let session_ttl = config.session_ttl();

    let repository = Arc::new(InMemorySessionRepository::new());
    let repo = Arc::clone(&repository) as Arc<dyn SessionRepository>;
    let timers = Arc::new(TimerRegistry::new());

    let hub = EventHub::start(config.connection_buffer, &spawner, cancel_token.clone());
    let pusher = Arc::new(hub.clone()) as Arc<dyn EventPusher>;

    let sync_engine = Arc::new(SyncEngine::new(
        Arc::clone(&repo),
        Arc::clone(&player),
        Arc::clone(&pusher),
        Arc::clone(&timers),
        spawner.clone(),
        config.sync.clone(),
        session_ttl,
    ));

    let state_controller = Arc::new(StateController::new(
        Arc::clone(&repo),
        Arc::clone(&player),
        Arc::clone(&pusher),
        Arc::clone(&timers),
        Arc::clone(&sync_engine),
        session_ttl,
    ));

    let session_service = Arc::new(SessionService::new(
        repo,
        player,
        pusher,
        Arc::clone(&timers),
        Arc::clone(&sync_engine),
        session_ttl,
    ));

    if config.archive_sweep_interval_secs > 0 {
        let interval = Duration::from_secs(config.archive_sweep_interval_secs);
        spawner.spawn(run_archive_sweeper(
            Arc::clone(&session_service),
            interval,
            cancel_token.clone(),
        ));
    } else {
        log::info!("[Bootstrap] Archive sweeper disabled");
    }

    log::info!("[Bootstrap] Services ready");

    Ok(BootstrappedServices {
        repository,
        timers,
        hub,
        sync_engine,
        state_controller,
        session_service,
        config,
        spawner,
        cancel_token,
    })
}

/// Archives expired sessions every `interval` until cancelled.
async fn run_archive_sweeper(
    service: Arc<SessionService>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = service.archive_expired().await {
                    log::error!("[Bootstrap] Archive sweep failed: {}", e);
                }
            }
        }
    }
    log::debug!("[Bootstrap] Archive sweeper stopped");
}
