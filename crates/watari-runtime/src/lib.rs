//! Background-worker glue: owns the store, the scheduler, the token
//! managers, and the orchestrator, and drives them from the message bus
//! and the recurring alarm.

mod oauth;
mod store;
mod sync;

use std::sync::Arc;

use tokio::sync::mpsc;

use watari_api::plex::PlexError;
use watari_api::simkl::{SimklClient, SimklError};
use watari_api::traits::TrackerAuth;
use watari_core::config::AppConfig;
use watari_core::messages::{Action, Call, MessageBus, ServiceStatus};
use watari_core::models::ServiceKind;
use watari_core::scheduler::{SyncScheduler, Tick};

pub use oauth::{Navigator, PlexTokenManager, SimklTokenManager, SystemNavigator};
pub use store::StoreHandle;
pub use sync::{SyncOrchestrator, SyncOutcome};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("store error: {0}")]
    Store(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("auth error: {0}")]
    Auth(String),

    #[error("plex error: {0}")]
    Plex(#[from] PlexError),

    #[error("simkl error: {0}")]
    Simkl(#[from] SimklError),
}

/// The background worker. One per process.
pub struct Runtime {
    config: AppConfig,
    store: StoreHandle,
    bus: MessageBus,
    scheduler: Arc<SyncScheduler>,
    ticks: mpsc::UnboundedReceiver<Tick>,
    orchestrator: SyncOrchestrator,
    plex: PlexTokenManager,
    simkl: SimklTokenManager,
}

impl Runtime {
    /// Open the on-disk store and wire everything together.
    pub fn new(config: AppConfig) -> Result<Self, RuntimeError> {
        let path =
            AppConfig::ensure_store_path().map_err(|e| RuntimeError::Config(e.to_string()))?;
        let store = StoreHandle::open(&path)?;
        Ok(Self::assemble(config, store))
    }

    /// Wire against an existing store handle (tests, embedders).
    pub fn with_store(config: AppConfig, store: StoreHandle) -> Self {
        Self::assemble(config, store)
    }

    fn assemble(config: AppConfig, store: StoreHandle) -> Self {
        let bus = MessageBus::new();
        let (scheduler, ticks) = SyncScheduler::new(bus.clone());
        let scheduler = Arc::new(scheduler);

        let orchestrator = SyncOrchestrator::new(
            store.clone(),
            bus.clone(),
            SimklClient::new(config.simkl.client_id.clone()),
            Arc::clone(&scheduler),
        );
        let plex = PlexTokenManager::new(store.clone(), bus.clone(), config.plex.clone());
        let simkl = SimklTokenManager::new(store.clone(), bus.clone(), config.simkl.clone());

        Self {
            config,
            store,
            bus,
            scheduler,
            ticks,
            orchestrator,
            plex,
            simkl,
        }
    }

    /// Bus handle for the UI surface.
    pub fn bus(&self) -> MessageBus {
        self.bus.clone()
    }

    pub fn store(&self) -> StoreHandle {
        self.store.clone()
    }

    pub fn is_sync_enabled(&self) -> bool {
        self.scheduler.is_enabled()
    }

    /// Event loop: scheduler ticks and UI calls, until the bus closes.
    /// A failed cycle never prevents the next tick from running.
    pub async fn run(mut self) {
        let mut calls = self.bus.subscribe_calls();
        loop {
            tokio::select! {
                tick = self.ticks.recv() => {
                    if tick.is_none() {
                        break;
                    }
                    let outcome = self
                        .orchestrator
                        .run_once(&self.plex, &self.simkl, None)
                        .await;
                    tracing::info!(?outcome, "scheduled sync tick finished");
                }
                call = calls.recv() => {
                    match call {
                        Ok(call) => self.handle_call(call).await,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(missed = n, "call receiver lagged");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
    }

    /// Dispatch one UI call. Errors are logged and surfaced on the bus,
    /// never propagated.
    pub async fn handle_call(&self, call: Call) {
        match call {
            Call::StartSync { period_hours } => {
                // first cycle after (re)enabling is a full sync
                if let Err(e) = self.store.set_full_sync_flag().await {
                    tracing::error!(error = %e, "failed to set full-sync flag");
                }
                self.scheduler.start(period_hours, true);
                self.bus.send_action(Action::SyncEnabled);
            }
            Call::StopSync => {
                self.scheduler.stop();
            }
            Call::SyncNow => {
                let outcome = self
                    .orchestrator
                    .run_once(&self.plex, &self.simkl, None)
                    .await;
                tracing::info!(?outcome, "manual sync finished");
            }
            Call::OauthStart {
                service,
                in_new_surface,
            } => {
                let result = match service {
                    ServiceKind::Plex => self.plex.start_authorization(in_new_surface).await,
                    ServiceKind::Simkl => self.simkl.start_authorization(in_new_surface).await,
                };
                if let Err(e) = result {
                    tracing::warn!(%service, error = %e, "authorization failed");
                    self.bus.service_status(service, ServiceStatus::Unexpected);
                }
            }
            Call::CheckToken { service } => {
                let state = match service {
                    ServiceKind::Plex => self.plex.check_validity(None).await,
                    ServiceKind::Simkl => self.simkl.check_validity(None).await,
                };
                let status = if state.is_valid() {
                    ServiceStatus::Online
                } else {
                    ServiceStatus::Offline
                };
                self.bus.service_status(service, status);
            }
            Call::Logout { service } => {
                let result = match service {
                    ServiceKind::Plex => self.plex.logout().await,
                    ServiceKind::Simkl => self.simkl.logout().await,
                };
                if let Err(e) = result {
                    tracing::error!(%service, error = %e, "logout failed");
                }
                // logout always disables recurring sync
                self.scheduler.stop();
            }
            Call::ReopenAfterPermissionPrompt { url } => {
                // stash the URL; the freshly opened surface consumes it
                // and resumes the permission flow
                if let Err(e) = self.store.set_pending_permission_url(url).await {
                    tracing::error!(error = %e, "failed to stash pending permission URL");
                }
            }
            Call::Ping => {
                self.bus.send_action(Action::Pong);
            }
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime() -> Runtime {
        let store = StoreHandle::open_memory().unwrap();
        Runtime::with_store(AppConfig::default(), store)
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_sync_arms_timer_and_requests_full_sync() {
        let rt = runtime();
        let mut actions = rt.bus().subscribe_actions();

        rt.handle_call(Call::StartSync { period_hours: 6.0 }).await;

        assert!(rt.is_sync_enabled());
        assert_eq!(actions.recv().await.unwrap(), Action::SyncEnabled);
        assert!(rt.store.take_full_sync_flag().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_sync_disarms_timer() {
        let rt = runtime();
        rt.handle_call(Call::StartSync { period_hours: 6.0 }).await;
        rt.handle_call(Call::StopSync).await;
        assert!(!rt.is_sync_enabled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_stops_recurring_sync() {
        let rt = runtime();
        rt.store
            .set_oauth_token(ServiceKind::Simkl, "tok".into())
            .await
            .unwrap();
        rt.handle_call(Call::StartSync { period_hours: 6.0 }).await;

        rt.handle_call(Call::Logout {
            service: ServiceKind::Simkl,
        })
        .await;

        assert!(!rt.is_sync_enabled());
        assert_eq!(
            rt.store.oauth_token(ServiceKind::Simkl).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let rt = runtime();
        let mut actions = rt.bus().subscribe_actions();
        rt.handle_call(Call::Ping).await;
        assert_eq!(actions.recv().await.unwrap(), Action::Pong);
    }

    #[tokio::test]
    async fn test_reopen_after_permission_prompt_stashes_url() {
        let rt = runtime();
        rt.handle_call(Call::ReopenAfterPermissionPrompt {
            url: "http://plex.local:32400/".into(),
        })
        .await;
        assert_eq!(
            rt.store
                .take_pending_permission_url()
                .await
                .unwrap()
                .as_deref(),
            Some("http://plex.local:32400/")
        );
    }
}
