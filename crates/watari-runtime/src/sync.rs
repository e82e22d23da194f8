//! One sync cycle: validate tokens, fetch activity deltas, advance the
//! incremental window, broadcast UI state.

use std::sync::Arc;

use watari_api::cancel::CancelSignal;
use watari_api::simkl::SimklClient;
use watari_api::traits::TrackerAuth;
use watari_core::messages::{Action, MessageBus, ServiceStatus};
use watari_core::models::{ActivityWindow, ServiceKind, TokenState};
use watari_core::scheduler::SyncScheduler;

use crate::store::StoreHandle;

/// Terminal state of one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed { items: usize },
    /// A token went dead; recurring sync is stopped.
    SessionExpired(ServiceKind),
    Failed,
}

/// Coordinates one scheduled (or manual) sync cycle.
///
/// There is no retry loop in here: the next scheduled tick is the retry
/// mechanism, and `run_once` never lets an error escape to the tick
/// handler.
pub struct SyncOrchestrator {
    store: StoreHandle,
    bus: MessageBus,
    simkl: SimklClient,
    scheduler: Arc<SyncScheduler>,
}

impl SyncOrchestrator {
    pub fn new(
        store: StoreHandle,
        bus: MessageBus,
        simkl: SimklClient,
        scheduler: Arc<SyncScheduler>,
    ) -> Self {
        Self {
            store,
            bus,
            simkl,
            scheduler,
        }
    }

    /// Run one cycle against the given token managers.
    pub async fn run_once<P, S>(
        &self,
        plex: &P,
        simkl_auth: &S,
        cancel: Option<CancelSignal>,
    ) -> SyncOutcome
    where
        P: TrackerAuth,
        S: TrackerAuth,
    {
        // 1. both tokens must be live before anything moves
        self.bus
            .service_status(ServiceKind::Plex, ServiceStatus::Connecting);
        let plex_state = plex.check_validity(None).await;
        if !plex_state.is_valid() {
            return self.session_expired(ServiceKind::Plex);
        }
        self.bus
            .service_status(ServiceKind::Plex, ServiceStatus::ConnectDone);

        self.bus
            .service_status(ServiceKind::Simkl, ServiceStatus::Connecting);
        let simkl_state = simkl_auth.check_validity(None).await;
        let token = match simkl_state {
            TokenState::Valid(token) => token,
            _ => return self.session_expired(ServiceKind::Simkl),
        };
        self.bus
            .service_status(ServiceKind::Simkl, ServiceStatus::ConnectDone);

        // 2. window: the full-sync flag forces one full cycle, then
        // reverts to incremental
        let window = match self.determine_window().await {
            Ok(window) => window,
            Err(e) => {
                tracing::error!(error = %e, "failed to determine activity window");
                return self.unexpected_failure();
            }
        };

        // 3. fetch and commit
        let fetch = self.simkl.get_all_items(&window, &token, cancel).await;
        if !fetch.success {
            if let Some(error) = &fetch.error {
                tracing::warn!(error = %error, "activity fetch failed");
            } else {
                tracing::warn!("activity fetch incomplete, window not advanced");
            }
            return self.unexpected_failure();
        }

        let mut items = 0;
        for (kind, entries) in &fetch.data {
            items += entries.len();
            if let Err(e) = self.store.set_last_synced(*kind, fetch.server_time.at).await {
                tracing::error!(error = %e, %kind, "failed to advance sync boundary");
            }
        }
        tracing::info!(
            items,
            server_time = %fetch.server_time.at,
            "sync cycle complete"
        );

        self.bus.send_action(Action::Progress { items });
        self.bus.send_action(Action::Finished);
        SyncOutcome::Completed { items }
    }

    async fn determine_window(&self) -> Result<ActivityWindow, crate::RuntimeError> {
        if self.store.take_full_sync_flag().await? {
            tracing::debug!("full sync requested, ignoring stored window");
            return Ok(ActivityWindow::Full);
        }
        Ok(ActivityWindow::Incremental(
            self.store.last_synced_all().await?,
        ))
    }

    fn session_expired(&self, service: ServiceKind) -> SyncOutcome {
        tracing::warn!(%service, "token invalid, halting sync");
        self.bus
            .service_status(service, ServiceStatus::SessionExpired);
        // session expiry is one of the two cases that stop the timer
        self.scheduler.stop();
        self.bus.send_action(Action::Failed);
        SyncOutcome::SessionExpired(service)
    }

    fn unexpected_failure(&self) -> SyncOutcome {
        self.bus
            .service_status(ServiceKind::Simkl, ServiceStatus::Unexpected);
        self.bus.send_action(Action::Failed);
        SyncOutcome::Failed
    }
}
