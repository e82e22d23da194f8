use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};

use watari_core::error::WatariError;
use watari_core::models::{MediaKind, ServiceKind};
use watari_core::storage::Storage;

use crate::RuntimeError;

/// Async handle to the key-value store, backed by a dedicated actor
/// thread that owns the SQLite connection.
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::UnboundedSender<StoreCommand>,
}

enum StoreCommand {
    GetToken {
        service: ServiceKind,
        reply: oneshot::Sender<Result<Option<String>, WatariError>>,
    },
    SetToken {
        service: ServiceKind,
        token: String,
        reply: oneshot::Sender<Result<(), WatariError>>,
    },
    DeleteToken {
        service: ServiceKind,
        reply: oneshot::Sender<Result<(), WatariError>>,
    },
    GetOneTimeCode {
        service: ServiceKind,
        reply: oneshot::Sender<Result<Option<String>, WatariError>>,
    },
    SetOneTimeCode {
        service: ServiceKind,
        code: String,
        reply: oneshot::Sender<Result<(), WatariError>>,
    },
    DeleteOneTimeCode {
        service: ServiceKind,
        reply: oneshot::Sender<Result<(), WatariError>>,
    },
    GetInstanceUrl {
        reply: oneshot::Sender<Result<Option<String>, WatariError>>,
    },
    GetSyncPeriod {
        reply: oneshot::Sender<Result<Option<f64>, WatariError>>,
    },
    SetInstanceUrlAndPeriod {
        url: String,
        period_hours: f64,
        reply: oneshot::Sender<Result<(), WatariError>>,
    },
    LastSyncedAll {
        reply: oneshot::Sender<Result<BTreeMap<MediaKind, Option<DateTime<Utc>>>, WatariError>>,
    },
    SetLastSynced {
        kind: MediaKind,
        at: DateTime<Utc>,
        reply: oneshot::Sender<Result<(), WatariError>>,
    },
    SetFullSyncFlag {
        reply: oneshot::Sender<Result<(), WatariError>>,
    },
    TakeFullSyncFlag {
        reply: oneshot::Sender<Result<bool, WatariError>>,
    },
    SetPendingPermissionUrl {
        url: String,
        reply: oneshot::Sender<Result<(), WatariError>>,
    },
    TakePendingPermissionUrl {
        reply: oneshot::Sender<Result<Option<String>, WatariError>>,
    },
    SetBackgroundUrls {
        landscape: Option<String>,
        portrait: Option<String>,
        reply: oneshot::Sender<Result<(), WatariError>>,
    },
}

impl StoreHandle {
    /// Open the store at `path` and spawn its actor thread.
    pub fn open(path: &Path) -> Result<Self, RuntimeError> {
        let storage = Storage::open(path).map_err(|e| RuntimeError::Store(e.to_string()))?;
        Ok(Self::spawn(storage))
    }

    /// In-memory store (tests).
    pub fn open_memory() -> Result<Self, RuntimeError> {
        let storage = Storage::open_memory().map_err(|e| RuntimeError::Store(e.to_string()))?;
        Ok(Self::spawn(storage))
    }

    fn spawn(storage: Storage) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::Builder::new()
            .name("store-actor".into())
            .spawn(move || actor_loop(storage, rx))
            .expect("spawn store actor thread");
        Self { tx }
    }

    async fn ask<T>(
        &self,
        rx: oneshot::Receiver<Result<T, WatariError>>,
    ) -> Result<T, RuntimeError> {
        rx.await
            .map_err(|_| RuntimeError::Store("store actor closed".into()))?
            .map_err(|e| RuntimeError::Store(e.to_string()))
    }

    pub async fn oauth_token(
        &self,
        service: ServiceKind,
    ) -> Result<Option<String>, RuntimeError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(StoreCommand::GetToken { service, reply });
        self.ask(rx).await
    }

    pub async fn set_oauth_token(
        &self,
        service: ServiceKind,
        token: String,
    ) -> Result<(), RuntimeError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(StoreCommand::SetToken {
            service,
            token,
            reply,
        });
        self.ask(rx).await
    }

    pub async fn delete_oauth_token(&self, service: ServiceKind) -> Result<(), RuntimeError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(StoreCommand::DeleteToken { service, reply });
        self.ask(rx).await
    }

    pub async fn one_time_code(
        &self,
        service: ServiceKind,
    ) -> Result<Option<String>, RuntimeError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(StoreCommand::GetOneTimeCode { service, reply });
        self.ask(rx).await
    }

    pub async fn set_one_time_code(
        &self,
        service: ServiceKind,
        code: String,
    ) -> Result<(), RuntimeError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(StoreCommand::SetOneTimeCode {
            service,
            code,
            reply,
        });
        self.ask(rx).await
    }

    pub async fn delete_one_time_code(&self, service: ServiceKind) -> Result<(), RuntimeError> {
        let (reply, rx) = oneshot::channel();
        let _ = self
            .tx
            .send(StoreCommand::DeleteOneTimeCode { service, reply });
        self.ask(rx).await
    }

    pub async fn instance_url(&self) -> Result<Option<String>, RuntimeError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(StoreCommand::GetInstanceUrl { reply });
        self.ask(rx).await
    }

    pub async fn sync_period_hours(&self) -> Result<Option<f64>, RuntimeError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(StoreCommand::GetSyncPeriod { reply });
        self.ask(rx).await
    }

    pub async fn set_instance_url_and_period(
        &self,
        url: String,
        period_hours: f64,
    ) -> Result<(), RuntimeError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(StoreCommand::SetInstanceUrlAndPeriod {
            url,
            period_hours,
            reply,
        });
        self.ask(rx).await
    }

    pub async fn last_synced_all(
        &self,
    ) -> Result<BTreeMap<MediaKind, Option<DateTime<Utc>>>, RuntimeError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(StoreCommand::LastSyncedAll { reply });
        self.ask(rx).await
    }

    pub async fn set_last_synced(
        &self,
        kind: MediaKind,
        at: DateTime<Utc>,
    ) -> Result<(), RuntimeError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(StoreCommand::SetLastSynced { kind, at, reply });
        self.ask(rx).await
    }

    pub async fn set_full_sync_flag(&self) -> Result<(), RuntimeError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(StoreCommand::SetFullSyncFlag { reply });
        self.ask(rx).await
    }

    pub async fn take_full_sync_flag(&self) -> Result<bool, RuntimeError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(StoreCommand::TakeFullSyncFlag { reply });
        self.ask(rx).await
    }

    pub async fn set_pending_permission_url(&self, url: String) -> Result<(), RuntimeError> {
        let (reply, rx) = oneshot::channel();
        let _ = self
            .tx
            .send(StoreCommand::SetPendingPermissionUrl { url, reply });
        self.ask(rx).await
    }

    pub async fn take_pending_permission_url(&self) -> Result<Option<String>, RuntimeError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(StoreCommand::TakePendingPermissionUrl { reply });
        self.ask(rx).await
    }

    pub async fn set_background_urls(
        &self,
        landscape: Option<String>,
        portrait: Option<String>,
    ) -> Result<(), RuntimeError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(StoreCommand::SetBackgroundUrls {
            landscape,
            portrait,
            reply,
        });
        self.ask(rx).await
    }
}

fn actor_loop(mut storage: Storage, mut rx: mpsc::UnboundedReceiver<StoreCommand>) {
    while let Some(cmd) = rx.blocking_recv() {
        match cmd {
            StoreCommand::GetToken { service, reply } => {
                let _ = reply.send(storage.oauth_token(service));
            }
            StoreCommand::SetToken {
                service,
                token,
                reply,
            } => {
                let _ = reply.send(storage.set_oauth_token(service, &token));
            }
            StoreCommand::DeleteToken { service, reply } => {
                let _ = reply.send(storage.delete_oauth_token(service));
            }
            StoreCommand::GetOneTimeCode { service, reply } => {
                let _ = reply.send(storage.one_time_code(service));
            }
            StoreCommand::SetOneTimeCode {
                service,
                code,
                reply,
            } => {
                let _ = reply.send(storage.set_one_time_code(service, &code));
            }
            StoreCommand::DeleteOneTimeCode { service, reply } => {
                let _ = reply.send(storage.delete_one_time_code(service));
            }
            StoreCommand::GetInstanceUrl { reply } => {
                let _ = reply.send(storage.instance_url());
            }
            StoreCommand::GetSyncPeriod { reply } => {
                let _ = reply.send(storage.sync_period_hours());
            }
            StoreCommand::SetInstanceUrlAndPeriod {
                url,
                period_hours,
                reply,
            } => {
                let _ = reply.send(storage.set_instance_url_and_period(&url, period_hours));
            }
            StoreCommand::LastSyncedAll { reply } => {
                let _ = reply.send(storage.last_synced_all());
            }
            StoreCommand::SetLastSynced { kind, at, reply } => {
                let _ = reply.send(storage.set_last_synced(kind, at));
            }
            StoreCommand::SetFullSyncFlag { reply } => {
                let _ = reply.send(storage.set_full_sync_flag());
            }
            StoreCommand::TakeFullSyncFlag { reply } => {
                let _ = reply.send(storage.take_full_sync_flag());
            }
            StoreCommand::SetPendingPermissionUrl { url, reply } => {
                let _ = reply.send(storage.set_pending_permission_url(&url));
            }
            StoreCommand::TakePendingPermissionUrl { reply } => {
                let _ = reply.send(storage.take_pending_permission_url());
            }
            StoreCommand::SetBackgroundUrls {
                landscape,
                portrait,
                reply,
            } => {
                let _ = reply.send(
                    storage.set_background_urls(landscape.as_deref(), portrait.as_deref()),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_token_round_trip_through_actor() {
        let store = StoreHandle::open_memory().unwrap();
        assert_eq!(store.oauth_token(ServiceKind::Simkl).await.unwrap(), None);

        store
            .set_oauth_token(ServiceKind::Simkl, "tok".into())
            .await
            .unwrap();
        assert_eq!(
            store
                .oauth_token(ServiceKind::Simkl)
                .await
                .unwrap()
                .as_deref(),
            Some("tok")
        );

        store.delete_oauth_token(ServiceKind::Simkl).await.unwrap();
        assert_eq!(store.oauth_token(ServiceKind::Simkl).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_full_sync_flag_through_actor() {
        let store = StoreHandle::open_memory().unwrap();
        store.set_full_sync_flag().await.unwrap();
        assert!(store.take_full_sync_flag().await.unwrap());
        assert!(!store.take_full_sync_flag().await.unwrap());
    }

    #[tokio::test]
    async fn test_clones_share_one_store() {
        let store = StoreHandle::open_memory().unwrap();
        let other = store.clone();
        store
            .set_instance_url_and_period("http://plex.local:32400/".into(), 6.0)
            .await
            .unwrap();
        assert_eq!(
            other.instance_url().await.unwrap().as_deref(),
            Some("http://plex.local:32400/")
        );
        assert_eq!(other.sync_period_hours().await.unwrap(), Some(6.0));
    }
}
