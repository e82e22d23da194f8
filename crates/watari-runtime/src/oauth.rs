//! Per-service OAuth token managers.
//!
//! Each manager owns the token lifecycle for one service: resuming a
//! pending one-time code into a token, validating token liveness, and
//! logout. One-time codes are deleted after exactly one exchange
//! attempt, success or failure, so a stale code can never be replayed.

use watari_api::plex::{self, PlexClient, PlexError};
use watari_api::simkl::{self, SimklClient};
use watari_api::traits::{AuthStart, TrackerAuth};
use watari_core::config::ServiceCredentials;
use watari_core::messages::{MessageBus, ServiceStatus};
use watari_core::models::{ServiceKind, TokenState};

use crate::store::StoreHandle;
use crate::RuntimeError;

/// Seam for sending the user to a consent page.
pub trait Navigator: Send + Sync {
    /// `in_new_surface` distinguishes "open a fresh tab/window" from
    /// "repurpose the current one".
    fn navigate(&self, url: &str, in_new_surface: bool) -> Result<(), String>;
}

/// Opens consent pages in the system browser.
pub struct SystemNavigator;

impl Navigator for SystemNavigator {
    fn navigate(&self, url: &str, _in_new_surface: bool) -> Result<(), String> {
        tracing::info!(%url, "opening consent page in browser");
        open::that(url).map_err(|e| e.to_string())
    }
}

/// Simkl token manager (authorization-code flow).
pub struct SimklTokenManager<N = SystemNavigator> {
    store: StoreHandle,
    bus: MessageBus,
    http: reqwest::Client,
    client: SimklClient,
    creds: ServiceCredentials,
    base_url: String,
    navigator: N,
}

impl SimklTokenManager {
    pub fn new(store: StoreHandle, bus: MessageBus, creds: ServiceCredentials) -> Self {
        Self::with_base_url(
            store,
            bus,
            creds,
            simkl::auth::BASE_URL.to_string(),
            SystemNavigator,
        )
    }
}

impl<N: Navigator> SimklTokenManager<N> {
    pub fn with_base_url(
        store: StoreHandle,
        bus: MessageBus,
        creds: ServiceCredentials,
        base_url: String,
        navigator: N,
    ) -> Self {
        let client = SimklClient::with_base_url(creds.client_id.clone(), base_url.clone());
        Self {
            store,
            bus,
            http: reqwest::Client::new(),
            client,
            creds,
            base_url,
            navigator,
        }
    }
}

impl<N: Navigator> TrackerAuth for SimklTokenManager<N> {
    type Error = RuntimeError;

    async fn start_authorization(&self, in_new_surface: bool) -> Result<AuthStart, RuntimeError> {
        if let Some(code) = self.store.one_time_code(ServiceKind::Simkl).await? {
            let exchanged = simkl::auth::exchange_code(
                &self.http,
                &self.base_url,
                &self.creds.client_id,
                &self.creds.client_secret,
                &code,
            )
            .await;
            // one exchange attempt per code, then it is gone
            self.store.delete_one_time_code(ServiceKind::Simkl).await?;

            match exchanged {
                Ok(token) => {
                    self.store
                        .set_oauth_token(ServiceKind::Simkl, token)
                        .await?;
                    self.bus
                        .service_status(ServiceKind::Simkl, ServiceStatus::LoggedIn);
                    Ok(AuthStart::LoggedIn)
                }
                Err(e) => Err(RuntimeError::Simkl(e)),
            }
        } else {
            let url = simkl::auth::authorize_url(&self.creds.client_id);
            self.navigator
                .navigate(&url, in_new_surface)
                .map_err(RuntimeError::Auth)?;
            Ok(AuthStart::NavigatedToConsent { url })
        }
    }

    async fn check_validity(&self, token: Option<String>) -> TokenState {
        let token = match token {
            Some(t) => t,
            None => match self.store.oauth_token(ServiceKind::Simkl).await {
                Ok(Some(t)) => t,
                Ok(None) => return TokenState::Absent,
                Err(e) => {
                    tracing::error!(error = %e, "failed to load simkl token");
                    return TokenState::Absent;
                }
            },
        };
        match self.client.get_last_activity(&token).await {
            Ok(check) if check.valid => TokenState::Valid(token),
            Ok(check) => {
                tracing::debug!(status = check.status, "simkl token invalid");
                TokenState::Invalid
            }
            Err(e) => {
                tracing::warn!(error = %e, "simkl validity check failed");
                TokenState::Invalid
            }
        }
    }

    async fn logout(&self) -> Result<(), RuntimeError> {
        self.store.delete_oauth_token(ServiceKind::Simkl).await?;
        self.bus
            .service_status(ServiceKind::Simkl, ServiceStatus::LoggedOut);
        Ok(())
    }
}

/// Plex token manager (PIN flow). The pending "one-time code" persisted
/// between surfaces is `"{pin_id}:{pin_code}"`.
pub struct PlexTokenManager<N = SystemNavigator> {
    store: StoreHandle,
    bus: MessageBus,
    http: reqwest::Client,
    client: PlexClient,
    creds: ServiceCredentials,
    base_url: String,
    navigator: N,
}

impl PlexTokenManager {
    pub fn new(store: StoreHandle, bus: MessageBus, creds: ServiceCredentials) -> Self {
        Self::with_base_url(
            store,
            bus,
            creds,
            plex::auth::BASE_URL.to_string(),
            SystemNavigator,
        )
    }
}

impl<N: Navigator> PlexTokenManager<N> {
    pub fn with_base_url(
        store: StoreHandle,
        bus: MessageBus,
        creds: ServiceCredentials,
        base_url: String,
        navigator: N,
    ) -> Self {
        let client = PlexClient::with_base_url(creds.client_id.clone(), base_url.clone());
        Self {
            store,
            bus,
            http: reqwest::Client::new(),
            client,
            creds,
            base_url,
            navigator,
        }
    }

    fn parse_pending(pending: &str) -> Result<(i64, &str), RuntimeError> {
        let (id, code) = pending
            .split_once(':')
            .ok_or_else(|| RuntimeError::Auth("malformed pending PIN".into()))?;
        let id = id
            .parse()
            .map_err(|_| RuntimeError::Auth("malformed pending PIN id".into()))?;
        Ok((id, code))
    }
}

impl<N: Navigator> TrackerAuth for PlexTokenManager<N> {
    type Error = RuntimeError;

    async fn start_authorization(&self, in_new_surface: bool) -> Result<AuthStart, RuntimeError> {
        if let Some(pending) = self.store.one_time_code(ServiceKind::Plex).await? {
            let exchanged = match Self::parse_pending(&pending) {
                Ok((pin_id, pin_code)) => plex::auth::exchange_pin(
                    &self.http,
                    &self.base_url,
                    &self.creds.client_id,
                    pin_id,
                    pin_code,
                )
                .await
                .map_err(RuntimeError::Plex),
                Err(e) => Err(e),
            };
            // one exchange attempt per PIN, then it is gone
            self.store.delete_one_time_code(ServiceKind::Plex).await?;

            match exchanged {
                Ok(token) => {
                    self.store.set_oauth_token(ServiceKind::Plex, token).await?;
                    self.bus
                        .service_status(ServiceKind::Plex, ServiceStatus::LoggedIn);
                    Ok(AuthStart::LoggedIn)
                }
                Err(e) => Err(e),
            }
        } else {
            let pin =
                plex::auth::request_pin(&self.http, &self.base_url, &self.creds.client_id).await?;
            self.store
                .set_one_time_code(ServiceKind::Plex, format!("{}:{}", pin.id, pin.code))
                .await?;
            let url = plex::auth::consent_url(&self.creds.client_id, &pin.code);
            self.navigator
                .navigate(&url, in_new_surface)
                .map_err(RuntimeError::Auth)?;
            Ok(AuthStart::NavigatedToConsent { url })
        }
    }

    async fn check_validity(&self, token: Option<String>) -> TokenState {
        let token = match token {
            Some(t) => t,
            None => match self.store.oauth_token(ServiceKind::Plex).await {
                Ok(Some(t)) => t,
                Ok(None) => return TokenState::Absent,
                Err(e) => {
                    tracing::error!(error = %e, "failed to load plex token");
                    return TokenState::Absent;
                }
            },
        };
        match self.client.check_token(&token).await {
            Ok(true) => TokenState::Valid(token),
            Ok(false) => TokenState::Invalid,
            Err(e) => {
                tracing::warn!(error = %e, "plex validity check failed");
                TokenState::Invalid
            }
        }
    }

    async fn logout(&self) -> Result<(), RuntimeError> {
        self.store.delete_oauth_token(ServiceKind::Plex).await?;
        self.bus
            .service_status(ServiceKind::Plex, ServiceStatus::LoggedOut);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Records navigation instead of opening a browser.
    struct RecordingNavigator {
        visits: Mutex<Vec<(String, bool)>>,
    }

    impl RecordingNavigator {
        fn new() -> Self {
            Self {
                visits: Mutex::new(Vec::new()),
            }
        }
    }

    impl Navigator for RecordingNavigator {
        fn navigate(&self, url: &str, in_new_surface: bool) -> Result<(), String> {
            self.visits
                .lock()
                .unwrap()
                .push((url.to_string(), in_new_surface));
            Ok(())
        }
    }

    fn creds() -> ServiceCredentials {
        ServiceCredentials {
            client_id: "cid".into(),
            client_secret: "secret".into(),
        }
    }

    fn simkl_manager(
        store: StoreHandle,
        base_url: String,
    ) -> SimklTokenManager<RecordingNavigator> {
        SimklTokenManager::with_base_url(
            store,
            MessageBus::new(),
            creds(),
            base_url,
            RecordingNavigator::new(),
        )
    }

    #[tokio::test]
    async fn test_pending_code_exchanged_and_consumed_on_success() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/oauth/token")
            .with_status(200)
            .with_body(r#"{"access_token":"fresh-tok"}"#)
            .create_async()
            .await;

        let store = StoreHandle::open_memory().unwrap();
        store
            .set_one_time_code(ServiceKind::Simkl, "code-1".into())
            .await
            .unwrap();

        let manager = simkl_manager(store.clone(), server.url());
        let started = manager.start_authorization(false).await.unwrap();

        assert_eq!(started, AuthStart::LoggedIn);
        assert_eq!(store.one_time_code(ServiceKind::Simkl).await.unwrap(), None);
        assert_eq!(
            store
                .oauth_token(ServiceKind::Simkl)
                .await
                .unwrap()
                .as_deref(),
            Some("fresh-tok")
        );
        // resuming a code never re-navigates to consent
        assert!(manager.navigator.visits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pending_code_consumed_even_when_exchange_fails() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/oauth/token")
            .with_status(200)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let store = StoreHandle::open_memory().unwrap();
        store
            .set_oauth_token(ServiceKind::Simkl, "old-tok".into())
            .await
            .unwrap();
        store
            .set_one_time_code(ServiceKind::Simkl, "stale-code".into())
            .await
            .unwrap();

        let manager = simkl_manager(store.clone(), server.url());
        let err = manager.start_authorization(false).await.unwrap_err();

        assert!(matches!(err, RuntimeError::Simkl(_)));
        // code is gone despite failure
        assert_eq!(store.one_time_code(ServiceKind::Simkl).await.unwrap(), None);
        // previous token untouched
        assert_eq!(
            store
                .oauth_token(ServiceKind::Simkl)
                .await
                .unwrap()
                .as_deref(),
            Some("old-tok")
        );
    }

    #[tokio::test]
    async fn test_code_consumed_even_when_network_fails() {
        let store = StoreHandle::open_memory().unwrap();
        store
            .set_one_time_code(ServiceKind::Simkl, "code-x".into())
            .await
            .unwrap();

        // unroutable token endpoint
        let manager = simkl_manager(store.clone(), "http://127.0.0.1:1".into());
        let err = manager.start_authorization(false).await.unwrap_err();

        assert!(matches!(err, RuntimeError::Simkl(_)));
        assert_eq!(store.one_time_code(ServiceKind::Simkl).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_no_pending_code_navigates_to_consent() {
        let store = StoreHandle::open_memory().unwrap();
        let manager = simkl_manager(store.clone(), "http://127.0.0.1:1".into());

        let started = manager.start_authorization(true).await.unwrap();
        match started {
            AuthStart::NavigatedToConsent { url } => {
                assert!(url.contains("response_type=code"));
            }
            other => panic!("Expected NavigatedToConsent, got {other:?}"),
        }

        let visits = manager.navigator.visits.lock().unwrap();
        assert_eq!(visits.len(), 1);
        assert!(visits[0].1);
        // nothing persisted yet
        assert_eq!(store.oauth_token(ServiceKind::Simkl).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_check_validity_tri_state() {
        let mut server = mockito::Server::new_async().await;
        let _ok = server
            .mock("GET", "/sync/activities")
            .match_header("authorization", "Bearer live")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;
        let _bad = server
            .mock("GET", "/sync/activities")
            .match_header("authorization", "Bearer dead")
            .with_status(401)
            .with_body("{}")
            .create_async()
            .await;

        let store = StoreHandle::open_memory().unwrap();
        let manager = simkl_manager(store.clone(), server.url());

        // absent
        assert_eq!(manager.check_validity(None).await, TokenState::Absent);

        // invalid (persisted)
        store
            .set_oauth_token(ServiceKind::Simkl, "dead".into())
            .await
            .unwrap();
        assert_eq!(manager.check_validity(None).await, TokenState::Invalid);

        // valid (supplied directly)
        assert_eq!(
            manager.check_validity(Some("live".into())).await,
            TokenState::Valid("live".into())
        );
    }

    #[tokio::test]
    async fn test_logout_deletes_token_and_notifies() {
        let store = StoreHandle::open_memory().unwrap();
        store
            .set_oauth_token(ServiceKind::Simkl, "tok".into())
            .await
            .unwrap();

        let bus = MessageBus::new();
        let mut actions = bus.subscribe_actions();
        let manager = SimklTokenManager::with_base_url(
            store.clone(),
            bus,
            creds(),
            "http://127.0.0.1:1".into(),
            RecordingNavigator::new(),
        );

        manager.logout().await.unwrap();
        assert_eq!(store.oauth_token(ServiceKind::Simkl).await.unwrap(), None);
        assert_eq!(
            actions.recv().await.unwrap(),
            watari_core::messages::Action::Service {
                service: ServiceKind::Simkl,
                status: ServiceStatus::LoggedOut
            }
        );
    }

    #[tokio::test]
    async fn test_plex_pin_flow_start_and_resume() {
        let mut server = mockito::Server::new_async().await;
        let _pin = server
            .mock("POST", "/api/v2/pins")
            .with_status(201)
            .with_body(r#"{"id":9,"code":"KLMN"}"#)
            .create_async()
            .await;
        let _check = server
            .mock("GET", "/api/v2/pins/9")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"id":9,"code":"KLMN","authToken":"plex-tok"}"#)
            .create_async()
            .await;

        let store = StoreHandle::open_memory().unwrap();
        let manager = PlexTokenManager::with_base_url(
            store.clone(),
            MessageBus::new(),
            creds(),
            server.url(),
            RecordingNavigator::new(),
        );

        // first call: requests a PIN, stashes it, navigates to consent
        let started = manager.start_authorization(false).await.unwrap();
        assert!(matches!(started, AuthStart::NavigatedToConsent { .. }));
        assert_eq!(
            store
                .one_time_code(ServiceKind::Plex)
                .await
                .unwrap()
                .as_deref(),
            Some("9:KLMN")
        );

        // second call: resumes the pending PIN into a token
        let resumed = manager.start_authorization(false).await.unwrap();
        assert_eq!(resumed, AuthStart::LoggedIn);
        assert_eq!(store.one_time_code(ServiceKind::Plex).await.unwrap(), None);
        assert_eq!(
            store
                .oauth_token(ServiceKind::Plex)
                .await
                .unwrap()
                .as_deref(),
            Some("plex-tok")
        );
    }
}
