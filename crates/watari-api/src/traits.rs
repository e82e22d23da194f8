//! Trait definitions for the external tracking services.
//!
//! Both token managers (Plex, Simkl) implement [`TrackerAuth`], so the
//! orchestrator and UI glue stay service-agnostic.

use std::future::Future;

use watari_core::models::TokenState;

/// What `start_authorization` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStart {
    /// No pending code existed; the user was sent to the consent page.
    NavigatedToConsent { url: String },
    /// A pending one-time code was exchanged and a token persisted.
    LoggedIn,
}

/// OAuth token lifecycle for one external service.
pub trait TrackerAuth: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Begin authorization, or resume it when a one-time code from a
    /// previous redirect is pending. On failure any previously stored
    /// token is left untouched.
    fn start_authorization(
        &self,
        in_new_surface: bool,
    ) -> impl Future<Output = Result<AuthStart, Self::Error>> + Send;

    /// Validate the supplied token, or the persisted one when `None`.
    /// Never fails: "no token" is [`TokenState::Absent`], a rejected or
    /// unverifiable one is [`TokenState::Invalid`].
    fn check_validity(&self, token: Option<String>) -> impl Future<Output = TokenState> + Send;

    /// Drop the persisted token.
    fn logout(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}
