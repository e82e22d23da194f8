use url::Url;

use crate::error::WatariError;
use crate::storage::Storage;

/// Platform seam for origin-level network grants.
///
/// The real implementation prompts the user; tests stub it. The broker
/// never trusts the platform's own "has permission" query (unreliable in
/// this embedding) and keeps its own tracked set in [`Storage`] instead.
pub trait OriginPrompt {
    /// Ask the user to grant network access to an origin.
    fn request(&self, origin: &str) -> bool;

    /// Release a previously granted origin.
    fn revoke(&self, origin: &str);
}

/// Outcome of a permission request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionOutcome {
    Granted,
    /// The user declined; `message` is the blocking alert text. Sync
    /// setup must not proceed.
    Denied { message: String },
}

impl PermissionOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }
}

/// Requests and releases origin grants for the media-server URL.
pub struct PermissionBroker<P: OriginPrompt> {
    prompt: P,
}

impl<P: OriginPrompt> PermissionBroker<P> {
    pub fn new(prompt: P) -> Self {
        Self { prompt }
    }

    /// Reconcile grants when the instance URL changes: same origin is a
    /// no-op; a different origin revokes the old grant and requests the
    /// new one.
    pub fn reconcile(
        &self,
        storage: &Storage,
        old_url: Option<&str>,
        new_url: &Url,
    ) -> Result<PermissionOutcome, WatariError> {
        let old_origin = old_url
            .and_then(|u| Url::parse(u).ok())
            .map(|u| origin_of(&u));
        let new_origin = origin_of(new_url);

        if old_origin.as_deref() == Some(new_origin.as_str()) {
            return Ok(PermissionOutcome::Granted);
        }

        if let Some(origin) = old_origin {
            tracing::debug!(%origin, "revoking origin grant for replaced instance URL");
            self.prompt.revoke(&origin);
            storage.remove_allowed_origin(&origin)?;
        }
        self.request(storage, new_url)
    }

    /// Request a grant for the URL's origin, consulting the tracked set
    /// before prompting.
    pub fn request(&self, storage: &Storage, url: &Url) -> Result<PermissionOutcome, WatariError> {
        let origin = origin_of(url);
        if storage.allowed_origins()?.iter().any(|o| *o == origin) {
            return Ok(PermissionOutcome::Granted);
        }

        if self.prompt.request(&origin) {
            storage.add_allowed_origin(&origin)?;
            Ok(PermissionOutcome::Granted)
        } else {
            Ok(PermissionOutcome::Denied {
                message: format!(
                    "Access for: {url} was denied by you but it is required for sync to work."
                ),
            })
        }
    }

    /// Stash the URL before a prompt that may close the issuing surface;
    /// the flow resumes via [`Storage::take_pending_permission_url`].
    pub fn begin_pending(&self, storage: &Storage, url: &Url) -> Result<(), WatariError> {
        storage.set_pending_permission_url(url.as_str())
    }
}

/// scheme://host[:port] — the unit permissions are granted on.
pub fn origin_of(url: &Url) -> String {
    url.origin().ascii_serialization()
}

/// Validate and normalize a user-supplied media-server URL.
///
/// Only absolute http/https URLs with a host are accepted; anything else
/// is the "malformed input URL" state and sync cannot be enabled from it.
pub fn normalize_instance_url(input: &str) -> Result<Url, WatariError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(WatariError::InvalidUrl("empty URL".into()));
    }
    let url = Url::parse(trimmed).map_err(|e| WatariError::InvalidUrl(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(WatariError::InvalidUrl(format!(
                "unsupported scheme: {other}"
            )));
        }
    }
    if url.host_str().is_none() {
        return Err(WatariError::InvalidUrl("missing host".into()));
    }
    Ok(url)
}
