use tokio::sync::broadcast;

use crate::models::ServiceKind;

/// UI → background requests.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    /// Enable recurring sync with the given period.
    StartSync { period_hours: f64 },
    /// Disable recurring sync.
    StopSync,
    /// Run one sync cycle now, ahead of the next scheduled tick.
    SyncNow,
    /// Begin (or resume) an OAuth flow for a service.
    OauthStart {
        service: ServiceKind,
        in_new_surface: bool,
    },
    /// Validate the persisted token for a service.
    CheckToken { service: ServiceKind },
    /// Drop the persisted token for a service.
    Logout { service: ServiceKind },
    /// A permission prompt closed the surface it was issued from; the
    /// flow resumes in a fresh surface with this URL.
    ReopenAfterPermissionPrompt { url: String },
    Ping,
}

/// Background → UI state notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    SyncEnabled,
    SyncDisabled,
    Service {
        service: ServiceKind,
        status: ServiceStatus,
    },
    /// Items processed so far in the running cycle.
    Progress { items: usize },
    Finished,
    Failed,
    Pong,
}

/// Per-service connection state as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Online,
    Offline,
    Connecting,
    ConnectDone,
    /// Transient error; the UI auto-dismisses it after a fixed delay.
    Unexpected,
    /// Token rejected; recurring sync is stopped.
    SessionExpired,
    LoggedIn,
    LoggedOut,
}

/// Typed channel pair between the two contexts.
///
/// Delivery is fan-out and FIFO per sender only; a receiver must not
/// assume ordering across senders. State transitions that must arrive in
/// order ("connecting" then "connected") are sequenced by one sender.
#[derive(Clone)]
pub struct MessageBus {
    calls: broadcast::Sender<Call>,
    actions: broadcast::Sender<Action>,
}

impl MessageBus {
    pub fn new() -> Self {
        let (calls, _) = broadcast::channel(64);
        let (actions, _) = broadcast::channel(64);
        Self { calls, actions }
    }

    /// Fire-and-forget; a send with no live receiver is not an error.
    pub fn send_call(&self, call: Call) {
        tracing::debug!(?call, "bus call");
        let _ = self.calls.send(call);
    }

    pub fn send_action(&self, action: Action) {
        tracing::debug!(?action, "bus action");
        let _ = self.actions.send(action);
    }

    pub fn subscribe_calls(&self) -> broadcast::Receiver<Call> {
        self.calls.subscribe()
    }

    pub fn subscribe_actions(&self) -> broadcast::Receiver<Action> {
        self.actions.subscribe()
    }

    /// Convenience for the common per-service status broadcast.
    pub fn service_status(&self, service: ServiceKind, status: ServiceStatus) {
        self.send_action(Action::Service { service, status });
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}
