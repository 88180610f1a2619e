//! Navigation diagnostics.
//!
//! The coordinator emits one event per notable step (dispatch, redirect,
//! retry, timeout, auth change) so hosts can surface or store them.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavEventKind {
    IntroStarted,
    IntroCompleted,
    Dispatch,
    Redirect,
    LoginRequired,
    PendingRouteConsumed,
    MountRetry,
    MountTimeout,
    StaleRetry,
    AuthChange,
    SessionCleared,
    StoreFailure,
}

impl std::fmt::Display for NavEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::IntroStarted => "intro_started",
            Self::IntroCompleted => "intro_completed",
            Self::Dispatch => "dispatch",
            Self::Redirect => "redirect",
            Self::LoginRequired => "login_required",
            Self::PendingRouteConsumed => "pending_route_consumed",
            Self::MountRetry => "mount_retry",
            Self::MountTimeout => "mount_timeout",
            Self::StaleRetry => "stale_retry",
            Self::AuthChange => "auth_change",
            Self::SessionCleared => "session_cleared",
            Self::StoreFailure => "store_failure",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavEventOutcome {
    Success,
    Error(String),
}

impl std::fmt::Display for NavEventOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Error(msg) => write!(f, "error: {msg}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NavEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: NavEventKind,
    pub path: Option<String>,
    pub outcome: NavEventOutcome,
    pub detail: String,
}

impl NavEvent {
    pub fn new(
        kind: NavEventKind,
        path: Option<String>,
        outcome: NavEventOutcome,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            path,
            outcome,
            detail: detail.into(),
        }
    }

    pub fn success(kind: NavEventKind, path: Option<&str>, detail: impl Into<String>) -> Self {
        Self::new(
            kind,
            path.map(str::to_string),
            NavEventOutcome::Success,
            detail,
        )
    }

    pub fn error(kind: NavEventKind, path: Option<&str>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(
            kind,
            path.map(str::to_string),
            NavEventOutcome::Error(message.clone()),
            message,
        )
    }
}

/// Receives navigation events.
pub trait NavEventSink: Send + Sync {
    fn record(&self, event: NavEvent);
}

/// In-memory event sink for testing and diagnostics panels.
#[derive(Default)]
pub struct InMemoryNavEventSink {
    events: std::sync::Mutex<Vec<NavEvent>>,
}

impl InMemoryNavEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<NavEvent> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn count(&self) -> usize {
        match self.events.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn count_of(&self, kind: NavEventKind) -> usize {
        self.events()
            .iter()
            .filter(|event| event.kind == kind)
            .count()
    }
}

impl NavEventSink for InMemoryNavEventSink {
    fn record(&self, event: NavEvent) {
        match self.events.lock() {
            Ok(mut guard) => guard.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Discards all events.
pub struct NullNavEventSink;

impl NavEventSink for NullNavEventSink {
    fn record(&self, _event: NavEvent) {}
}
