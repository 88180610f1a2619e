//! Error types for routing, flag storage, and the coordinator runtime.

use thiserror::Error;

/// Route registration, matching, and reverse-routing failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// No registered pattern matches the path. Recovered by redirecting to `/`.
    #[error("no route matches {path:?}")]
    NotFound { path: String },

    /// Two registrations used textually identical patterns.
    #[error("route pattern {pattern:?} is already registered")]
    DuplicatePattern { pattern: String },

    /// Pattern is not absolute, has an empty parameter name, or repeats one.
    #[error("invalid route pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A coordinator needs `/` registered so the not-found redirect terminates.
    #[error("route table has no entry for \"/\"")]
    MissingRoot,

    /// Reverse routing was asked to fill a parameter it was not given.
    #[error("missing parameter {name:?} for pattern {pattern:?}")]
    MissingParam { pattern: String, name: String },
}

/// Durable or ephemeral store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("store encode: {message}")]
    Encode { message: String },
}

/// Failures surfaced by the coordinator and its runtime handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    /// A screen never reported ready within the retry budget.
    #[error("screen {screen_id:?} for {path:?} not ready after {attempts} retries")]
    MountTimeout {
        path: String,
        screen_id: String,
        attempts: u32,
    },

    /// The coordinator task has stopped and can no longer accept commands.
    #[error("coordinator queue closed")]
    QueueClosed,
}

impl CoordinatorError {
    /// Whether the caller may reasonably try the same operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::MountTimeout { .. })
    }
}
