//! archive-nav: navigation and session-state coordinator for the archive
//! front end.
//!
//! Provides:
//! - `RouteTable`: pattern registration and path matching with `:param` capture
//! - `IntroGate`: the one-time intro decision and its completion hooks
//! - `SessionState`: durable and per-session navigation flags
//! - `Coordinator`: the state machine that turns navigation into mounted screens
//! - `runtime::spawn`: a tokio task that serialises commands for a coordinator
//!
//! Each dispatch step emits a `NavEvent` through the `NavEventSink` trait.

pub mod coordinator;
pub mod error;
pub mod event;
pub mod history;
pub mod intro;
pub mod mount;
pub mod retry;
pub mod route;
pub mod runtime;
pub mod session;
pub mod store;

use archive_core::config::Config;

use crate::session::SessionState;
use crate::store::{FileStore, MemoryStore};

/// Stable crate label used for bootstrap smoke tests.
pub fn crate_label() -> &'static str {
    "archive-nav"
}

/// Open session state backed by the configured durable store file, with a
/// fresh in-memory ephemeral store.
pub fn open_session(cfg: &Config) -> SessionState {
    let path = cfg.durable_store_path();
    let durable = FileStore::open(path.clone());
    for warning in durable.warnings() {
        tracing::warn!(path = %path.display(), "{warning}");
    }
    SessionState::new(Box::new(durable), Box::new(MemoryStore::new()))
}
