//! archive-core: shared configuration and logging bootstrap for the archive
//! front end.
//!
//! The navigation coordinator and any host embedding it load the same
//! [`config::Config`] and install tracing through [`logging::init_logging`].

pub mod config;
pub mod logging;

/// Crate identity label used for smoke tests.
pub fn crate_label() -> &'static str {
    "archive-core"
}
