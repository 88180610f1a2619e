//! Durable navigation flags, the ephemeral session record, and the
//! [`SessionState`] value object that owns both.
//!
//! Raw key/value access stays inside this module. Every durable write
//! rewrites the whole [`NavFlags`] record in one batch, so readers never
//! observe a half-applied update.

use std::fmt;

use crate::error::StoreError;
use crate::store::{KeyValueStore, MemoryStore, StoreOp};

const KEY_BOOT_COMPLETED: &str = "boot_completed";
const KEY_CURRENT_SCREEN: &str = "current_screen";
const KEY_LOGGED_IN: &str = "logged_in";
const KEY_PENDING_ROUTE: &str = "pending_route";

const KEY_SESSION_STARTED_AT: &str = "session_started_at_ms";
const KEY_LAST_ACTIVE_VIEW: &str = "last_active_view";

/// Mutually exclusive top-level UI states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Screen {
    Boot,
    Login,
    Register,
    Main,
    AdminLogin,
    AdminDashboard,
}

impl Screen {
    pub const ALL: [Screen; 6] = [
        Screen::Boot,
        Screen::Login,
        Screen::Register,
        Screen::Main,
        Screen::AdminLogin,
        Screen::AdminDashboard,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Boot => "boot",
            Self::Login => "login",
            Self::Register => "register",
            Self::Main => "main",
            Self::AdminLogin => "admin-login",
            Self::AdminDashboard => "admin-dashboard",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL.into_iter().find(|screen| screen.as_str() == value)
    }
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable navigation flags. `Default` is the fully-unset record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NavFlags {
    pub boot_completed: bool,
    pub current_screen: Option<Screen>,
    pub logged_in: bool,
    pub pending_route: Option<String>,
}

/// Created on first access per process lifetime; never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionRecord {
    pub started_at_epoch_ms: i64,
}

/// Typed view over the durable medium.
pub struct DurableFlagStore {
    backend: Box<dyn KeyValueStore>,
}

impl DurableFlagStore {
    pub fn new(backend: Box<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    pub fn load(&self) -> NavFlags {
        let current_screen = self.backend.get(KEY_CURRENT_SCREEN).and_then(|raw| {
            let parsed = Screen::parse(&raw);
            if parsed.is_none() {
                tracing::warn!(value = %raw, "ignoring unknown persisted screen");
            }
            parsed
        });
        NavFlags {
            boot_completed: read_bool(self.backend.as_ref(), KEY_BOOT_COMPLETED),
            current_screen,
            logged_in: read_bool(self.backend.as_ref(), KEY_LOGGED_IN),
            pending_route: self
                .backend
                .get(KEY_PENDING_ROUTE)
                .filter(|route| !route.trim().is_empty()),
        }
    }

    /// Replace the whole record in one batch.
    pub fn write(&mut self, flags: &NavFlags) -> Result<(), StoreError> {
        let mut ops = vec![
            StoreOp::set(KEY_BOOT_COMPLETED, bool_str(flags.boot_completed)),
            StoreOp::set(KEY_LOGGED_IN, bool_str(flags.logged_in)),
        ];
        ops.push(match flags.current_screen {
            Some(screen) => StoreOp::set(KEY_CURRENT_SCREEN, screen.as_str()),
            None => StoreOp::remove(KEY_CURRENT_SCREEN),
        });
        ops.push(match &flags.pending_route {
            Some(route) => StoreOp::set(KEY_PENDING_ROUTE, route.clone()),
            None => StoreOp::remove(KEY_PENDING_ROUTE),
        });
        self.backend.apply(&ops)
    }

    /// Remove all four flags together.
    pub fn clear(&mut self) -> Result<(), StoreError> {
        self.backend.apply(&[
            StoreOp::remove(KEY_BOOT_COMPLETED),
            StoreOp::remove(KEY_CURRENT_SCREEN),
            StoreOp::remove(KEY_LOGGED_IN),
            StoreOp::remove(KEY_PENDING_ROUTE),
        ])
    }
}

/// Typed view over the process-lifetime medium.
pub struct EphemeralFlagStore {
    backend: Box<dyn KeyValueStore>,
}

impl EphemeralFlagStore {
    pub fn new(backend: Box<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Return the session record, creating it stamped `now_ms` if absent.
    pub fn session_record(&mut self, now_ms: i64) -> Result<SessionRecord, StoreError> {
        if let Some(started) = self
            .backend
            .get(KEY_SESSION_STARTED_AT)
            .and_then(|raw| raw.parse::<i64>().ok())
        {
            return Ok(SessionRecord {
                started_at_epoch_ms: started,
            });
        }
        self.backend
            .apply(&[StoreOp::set(KEY_SESSION_STARTED_AT, now_ms.to_string())])?;
        Ok(SessionRecord {
            started_at_epoch_ms: now_ms,
        })
    }

    pub fn peek_session_record(&self) -> Option<SessionRecord> {
        self.backend
            .get(KEY_SESSION_STARTED_AT)
            .and_then(|raw| raw.parse::<i64>().ok())
            .map(|started_at_epoch_ms| SessionRecord {
                started_at_epoch_ms,
            })
    }

    pub fn last_active_view(&self) -> Option<String> {
        self.backend.get(KEY_LAST_ACTIVE_VIEW)
    }

    pub fn set_last_active_view(&mut self, view: &str) -> Result<(), StoreError> {
        self.backend
            .apply(&[StoreOp::set(KEY_LAST_ACTIVE_VIEW, view)])
    }

    pub fn clear(&mut self) -> Result<(), StoreError> {
        self.backend.apply(&[StoreOp::Clear])
    }
}

/// Joint owner of the durable flags and the ephemeral session.
///
/// The cached [`NavFlags`] always reflect the last requested write; a
/// backend failure is returned to the caller but does not roll the cache
/// back, so navigation keeps working on in-memory state.
pub struct SessionState {
    durable: DurableFlagStore,
    ephemeral: EphemeralFlagStore,
    flags: NavFlags,
}

impl SessionState {
    pub fn new(durable: Box<dyn KeyValueStore>, ephemeral: Box<dyn KeyValueStore>) -> Self {
        let durable = DurableFlagStore::new(durable);
        let flags = durable.load();
        Self {
            durable,
            ephemeral: EphemeralFlagStore::new(ephemeral),
            flags,
        }
    }

    /// Both scopes backed by memory.
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStore::new()), Box::new(MemoryStore::new()))
    }

    pub fn flags(&self) -> &NavFlags {
        &self.flags
    }

    fn update(&mut self, change: impl FnOnce(&mut NavFlags)) -> Result<(), StoreError> {
        let mut next = self.flags.clone();
        change(&mut next);
        self.flags = next;
        self.durable.write(&self.flags)
    }

    /// Mark the intro as done, defaulting the screen to `fallback` when it is
    /// unset or still `boot`.
    pub fn mark_boot_completed(&mut self, fallback: Screen) -> Result<(), StoreError> {
        self.update(|flags| {
            flags.boot_completed = true;
            if matches!(flags.current_screen, None | Some(Screen::Boot)) {
                flags.current_screen = Some(fallback);
            }
        })
    }

    /// Mark the intro as done and land on `screen` unconditionally.
    pub fn mark_boot_completed_at(&mut self, screen: Screen) -> Result<(), StoreError> {
        self.update(|flags| {
            flags.boot_completed = true;
            flags.current_screen = Some(screen);
        })
    }

    pub fn set_current_screen(&mut self, screen: Screen) -> Result<(), StoreError> {
        self.update(|flags| flags.current_screen = Some(screen))
    }

    pub fn set_logged_in(&mut self, logged_in: bool) -> Result<(), StoreError> {
        self.update(|flags| flags.logged_in = logged_in)
    }

    pub fn set_pending_route(&mut self, route: &str) -> Result<(), StoreError> {
        self.update(|flags| flags.pending_route = Some(route.to_string()))
    }

    /// Remove and return the pending route. A second call returns `None`.
    pub fn take_pending_route(&mut self) -> Result<Option<String>, StoreError> {
        let Some(route) = self.flags.pending_route.clone() else {
            return Ok(None);
        };
        self.update(|flags| flags.pending_route = None)?;
        Ok(Some(route))
    }

    /// Reset every durable flag and drop the ephemeral session together.
    pub fn reset(&mut self) -> Result<(), StoreError> {
        self.flags = NavFlags::default();
        let durable = self.durable.clear();
        let ephemeral = self.ephemeral.clear();
        durable.and(ephemeral)
    }

    pub fn session_record(&mut self, now_ms: i64) -> Result<SessionRecord, StoreError> {
        self.ephemeral.session_record(now_ms)
    }

    pub fn peek_session_record(&self) -> Option<SessionRecord> {
        self.ephemeral.peek_session_record()
    }

    pub fn last_active_view(&self) -> Option<String> {
        self.ephemeral.last_active_view()
    }

    pub fn set_last_active_view(&mut self, view: &str) -> Result<(), StoreError> {
        self.ephemeral.set_last_active_view(view)
    }
}

fn read_bool(store: &dyn KeyValueStore, key: &str) -> bool {
    matches!(store.get(key).as_deref().map(str::trim), Some("true"))
}

fn bool_str(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}
