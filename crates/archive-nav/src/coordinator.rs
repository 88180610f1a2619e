//! Navigation coordinator: reconciles the intro gate, the durable session
//! flags, and the address history into the single screen that is mounted.
//!
//! Every operation runs to completion and returns a [`DispatchOutcome`].
//! The only suspension is a mount retry, which is handed back to the caller
//! as a [`DispatchTicket`] plus delay; the runtime feeds it back through
//! [`Coordinator::retry_dispatch`] on the same queue as every other command.

use std::sync::Arc;
use std::time::Duration;

use archive_core::config::Config;

use crate::error::{CoordinatorError, RouteError, StoreError};
use crate::event::{NavEvent, NavEventKind, NavEventSink, NullNavEventSink};
use crate::history::AddressHistory;
use crate::intro::{IntroGate, IntroInterrupt, IntroOutcome};
use crate::mount::ScreenHost;
use crate::retry::RetryPolicy;
use crate::route::{is_valid_path, RouteAccess, RouteTable};
use crate::session::{NavFlags, Screen, SessionState};

pub const ROOT_PATH: &str = "/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Uninitialized,
    ResolvingIntro,
    Dispatching,
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionEvent {
    Start,
    IntroSkipped,
    IntroCompleted,
    NavigationRequested,
    DispatchSettled,
    RetryScheduled,
}

/// Pure transition table. Events that do not apply leave the state alone.
pub fn next_state(current: CoordinatorState, event: TransitionEvent) -> CoordinatorState {
    use CoordinatorState as S;
    use TransitionEvent as E;
    match (current, event) {
        (S::Uninitialized, E::Start) => S::ResolvingIntro,
        (S::ResolvingIntro, E::IntroSkipped | E::IntroCompleted) => S::Dispatching,
        (S::Idle | S::Dispatching, E::NavigationRequested) => S::Dispatching,
        (S::Dispatching, E::DispatchSettled) => S::Idle,
        (S::Dispatching, E::RetryScheduled) => S::Dispatching,
        (state, _) => state,
    }
}

/// Identifies one dispatch cycle; a retry is only honoured while its
/// generation and path are still current.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchTicket {
    pub path: String,
    pub generation: u64,
    /// Retries already made for this cycle.
    pub attempt: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Route matched, screen mounted, handler invoked.
    Mounted { path: String, screen_id: String },
    /// Protected route while logged out; login is shown and the path kept.
    LoginRequired { path: String },
    /// The intro was diverted to the admin login screen.
    AdminLogin,
    /// Mount reported not ready; feed the ticket back after `delay`.
    RetryScheduled {
        ticket: DispatchTicket,
        delay: Duration,
    },
    /// A retry arrived for a path the user already left.
    Stale { path: String },
    /// The retry budget ran out.
    TimedOut(CoordinatorError),
    /// History updated; dispatch waits for the intro to finish.
    Deferred,
    /// Nothing to do (invalid path, wrong state, empty history move).
    Ignored,
}

impl DispatchOutcome {
    pub fn retry(&self) -> Option<(&DispatchTicket, Duration)> {
        match self {
            Self::RetryScheduled { ticket, delay } => Some((ticket, *delay)),
            _ => None,
        }
    }
}

pub struct Coordinator {
    routes: RouteTable,
    session: SessionState,
    gate: IntroGate,
    interrupt: IntroInterrupt,
    intro_enabled: bool,
    host: Arc<dyn ScreenHost>,
    events: Arc<dyn NavEventSink>,
    retry: RetryPolicy,
    history: AddressHistory,
    state: CoordinatorState,
    generation: u64,
    mounted: Option<String>,
    title: Option<String>,
    /// Title of the last route whose screen actually mounted.
    mounted_title: Option<String>,
}

impl Coordinator {
    /// Fails with `MissingRoot` unless `/` resolves, so the not-found
    /// redirect always terminates.
    pub fn new(
        routes: RouteTable,
        session: SessionState,
        host: Arc<dyn ScreenHost>,
        initial_path: &str,
    ) -> Result<Self, RouteError> {
        if routes.match_path(ROOT_PATH).is_err() {
            return Err(RouteError::MissingRoot);
        }
        let initial = if is_valid_path(initial_path) {
            initial_path
        } else {
            ROOT_PATH
        };
        Ok(Self {
            routes,
            session,
            gate: IntroGate::new(),
            interrupt: IntroInterrupt::default(),
            intro_enabled: true,
            host,
            events: Arc::new(NullNavEventSink),
            retry: RetryPolicy::default(),
            history: AddressHistory::new(initial),
            state: CoordinatorState::Uninitialized,
            generation: 0,
            mounted: None,
            title: None,
            mounted_title: None,
        })
    }

    /// Apply retry and intro settings from `cfg`.
    pub fn with_config(mut self, cfg: &Config) -> Self {
        self.retry = RetryPolicy::from_config(&cfg.retry);
        self.intro_enabled = cfg.intro.enabled;
        self.interrupt = IntroInterrupt::new(&cfg.intro.admin_sequence);
        self
    }

    pub fn with_events(mut self, events: Arc<dyn NavEventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_intro_gate(mut self, gate: IntroGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_intro_enabled(mut self, enabled: bool) -> Self {
        self.intro_enabled = enabled;
        self
    }

    pub fn with_interrupt(mut self, interrupt: IntroInterrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    pub fn current_path(&self) -> &str {
        self.history.current()
    }

    pub fn history(&self) -> &AddressHistory {
        &self.history
    }

    pub fn flags(&self) -> &NavFlags {
        self.session.flags()
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn mounted_screen(&self) -> Option<&str> {
        self.mounted.as_deref()
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn start(&mut self) -> DispatchOutcome {
        if self.state != CoordinatorState::Uninitialized {
            tracing::debug!(state = ?self.state, "start ignored; coordinator already running");
            return DispatchOutcome::Ignored;
        }
        let now_ms = chrono::Utc::now().timestamp_millis();
        if let Err(err) = self.session.session_record(now_ms) {
            self.store_failed("session record", &err);
        }
        self.transition(TransitionEvent::Start);

        let decision = IntroGate::decide(self.session.flags());
        tracing::info!(?decision, path = self.history.current(), "coordinator starting");
        if !decision.should_run() {
            self.transition(TransitionEvent::IntroSkipped);
            return self.dispatch_current();
        }
        if !self.intro_enabled {
            return self.complete_intro(IntroOutcome::Finished);
        }

        self.interrupt.reset();
        if self.session.flags().current_screen.is_none() {
            if let Err(err) = self.session.set_current_screen(Screen::Boot) {
                self.store_failed("current_screen", &err);
            }
        }
        if !self.mount_screen(Screen::Boot.as_str()) {
            tracing::warn!("boot screen not ready; intro continues without it");
        }
        self.events.record(NavEvent::success(
            NavEventKind::IntroStarted,
            Some(self.history.current()),
            "intro running",
        ));
        DispatchOutcome::Deferred
    }

    /// Feed a key typed during the intro. The admin sequence diverts it.
    pub fn intro_key(&mut self, key: char) -> DispatchOutcome {
        if self.state != CoordinatorState::ResolvingIntro {
            return DispatchOutcome::Ignored;
        }
        if self.interrupt.feed(key) {
            tracing::info!("admin key sequence interrupted the intro");
            return self.complete_intro(IntroOutcome::AdminOverride);
        }
        DispatchOutcome::Ignored
    }

    pub fn complete_intro(&mut self, outcome: IntroOutcome) -> DispatchOutcome {
        if self.state != CoordinatorState::ResolvingIntro {
            tracing::debug!(state = ?self.state, "intro completion ignored");
            return DispatchOutcome::Ignored;
        }
        if let Err(err) = self.gate.complete(&mut self.session, outcome) {
            self.store_failed("intro completion", &err);
        }
        self.events.record(NavEvent::success(
            NavEventKind::IntroCompleted,
            Some(self.history.current()),
            format!("{outcome:?}"),
        ));
        self.transition(TransitionEvent::IntroCompleted);

        match outcome {
            IntroOutcome::Finished => self.dispatch_current(),
            IntroOutcome::AdminOverride => {
                let screen = outcome.landing_screen();
                if !self.mount_screen(screen.as_str()) {
                    tracing::warn!(screen = %screen, "admin login screen not ready");
                }
                self.transition(TransitionEvent::DispatchSettled);
                DispatchOutcome::AdminLogin
            }
        }
    }

    /// Update history (push, or replace), then dispatch. Paths that are not
    /// absolute are ignored; unmatched paths redirect to `/`.
    pub fn navigate(&mut self, path: &str, replace: bool) -> DispatchOutcome {
        if !is_valid_path(path) {
            tracing::warn!(path, "ignoring navigation to a non-absolute path");
            return DispatchOutcome::Ignored;
        }
        if replace {
            self.history.replace(path);
        } else {
            self.history.push(path);
        }
        self.after_history_change()
    }

    pub fn back(&mut self) -> DispatchOutcome {
        if self.history.back().is_none() {
            return DispatchOutcome::Ignored;
        }
        self.after_history_change()
    }

    pub fn forward(&mut self) -> DispatchOutcome {
        if self.history.forward().is_none() {
            return DispatchOutcome::Ignored;
        }
        self.after_history_change()
    }

    /// Record a credential change. Logging in with a pending route consumes
    /// it and replaces the current entry with it.
    pub fn handle_external_auth_change(&mut self, logged_in: bool) -> DispatchOutcome {
        if let Err(err) = self.session.set_logged_in(logged_in) {
            self.store_failed("logged_in", &err);
        }
        tracing::info!(logged_in, "auth state changed");
        self.events.record(NavEvent::success(
            NavEventKind::AuthChange,
            None,
            format!("logged_in={logged_in}"),
        ));
        if !logged_in {
            return DispatchOutcome::Ignored;
        }

        let pending = match self.session.take_pending_route() {
            Ok(pending) => pending,
            Err(err) => {
                self.store_failed("pending_route", &err);
                None
            }
        };
        let Some(pending) = pending else {
            return DispatchOutcome::Ignored;
        };
        self.events.record(NavEvent::success(
            NavEventKind::PendingRouteConsumed,
            Some(&pending),
            "resuming after login",
        ));
        self.navigate(&pending, true)
    }

    /// Reset every flag and the ephemeral session, unmount the active
    /// screen, then go to `/`.
    pub fn clear_session(&mut self) -> DispatchOutcome {
        if let Err(err) = self.session.reset() {
            self.store_failed("clear session", &err);
        }
        self.interrupt.reset();
        if let Some(screen) = self.mounted.take() {
            self.host.unmount(&screen);
        }
        self.mounted_title = None;
        tracing::info!("session cleared");
        self.events.record(NavEvent::success(
            NavEventKind::SessionCleared,
            None,
            "flags and session reset",
        ));
        self.navigate(ROOT_PATH, true)
    }

    /// Re-run a dispatch whose mount was not ready. Dropped when the user has
    /// navigated since.
    pub fn retry_dispatch(&mut self, ticket: DispatchTicket) -> DispatchOutcome {
        let current = ticket.generation == self.generation
            && ticket.path == self.history.current()
            && self.state == CoordinatorState::Dispatching;
        if !current {
            tracing::debug!(
                path = %ticket.path,
                generation = ticket.generation,
                "dropping stale mount retry"
            );
            self.events.record(NavEvent::success(
                NavEventKind::StaleRetry,
                Some(&ticket.path),
                "path no longer current",
            ));
            return DispatchOutcome::Stale { path: ticket.path };
        }
        self.run_dispatch(ticket, true)
    }

    fn after_history_change(&mut self) -> DispatchOutcome {
        match self.state {
            CoordinatorState::Uninitialized | CoordinatorState::ResolvingIntro => {
                // Invalidate any in-flight retry; dispatch happens after the intro.
                self.generation += 1;
                DispatchOutcome::Deferred
            }
            CoordinatorState::Dispatching | CoordinatorState::Idle => {
                self.transition(TransitionEvent::NavigationRequested);
                self.dispatch_current()
            }
        }
    }

    fn dispatch_current(&mut self) -> DispatchOutcome {
        self.generation += 1;
        let ticket = DispatchTicket {
            path: self.history.current().to_string(),
            generation: self.generation,
            attempt: 0,
        };
        self.run_dispatch(ticket, true)
    }

    fn run_dispatch(&mut self, ticket: DispatchTicket, allow_redirect: bool) -> DispatchOutcome {
        let matched = self
            .routes
            .match_path(&ticket.path)
            .map(|matched| (matched.entry.clone(), matched.params));
        let (entry, params) = match matched {
            Ok(matched) => matched,
            Err(err) => {
                if !allow_redirect {
                    tracing::error!(%err, "redirect target did not resolve");
                    self.transition(TransitionEvent::DispatchSettled);
                    return DispatchOutcome::Ignored;
                }
                tracing::info!(path = %ticket.path, "no route matched; redirecting to /");
                self.events.record(NavEvent::success(
                    NavEventKind::Redirect,
                    Some(&ticket.path),
                    "redirect to /",
                ));
                self.history.replace(ROOT_PATH);
                self.generation += 1;
                let redirect = DispatchTicket {
                    path: ROOT_PATH.to_string(),
                    generation: self.generation,
                    attempt: 0,
                };
                return self.run_dispatch(redirect, false);
            }
        };

        if entry.access == RouteAccess::Authenticated && !self.session.flags().logged_in {
            return self.require_login(ticket);
        }

        self.title = Some(entry.title.clone());
        self.host.set_title(&entry.title);
        if !self.mount_screen(&entry.screen_id) {
            return self.schedule_retry(ticket, &entry.screen_id);
        }
        self.mounted_title = Some(entry.title.clone());

        if entry.access == RouteAccess::Authenticated {
            if let Err(err) = self.session.set_current_screen(Screen::Main) {
                self.store_failed("current_screen", &err);
            }
            if let Err(err) = self.session.take_pending_route() {
                self.store_failed("pending_route", &err);
            }
        }
        if let Err(err) = self.session.set_last_active_view(&entry.screen_id) {
            self.store_failed("last_active_view", &err);
        }

        self.transition(TransitionEvent::DispatchSettled);
        (entry.handler)(&params);
        tracing::debug!(
            path = %ticket.path,
            screen = %entry.screen_id,
            pattern = entry.pattern.as_str(),
            "dispatched"
        );
        self.events.record(NavEvent::success(
            NavEventKind::Dispatch,
            Some(&ticket.path),
            entry.screen_id.clone(),
        ));
        DispatchOutcome::Mounted {
            path: ticket.path,
            screen_id: entry.screen_id,
        }
    }

    fn require_login(&mut self, ticket: DispatchTicket) -> DispatchOutcome {
        if let Err(err) = self.session.set_pending_route(&ticket.path) {
            self.store_failed("pending_route", &err);
        }
        if let Err(err) = self.session.set_current_screen(Screen::Login) {
            self.store_failed("current_screen", &err);
        }
        let login = Screen::Login.as_str();
        if !self.mount_screen(login) {
            return self.schedule_retry(ticket, login);
        }
        self.transition(TransitionEvent::DispatchSettled);
        tracing::info!(path = %ticket.path, "login required; path kept as pending route");
        self.events.record(NavEvent::success(
            NavEventKind::LoginRequired,
            Some(&ticket.path),
            "pending route stored",
        ));
        DispatchOutcome::LoginRequired { path: ticket.path }
    }

    fn schedule_retry(&mut self, ticket: DispatchTicket, screen_id: &str) -> DispatchOutcome {
        let attempt = ticket.attempt + 1;
        if self.retry.exhausted(attempt) {
            let err = CoordinatorError::MountTimeout {
                path: ticket.path.clone(),
                screen_id: screen_id.to_string(),
                attempts: ticket.attempt,
            };
            tracing::warn!(%err, "giving up on mount");
            self.restore_mounted_title();
            self.events.record(NavEvent::error(
                NavEventKind::MountTimeout,
                Some(&ticket.path),
                err.to_string(),
            ));
            self.transition(TransitionEvent::DispatchSettled);
            return DispatchOutcome::TimedOut(err);
        }

        let delay = self.retry.delay_for(attempt);
        tracing::debug!(
            path = %ticket.path,
            screen = screen_id,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "screen not ready; retrying"
        );
        self.events.record(NavEvent::success(
            NavEventKind::MountRetry,
            Some(&ticket.path),
            format!("attempt {attempt} for {screen_id}"),
        ));
        self.transition(TransitionEvent::RetryScheduled);
        DispatchOutcome::RetryScheduled {
            ticket: DispatchTicket { attempt, ..ticket },
            delay,
        }
    }

    /// Mount `screen_id`, unmounting the previous screen only once the new
    /// one is up. Already-mounted screens are not remounted.
    fn mount_screen(&mut self, screen_id: &str) -> bool {
        if self.mounted.as_deref() == Some(screen_id) {
            return true;
        }
        if !self.host.mount(screen_id) {
            return false;
        }
        if let Some(previous) = self.mounted.replace(screen_id.to_string()) {
            self.host.unmount(&previous);
        }
        true
    }

    /// Point the title back at the screen that is still showing.
    fn restore_mounted_title(&mut self) {
        if self.title == self.mounted_title {
            return;
        }
        self.title = self.mounted_title.clone();
        if let Some(title) = &self.title {
            self.host.set_title(title);
        }
    }

    fn transition(&mut self, event: TransitionEvent) {
        let next = next_state(self.state, event);
        if next != self.state {
            tracing::trace!(from = ?self.state, to = ?next, ?event, "coordinator transition");
        }
        self.state = next;
    }

    fn store_failed(&self, what: &str, err: &StoreError) {
        tracing::warn!(%err, what, "flag store write failed; continuing in memory");
        self.events.record(NavEvent::error(
            NavEventKind::StoreFailure,
            None,
            format!("{what}: {err}"),
        ));
    }
}
