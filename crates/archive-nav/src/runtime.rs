//! Single-task driver for a [`Coordinator`].
//!
//! Commands from any number of [`CoordinatorHandle`]s are applied strictly in
//! arrival order. At most one mount retry is pending at a time; a newer
//! retry replaces it, and it is discarded once the coordinator settles.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::coordinator::{Coordinator, CoordinatorState, DispatchOutcome, DispatchTicket};
use crate::error::CoordinatorError;
use crate::intro::IntroOutcome;
use crate::session::NavFlags;

#[derive(Debug)]
pub enum CoordinatorCommand {
    Start,
    IntroKey(char),
    CompleteIntro(IntroOutcome),
    Navigate { path: String, replace: bool },
    Back,
    Forward,
    AuthChanged(bool),
    ClearSession,
    Snapshot(oneshot::Sender<CoordinatorSnapshot>),
}

/// Point-in-time view of the coordinator, taken between commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorSnapshot {
    pub state: CoordinatorState,
    pub path: String,
    pub flags: NavFlags,
    pub mounted_screen: Option<String>,
    pub title: Option<String>,
    pub can_go_back: bool,
    pub can_go_forward: bool,
    pub retry_pending: bool,
}

#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::UnboundedSender<CoordinatorCommand>,
    cancel: CancellationToken,
}

impl CoordinatorHandle {
    pub fn send(&self, command: CoordinatorCommand) -> Result<(), CoordinatorError> {
        self.tx
            .send(command)
            .map_err(|_| CoordinatorError::QueueClosed)
    }

    pub fn start(&self) -> Result<(), CoordinatorError> {
        self.send(CoordinatorCommand::Start)
    }

    pub fn intro_key(&self, key: char) -> Result<(), CoordinatorError> {
        self.send(CoordinatorCommand::IntroKey(key))
    }

    pub fn complete_intro(&self, outcome: IntroOutcome) -> Result<(), CoordinatorError> {
        self.send(CoordinatorCommand::CompleteIntro(outcome))
    }

    pub fn navigate(&self, path: impl Into<String>, replace: bool) -> Result<(), CoordinatorError> {
        self.send(CoordinatorCommand::Navigate {
            path: path.into(),
            replace,
        })
    }

    pub fn back(&self) -> Result<(), CoordinatorError> {
        self.send(CoordinatorCommand::Back)
    }

    pub fn forward(&self) -> Result<(), CoordinatorError> {
        self.send(CoordinatorCommand::Forward)
    }

    pub fn auth_changed(&self, logged_in: bool) -> Result<(), CoordinatorError> {
        self.send(CoordinatorCommand::AuthChanged(logged_in))
    }

    pub fn clear_session(&self) -> Result<(), CoordinatorError> {
        self.send(CoordinatorCommand::ClearSession)
    }

    /// Resolves after every command sent before it has been applied.
    pub async fn snapshot(&self) -> Result<CoordinatorSnapshot, CoordinatorError> {
        let (reply, rx) = oneshot::channel();
        self.send(CoordinatorCommand::Snapshot(reply))?;
        rx.await.map_err(|_| CoordinatorError::QueueClosed)
    }

    /// Stop the driver. Queued commands are discarded.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// Spawn the driver on the current tokio runtime. The task ends on
/// [`CoordinatorHandle::shutdown`] or once every handle is dropped, and
/// yields the coordinator back.
pub fn spawn(coordinator: Coordinator) -> (CoordinatorHandle, JoinHandle<Coordinator>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(run(coordinator, rx, cancel.clone()));
    (CoordinatorHandle { tx, cancel }, task)
}

async fn run(
    mut coordinator: Coordinator,
    mut rx: mpsc::UnboundedReceiver<CoordinatorCommand>,
    cancel: CancellationToken,
) -> Coordinator {
    let mut pending: Option<(DispatchTicket, Instant)> = None;

    loop {
        let deadline = pending.as_ref().map(|(_, at)| *at);
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            command = rx.recv() => match command {
                Some(command) => apply(&mut coordinator, command, pending.is_some()),
                None => break,
            },
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                match pending.take() {
                    Some((ticket, _)) => coordinator.retry_dispatch(ticket),
                    None => DispatchOutcome::Ignored,
                }
            }
        };

        match outcome.retry() {
            Some((ticket, delay)) => pending = Some((ticket.clone(), Instant::now() + delay)),
            // Settled on another path; the old ticket can only come back stale.
            None if coordinator.state() != CoordinatorState::Dispatching => pending = None,
            None => {}
        }
    }

    tracing::debug!(
        path = coordinator.current_path(),
        "coordinator driver stopped"
    );
    coordinator
}

fn apply(
    coordinator: &mut Coordinator,
    command: CoordinatorCommand,
    retry_pending: bool,
) -> DispatchOutcome {
    match command {
        CoordinatorCommand::Start => coordinator.start(),
        CoordinatorCommand::IntroKey(key) => coordinator.intro_key(key),
        CoordinatorCommand::CompleteIntro(outcome) => coordinator.complete_intro(outcome),
        CoordinatorCommand::Navigate { path, replace } => coordinator.navigate(&path, replace),
        CoordinatorCommand::Back => coordinator.back(),
        CoordinatorCommand::Forward => coordinator.forward(),
        CoordinatorCommand::AuthChanged(logged_in) => {
            coordinator.handle_external_auth_change(logged_in)
        }
        CoordinatorCommand::ClearSession => coordinator.clear_session(),
        CoordinatorCommand::Snapshot(reply) => {
            let snapshot = CoordinatorSnapshot {
                state: coordinator.state(),
                path: coordinator.current_path().to_string(),
                flags: coordinator.flags().clone(),
                mounted_screen: coordinator.mounted_screen().map(str::to_string),
                title: coordinator.title().map(str::to_string),
                can_go_back: coordinator.history().can_go_back(),
                can_go_forward: coordinator.history().can_go_forward(),
                retry_pending,
            };
            // The requester may have given up; nothing to do then.
            let _ = reply.send(snapshot);
            DispatchOutcome::Ignored
        }
    }
}
