#![allow(clippy::expect_used, clippy::unwrap_used)]

//! Command serialisation and retry timing through the tokio driver.

use std::sync::Arc;
use std::time::Duration;

use archive_nav::coordinator::{Coordinator, CoordinatorState};
use archive_nav::error::CoordinatorError;
use archive_nav::event::{InMemoryNavEventSink, NavEventKind};
use archive_nav::intro::IntroOutcome;
use archive_nav::mount::RecordingScreenHost;
use archive_nav::retry::RetryPolicy;
use archive_nav::route::RouteTable;
use archive_nav::runtime::{self, CoordinatorHandle, CoordinatorSnapshot};
use archive_nav::session::{Screen, SessionState};

fn table() -> RouteTable {
    let mut table = RouteTable::new();
    table.register("/", "home", "Archive", |_| {}).unwrap();
    table
        .register("/article/:id", "article", "Article", |_| {})
        .unwrap();
    table
        .register_protected("/library", "main", "Library", |_| {})
        .unwrap();
    table
}

fn booted_session() -> SessionState {
    let mut session = SessionState::in_memory();
    session.mark_boot_completed(Screen::Login).unwrap();
    session
}

fn build(
    session: SessionState,
    host: Arc<RecordingScreenHost>,
    events: Arc<InMemoryNavEventSink>,
    max_attempts: u32,
) -> Coordinator {
    Coordinator::new(table(), session, host, "/")
        .unwrap()
        .with_events(events)
        .with_retry_policy(RetryPolicy {
            initial_delay: Duration::from_millis(2),
            max_delay: Duration::from_millis(10),
            multiplier: 2,
            max_attempts,
        })
}

async fn wait_for<F>(handle: &CoordinatorHandle, done: F) -> CoordinatorSnapshot
where
    F: Fn(&CoordinatorSnapshot) -> bool,
{
    for _ in 0..400 {
        let snapshot = handle.snapshot().await.unwrap();
        if done(&snapshot) {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("coordinator never reached the expected state");
}

#[tokio::test]
async fn commands_apply_in_order() {
    let host = Arc::new(RecordingScreenHost::new());
    let events = Arc::new(InMemoryNavEventSink::new());
    let (handle, _task) = runtime::spawn(build(booted_session(), host.clone(), events, 8));

    handle.start().unwrap();
    handle.navigate("/article/1", false).unwrap();
    handle.navigate("/article/2", false).unwrap();
    handle.back().unwrap();

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, CoordinatorState::Idle);
    assert_eq!(snapshot.path, "/article/1");
    assert_eq!(snapshot.mounted_screen.as_deref(), Some("article"));
    assert_eq!(snapshot.title.as_deref(), Some("Article"));
    assert!(snapshot.can_go_back);
    assert!(snapshot.can_go_forward);
    assert_eq!(host.mounted(), vec!["home".to_string(), "article".to_string()]);
}

#[tokio::test]
async fn intro_flow_runs_through_handle() {
    let host = Arc::new(RecordingScreenHost::new());
    let events = Arc::new(InMemoryNavEventSink::new());
    let (handle, _task) = runtime::spawn(build(
        SessionState::in_memory(),
        host.clone(),
        events,
        8,
    ));

    handle.start().unwrap();
    let during = handle.snapshot().await.unwrap();
    assert_eq!(during.state, CoordinatorState::ResolvingIntro);
    assert_eq!(during.mounted_screen.as_deref(), Some("boot"));

    handle.complete_intro(IntroOutcome::Finished).unwrap();
    let after = handle.snapshot().await.unwrap();
    assert_eq!(after.state, CoordinatorState::Idle);
    assert!(after.flags.boot_completed);
    assert_eq!(after.flags.current_screen, Some(Screen::Login));
    assert_eq!(after.mounted_screen.as_deref(), Some("home"));
}

#[tokio::test]
async fn pending_retry_fires_and_mounts() {
    let host = Arc::new(RecordingScreenHost::new().with_not_ready("article", 2));
    let events = Arc::new(InMemoryNavEventSink::new());
    let (handle, _task) =
        runtime::spawn(build(booted_session(), host.clone(), events.clone(), 8));

    handle.start().unwrap();
    handle.navigate("/article/9", false).unwrap();

    let first = handle.snapshot().await.unwrap();
    assert_eq!(first.state, CoordinatorState::Dispatching);
    assert!(first.retry_pending);

    let settled = wait_for(&handle, |s| s.mounted_screen.as_deref() == Some("article")).await;
    assert_eq!(settled.state, CoordinatorState::Idle);
    assert!(!settled.retry_pending);
    assert_eq!(host.mount_attempts("article"), 3);
    assert_eq!(events.count_of(NavEventKind::MountRetry), 2);
}

#[tokio::test]
async fn auth_change_during_retry_supersedes_it() {
    let host = Arc::new(RecordingScreenHost::new().with_never_ready("article"));
    let events = Arc::new(InMemoryNavEventSink::new());
    let (handle, _task) =
        runtime::spawn(build(booted_session(), host.clone(), events.clone(), 50));

    handle.start().unwrap();
    handle.navigate("/library", false).unwrap();
    let diverted = handle.snapshot().await.unwrap();
    assert_eq!(diverted.mounted_screen.as_deref(), Some("login"));
    assert_eq!(diverted.flags.pending_route.as_deref(), Some("/library"));

    handle.navigate("/article/3", false).unwrap();
    let retrying = handle.snapshot().await.unwrap();
    assert!(retrying.retry_pending);

    handle.auth_changed(true).unwrap();
    let resumed = handle.snapshot().await.unwrap();
    assert_eq!(resumed.path, "/library");
    assert_eq!(resumed.mounted_screen.as_deref(), Some("main"));
    assert!(resumed.flags.logged_in);
    assert_eq!(resumed.flags.pending_route, None);
    assert_eq!(resumed.state, CoordinatorState::Idle);
    assert!(!resumed.retry_pending);

    host.make_ready("article");
    tokio::time::sleep(Duration::from_millis(30)).await;
    let last = handle.snapshot().await.unwrap();
    assert_eq!(last.mounted_screen.as_deref(), Some("main"));
    assert_eq!(last.path, "/library");
    assert_eq!(events.count_of(NavEventKind::StaleRetry), 0);
    assert_eq!(
        host.mounted(),
        vec!["home".to_string(), "login".to_string(), "main".to_string()]
    );
}

#[tokio::test]
async fn settled_navigation_discards_superseded_retry() {
    let host = Arc::new(RecordingScreenHost::new().with_never_ready("article"));
    let events = Arc::new(InMemoryNavEventSink::new());
    let coordinator = build(booted_session(), host.clone(), events.clone(), 8)
        .with_retry_policy(RetryPolicy {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(2),
            multiplier: 1,
            max_attempts: 8,
        });
    let (handle, _task) = runtime::spawn(coordinator);

    handle.start().unwrap();
    handle.navigate("/article/1", false).unwrap();
    assert!(handle.snapshot().await.unwrap().retry_pending);

    handle.navigate("/", false).unwrap();
    let snapshot = handle.snapshot().await.unwrap();

    assert_eq!(snapshot.state, CoordinatorState::Idle);
    assert_eq!(snapshot.mounted_screen.as_deref(), Some("home"));
    assert_eq!(snapshot.path, "/");
    assert!(!snapshot.retry_pending);
    assert_eq!(host.mount_attempts("article"), 1);
}

#[tokio::test]
async fn exhausted_retries_surface_mount_timeout() {
    let host = Arc::new(RecordingScreenHost::new().with_never_ready("article"));
    let events = Arc::new(InMemoryNavEventSink::new());
    let (handle, _task) =
        runtime::spawn(build(booted_session(), host.clone(), events.clone(), 3));

    handle.start().unwrap();
    handle.navigate("/article/3", false).unwrap();

    let settled = wait_for(&handle, |s| s.state == CoordinatorState::Idle).await;
    assert!(!settled.retry_pending);
    assert_eq!(settled.mounted_screen.as_deref(), Some("home"));
    assert_eq!(events.count_of(NavEventKind::MountTimeout), 1);
    assert_eq!(host.mount_attempts("article"), 4);
}

#[tokio::test]
async fn clear_session_resets_flags_through_handle() {
    let host = Arc::new(RecordingScreenHost::new());
    let events = Arc::new(InMemoryNavEventSink::new());
    let (handle, _task) = runtime::spawn(build(booted_session(), host, events, 8));

    handle.start().unwrap();
    handle.navigate("/library", false).unwrap();
    handle.clear_session().unwrap();

    let snapshot = handle.snapshot().await.unwrap();
    assert!(!snapshot.flags.boot_completed);
    assert_eq!(snapshot.flags.pending_route, None);
    assert_eq!(snapshot.flags.current_screen, None);
    assert_eq!(snapshot.path, "/");
}

#[tokio::test]
async fn shutdown_returns_coordinator_and_closes_queue() {
    let host = Arc::new(RecordingScreenHost::new());
    let events = Arc::new(InMemoryNavEventSink::new());
    let (handle, task) = runtime::spawn(build(booted_session(), host, events, 8));

    handle.start().unwrap();
    handle.navigate("/article/4", false).unwrap();
    handle.snapshot().await.unwrap();
    handle.shutdown();

    let coordinator = task.await.unwrap();
    assert_eq!(coordinator.current_path(), "/article/4");
    assert_eq!(
        handle.navigate("/", false).unwrap_err(),
        CoordinatorError::QueueClosed
    );
}

#[tokio::test]
async fn dropping_every_handle_stops_the_driver() {
    let host = Arc::new(RecordingScreenHost::new());
    let events = Arc::new(InMemoryNavEventSink::new());
    let (handle, task) = runtime::spawn(build(booted_session(), host, events, 8));

    let clone = handle.clone();
    clone.start().unwrap();
    drop(handle);
    drop(clone);

    let coordinator = task.await.unwrap();
    assert_eq!(coordinator.state(), CoordinatorState::Idle);
}
