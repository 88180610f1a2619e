//! Screen-mount service seam.
//!
//! The host owns the actual UI. `mount` returning `false` means the host is
//! still initialising; the coordinator retries the dispatch with backoff.

use std::collections::HashMap;
use std::sync::Mutex;

pub trait ScreenHost: Send + Sync {
    /// Show `screen_id`. Returns `false` when the host is not ready yet.
    fn mount(&self, screen_id: &str) -> bool;

    fn unmount(&self, screen_id: &str);

    fn set_title(&self, _title: &str) {}
}

/// A recorded call to [`RecordingScreenHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    Mount { screen_id: String, ready: bool },
    Unmount(String),
    SetTitle(String),
}

/// Host double that records calls and can simulate a slow start.
#[derive(Default)]
pub struct RecordingScreenHost {
    calls: Mutex<Vec<HostCall>>,
    not_ready: Mutex<HashMap<String, Option<usize>>>,
}

impl RecordingScreenHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `screen_id` not ready for the next `times` mount calls.
    pub fn with_not_ready(self, screen_id: &str, times: usize) -> Self {
        lock(&self.not_ready).insert(screen_id.to_string(), Some(times));
        self
    }

    /// Report `screen_id` not ready until [`Self::make_ready`].
    pub fn with_never_ready(self, screen_id: &str) -> Self {
        lock(&self.not_ready).insert(screen_id.to_string(), None);
        self
    }

    pub fn make_ready(&self, screen_id: &str) {
        lock(&self.not_ready).remove(screen_id);
    }

    pub fn calls(&self) -> Vec<HostCall> {
        lock(&self.calls).clone()
    }

    /// Screen ids of successful mounts, in order.
    pub fn mounted(&self) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .filter_map(|call| match call {
                HostCall::Mount {
                    screen_id,
                    ready: true,
                } => Some(screen_id.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn mount_attempts(&self, screen_id: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| matches!(call, HostCall::Mount { screen_id: id, .. } if id == screen_id))
            .count()
    }

    pub fn titles(&self) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .filter_map(|call| match call {
                HostCall::SetTitle(title) => Some(title.clone()),
                _ => None,
            })
            .collect()
    }
}

impl ScreenHost for RecordingScreenHost {
    fn mount(&self, screen_id: &str) -> bool {
        let ready = {
            let mut not_ready = lock(&self.not_ready);
            match not_ready.get_mut(screen_id) {
                None => true,
                Some(None) => false,
                Some(Some(0)) => {
                    not_ready.remove(screen_id);
                    true
                }
                Some(Some(remaining)) => {
                    *remaining -= 1;
                    false
                }
            }
        };
        lock(&self.calls).push(HostCall::Mount {
            screen_id: screen_id.to_string(),
            ready,
        });
        ready
    }

    fn unmount(&self, screen_id: &str) {
        lock(&self.calls).push(HostCall::Unmount(screen_id.to_string()));
    }

    fn set_title(&self, title: &str) {
        lock(&self.calls).push(HostCall::SetTitle(title.to_string()));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
