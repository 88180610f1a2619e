//! One-time intro gate.
//!
//! Decision rule, first match wins:
//! 1. logged in and last screen was `main` => skip (returning user)
//! 2. boot already completed => skip
//! 3. otherwise run
//!
//! Rule 1 sits ahead of rule 2 so an authenticated user never sees the
//! intro again, even if `boot_completed` was lost on an abnormal exit.

use std::collections::VecDeque;

use crate::error::StoreError;
use crate::session::{NavFlags, Screen, SessionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntroDecision {
    Run,
    SkipReturningUser,
    SkipBootCompleted,
}

impl IntroDecision {
    pub fn should_run(self) -> bool {
        self == Self::Run
    }
}

/// How the intro ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntroOutcome {
    Finished,
    /// The admin key sequence interrupted the intro.
    AdminOverride,
}

impl IntroOutcome {
    pub fn landing_screen(self) -> Screen {
        match self {
            Self::Finished => Screen::Login,
            Self::AdminOverride => Screen::AdminLogin,
        }
    }
}

pub type IntroCallback = Box<dyn Fn(&NavFlags, IntroOutcome) + Send>;

#[derive(Default)]
pub struct IntroGate {
    callbacks: Vec<IntroCallback>,
}

impl IntroGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decide(flags: &NavFlags) -> IntroDecision {
        if flags.logged_in && flags.current_screen == Some(Screen::Main) {
            return IntroDecision::SkipReturningUser;
        }
        if flags.boot_completed {
            return IntroDecision::SkipBootCompleted;
        }
        IntroDecision::Run
    }

    pub fn should_run(&self, flags: &NavFlags) -> bool {
        Self::decide(flags).should_run()
    }

    pub fn on_complete<F>(&mut self, callback: F)
    where
        F: Fn(&NavFlags, IntroOutcome) + Send + 'static,
    {
        self.callbacks.push(Box::new(callback));
    }

    /// Persist completion, then notify callbacks with the resulting flags.
    ///
    /// An admin override always lands on `admin-login`; a normal finish only
    /// fills in `login` when no screen is recorded.
    pub fn complete(
        &self,
        session: &mut SessionState,
        outcome: IntroOutcome,
    ) -> Result<(), StoreError> {
        let result = match outcome {
            IntroOutcome::Finished => session.mark_boot_completed(Screen::Login),
            IntroOutcome::AdminOverride => session.mark_boot_completed_at(Screen::AdminLogin),
        };
        for callback in &self.callbacks {
            callback(session.flags(), outcome);
        }
        result
    }
}

/// Detects the admin key sequence typed during the intro.
///
/// Cosmetic only: typing the sequence is not an access check.
#[derive(Debug, Clone)]
pub struct IntroInterrupt {
    sequence: Vec<char>,
    recent: VecDeque<char>,
}

impl IntroInterrupt {
    pub fn new(sequence: &str) -> Self {
        let sequence: Vec<char> = sequence.chars().flat_map(char::to_lowercase).collect();
        Self {
            recent: VecDeque::with_capacity(sequence.len()),
            sequence,
        }
    }

    /// Feed one key; returns true when the last keys spell the sequence.
    pub fn feed(&mut self, key: char) -> bool {
        if self.sequence.is_empty() {
            return false;
        }
        for lowered in key.to_lowercase() {
            if self.recent.len() == self.sequence.len() {
                self.recent.pop_front();
            }
            self.recent.push_back(lowered);
        }
        let matched = self.recent.iter().eq(self.sequence.iter());
        if matched {
            self.recent.clear();
        }
        matched
    }

    pub fn reset(&mut self) {
        self.recent.clear();
    }
}

impl Default for IntroInterrupt {
    fn default() -> Self {
        Self::new("admin")
    }
}
