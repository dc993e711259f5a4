//! Timer-based coalescing of profile edits.

use serde::Serialize;
use std::time::{Duration, Instant};

/// Holds at most one pending value. Scheduling again inside the window
/// replaces the value and pushes the deadline out.
#[derive(Debug)]
pub struct Debouncer<T> {
    delay: Duration,
    pending: Option<(Instant, T)>,
}

impl<T> Debouncer<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub fn set_delay(&mut self, delay: Duration) {
        self.delay = delay;
    }

    pub fn schedule(&mut self, now: Instant, value: T) {
        self.pending = Some((now + self.delay, value));
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(at, _)| *at)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn take_due(&mut self, now: Instant) -> Option<T> {
        let due = matches!(&self.pending, Some((at, _)) if *at <= now);
        if !due {
            return None;
        }
        self.pending.take().map(|(_, v)| v)
    }

    /// Takes the pending value regardless of its deadline.
    pub fn take_now(&mut self) -> Option<T> {
        self.pending.take().map(|(_, v)| v)
    }

    pub fn cancel(&mut self) -> Option<T> {
        self.take_now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoSaveStatus {
    Idle,
    Saving,
    Saved,
    Error,
}

/// Save indicator. `saved` and `error` are transient and read as `idle`
/// once their display window has passed.
#[derive(Debug)]
pub struct StatusIndicator {
    status: AutoSaveStatus,
    until: Option<Instant>,
    saved_for: Duration,
    error_for: Duration,
    last_error: Option<String>,
}

impl StatusIndicator {
    pub fn new(saved_for: Duration, error_for: Duration) -> Self {
        Self {
            status: AutoSaveStatus::Idle,
            until: None,
            saved_for,
            error_for,
            last_error: None,
        }
    }

    pub fn set_durations(&mut self, saved_for: Duration, error_for: Duration) {
        self.saved_for = saved_for;
        self.error_for = error_for;
    }

    pub fn saving(&mut self) {
        self.status = AutoSaveStatus::Saving;
        self.until = None;
    }

    pub fn saved(&mut self, now: Instant) {
        self.status = AutoSaveStatus::Saved;
        self.until = Some(now + self.saved_for);
        self.last_error = None;
    }

    pub fn failed(&mut self, now: Instant, message: String) {
        self.status = AutoSaveStatus::Error;
        self.until = Some(now + self.error_for);
        self.last_error = Some(message);
    }

    pub fn status_at(&self, now: Instant) -> AutoSaveStatus {
        match self.until {
            Some(until) if now >= until => AutoSaveStatus::Idle,
            _ => self.status,
        }
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}
