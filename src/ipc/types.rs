use std::path::PathBuf;
use std::time::Instant;

use serde::Deserialize;

use crate::backend::SqliteBackend;
use crate::session::Session;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Default)]
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub backend: Option<SqliteBackend>,
    pub session: Option<Session>,
}

impl AppState {
    /// Earliest timer the main loop has to wake up for.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.session.as_ref().and_then(|s| s.autosave_deadline())
    }

    /// Runs whatever timers are due at `now`.
    pub fn run_due(&mut self, now: Instant) {
        if let (Some(backend), Some(session)) = (self.backend.as_ref(), self.session.as_mut()) {
            session.run_due_autosave(now, backend);
        }
    }

    /// Writes pending edits before the process exits.
    pub fn shutdown(&mut self) {
        if let (Some(backend), Some(session)) = (self.backend.as_ref(), self.session.as_mut()) {
            session.flush_autosave(Instant::now(), backend);
        }
    }
}
