//! Per-workspace session state owned by the daemon: identity, role cache,
//! sidebar flag, viewport classification and the profile auto-save queue.

use crate::autosave::{AutoSaveStatus, Debouncer, StatusIndicator};
use crate::backend::{DataService, Identity, ProfileUpdate};
use crate::config::{self, SessionConfig};
use crate::kv::{PersistentCache, SqliteKv};
use crate::nav::{self, NavItem};
use crate::profile::{self, ProfileDraft, ProfileError};
use crate::role::{Role, RoleResolver};
use crate::sidebar::CollapseState;
use crate::viewport::MediaQueryMediator;
use chrono::Utc;
use rusqlite::Connection;
use std::path::Path;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PendingSave {
    pub identity: Identity,
    pub draft: ProfileDraft,
}

pub struct Session {
    config: SessionConfig,
    identity: Option<Identity>,
    pub roles: RoleResolver,
    pub sidebar: CollapseState,
    pub layout: MediaQueryMediator,
    viewport_width: Option<u32>,
    autosave: Debouncer<PendingSave>,
    save_status: StatusIndicator,
    last_saved: Option<ProfileUpdate>,
}

impl Session {
    pub fn open(workspace: &Path, conn: &Connection) -> anyhow::Result<Self> {
        let config = config::load_session_config(conn)?;
        // Role cache and sidebar are separate consumers of the same storage.
        let role_cache = PersistentCache::new(Box::new(SqliteKv::open(workspace)?));
        let sidebar_cache = PersistentCache::new(Box::new(SqliteKv::open(workspace)?));
        Ok(Self::with_caches(config, role_cache, sidebar_cache))
    }

    pub fn with_caches(
        config: SessionConfig,
        role_cache: PersistentCache,
        sidebar_cache: PersistentCache,
    ) -> Self {
        let roles = RoleResolver::new(role_cache).with_persist_fallback(config.persist_fallback_role);
        let sidebar = CollapseState::load(sidebar_cache);
        let layout = MediaQueryMediator::observe(&config.breakpoint_query, None);
        let autosave = Debouncer::new(config.autosave_delay());
        let save_status = StatusIndicator::new(config.saved_status(), config.error_status());
        Self {
            config,
            identity: None,
            roles,
            sidebar,
            layout,
            viewport_width: None,
            autosave,
            save_status,
            last_saved: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn apply_config(&mut self, config: SessionConfig) {
        self.roles.set_persist_fallback(config.persist_fallback_role);
        self.autosave.set_delay(config.autosave_delay());
        self.save_status
            .set_durations(config.saved_status(), config.error_status());
        if config.breakpoint_query != self.config.breakpoint_query {
            self.layout = MediaQueryMediator::observe(&config.breakpoint_query, self.viewport_width);
        }
        self.config = config;
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Records the current identity and resolves its role. Calling this
    /// again with an unchanged identity does not hit the data service.
    pub fn sync_identity(&mut self, identity: Option<Identity>, data: &dyn DataService) -> Role {
        if self.identity.as_ref().map(|i| &i.id) != identity.as_ref().map(|i| &i.id) {
            tracing::info!(
                user_id = identity.as_ref().map(|i| i.id.as_str()).unwrap_or("-"),
                "identity changed"
            );
        }
        self.identity = identity;
        self.roles.resolve(self.identity.as_ref(), data)
    }

    pub fn role(&self) -> Role {
        self.roles.current_role()
    }

    pub fn nav_items(&self, current_path: &str) -> Vec<NavItem> {
        nav::visible_items(self.role(), current_path)
    }

    pub fn viewport_changed(&mut self, width: u32) -> Option<bool> {
        self.viewport_width = Some(width);
        self.layout.viewport_changed(width)
    }

    /// False until the front-end reports a width; the layout value is the
    /// no-viewport assumption until then.
    pub fn viewport_known(&self) -> bool {
        self.viewport_width.is_some()
    }

    pub fn queue_profile_edit(&mut self, now: Instant, draft: ProfileDraft) -> anyhow::Result<()> {
        let Some(identity) = self.identity.clone() else {
            anyhow::bail!("not signed in");
        };
        if draft.is_blank() {
            return Ok(());
        }
        self.autosave.schedule(now, PendingSave { identity, draft });
        Ok(())
    }

    pub fn autosave_deadline(&self) -> Option<Instant> {
        self.autosave.deadline()
    }

    pub fn autosave_pending(&self) -> bool {
        self.autosave.is_pending()
    }

    pub fn autosave_status(&self, now: Instant) -> AutoSaveStatus {
        self.save_status.status_at(now)
    }

    pub fn autosave_error(&self) -> Option<&str> {
        self.save_status.last_error()
    }

    pub fn last_saved(&self) -> Option<&ProfileUpdate> {
        self.last_saved.as_ref()
    }

    pub fn cancel_autosave(&mut self) -> bool {
        self.autosave.cancel().is_some()
    }

    /// Writes the pending draft if its window has closed.
    pub fn run_due_autosave(&mut self, now: Instant, data: &dyn DataService) -> Option<AutoSaveStatus> {
        let pending = self.autosave.take_due(now)?;
        Some(self.write_pending(now, pending, data))
    }

    /// Writes the pending draft immediately (explicit flush, sign-out).
    pub fn flush_autosave(&mut self, now: Instant, data: &dyn DataService) -> Option<AutoSaveStatus> {
        let pending = self.autosave.take_now()?;
        Some(self.write_pending(now, pending, data))
    }

    fn write_pending(
        &mut self,
        now: Instant,
        pending: PendingSave,
        data: &dyn DataService,
    ) -> AutoSaveStatus {
        self.save_status.saving();
        match profile::autosave_profile(data, &pending.identity, &pending.draft, Utc::now()) {
            Ok(update) => {
                tracing::debug!(user_id = %pending.identity.id, "profile auto-saved");
                self.last_saved = Some(update);
                self.save_status.saved(now);
            }
            Err(ProfileError::Validation(errors)) => {
                let message = serde_json::to_string(&errors)
                    .unwrap_or_else(|_| "validation failed".to_string());
                tracing::debug!(user_id = %pending.identity.id, %message, "auto-save skipped");
                self.save_status.failed(now, message);
            }
            Err(e) => {
                tracing::error!(user_id = %pending.identity.id, error = %e.message(), "auto-save error");
                self.save_status.failed(now, e.message());
            }
        }
        self.save_status.status_at(now)
    }
}
