use crate::db;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::time::Duration;

pub const SESSION_SETTINGS_KEY: &str = "setup.session";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub breakpoint_query: String,
    pub autosave_delay_ms: u64,
    pub saved_status_ms: u64,
    pub error_status_ms: u64,
    pub persist_fallback_role: bool,
    pub avatar_bucket: String,
    pub avatar_max_bytes: u64,
    pub public_url_base: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            breakpoint_query: crate::viewport::DESKTOP_QUERY.to_string(),
            autosave_delay_ms: 1000,
            saved_status_ms: 2000,
            error_status_ms: 3000,
            persist_fallback_role: true,
            avatar_bucket: "avatars".to_string(),
            avatar_max_bytes: 5 * 1024 * 1024,
            public_url_base: "attendd://storage".to_string(),
        }
    }
}

impl SessionConfig {
    pub fn autosave_delay(&self) -> Duration {
        Duration::from_millis(self.autosave_delay_ms)
    }

    pub fn saved_status(&self) -> Duration {
        Duration::from_millis(self.saved_status_ms)
    }

    pub fn error_status(&self) -> Duration {
        Duration::from_millis(self.error_status_ms)
    }

    pub fn to_json(&self) -> Value {
        json!(self)
    }

    /// Applies a camelCase patch. Unknown keys and wrong types are rejected
    /// before anything is changed.
    pub fn apply_patch(&mut self, patch: &Map<String, Value>) -> Result<(), String> {
        let mut next = self.clone();
        for (k, v) in patch {
            match k.as_str() {
                "breakpointQuery" => {
                    let s = v
                        .as_str()
                        .ok_or_else(|| "breakpointQuery must be a string".to_string())?;
                    if s.trim().is_empty() {
                        return Err("breakpointQuery must not be empty".to_string());
                    }
                    next.breakpoint_query = s.trim().to_string();
                }
                "autosaveDelayMs" => next.autosave_delay_ms = as_ms(k, v, 0, 60_000)?,
                "savedStatusMs" => next.saved_status_ms = as_ms(k, v, 0, 60_000)?,
                "errorStatusMs" => next.error_status_ms = as_ms(k, v, 0, 60_000)?,
                "persistFallbackRole" => {
                    next.persist_fallback_role = v
                        .as_bool()
                        .ok_or_else(|| "persistFallbackRole must be a boolean".to_string())?;
                }
                "avatarBucket" => {
                    let s = v
                        .as_str()
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .ok_or_else(|| "avatarBucket must be a non-empty string".to_string())?;
                    next.avatar_bucket = s.to_string();
                }
                "avatarMaxBytes" => {
                    next.avatar_max_bytes = v
                        .as_u64()
                        .filter(|n| *n > 0)
                        .ok_or_else(|| "avatarMaxBytes must be a positive integer".to_string())?;
                }
                "publicUrlBase" => {
                    next.public_url_base = v
                        .as_str()
                        .ok_or_else(|| "publicUrlBase must be a string".to_string())?
                        .to_string();
                }
                _ => return Err(format!("unknown session field: {}", k)),
            }
        }
        *self = next;
        Ok(())
    }
}

fn as_ms(key: &str, v: &Value, min: u64, max: u64) -> Result<u64, String> {
    v.as_u64()
        .filter(|n| (min..=max).contains(n))
        .ok_or_else(|| format!("{} must be an integer between {} and {}", key, min, max))
}

pub fn load_session_config(conn: &Connection) -> anyhow::Result<SessionConfig> {
    let mut cfg = SessionConfig::default();
    if let Some(saved) = db::settings_get_json(conn, SESSION_SETTINGS_KEY)? {
        if let Some(obj) = saved.as_object() {
            // A bad stored value must not keep the workspace from opening.
            if let Err(msg) = cfg.apply_patch(obj) {
                tracing::warn!(error = %msg, "ignoring stored session settings");
                cfg = SessionConfig::default();
            }
        }
    }
    Ok(cfg)
}

pub fn save_session_config(conn: &Connection, cfg: &SessionConfig) -> anyhow::Result<()> {
    db::settings_set_json(conn, SESSION_SETTINGS_KEY, &cfg.to_json())
}
