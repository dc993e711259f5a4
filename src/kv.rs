//! Persistent key/value cache for session state that must survive restarts.
//!
//! This is the only code that reads or writes the role pair and the sidebar
//! flag. Every failure of the underlying backend is swallowed and surfaces as
//! a cache miss, so callers never have to handle storage errors.

use rusqlite::{Connection, OptionalExtension};
#[cfg(test)]
use std::collections::HashMap;
use std::path::Path;

pub const KEY_USER_ROLE: &str = "userRole";
pub const KEY_USER_ID: &str = "userId";
pub const KEY_SIDEBAR_COLLAPSED: &str = "sidebarCollapsed";

/// Storage backend behind [`PersistentCache`].
pub trait KvBackend {
    fn read(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn write(&mut self, key: &str, value: &str) -> anyhow::Result<()>;
    fn remove(&mut self, key: &str) -> anyhow::Result<()>;
}

/// `local_storage` table in the workspace database, on its own connection.
/// The table is created by [`crate::db::open_db`].
pub struct SqliteKv {
    conn: Connection,
}

impl SqliteKv {
    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(crate::db::db_path(workspace))?;
        conn.busy_timeout(std::time::Duration::from_secs(2))?;
        Ok(Self { conn })
    }
}

impl KvBackend for SqliteKv {
    fn read(&self, key: &str) -> anyhow::Result<Option<String>> {
        let v = self
            .conn
            .query_row("SELECT value FROM local_storage WHERE key = ?", [key], |r| {
                r.get(0)
            })
            .optional()?;
        Ok(v)
    }

    fn write(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT INTO local_storage(key, value) VALUES(?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            (key, value),
        )?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> anyhow::Result<()> {
        self.conn
            .execute("DELETE FROM local_storage WHERE key = ?", [key])?;
        Ok(())
    }
}

#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: HashMap<String, String>,
}

#[cfg(test)]
impl KvBackend for MemoryKv {
    fn read(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> anyhow::Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Storage that refuses every operation (disabled or private storage).
#[cfg(test)]
#[derive(Debug, Default)]
pub struct UnavailableKv;

#[cfg(test)]
impl KvBackend for UnavailableKv {
    fn read(&self, _key: &str) -> anyhow::Result<Option<String>> {
        anyhow::bail!("local storage unavailable")
    }

    fn write(&mut self, _key: &str, _value: &str) -> anyhow::Result<()> {
        anyhow::bail!("local storage unavailable")
    }

    fn remove(&mut self, _key: &str) -> anyhow::Result<()> {
        anyhow::bail!("local storage unavailable")
    }
}

pub struct PersistentCache {
    backend: Box<dyn KvBackend>,
}

impl PersistentCache {
    pub fn new(backend: Box<dyn KvBackend>) -> Self {
        Self { backend }
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryKv::default()))
    }

    pub fn get(&self, key: &str) -> Option<String> {
        match self.backend.read(key) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(key, error = %e, "local storage read failed; treating as miss");
                None
            }
        }
    }

    pub fn set(&mut self, key: &str, value: &str) {
        if let Err(e) = self.backend.write(key, value) {
            tracing::debug!(key, error = %e, "local storage write ignored");
        }
    }

    pub fn clear(&mut self, keys: &[&str]) {
        for key in keys {
            if let Err(e) = self.backend.remove(key) {
                tracing::debug!(key = *key, error = %e, "local storage remove ignored");
            }
        }
    }
}
