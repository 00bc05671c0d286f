//! Storage backends for a single scope.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rusqlite::{params, OptionalExtension};

use crate::error::StoreError;
use crate::pool::{open_pool, DbPool, StorePoolSettings};
use crate::schema::ensure_schema;
use crate::scoped::StoreScope;

/// A string-to-string store backing one [`StoreScope`].
///
/// Backends may fail; [`ScopedStore`](crate::ScopedStore) is the layer that
/// hides those failures from the engine.
pub trait KvBackend: Send + Sync {
    /// Reads the value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Deletes `key`. Deleting a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// An in-process map. Never fails and never survives the process.
///
/// Clones share the same entries, which lets tests hand one map to
/// successive engine instances to simulate a reload.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryBackend {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }
}

/// A SQLite-backed scope. Rows live in `kv_entries`, partitioned by the
/// scope label, so one database file can hold both scopes.
#[derive(Clone)]
pub struct SqliteBackend {
    pool: DbPool,
    scope: StoreScope,
}

impl SqliteBackend {
    fn new(pool: DbPool, scope: StoreScope) -> Self {
        Self { pool, scope }
    }

    /// Opens (or creates) the database at `path` and makes sure it holds
    /// the current schema.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the file cannot be opened or its schema is
    /// unusable.
    pub fn open(path: &str, scope: StoreScope) -> Result<Self, StoreError> {
        let pool = open_pool(path, StorePoolSettings::for_path(path))?;
        {
            let mut conn = pool.get()?;
            if ensure_schema(&mut conn)? {
                tracing::debug!(path, "initialized store file");
            }
        }
        Ok(Self::new(pool, scope))
    }
}

impl KvBackend for SqliteBackend {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.pool.get()?;
        let value = conn
            .query_row(
                "SELECT value FROM kv_entries WHERE scope = ?1 AND key = ?2",
                params![self.scope.as_str(), key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO kv_entries (scope, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(scope, key) DO UPDATE SET
                value = excluded.value,
                updated_at = datetime('now')",
            params![self.scope.as_str(), key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        conn.execute(
            "DELETE FROM kv_entries WHERE scope = ?1 AND key = ?2",
            params![self.scope.as_str(), key],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_backend_clones_share_entries() {
        let a = MemoryBackend::new();
        let b = a.clone();

        a.set("k", "v").unwrap();

        assert_eq!(b.get("k").unwrap().as_deref(), Some("v"));
        b.remove("k").unwrap();
        assert!(a.is_empty());
    }

    #[test]
    fn sqlite_backend_set_get_remove() {
        let backend = SqliteBackend::open(":memory:", StoreScope::Local).expect("should open");

        assert_eq!(backend.get("missing").unwrap(), None);

        backend.set("distinct_id", "user-1").unwrap();
        backend.set("distinct_id", "user-2").unwrap();
        assert_eq!(backend.get("distinct_id").unwrap().as_deref(), Some("user-2"));

        backend.remove("distinct_id").unwrap();
        assert_eq!(backend.get("distinct_id").unwrap(), None);

        backend.remove("distinct_id").expect("removing a missing key is fine");
    }

    #[test]
    fn sqlite_scopes_are_partitioned() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = dir.path().join("pulse.db");
        let path = path.to_str().unwrap();

        let local = SqliteBackend::open(path, StoreScope::Local).expect("should open local");
        let session = SqliteBackend::open(path, StoreScope::Session).expect("should open session");

        local.set("k", "local").unwrap();
        session.set("k", "session").unwrap();

        assert_eq!(local.get("k").unwrap().as_deref(), Some("local"));
        assert_eq!(session.get("k").unwrap().as_deref(), Some("session"));
    }
}
