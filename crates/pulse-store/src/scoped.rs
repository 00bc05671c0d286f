//! The two-scope adapter the engine talks to.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::backend::{KvBackend, MemoryBackend, SqliteBackend};

/// Sentinel key written and deleted once per scope to test availability.
const PROBE_KEY: &str = "__pulse_probe__";

/// Which of the two independent stores a key lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreScope {
    /// Durable across restarts.
    Local,
    /// Scoped to the current process or tab.
    Session,
}

impl StoreScope {
    /// Returns the label used to partition rows in SQLite.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Session => "session",
        }
    }
}

impl std::fmt::Display for StoreScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform get/set/remove over both scopes.
///
/// Backend failures never surface: a scope that fails its construction
/// probe is replaced by an in-memory map for the lifetime of the store,
/// and individual operation failures afterwards are logged and treated as
/// a missing value or a dropped write.
#[derive(Clone)]
pub struct ScopedStore {
    local: Arc<dyn KvBackend>,
    session: Arc<dyn KvBackend>,
    local_fallback: bool,
    session_fallback: bool,
    prefix: String,
}

impl ScopedStore {
    /// Builds a store from optional backends, probing each one.
    ///
    /// `None` or a backend that fails the probe falls back to memory.
    pub fn new(
        local: Option<Arc<dyn KvBackend>>,
        session: Option<Arc<dyn KvBackend>>,
        prefix: impl Into<String>,
    ) -> Self {
        let prefix = prefix.into();
        let (local, local_fallback) = probe_or_fallback(StoreScope::Local, local, &prefix);
        let (session, session_fallback) =
            probe_or_fallback(StoreScope::Session, session, &prefix);
        Self {
            local,
            session,
            local_fallback,
            session_fallback,
            prefix,
        }
    }

    /// A store with both scopes held in memory.
    pub fn in_memory(prefix: impl Into<String>) -> Self {
        Self::new(
            Some(Arc::new(MemoryBackend::new())),
            Some(Arc::new(MemoryBackend::new())),
            prefix,
        )
    }

    /// Returns `true` if `scope` was replaced by an in-memory map because
    /// its backend was missing or failed the probe.
    pub fn uses_fallback(&self, scope: StoreScope) -> bool {
        match scope {
            StoreScope::Local => self.local_fallback,
            StoreScope::Session => self.session_fallback,
        }
    }

    /// Reads `key` from `scope`. Backend errors read as absent.
    pub fn get(&self, scope: StoreScope, key: &str) -> Option<String> {
        let full_key = self.full_key(key);
        match self.backend(scope).get(&full_key) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(%scope, key, error = %e, "store read failed");
                None
            }
        }
    }

    /// Writes `key` in `scope`. Backend errors drop the write.
    pub fn set(&self, scope: StoreScope, key: &str, value: &str) {
        let full_key = self.full_key(key);
        if let Err(e) = self.backend(scope).set(&full_key, value) {
            tracing::debug!(%scope, key, error = %e, "store write failed");
        }
    }

    /// Deletes `key` from `scope`. Backend errors are ignored.
    pub fn remove(&self, scope: StoreScope, key: &str) {
        let full_key = self.full_key(key);
        if let Err(e) = self.backend(scope).remove(&full_key) {
            tracing::debug!(%scope, key, error = %e, "store remove failed");
        }
    }

    /// Reads and decodes a JSON value. Malformed JSON reads as absent.
    pub fn get_json<T: DeserializeOwned>(&self, scope: StoreScope, key: &str) -> Option<T> {
        let raw = self.get(scope, key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(%scope, key, error = %e, "ignoring malformed persisted value");
                None
            }
        }
    }

    /// Encodes `value` as JSON and writes it.
    pub fn set_json<T: Serialize>(&self, scope: StoreScope, key: &str, value: &T) {
        match serde_json::to_string(value) {
            Ok(raw) => self.set(scope, key, &raw),
            Err(e) => tracing::warn!(%scope, key, error = %e, "failed to encode value"),
        }
    }

    fn backend(&self, scope: StoreScope) -> &dyn KvBackend {
        match scope {
            StoreScope::Local => self.local.as_ref(),
            StoreScope::Session => self.session.as_ref(),
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

fn probe_or_fallback(
    scope: StoreScope,
    backend: Option<Arc<dyn KvBackend>>,
    prefix: &str,
) -> (Arc<dyn KvBackend>, bool) {
    let Some(backend) = backend else {
        tracing::debug!(%scope, "no backend configured, using in-memory store");
        return (Arc::new(MemoryBackend::new()), true);
    };

    let probe_key = format!("{prefix}{PROBE_KEY}");
    let probe = backend
        .set(&probe_key, "1")
        .and_then(|()| backend.remove(&probe_key));

    match probe {
        Ok(()) => (backend, false),
        Err(e) => {
            tracing::warn!(%scope, error = %e, "storage unavailable, falling back to in-memory store");
            (Arc::new(MemoryBackend::new()), true)
        }
    }
}

/// Where the engine's two scopes should live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSettings {
    /// When `false`, both scopes are kept in memory.
    pub persistence: bool,
    /// SQLite file for the durable scope.
    pub path: Option<String>,
    /// SQLite file for the session scope. `None` keeps the session scope
    /// in process memory, which ends it with the process.
    pub session_path: Option<String>,
    /// Prefix for every key, so engines sharing a file do not collide.
    pub key_prefix: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            persistence: true,
            path: Some("pulse.db".to_string()),
            session_path: None,
            key_prefix: "pulse_".to_string(),
        }
    }
}

/// Opens the backends described by `settings` and wraps them in a
/// [`ScopedStore`]. Backends that fail to open fall back to memory.
pub fn open_scoped_store(settings: &StorageSettings) -> ScopedStore {
    if !settings.persistence {
        return ScopedStore::in_memory(settings.key_prefix.clone());
    }

    let local = settings
        .path
        .as_deref()
        .and_then(|path| open_sqlite(path, StoreScope::Local));

    let session: Option<Arc<dyn KvBackend>> = match settings.session_path.as_deref() {
        Some(path) => open_sqlite(path, StoreScope::Session),
        None => Some(Arc::new(MemoryBackend::new())),
    };

    ScopedStore::new(local, session, settings.key_prefix.clone())
}

fn open_sqlite(path: &str, scope: StoreScope) -> Option<Arc<dyn KvBackend>> {
    match SqliteBackend::open(path, scope) {
        Ok(backend) => Some(Arc::new(backend)),
        Err(e) => {
            tracing::warn!(%scope, path, error = %e, "failed to open store");
            None
        }
    }
}
