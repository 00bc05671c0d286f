//! Scoped key-value persistence for the Pulse engine.
//!
//! The engine keeps a handful of small snapshots (identity, property maps,
//! consent, session id, last activity) in two independent scopes:
//!
//! - [`StoreScope::Local`]: durable across restarts.
//! - [`StoreScope::Session`]: lives as long as the current process or tab.
//!
//! Each scope is backed by a [`KvBackend`]. The durable backend is SQLite
//! (WAL mode, pooled via `r2d2`, schema versioned through `user_version`).
//! [`ScopedStore`] probes each backend once at construction and silently
//! substitutes an in-memory map for any scope that fails the probe, so the
//! engine never sees a storage error, only a possible loss of durability.

mod backend;
mod error;
mod pool;
mod schema;
mod scoped;

pub use backend::{KvBackend, MemoryBackend, SqliteBackend};
pub use error::{MigrationError, PoolError, StoreError};
pub use schema::{schema_version, SCHEMA_VERSION};
pub use scoped::{open_scoped_store, ScopedStore, StorageSettings, StoreScope};

/// Persisted key names. [`ScopedStore`] prepends its key prefix.
pub mod keys {
    /// Durable: the identified user id.
    pub const DISTINCT_ID: &str = "distinct_id";
    /// Durable: JSON object of super-properties.
    pub const SUPER_PROPS: &str = "super_props";
    /// Durable: JSON object of user properties.
    pub const USER_PROPS: &str = "user_props";
    /// Durable: JSON `{"optedOut": bool}`.
    pub const CONSENT: &str = "consent";
    /// Durable: epoch milliseconds of the last observed activity.
    pub const LAST_ACTIVITY: &str = "last_activity";
    /// Session scope: the active session id.
    pub const SESSION: &str = "session";
}
