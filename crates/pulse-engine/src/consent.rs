//! The opt-in/opt-out switch.

use pulse_store::{keys, ScopedStore, StoreScope};
use serde::{Deserialize, Serialize};

/// Persisted form: `{"optedOut": bool}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
struct ConsentRecord {
    #[serde(rename = "optedOut")]
    opted_out: bool,
}

/// Whether tracking has any effect.
///
/// When opted out, `track` and automatic instrumentation do nothing at all,
/// not even a session check. Events already buffered are kept and still
/// delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsentGate {
    opted_out: bool,
}

impl ConsentGate {
    /// Restores the persisted state. Missing or malformed means opted in.
    pub fn load(store: &ScopedStore) -> Self {
        let record: ConsentRecord = store
            .get_json(StoreScope::Local, keys::CONSENT)
            .unwrap_or_default();
        Self {
            opted_out: record.opted_out,
        }
    }

    /// Returns `true` while tracking is disabled.
    pub fn is_opted_out(&self) -> bool {
        self.opted_out
    }

    /// Disables tracking and persists the choice.
    pub fn opt_out(&mut self, store: &ScopedStore) {
        self.set(store, true);
    }

    /// Re-enables tracking and persists the choice.
    pub fn opt_in(&mut self, store: &ScopedStore) {
        self.set(store, false);
    }

    fn set(&mut self, store: &ScopedStore, opted_out: bool) {
        self.opted_out = opted_out;
        store.set_json(
            StoreScope::Local,
            keys::CONSENT,
            &ConsentRecord { opted_out },
        );
    }
}
