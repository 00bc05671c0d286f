//! Session identity and the inactivity rotation check.

use pulse_store::{keys, ScopedStore, StoreScope};
use uuid::Uuid;

/// A session transition the engine must turn into an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionBoundary {
    /// A session became active.
    Started { session_id: String },
    /// A session ended after `inactive_ms` without activity.
    Ended { session_id: String, inactive_ms: u64 },
}

/// Tracks the active session and when it last saw activity.
///
/// Exactly one session is active at a time. Its id only changes through
/// rotation in [`SessionManager::touch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionManager {
    session_id: String,
    last_activity_ms: i64,
    timeout_ms: u64,
}

fn mint_session_id() -> String {
    Uuid::new_v4().to_string()
}

impl SessionManager {
    /// Resumes the stored session or starts a new one.
    ///
    /// A resumed session goes through the rotation check straight away, so
    /// a reload after the timeout yields `Ended` then `Started`. A missing
    /// last-activity stamp counts as activity now.
    pub fn start(store: &ScopedStore, now_ms: i64, timeout_ms: u64) -> (Self, Vec<SessionBoundary>) {
        match store.get(StoreScope::Session, keys::SESSION) {
            Some(session_id) if !session_id.is_empty() => {
                let last_activity_ms = store
                    .get(StoreScope::Local, keys::LAST_ACTIVITY)
                    .and_then(|raw| raw.trim().parse::<i64>().ok())
                    .unwrap_or(now_ms);
                let mut manager = Self {
                    session_id,
                    last_activity_ms,
                    timeout_ms,
                };
                tracing::debug!(session_id = %manager.session_id, "resumed session");
                let boundaries = manager.touch(store, now_ms);
                (manager, boundaries)
            }
            _ => {
                let session_id = mint_session_id();
                store.set(StoreScope::Session, keys::SESSION, &session_id);
                let manager = Self {
                    session_id: session_id.clone(),
                    last_activity_ms: now_ms,
                    timeout_ms,
                };
                manager.persist_activity(store);
                tracing::debug!(session_id = %session_id, "started session");
                (manager, vec![SessionBoundary::Started { session_id }])
            }
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn last_activity_ms(&self) -> i64 {
        self.last_activity_ms
    }

    /// Applies a new inactivity timeout to subsequent checks.
    pub fn set_timeout(&mut self, timeout_ms: u64) {
        self.timeout_ms = timeout_ms;
    }

    /// Records activity at `now_ms`, rotating first if the session has
    /// been idle for longer than the timeout.
    ///
    /// Returns the boundaries in the order their events must be queued.
    /// The activity stamp is persisted on every call.
    pub fn touch(&mut self, store: &ScopedStore, now_ms: i64) -> Vec<SessionBoundary> {
        let elapsed = u64::try_from(now_ms.saturating_sub(self.last_activity_ms)).unwrap_or(0);
        let mut boundaries = Vec::new();

        if elapsed > self.timeout_ms {
            let old = std::mem::replace(&mut self.session_id, mint_session_id());
            store.set(StoreScope::Session, keys::SESSION, &self.session_id);
            tracing::info!(
                old_session_id = %old,
                session_id = %self.session_id,
                inactive_ms = elapsed,
                "session rotated after inactivity"
            );
            boundaries.push(SessionBoundary::Ended {
                session_id: old,
                inactive_ms: elapsed,
            });
            boundaries.push(SessionBoundary::Started {
                session_id: self.session_id.clone(),
            });
        }

        self.last_activity_ms = now_ms;
        self.persist_activity(store);
        boundaries
    }

    fn persist_activity(&self, store: &ScopedStore) {
        store.set(
            StoreScope::Local,
            keys::LAST_ACTIVITY,
            &self.last_activity_ms.to_string(),
        );
    }
}
