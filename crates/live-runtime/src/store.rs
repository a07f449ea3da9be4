//! Retained snapshots of terminated sessions.
//!
//! When a session actor stops it hands its last snapshot to the store. A
//! reconnect with the same identity inside the retention window resumes
//! from it instead of mounting fresh. Entries older than the retention are
//! purged by the supervisor's sweep and ignored on lookup.

use crate::types::SessionId;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Storage for snapshots awaiting a reconnect.
pub trait SnapshotStore<S>: Send + Sync + 'static {
    /// Retain a snapshot, replacing any previous one for the session.
    fn save(&self, session_id: SessionId, snapshot: S);

    /// Remove and return a retained snapshot if it has not expired.
    fn take(&self, session_id: &SessionId) -> Option<S>;

    /// Drop expired entries. Returns how many were removed.
    fn purge_expired(&self) -> usize;

    /// Number of retained snapshots.
    fn len(&self) -> usize;

    /// Whether the store is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
struct Retained<S> {
    snapshot: S,
    stored_at: Instant,
}

/// In-process snapshot store with a fixed retention window.
#[derive(Debug)]
pub struct MemorySnapshotStore<S> {
    entries: Mutex<HashMap<SessionId, Retained<S>>>,
    retention: Duration,
}

impl<S> MemorySnapshotStore<S> {
    /// Create a store that keeps snapshots for `retention`.
    #[must_use]
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            retention,
        }
    }

    fn is_live(&self, entry: &Retained<S>, now: Instant) -> bool {
        now.duration_since(entry.stored_at) < self.retention
    }
}

impl<S: Send + 'static> SnapshotStore<S> for MemorySnapshotStore<S> {
    fn save(&self, session_id: SessionId, snapshot: S) {
        if self.retention.is_zero() {
            return;
        }
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            session_id,
            Retained {
                snapshot,
                stored_at: Instant::now(),
            },
        );
    }

    fn take(&self, session_id: &SessionId) -> Option<S> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.remove(session_id)?;
        self.is_live(&entry, Instant::now()).then_some(entry.snapshot)
    }

    fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| now.duration_since(entry.stored_at) < self.retention);
        before - entries.len()
    }

    fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
