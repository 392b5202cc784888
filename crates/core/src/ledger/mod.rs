use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::request::{RequestId, RequestState};

type Entry = Arc<AsyncMutex<Option<RequestState>>>;
type Entries = Arc<Mutex<HashMap<RequestId, Entry>>>;

/// In-process record of the last known state of each help request, keyed by
/// post id. Holding a [`RequestSlot`] serializes every transition on that
/// request; unrelated requests never contend.
///
/// Only open requests stay tracked. Once a slot is released with no other
/// caller waiting on it, unknown and resolved entries are dropped; their state
/// is recoverable from the message itself.
///
/// The ledger is not persisted. After a restart every request is unknown
/// (`None`) and callers fall back to inspecting the message itself.
#[derive(Debug, Default)]
pub struct RequestLedger {
    entries: Entries,
}

#[derive(Debug)]
pub struct RequestSlot {
    id: RequestId,
    entries: Entries,
    guard: OwnedMutexGuard<Option<RequestState>>,
}

impl RequestSlot {
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    pub fn state(&self) -> Option<RequestState> {
        *self.guard
    }

    pub fn record(&mut self, state: RequestState) {
        *self.guard = Some(state);
    }
}

impl Drop for RequestSlot {
    fn drop(&mut self) {
        if *self.guard == Some(RequestState::Open) {
            return;
        }

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference is the map's, one is this guard's; any more are waiters.
        let uncontended = entries
            .get(&self.id)
            .is_some_and(|entry| Arc::ptr_eq(entry, OwnedMutexGuard::mutex(&self.guard)))
            && Arc::strong_count(OwnedMutexGuard::mutex(&self.guard)) == 2;
        if uncontended {
            entries.remove(&self.id);
        }
    }
}

impl RequestLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to one request's entry.
    pub async fn lock(&self, id: &RequestId) -> RequestSlot {
        let entry = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(entries.entry(id.clone()).or_default())
        };

        RequestSlot {
            id: id.clone(),
            entries: Arc::clone(&self.entries),
            guard: entry.lock_owned().await,
        }
    }

    pub async fn record_open(&self, id: &RequestId) {
        self.lock(id).await.record(RequestState::Open);
    }

    pub async fn state(&self, id: &RequestId) -> Option<RequestState> {
        self.lock(id).await.state()
    }

    pub fn tracked(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
