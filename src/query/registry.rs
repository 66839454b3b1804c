use crate::models::geometry::Region;
use crate::models::layer::Layer;
use crate::models::query::QueryResult;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Debug, Default)]
struct RegistryState {
    entries: HashMap<String, QueryResult>,
    latest_ticket: HashMap<String, u64>,
    next_ticket: u64,
}

/// Query results keyed by layer id.
///
/// Only the engine writes entries. Each query takes a ticket when issued; a
/// completion carrying an older ticket than the layer's latest is dropped,
/// so a slow stale response cannot overwrite a newer one.
#[derive(Debug, Clone, Default)]
pub struct SelectionRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl SelectionRegistry {
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a loading entry for `layer`, replacing any previous one.
    pub fn begin(&self, layer: &Layer, region: &Region) -> u64 {
        let mut state = self.lock();
        state.next_ticket += 1;
        let ticket = state.next_ticket;
        let key = layer.id();
        state.latest_ticket.insert(key.clone(), ticket);
        state
            .entries
            .insert(key, QueryResult::pending(layer.clone(), region.clone(), ticket));
        ticket
    }

    /// Write a finished result. Returns false when a newer query superseded it.
    pub fn complete(&self, result: QueryResult) -> bool {
        let mut state = self.lock();
        let key = result.layer.id();
        if state.latest_ticket.get(&key) != Some(&result.ticket) {
            debug!(layer = %key, ticket = result.ticket, "discarding stale query result");
            return false;
        }
        state.entries.insert(key, result);
        true
    }

    pub fn get(&self, key: &str) -> Option<QueryResult> {
        self.lock().entries.get(key).cloned()
    }

    /// Snapshot of all entries ordered by layer id.
    pub fn all(&self) -> Vec<QueryResult> {
        let mut results: Vec<QueryResult> = self.lock().entries.values().cloned().collect();
        results.sort_by_key(|r| r.layer.id());
        results
    }

    pub fn is_loading(&self) -> bool {
        self.lock().entries.values().any(|r| r.is_loading)
    }

    /// Drop one entry; in-flight queries for it are discarded on completion.
    pub fn remove(&self, key: &str) {
        let mut state = self.lock();
        state.entries.remove(key);
        state.latest_ticket.remove(key);
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.latest_ticket.clear();
    }
}
