use std::collections::HashMap;

use parking_lot::RwLock;
use serde_json::Value;

use crate::types::MarkerId;

/// Concurrency-safe store of marker ids to watch for, each with the opaque
/// payload delivered alongside it.
///
/// Written only by the message channel's receive loop, read only by the
/// tracking loop. All access goes through methods so the single-writer
/// discipline is an interface property rather than a convention.
#[derive(Debug, Default)]
pub struct TargetRegistry {
    targets: RwLock<HashMap<MarkerId, Value>>,
}

impl TargetRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the payload for a marker id.
    pub fn set(&self, id: MarkerId, payload: Value) {
        self.targets.write().insert(id, payload);
    }

    /// Insert or overwrite several ids sharing one payload.
    pub fn set_many(&self, ids: &[MarkerId], payload: &Value) {
        let mut targets = self.targets.write();
        for id in ids {
            targets.insert(*id, payload.clone());
        }
    }

    /// Remove a single marker id. Idempotent.
    pub fn clear(&self, id: MarkerId) -> bool {
        self.targets.write().remove(&id).is_some()
    }

    /// Remove every target.
    pub fn reset(&self) {
        self.targets.write().clear();
    }

    /// Look up the payload for a marker id.
    pub fn get(&self, id: MarkerId) -> Option<Value> {
        self.targets.read().get(&id).cloned()
    }

    /// Whether the marker id is currently a target.
    pub fn contains(&self, id: MarkerId) -> bool {
        self.targets.read().contains_key(&id)
    }

    /// Number of registered targets.
    pub fn len(&self) -> usize {
        self.targets.read().len()
    }

    /// Whether the registry has no targets.
    pub fn is_empty(&self) -> bool {
        self.targets.read().is_empty()
    }

    /// Snapshot of the currently registered ids, sorted for stable logging.
    pub fn ids(&self) -> Vec<MarkerId> {
        let mut ids: Vec<MarkerId> = self.targets.read().keys().copied().collect();
        ids.sort();
        ids
    }
}
