//! Shadow storage.
//!
//! A shadow is the last collection state the server and a client agreed on.
//! Each scope holds exactly one immutable snapshot; a write swaps the whole
//! snapshot and readers keep whatever `Arc` they already hold.

use crate::Collection;
use dashmap::DashMap;
use std::sync::Arc;

/// Keyed storage of shadow snapshots.
pub trait ShadowStore: Send + Sync {
    /// Current shadow for `scope`, if any.
    fn get(&self, scope: &str) -> Option<Arc<Collection>>;

    /// Replace the shadow for `scope`.
    fn put(&self, scope: &str, shadow: Collection);

    /// Forget the shadow for `scope`. Returns whether one existed.
    fn remove(&self, scope: &str) -> bool;
}

/// In-process shadow store.
#[derive(Debug, Default)]
pub struct InMemoryShadowStore {
    shadows: DashMap<String, Arc<Collection>>,
}

impl InMemoryShadowStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            shadows: DashMap::new(),
        }
    }

    /// Create an empty store wrapped in `Arc` for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of scopes with a shadow.
    pub fn len(&self) -> usize {
        self.shadows.len()
    }

    /// Whether no scope has a shadow.
    pub fn is_empty(&self) -> bool {
        self.shadows.is_empty()
    }
}

impl ShadowStore for InMemoryShadowStore {
    fn get(&self, scope: &str) -> Option<Arc<Collection>> {
        self.shadows.get(scope).map(|entry| Arc::clone(entry.value()))
    }

    fn put(&self, scope: &str, shadow: Collection) {
        tracing::trace!(scope = %scope, records = shadow.len(), "Shadow replaced");
        self.shadows.insert(scope.to_string(), Arc::new(shadow));
    }

    fn remove(&self, scope: &str) -> bool {
        self.shadows.remove(scope).is_some()
    }
}

impl<S: ShadowStore + ?Sized> ShadowStore for Arc<S> {
    fn get(&self, scope: &str) -> Option<Arc<Collection>> {
        (**self).get(scope)
    }

    fn put(&self, scope: &str, shadow: Collection) {
        (**self).put(scope, shadow)
    }

    fn remove(&self, scope: &str) -> bool {
        (**self).remove(scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Record;
    use serde_json::Map;

    fn collection(ids: &[i64]) -> Collection {
        ids.iter().map(|id| Record::with_id(*id, Map::new())).collect()
    }

    #[test]
    fn get_missing_scope() {
        let store = InMemoryShadowStore::new();
        assert!(store.get("todos").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn put_replaces_whole_snapshot() {
        let store = InMemoryShadowStore::new();
        store.put("todos", collection(&[1, 2, 3]));
        let held = store.get("todos").unwrap();

        store.put("todos", collection(&[1]));
        assert_eq!(store.get("todos").unwrap().len(), 1);
        // Earlier readers keep their snapshot
        assert_eq!(held.len(), 3);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn scopes_are_independent() {
        let store = InMemoryShadowStore::new();
        store.put("a", collection(&[1]));
        store.put("b", collection(&[1, 2]));
        assert_eq!(store.get("a").unwrap().len(), 1);
        assert_eq!(store.get("b").unwrap().len(), 2);

        assert!(store.remove("a"));
        assert!(!store.remove("a"));
        assert!(store.get("a").is_none());
        assert!(store.get("b").is_some());
    }

    #[test]
    fn shared_store() {
        let store = InMemoryShadowStore::new_shared();
        let other = Arc::clone(&store);
        other.put("todos", collection(&[7]));
        assert_eq!(ShadowStore::get(&store, "todos").unwrap().len(), 1);
    }
}
