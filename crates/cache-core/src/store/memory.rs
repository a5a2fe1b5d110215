use crate::store::EntityStore;
use crate::value::{EntityId, EntityRecord};
use std::collections::{HashMap, HashSet};

///
/// InMemoryStore
/// The base entity store and the shape every optimistic overlay shares.
/// Created empty; entity records are created on first write and mutate by
/// replacement on subsequent `set` calls (merge semantics live one layer
/// up, in the normalization writer — spec.md §4.1 describes `set` as
/// "replaces the record for `id`").
///

#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    records: HashMap<EntityId, EntityRecord>,
    tombstones: HashSet<EntityId>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.tombstones.is_empty()
    }
}

impl EntityStore for InMemoryStore {
    fn get(&self, id: &str) -> Option<&EntityRecord> {
        self.records.get(id)
    }

    fn set(&mut self, id: EntityId, record: EntityRecord) {
        self.tombstones.remove(&id);
        self.records.insert(id, record);
    }

    fn delete(&mut self, id: &str) {
        self.records.remove(id);
        self.tombstones.insert(id.to_string());
    }

    fn is_tombstoned(&self, id: &str) -> bool {
        self.tombstones.contains(id)
    }

    fn snapshot(&self) -> HashMap<EntityId, EntityRecord> {
        self.records.clone()
    }

    fn restore(&mut self, snapshot: HashMap<EntityId, EntityRecord>) {
        self.records = snapshot;
        self.tombstones.clear();
    }

    fn ids(&self) -> Vec<EntityId> {
        self.records
            .keys()
            .cloned()
            .chain(self.tombstones.iter().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let mut store = InMemoryStore::new();
        let mut record = EntityRecord::new();
        record.insert("name".to_string(), crate::value::Value::Scalar("1984".into()));
        store.set("Book:1".to_string(), record.clone());

        assert_eq!(store.get("Book:1"), Some(&record));
        assert!(!store.is_tombstoned("Book:1"));
    }

    #[test]
    fn delete_leaves_a_tombstone() {
        let mut store = InMemoryStore::new();
        store.set("Book:1".to_string(), EntityRecord::new());
        store.delete("Book:1");

        assert_eq!(store.get("Book:1"), None);
        assert!(store.is_tombstoned("Book:1"));
    }

    #[test]
    fn snapshot_restore_round_trips() {
        let mut store = InMemoryStore::new();
        let mut record = EntityRecord::new();
        record.insert("title".to_string(), crate::value::Value::Scalar("2666".into()));
        store.set("Book:1".to_string(), record);

        let snapshot = store.snapshot();
        let mut restored = InMemoryStore::new();
        restored.restore(snapshot);

        assert_eq!(restored.get("Book:1"), store.get("Book:1"));
    }
}
