//! Optimistic Stack (C8, spec.md §4.8): an ordered list of named overlay
//! stores above the base, resolved top-to-bottom on read.

use crate::store::{EntityStore, InMemoryStore};
use crate::value::{EntityId, EntityRecord};
use std::collections::HashMap;

pub type LayerName = String;

///
/// OptimisticStack
/// Layers in insertion order (the order is the rank; no separate rank
/// field, per SPEC_FULL.md §4.8). Each layer is an `InMemoryStore`-shaped
/// overlay so composite reads reuse the base store's own lookup code.
///

#[derive(Debug, Default)]
pub struct OptimisticStack {
    layers: Vec<(LayerName, InMemoryStore)>,
}

impl OptimisticStack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    #[must_use]
    pub fn names(&self) -> Vec<LayerName> {
        self.layers.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Push a new empty overlay named `name`, returning a mutable handle
    /// the caller writes through. Pushing a name that already exists
    /// shadows the earlier layer for lookups by name, matching a plain
    /// `Vec` push; callers are expected to use unique names (spec.md
    /// never says names must be rejected when reused, so we don't).
    pub fn push_layer(&mut self, name: impl Into<LayerName>) -> &mut InMemoryStore {
        self.layers.push((name.into(), InMemoryStore::new()));
        &mut self.layers.last_mut().expect("just pushed").1
    }

    pub fn layer_mut(&mut self, name: &str) -> Option<&mut InMemoryStore> {
        self.layers.iter_mut().rev().find(|(n, _)| n == name).map(|(_, layer)| layer)
    }

    /// Remove the named overlay. Per spec.md §4.8, removal is equivalent
    /// to replaying the surviving overlays, in their original order, over
    /// a pristine base — so any write ordering effects between the
    /// removed layer and its neighbours vanish along with it rather than
    /// leaving residue. Because layers never read each other at write
    /// time (each records only its own deltas against the *base*, not
    /// against the composite), simply dropping the entry from the `Vec`
    /// already produces that outcome: the remaining layers are untouched
    /// records of their own writes.
    pub fn remove_layer(&mut self, name: &str) -> bool {
        let before = self.layers.len();
        self.layers.retain(|(n, _)| n != name);
        self.layers.len() != before
    }

    /// Composite read for entity `id`: iterate overlays top-to-bottom
    /// (most recently pushed first); the first overlay with either a
    /// value or a tombstone for `id` wins, else fall through to `base`.
    #[must_use]
    pub fn get<'a>(&'a self, base: &'a dyn EntityStore, id: &str) -> Option<&'a EntityRecord> {
        for (_, layer) in self.layers.iter().rev() {
            if layer.is_tombstoned(id) {
                return None;
            }
            if let Some(record) = layer.get(id) {
                return Some(record);
            }
        }
        base.get(id)
    }

    #[must_use]
    pub fn is_tombstoned(&self, base: &dyn EntityStore, id: &str) -> bool {
        for (_, layer) in self.layers.iter().rev() {
            if layer.is_tombstoned(id) {
                return true;
            }
            if layer.get(id).is_some() {
                return false;
            }
        }
        base.is_tombstoned(id)
    }

    /// Flatten the composite view into a single snapshot, base entities
    /// overridden top-down by overlay entities/tombstones.
    #[must_use]
    pub fn composite_snapshot(&self, base: &dyn EntityStore) -> HashMap<EntityId, EntityRecord> {
        let mut out = base.snapshot();
        for (_, layer) in &self.layers {
            for id in layer.ids() {
                if layer.is_tombstoned(&id) {
                    out.remove(&id);
                } else if let Some(record) = layer.get(&id) {
                    out.insert(id, record.clone());
                }
            }
        }
        out
    }
}

/// A read-or-write view over one overlay layer composited with the base
/// beneath it, handed to an `addLayer`/`recordOptimisticTransaction`
/// mutator (spec.md §4.8, "invokes `mutator` with a proxy that routes
/// writes to this overlay and reads to the composite view below-plus-this-overlay").
pub struct LayerView<'a> {
    base: &'a dyn EntityStore,
    below: &'a [(LayerName, InMemoryStore)],
    layer: &'a mut InMemoryStore,
}

impl<'a> LayerView<'a> {
    fn get_through(&self, id: &str) -> Option<&EntityRecord> {
        if self.layer.is_tombstoned(id) {
            return None;
        }
        if let Some(record) = self.layer.get(id) {
            return Some(record);
        }
        for (_, layer) in self.below.iter().rev() {
            if layer.is_tombstoned(id) {
                return None;
            }
            if let Some(record) = layer.get(id) {
                return Some(record);
            }
        }
        self.base.get(id)
    }

    fn is_tombstoned_through(&self, id: &str) -> bool {
        if self.layer.is_tombstoned(id) {
            return true;
        }
        if self.layer.get(id).is_some() {
            return false;
        }
        for (_, layer) in self.below.iter().rev() {
            if layer.is_tombstoned(id) {
                return true;
            }
            if layer.get(id).is_some() {
                return false;
            }
        }
        self.base.is_tombstoned(id)
    }
}

/// `EntityStore` over one overlay: reads fall through to the layers
/// below and the base (so scratch-seeding a merge during a write sees
/// the composite value), while `set`/`delete` land only on this layer
/// (spec.md §4.8 — a layer records only its own deltas).
impl EntityStore for LayerView<'_> {
    fn get(&self, id: &str) -> Option<&EntityRecord> {
        self.get_through(id)
    }

    fn set(&mut self, id: EntityId, record: EntityRecord) {
        self.layer.set(id, record);
    }

    fn delete(&mut self, id: &str) {
        self.layer.delete(id);
    }

    fn is_tombstoned(&self, id: &str) -> bool {
        self.is_tombstoned_through(id)
    }

    /// IDs carrying either a value or a tombstone in *this layer only*,
    /// not the composite below it, matching [`EntityStore::ids`]'s
    /// contract.
    fn snapshot(&self) -> HashMap<EntityId, EntityRecord> {
        self.layer.snapshot()
    }

    fn restore(&mut self, snapshot: HashMap<EntityId, EntityRecord>) {
        self.layer.restore(snapshot);
    }

    fn ids(&self) -> Vec<EntityId> {
        self.layer.ids()
    }
}

impl OptimisticStack {
    /// Borrow a mutator view for the top layer named `name`, with every
    /// layer below it (and the base) visible for reads.
    pub fn view_mut<'a>(&'a mut self, base: &'a dyn EntityStore, name: &str) -> Option<LayerView<'a>> {
        let index = self.layers.iter().rposition(|(n, _)| n == name)?;
        let (below, at_and_above) = self.layers.split_at_mut(index);
        let (_, layer) = &mut at_and_above[0];
        Some(LayerView { base, below, layer })
    }
}

/// Read-only `EntityStore` over `(base, stack)`, for handing the reader
/// and the watch broadcaster a single store to walk regardless of
/// whether a given watch opted into the optimistic view (spec.md §4.8,
/// "optimistic reads compose the stack over the base transparently").
pub struct CompositeView<'a> {
    base: &'a dyn EntityStore,
    stack: &'a OptimisticStack,
}

impl<'a> CompositeView<'a> {
    #[must_use]
    pub fn new(base: &'a dyn EntityStore, stack: &'a OptimisticStack) -> Self {
        Self { base, stack }
    }
}

impl EntityStore for CompositeView<'_> {
    fn get(&self, id: &str) -> Option<&EntityRecord> {
        self.stack.get(self.base, id)
    }

    fn set(&mut self, _id: EntityId, _record: EntityRecord) {
        unreachable!("CompositeView is read-only; write through a LayerView or the base store")
    }

    fn delete(&mut self, _id: &str) {
        unreachable!("CompositeView is read-only; write through a LayerView or the base store")
    }

    fn is_tombstoned(&self, id: &str) -> bool {
        self.stack.is_tombstoned(self.base, id)
    }

    fn snapshot(&self) -> HashMap<EntityId, EntityRecord> {
        self.stack.composite_snapshot(self.base)
    }

    fn restore(&mut self, _snapshot: HashMap<EntityId, EntityRecord>) {
        unreachable!("CompositeView is read-only; write through a LayerView or the base store")
    }

    fn ids(&self) -> Vec<EntityId> {
        self.stack.composite_snapshot(self.base).into_keys().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn record(field: &str, value: &str) -> EntityRecord {
        let mut r = EntityRecord::new();
        r.insert(field.to_string(), Value::Scalar(value.into()));
        r
    }

    #[test]
    fn composite_read_falls_through_to_base() {
        let mut base = InMemoryStore::new();
        base.set("Book:1".into(), record("title", "1984"));
        let stack = OptimisticStack::new();

        assert_eq!(stack.get(&base, "Book:1"), base.get("Book:1"));
    }

    #[test]
    fn top_layer_shadows_base() {
        let mut base = InMemoryStore::new();
        base.set("Book:1".into(), record("title", "1984"));
        let mut stack = OptimisticStack::new();
        stack.push_layer("optimistic-1").set("Book:1".to_string(), record("title", "Animal Farm"));

        let seen = stack.get(&base, "Book:1").unwrap();
        assert_eq!(seen.get("title"), Some(&Value::Scalar("Animal Farm".into())));
    }

    #[test]
    fn removing_a_middle_layer_preserves_the_others() {
        let base = InMemoryStore::new();
        let mut stack = OptimisticStack::new();
        stack.push_layer("a").set("X".to_string(), record("f", "from-a"));
        stack.push_layer("b").set("X".to_string(), record("f", "from-b"));
        stack.push_layer("c").set("Y".to_string(), record("g", "from-c"));

        assert!(stack.remove_layer("b"));

        let seen_x = stack.get(&base, "X").unwrap();
        assert_eq!(seen_x.get("f"), Some(&Value::Scalar("from-a".into())));
        let seen_y = stack.get(&base, "Y").unwrap();
        assert_eq!(seen_y.get("g"), Some(&Value::Scalar("from-c".into())));
    }

    #[test]
    fn tombstone_in_an_overlay_hides_the_base_entity() {
        let mut base = InMemoryStore::new();
        base.set("Book:1".into(), record("title", "1984"));
        let mut stack = OptimisticStack::new();
        stack.push_layer("a").delete("Book:1");

        assert_eq!(stack.get(&base, "Book:1"), None);
        assert!(stack.is_tombstoned(&base, "Book:1"));
    }

    #[test]
    fn composite_view_reads_through_as_an_entity_store() {
        let mut base = InMemoryStore::new();
        base.set("Book:1".into(), record("title", "1984"));
        let mut stack = OptimisticStack::new();
        stack.push_layer("a").set("Book:2".to_string(), record("title", "Animal Farm"));

        let view = CompositeView::new(&base, &stack);
        assert_eq!(view.get("Book:1"), base.get("Book:1"));
        assert_eq!(view.get("Book:2").unwrap().get("title"), Some(&Value::Scalar("Animal Farm".into())));
        assert!(view.ids().len() >= 2);
    }

    #[test]
    fn layer_view_writes_land_on_the_layer_and_read_through_below() {
        let mut base = InMemoryStore::new();
        base.set("Book:1".into(), record("title", "1984"));
        let mut stack = OptimisticStack::new();
        stack.push_layer("a");
        stack.push_layer("b");

        let mut view = stack.view_mut(&base, "b").unwrap();
        assert_eq!(EntityStore::get(&view, "Book:1"), base.get("Book:1"));
        EntityStore::set(&mut view, "Book:2".to_string(), record("title", "Animal Farm"));
        assert_eq!(view.snapshot().len(), 1);
    }
}
