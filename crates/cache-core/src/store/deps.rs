//! Dependency tracker: an explicit `(memo key -> set of entity IDs read)`
//! bi-map, updated by the reader as it walks and invalidated by the store
//! on `set`/`delete` (spec.md §4.1, §9 "Result memoization with implicit
//! dependency tracking").

use crate::value::EntityId;
use std::collections::{HashMap, HashSet};

/// Identity of one memoized reader call: `(selection-set identity, entity
/// ID, a hash folding variables + matcher + resolvers identity together)`
/// — spec.md §4.6 step 5's composite memoization key.
pub type MemoKey = (u64, EntityId, u64);

///
/// DepTracker
/// Bidirectional multimap so invalidating an entity costs
/// `O(memos that read it)`, not a scan of every live memo.
///

#[derive(Debug, Default)]
pub struct DepTracker {
    by_memo: HashMap<MemoKey, HashSet<EntityId>>,
    by_entity: HashMap<EntityId, HashSet<MemoKey>>,
}

impl DepTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that computing `memo` read a field of entity `entity_id`.
    pub fn record(&mut self, memo: MemoKey, entity_id: &str) {
        self.by_memo
            .entry(memo.clone())
            .or_default()
            .insert(entity_id.to_string());
        self.by_entity
            .entry(entity_id.to_string())
            .or_default()
            .insert(memo);
    }

    /// Drop all dependency edges for `memo` (called before recomputing it,
    /// so stale edges from a prior shape of the result don't linger).
    pub fn clear_memo(&mut self, memo: &MemoKey) {
        if let Some(entities) = self.by_memo.remove(memo) {
            for entity_id in entities {
                if let Some(memos) = self.by_entity.get_mut(&entity_id) {
                    memos.remove(memo);
                    if memos.is_empty() {
                        self.by_entity.remove(&entity_id);
                    }
                }
            }
        }
    }

    /// Entity `entity_id` was written or deleted: return every memo that
    /// depended on it, and drop their dependency edges (the caller is
    /// responsible for evicting those memos from its result cache).
    pub fn invalidate_entity(&mut self, entity_id: &str) -> Vec<MemoKey> {
        let Some(memos) = self.by_entity.remove(entity_id) else {
            return Vec::new();
        };
        for memo in &memos {
            self.by_memo.remove(memo);
        }
        memos.into_iter().collect()
    }

    #[must_use]
    pub fn depends_on(&self, memo: &MemoKey) -> Option<&HashSet<EntityId>> {
        self.by_memo.get(memo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalidating_an_entity_returns_dependent_memos() {
        let mut tracker = DepTracker::new();
        tracker.record((1, "ROOT_QUERY".into(), 0), "Book:1");
        tracker.record((2, "ROOT_QUERY".into(), 0), "Book:1");
        tracker.record((3, "ROOT_QUERY".into(), 0), "Author:1");

        let mut invalidated = tracker.invalidate_entity("Book:1");
        invalidated.sort();
        assert_eq!(
            invalidated,
            vec![(1, "ROOT_QUERY".to_string(), 0), (2, "ROOT_QUERY".to_string(), 0)]
        );
        assert!(tracker.depends_on(&(3, "ROOT_QUERY".into(), 0)).is_some());
    }

    #[test]
    fn clearing_a_memo_drops_its_edges_only() {
        let mut tracker = DepTracker::new();
        tracker.record((1, "ROOT_QUERY".into(), 0), "Book:1");
        tracker.record((2, "ROOT_QUERY".into(), 0), "Book:1");

        tracker.clear_memo(&(1, "ROOT_QUERY".into(), 0));
        assert!(tracker.depends_on(&(1, "ROOT_QUERY".into(), 0)).is_none());
        assert!(tracker.depends_on(&(2, "ROOT_QUERY".into(), 0)).is_some());
    }
}
