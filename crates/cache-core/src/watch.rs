//! Watch Broadcaster & Transaction Manager (C9, spec.md §4.9): tracks
//! live watches and notifies callbacks when their projected result
//! changes, batching notifications inside explicit transactions.

use crate::diff::{self, SharedValue};
use crate::value::EntityId;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

/// Opaque handle returned by [`Broadcaster::watch`]; dropping it does
/// nothing on its own — call [`Broadcaster::stop`] (or the disposer
/// closure the facade wraps around it) to unregister.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct WatchId(u64);

/// Re-executes a watch's query against the effective store view and
/// returns its freshly read (not yet diffed) result, or `None` if the
/// watch was disposed mid-broadcast (spec.md §5, "Cancellation"). The
/// broadcaster itself runs the result through [`diff::diff`] against the
/// watch's previous [`SharedValue`].
pub trait WatchExecutor {
    fn execute(&mut self, watch_id: WatchId, root_id: &EntityId, optimistic: bool) -> Option<serde_json::Value>;
}

struct WatchEntry {
    root_id: EntityId,
    optimistic: bool,
    previous: Option<SharedValue>,
    callback: Box<dyn FnMut(&SharedValue)>,
    live: bool,
}

///
/// Broadcaster
/// Owns the watch table and the reentrant-broadcast guard. `broadcasting`
/// marks a pass already in flight; a nested `broadcast()` call instead
/// sets `pending` and returns, and the in-flight pass re-runs once more
/// after finishing if `pending` was set — bounding reentry to one extra
/// pass rather than recursing (spec.md §5, "must tolerate this by
/// deferring... to avoid re-entrant infinite loops").
///

pub struct Broadcaster {
    watches: RefCell<HashMap<WatchId, WatchEntry>>,
    next_id: Cell<u64>,
    broadcasting: Cell<bool>,
    pending: RefCell<bool>,
}

impl std::fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcaster")
            .field("watch_count", &self.watches.borrow().len())
            .finish()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self {
            watches: RefCell::new(HashMap::new()),
            next_id: Cell::new(0),
            broadcasting: Cell::new(false),
            pending: RefCell::new(false),
        }
    }
}

impl Broadcaster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a watch and perform its initial read (not a broadcast),
    /// matching spec.md §4.9's `watch(options) -> disposer`.
    pub fn watch(
        &self,
        root_id: EntityId,
        optimistic: bool,
        executor: &mut dyn WatchExecutor,
        mut callback: Box<dyn FnMut(&SharedValue)>,
    ) -> WatchId {
        let id = WatchId(self.next_id.get());
        self.next_id.set(id.0 + 1);

        let initial = executor
            .execute(id, &root_id, optimistic)
            .map(|fresh| diff::diff(&fresh, None, &|_| None));
        if let Some(result) = &initial {
            callback(result);
        }

        self.watches.borrow_mut().insert(
            id,
            WatchEntry {
                root_id,
                optimistic,
                previous: initial,
                callback,
                live: true,
            },
        );
        id
    }

    /// Disposer semantics: once stopped, a watch receives no further
    /// callbacks even if a broadcast already in flight had it queued
    /// (spec.md §5, "Cancellation").
    pub fn stop(&self, id: WatchId) {
        if let Some(entry) = self.watches.borrow_mut().get_mut(&id) {
            entry.live = false;
        }
        self.watches.borrow_mut().remove(&id);
    }

    /// Re-read every live watch against its effective view; fire the
    /// callback only when the diffed result is not reference-equal to
    /// the previous one (spec.md §4.9).
    pub fn broadcast(&self, executor: &mut dyn WatchExecutor) {
        if self.broadcasting.get() {
            *self.pending.borrow_mut() = true;
            return;
        }

        self.broadcasting.set(true);
        self.run_pass(executor);
        while std::mem::take(&mut *self.pending.borrow_mut()) {
            self.run_pass(executor);
        }
        self.broadcasting.set(false);
    }

    fn run_pass(&self, executor: &mut dyn WatchExecutor) {
        let ids: Vec<WatchId> = self
            .watches
            .borrow()
            .iter()
            .filter(|(_, entry)| entry.live)
            .map(|(id, _)| *id)
            .collect();

        for id in ids {
            let (root_id, optimistic) = {
                let watches = self.watches.borrow();
                let Some(entry) = watches.get(&id) else { continue };
                if !entry.live {
                    continue;
                }
                (entry.root_id.clone(), entry.optimistic)
            };

            let Some(fresh) = executor.execute(id, &root_id, optimistic) else {
                continue;
            };

            let previous = {
                let watches = self.watches.borrow();
                watches.get(&id).filter(|e| e.live).map(|e| e.previous.clone())
            };
            let Some(previous) = previous else { continue };

            let reconciled = diff::diff(&fresh, previous.as_ref(), &|_| None);
            let changed = match &previous {
                Some(prev) => !std::sync::Arc::ptr_eq(prev, &reconciled),
                None => true,
            };
            if !changed {
                continue;
            }

            let mut watches = self.watches.borrow_mut();
            let Some(entry) = watches.get_mut(&id) else { continue };
            if !entry.live {
                continue;
            }
            entry.previous = Some(std::sync::Arc::clone(&reconciled));
            (entry.callback)(&reconciled);
        }
    }

    /// Run `body` with a write proxy, then broadcast exactly once whether
    /// `body` returned normally or panicked-and-was-caught by the caller
    /// (spec.md §4.9, "`performTransaction`"). The facade is expected to
    /// call this around its write/delete calls and forward `body`'s
    /// `Result` unchanged; the broadcast itself never swallows an error.
    pub fn perform_transaction<T, E>(
        &self,
        executor: &mut dyn WatchExecutor,
        body: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E> {
        let outcome = body();
        self.broadcast(executor);
        outcome
    }

    #[must_use]
    pub fn watch_count(&self) -> usize {
        self.watches.borrow().len()
    }

    /// The [`WatchId`] the next [`Broadcaster::watch`] call will assign.
    /// Lets a facade pre-register per-watch state (document, variables)
    /// under that id before the registering call performs its initial
    /// read, which needs that state to already be in place.
    #[must_use]
    pub fn peek_next_id(&self) -> WatchId {
        WatchId(self.next_id.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell as StdRefCell;
    use std::rc::Rc;

    struct ScriptedExecutor {
        results: StdRefCell<HashMap<WatchId, Vec<serde_json::Value>>>,
    }

    impl WatchExecutor for ScriptedExecutor {
        fn execute(&mut self, watch_id: WatchId, _root_id: &EntityId, _optimistic: bool) -> Option<serde_json::Value> {
            let mut results = self.results.borrow_mut();
            let queue = results.get_mut(&watch_id)?;
            if queue.is_empty() {
                return None;
            }
            Some(queue.remove(0))
        }
    }

    #[test]
    fn watch_fires_only_when_the_diffed_result_changes() {
        let broadcaster = Broadcaster::new();
        let calls = Rc::new(StdRefCell::new(0u32));
        let calls_clone = Rc::clone(&calls);

        let mut executor = ScriptedExecutor { results: StdRefCell::new(HashMap::new()) };
        // Pre-seed a result so the initial watch() read succeeds.
        executor.results.borrow_mut().insert(WatchId(0), vec![json!({"a": 1})]);

        let id = broadcaster.watch(
            "ROOT_QUERY".to_string(),
            false,
            &mut executor,
            Box::new(move |_| {
                *calls_clone.borrow_mut() += 1;
            }),
        );
        assert_eq!(*calls.borrow(), 1);

        executor.results.borrow_mut().insert(id, vec![json!({"a": 1})]);
        broadcaster.broadcast(&mut executor);
        assert_eq!(*calls.borrow(), 1, "identical result must not re-fire the callback");

        executor.results.borrow_mut().insert(id, vec![json!({"a": 2})]);
        broadcaster.broadcast(&mut executor);
        assert_eq!(*calls.borrow(), 2, "changed result must fire the callback");
    }

    #[test]
    fn stopped_watch_receives_no_further_callbacks() {
        let broadcaster = Broadcaster::new();
        let calls = Rc::new(StdRefCell::new(0u32));
        let calls_clone = Rc::clone(&calls);

        let mut executor = ScriptedExecutor { results: StdRefCell::new(HashMap::new()) };
        executor.results.borrow_mut().insert(WatchId(0), vec![json!({"a": 1})]);

        let id = broadcaster.watch(
            "ROOT_QUERY".to_string(),
            false,
            &mut executor,
            Box::new(move |_| {
                *calls_clone.borrow_mut() += 1;
            }),
        );
        broadcaster.stop(id);

        executor.results.borrow_mut().insert(id, vec![json!({"a": 2})]);
        broadcaster.broadcast(&mut executor);
        assert_eq!(*calls.borrow(), 1, "a stopped watch must not fire again");
    }

    #[test]
    fn perform_transaction_broadcasts_once_and_forwards_the_error() {
        let broadcaster = Broadcaster::new();
        let mut executor = ScriptedExecutor { results: StdRefCell::new(HashMap::new()) };

        let result: Result<(), &'static str> =
            broadcaster.perform_transaction(&mut executor, || Err("boom"));
        assert_eq!(result, Err("boom"));
    }
}
