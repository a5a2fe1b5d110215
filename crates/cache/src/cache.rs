//! The public [`Cache`] handle: owns the base store, the dependency
//! tracker, the optimistic stack, the read engine and the watch
//! broadcaster, and exposes the entry points spec.md §6 names.
//!
//! Every method takes `&self`: interior mutability (`RefCell`) plays the
//! role a canister-scoped `thread_local! + RefCell` pair plays for the
//! teacher's session handle, minus the thread-local — this cache is not
//! scoped to a canister, just to wherever the caller holds the handle.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use cache_core::config::CacheConfig;
use cache_core::diff::{self, SharedValue};
use cache_core::document::{Doc, Variables};
use cache_core::error::Result;
use cache_core::matcher::FragmentMatcher;
use cache_core::obs::{CacheEvent, MetricsSink, NoopSink};
use cache_core::optimistic::{CompositeView, LayerView, OptimisticStack};
use cache_core::read::{ReadEngine, ReadFragmentOptions, ReadOptions, ReadOutcome};
use cache_core::store::{DepTracker, EntityStore, InMemoryStore};
use cache_core::value::{EntityId, EntityRecord, Value};
use cache_core::watch::{Broadcaster, WatchExecutor, WatchId};
use cache_core::write::{self, WriteFragmentOptions, WriteOptions, WriteOutcome};

use crate::request::{
    ReadFragmentRequest, ReadRequest, WatchRequest, WriteFragmentRequest, WriteRequest,
};

/// Per-watch state the broadcaster itself doesn't keep: the document,
/// variables and operation name needed to re-run the watch's read. The
/// root entity and the optimistic flag already live on the broadcaster's
/// own `WatchEntry`, so they aren't duplicated here.
struct WatchSpec {
    document: Doc<'static>,
    variables: Variables,
    operation_name: Option<String>,
}

struct CacheInner {
    base: InMemoryStore,
    deps: DepTracker,
    optimistic: OptimisticStack,
    read_engine: ReadEngine,
    matcher: FragmentMatcher,
    config: CacheConfig,
    watches: HashMap<WatchId, WatchSpec>,
}

impl CacheInner {
    fn new(config: CacheConfig) -> Self {
        let matcher = FragmentMatcher::new(config.matcher_mode.clone());
        Self {
            base: InMemoryStore::new(),
            deps: DepTracker::new(),
            optimistic: OptimisticStack::new(),
            read_engine: ReadEngine::new(),
            matcher,
            config,
            watches: HashMap::new(),
        }
    }
}

///
/// Cache
/// Normalized, reactive query-result cache (spec.md §1). One `Cache`
/// owns one base store, one optimistic stack and one set of live watches;
/// nothing here is `Send`/`Sync` — share a handle the way a single-writer
/// canister session is shared, not across threads.
///

pub struct Cache {
    inner: RefCell<CacheInner>,
    broadcaster: Broadcaster,
    sink: RefCell<Box<dyn MetricsSink>>,
    in_transaction: Cell<bool>,
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    #[must_use]
    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            inner: RefCell::new(CacheInner::new(config)),
            broadcaster: Broadcaster::new(),
            sink: RefCell::new(Box::new(NoopSink)),
            in_transaction: Cell::new(false),
        }
    }

    /// Install a metrics sink (spec.md §4.10 / SPEC_FULL.md §4.10). A
    /// consuming builder setter, matching the teacher's `DbSession`
    /// configuration methods.
    #[must_use]
    pub fn metrics_sink(self, sink: Box<dyn MetricsSink>) -> Self {
        *self.sink.borrow_mut() = sink;
        self
    }

    /// Seed the explicit fragment matcher's possible-types table once it
    /// has loaded (e.g. after a schema-introspection fetch completes).
    /// No-op under the heuristic strategy. Reads issued against an
    /// explicit matcher before this is called fail with
    /// `CacheError::matcher_not_ready()` (spec.md §7).
    pub fn load_possible_types(&self, table: cache_core::config::PossibleTypesTable) {
        self.inner.borrow_mut().matcher.load_possible_types(table);
    }

    fn log(&self, event: CacheEvent) {
        cache_core::obs::log_event(self.sink.borrow().as_ref(), event);
    }

    // ---------------------------------------------------------------
    // Write
    // ---------------------------------------------------------------

    #[tracing::instrument(level = "debug", skip_all, fields(root_id = %req.root_id))]
    pub fn write(&self, req: WriteRequest<'_>) -> Result<WriteOutcome> {
        let root_id = req.root_id.clone();
        self.log(CacheEvent::WriteStart { root_id: root_id.clone() });

        let outcome = {
            let mut inner = self.inner.borrow_mut();
            let CacheInner { base, deps, matcher, config, read_engine, .. } = &mut *inner;
            let opts = WriteOptions {
                document: req.document,
                variables: req.variables,
                result: req.result,
                root_id: req.root_id,
                operation_name: req.operation_name,
                id_extractor: req.id_extractor,
                matcher,
                validate: config.validate_on_write,
                strict: config.strict_writes,
                connection_filter: req.connection_filter,
            };
            let outcome = write::write(opts, base)?;
            invalidate_touched(deps, read_engine, &outcome.touched_ids);
            outcome
        };

        if !self.in_transaction.get() {
            self.broadcast_now();
        }
        self.log(CacheEvent::WriteFinish { root_id, entities_touched: outcome.touched_ids.len() });
        Ok(outcome)
    }

    /// Alias of [`Cache::write`] (spec.md §6 lists `writeQuery` and
    /// `write` with identical semantics; see DESIGN.md).
    pub fn write_query(&self, req: WriteRequest<'_>) -> Result<WriteOutcome> {
        self.write(req)
    }

    pub fn write_fragment(&self, req: WriteFragmentRequest<'_>) -> Result<WriteOutcome> {
        let root_id = req.root_id.clone();
        self.log(CacheEvent::WriteStart { root_id: root_id.clone() });

        let outcome = {
            let mut inner = self.inner.borrow_mut();
            let CacheInner { base, deps, matcher, config, read_engine, .. } = &mut *inner;
            let opts = WriteFragmentOptions {
                document: req.document,
                fragment_name: req.fragment_name,
                variables: req.variables,
                result: req.result,
                root_id: req.root_id,
                id_extractor: req.id_extractor,
                matcher,
                validate: config.validate_on_write,
                strict: config.strict_writes,
                connection_filter: req.connection_filter,
            };
            let outcome = write::write_fragment(opts, base)?;
            invalidate_touched(deps, read_engine, &outcome.touched_ids);
            outcome
        };

        if !self.in_transaction.get() {
            self.broadcast_now();
        }
        self.log(CacheEvent::WriteFinish { root_id, entities_touched: outcome.touched_ids.len() });
        Ok(outcome)
    }

    // ---------------------------------------------------------------
    // Read
    // ---------------------------------------------------------------

    #[tracing::instrument(level = "debug", skip_all, fields(root_id = %req.root_id))]
    pub fn read(&self, req: ReadRequest<'_>) -> Result<ReadOutcome> {
        let root_id = req.root_id.clone();
        self.log(CacheEvent::ReadStart { root_id: root_id.clone() });

        let mut inner = self.inner.borrow_mut();
        let CacheInner { base, deps, matcher, config, read_engine, optimistic, .. } = &mut *inner;
        let return_partial = req.return_partial.unwrap_or(config.return_partial_default);

        let opts = ReadOptions {
            document: req.document,
            variables: req.variables,
            root_id: req.root_id,
            operation_name: req.operation_name,
            matcher,
            field_resolvers: req.field_resolvers,
            return_partial,
        };

        let outcome = if req.optimistic {
            let composite = CompositeView::new(&*base, &*optimistic);
            read_engine.read(opts, &composite, Some(deps))?
        } else {
            read_engine.read(opts, &*base, Some(deps))?
        };

        self.log(CacheEvent::ReadFinish { root_id, complete: outcome.complete });
        Ok(outcome)
    }

    /// Alias of [`Cache::read`] (spec.md §6; see DESIGN.md).
    pub fn read_query(&self, req: ReadRequest<'_>) -> Result<ReadOutcome> {
        self.read(req)
    }

    pub fn read_fragment(&self, req: ReadFragmentRequest<'_>) -> Result<ReadOutcome> {
        let mut inner = self.inner.borrow_mut();
        let CacheInner { base, deps, matcher, config, read_engine, optimistic, .. } = &mut *inner;
        let return_partial = req.return_partial.unwrap_or(config.return_partial_default);

        let opts = ReadFragmentOptions {
            document: req.document,
            fragment_name: req.fragment_name,
            variables: req.variables,
            root_id: req.root_id,
            matcher,
            field_resolvers: req.field_resolvers,
            return_partial,
        };

        if req.optimistic {
            let composite = CompositeView::new(&*base, &*optimistic);
            Ok(read_engine.read_fragment(opts, &composite, Some(deps))?)
        } else {
            Ok(read_engine.read_fragment(opts, &*base, Some(deps))?)
        }
    }

    /// Read then reconcile against `previous` (C7, spec.md §4.7):
    /// referentially stable subtrees are reused so callers can use
    /// pointer equality as a change signal.
    pub fn diff(
        &self,
        req: ReadRequest<'_>,
        previous: Option<&SharedValue>,
    ) -> Result<(SharedValue, bool)> {
        let outcome = self.read(req)?;
        let reconciled = diff::diff(&outcome.data, previous, &|_| None);
        Ok((reconciled, outcome.complete))
    }

    // ---------------------------------------------------------------
    // Watch
    // ---------------------------------------------------------------

    /// Register a watch and perform its initial read (spec.md §4.9,
    /// `watch(options) -> disposer`). Returns a [`WatchId`]; pair it with
    /// [`Cache::stop_watch`] in place of spec.md's closure-returning
    /// disposer (see DESIGN.md).
    pub fn watch(&self, req: WatchRequest<'_>) -> WatchId {
        let id = self.broadcaster.peek_next_id();
        let spec = WatchSpec {
            document: req.document.clone().into_static(),
            variables: req.variables,
            operation_name: req.operation_name.map(ToString::to_string),
        };
        self.inner.borrow_mut().watches.insert(id, spec);

        let mut adapter = WatchExecAdapter { cache: self };
        let assigned = self.broadcaster.watch(req.root_id, req.optimistic, &mut adapter, req.callback);
        debug_assert_eq!(assigned, id, "broadcaster assigned an id other than the one peeked");
        assigned
    }

    /// Stop a watch; it receives no further callbacks (spec.md §5,
    /// "Cancellation").
    pub fn stop_watch(&self, id: WatchId) {
        self.broadcaster.stop(id);
        self.inner.borrow_mut().watches.remove(&id);
    }

    fn execute_watch(&self, watch_id: WatchId, root_id: &EntityId, optimistic: bool) -> Option<serde_json::Value> {
        let mut inner = self.inner.borrow_mut();
        let CacheInner { base, optimistic: stack, read_engine, deps, matcher, watches, .. } = &mut *inner;
        let spec = watches.get(&watch_id)?;

        let opts = ReadOptions {
            document: &spec.document,
            variables: spec.variables.clone(),
            root_id: root_id.clone(),
            operation_name: spec.operation_name.as_deref(),
            matcher,
            field_resolvers: None,
            return_partial: true,
        };

        let outcome = if optimistic {
            let composite = CompositeView::new(&*base, &*stack);
            read_engine.read(opts, &composite, Some(deps)).ok()?
        } else {
            read_engine.read(opts, &*base, Some(deps)).ok()?
        };

        Some(outcome.data)
    }

    fn broadcast_now(&self) {
        let mut adapter = WatchExecAdapter { cache: self };
        self.broadcaster.broadcast(&mut adapter);
        self.log(CacheEvent::Broadcast { watches_notified: self.broadcaster.watch_count() });
    }

    // ---------------------------------------------------------------
    // Transactions & optimistic layers
    // ---------------------------------------------------------------

    /// Batch every write performed inside `body` into exactly one
    /// broadcast (spec.md §4.9 `performTransaction`, scenario S4). `body`
    /// is handed `self` as its write proxy, matching the single-cache
    /// mutation surface.
    pub fn perform_transaction<T>(&self, body: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        let already_nested = self.in_transaction.replace(true);
        let outcome = body(self);
        if !already_nested {
            self.in_transaction.set(false);
            self.broadcast_now();
        }
        outcome
    }

    /// Push a named optimistic overlay and run `body` against a write
    /// proxy scoped to it (spec.md §4.8 `recordOptimisticTransaction`).
    pub fn record_optimistic_transaction(
        &self,
        name: impl Into<String>,
        body: impl FnOnce(&mut OptimisticWriter<'_>) -> Result<()>,
    ) -> Result<()> {
        let name = name.into();
        {
            self.inner.borrow_mut().optimistic.push_layer(name.clone());
        }

        let outcome = {
            let mut inner = self.inner.borrow_mut();
            let CacheInner { base, optimistic, matcher, .. } = &mut *inner;
            let view = optimistic.view_mut(&*base, &name).expect("layer just pushed");
            let mut writer = OptimisticWriter { view, matcher };
            body(&mut writer)
        };

        self.log(CacheEvent::LayerPush { name });
        if !self.in_transaction.get() {
            self.broadcast_now();
        }
        outcome
    }

    /// Remove a named optimistic overlay (spec.md §4.8
    /// `removeOptimistic`); equivalent to replaying the surviving layers
    /// over a pristine base. Returns whether a layer of that name existed.
    pub fn remove_optimistic(&self, name: &str) -> bool {
        let removed = self.inner.borrow_mut().optimistic.remove_layer(name);
        if removed {
            self.log(CacheEvent::LayerPop { name: name.to_string() });
            if !self.in_transaction.get() {
                self.broadcast_now();
            }
        }
        removed
    }

    // ---------------------------------------------------------------
    // Snapshot & reset
    // ---------------------------------------------------------------

    /// Flatten the store to its persistence-format JSON shape (spec.md §6
    /// "Persistence format"). `optimistic = true` includes the overlay
    /// stack composited over the base.
    #[must_use]
    pub fn extract(&self, optimistic: bool) -> serde_json::Value {
        let inner = self.inner.borrow();
        let snapshot = if optimistic {
            inner.optimistic.composite_snapshot(&inner.base)
        } else {
            inner.base.snapshot()
        };

        let mut out = serde_json::Map::with_capacity(snapshot.len());
        for (id, record) in snapshot {
            let mut fields = serde_json::Map::with_capacity(record.len());
            for (key, value) in record {
                fields.insert(key, value.to_wire());
            }
            out.insert(id, serde_json::Value::Object(fields));
        }
        serde_json::Value::Object(out)
    }

    /// Inverse of [`Cache::extract`]: `restore(extract()) == identity` on
    /// the base store (spec.md §6, "Round-trip property"). Replaces the
    /// base store only; the optimistic stack is untouched.
    pub fn restore(&self, snapshot: serde_json::Value) {
        let records = parse_snapshot(snapshot);
        let mut inner = self.inner.borrow_mut();
        inner.base.restore(records);
        inner.deps = DepTracker::new();
        inner.read_engine = ReadEngine::new();
        drop(inner);
        self.broadcast_now();
    }

    /// Clear the base store, the optimistic stack and every memoization
    /// / dependency table. Live watches are kept registered and re-fire
    /// against the now-empty store (a deliberate choice over disposing
    /// them outright; see DESIGN.md).
    pub fn reset(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.base = InMemoryStore::new();
            inner.deps = DepTracker::new();
            inner.optimistic = OptimisticStack::new();
            inner.read_engine = ReadEngine::new();
        }
        self.broadcast_now();
    }
}

fn invalidate_touched(deps: &mut DepTracker, read_engine: &mut ReadEngine, touched_ids: &[EntityId]) {
    let mut invalidated = Vec::new();
    for id in touched_ids {
        invalidated.extend(deps.invalidate_entity(id));
    }
    read_engine.memo.evict_many(&invalidated);
}

fn parse_snapshot(snapshot: serde_json::Value) -> HashMap<EntityId, EntityRecord> {
    let serde_json::Value::Object(entities) = snapshot else {
        return HashMap::new();
    };

    let mut out = HashMap::with_capacity(entities.len());
    for (id, fields) in entities {
        let serde_json::Value::Object(fields) = fields else { continue };
        let mut record = EntityRecord::new();
        for (key, wire) in fields {
            record.insert(key, Value::from_wire(&wire));
        }
        out.insert(id, record);
    }
    out
}

/// Adapts [`Cache::execute_watch`] to the shape [`Broadcaster`] drives a
/// watch pass through.
struct WatchExecAdapter<'c> {
    cache: &'c Cache,
}

impl WatchExecutor for WatchExecAdapter<'_> {
    fn execute(&mut self, watch_id: WatchId, root_id: &EntityId, optimistic: bool) -> Option<serde_json::Value> {
        self.cache.execute_watch(watch_id, root_id, optimistic)
    }
}

/// Write proxy handed to a [`Cache::record_optimistic_transaction`] body:
/// writes land on the pushed overlay, reads fall through to the layers
/// below and the base (spec.md §4.8).
pub struct OptimisticWriter<'a> {
    view: LayerView<'a>,
    matcher: &'a FragmentMatcher,
}

impl OptimisticWriter<'_> {
    pub fn write(&mut self, req: WriteRequest<'_>) -> Result<WriteOutcome> {
        let opts = WriteOptions {
            document: req.document,
            variables: req.variables,
            result: req.result,
            root_id: req.root_id,
            operation_name: req.operation_name,
            id_extractor: req.id_extractor,
            matcher: self.matcher,
            validate: false,
            strict: false,
            connection_filter: req.connection_filter,
        };
        Ok(write::write(opts, &mut self.view)?)
    }

    pub fn delete(&mut self, id: &str) {
        self.view.delete(id);
    }
}
