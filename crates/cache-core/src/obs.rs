//! Metrics sink boundary.
//!
//! Cache logic MUST NOT depend on any particular metrics backend.
//! All instrumentation flows through [`CacheEvent`] and [`MetricsSink`];
//! this is the only bridge between execution logic and an embedder's
//! telemetry (grounded on the teacher's `obs::sink` split, minus the
//! IC-specific performance counter).

///
/// CacheEvent
///

#[derive(Clone, Debug)]
pub enum CacheEvent {
    WriteStart { root_id: String },
    WriteFinish { root_id: String, entities_touched: usize },
    ReadStart { root_id: String },
    ReadFinish { root_id: String, complete: bool },
    Broadcast { watches_notified: usize },
    LayerPush { name: String },
    LayerPop { name: String },
}

/// Receives [`CacheEvent`]s as the cache executes. Implementors should be
/// cheap and non-blocking; the cache calls this synchronously inline with
/// every write/read/broadcast.
pub trait MetricsSink {
    fn record(&self, event: CacheEvent);
}

///
/// NoopSink
/// Default sink: discards every event.
///

pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn record(&self, _event: CacheEvent) {}
}

/// Trace the event, then forward it to `sink`. The one place both the
/// core engine and the facade funnel `CacheEvent`s through, so the two
/// never drift on what "logging an event" means.
pub fn log_event(sink: &dyn MetricsSink, event: CacheEvent) {
    tracing::trace!(?event, "cache event");
    sink.record(event);
}

impl std::fmt::Debug for dyn MetricsSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<metrics sink>")
    }
}
