//! # graph-cache
//!
//! `graph-cache` is the **public facade crate** for the normalized,
//! reactive query-result cache. It is the recommended dependency for
//! downstream client code.
//!
//! This crate exposes:
//! - the single [`Cache`] entry point used by application code,
//! - the request builders used to call it (`write`, `read`, `watch`, ...),
//! - and the stable error surface shared with `cache-core`.
//!
//! Low-level normalization, execution, diffing and the watch broadcaster
//! live in `cache-core` and are consumed here, not re-exposed wholesale.
//!
//! ## Crate layout
//!
//! - `cache`
//!   The [`Cache`] handle itself: construction, the write/read/watch/
//!   transaction surface, and the store/watch plumbing it owns.
//!
//! - `request`
//!   Builder-style option structs for every [`Cache`] entry point.
//!
//! - `error`
//!   Re-export of `cache-core`'s error taxonomy.
//!
//! ## Prelude
//!
//! - `prelude`
//!   Glob-importable module bringing in [`Cache`] plus the request and
//!   domain-vocabulary types most call sites need.

mod cache;
pub mod error;
mod request;

pub use cache::{Cache, OptimisticWriter};
pub use error::Error;
pub use request::{
    ReadFragmentRequest, ReadRequest, WatchRequest, WriteFragmentRequest, WriteRequest,
};

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

///
/// Prelude
/// Glob-importable surface for call sites that want `Cache` plus the
/// request builders and core domain vocabulary in scope without spelling
/// out every path.
///

pub mod prelude {
    pub use crate::{
        error::{Error, Result},
        Cache, OptimisticWriter, ReadFragmentRequest, ReadRequest, WatchRequest,
        WriteFragmentRequest, WriteRequest,
    };
    pub use cache_core::prelude::*;
    pub use cache_core::watch::WatchId;
}
