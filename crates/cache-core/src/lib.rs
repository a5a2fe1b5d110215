//! Core engine for graph-cache: normalization, execution, diffing,
//! optimistic layering and watch broadcasting over a flat entity store.
#![warn(unreachable_pub)]

pub mod config;
pub mod diff;
pub mod document;
pub mod error;
pub mod key;
pub mod matcher;
pub mod obs;
pub mod optimistic;
pub mod query_key;
pub mod read;
pub mod store;
pub mod value;
pub mod watch;
pub mod write;

///
/// Prelude
///
/// Contains only domain vocabulary: the types callers build requests with.
/// No errors, executors or store internals are re-exported here.
///
pub mod prelude {
    pub use crate::{
        config::{CacheConfig, MatcherMode},
        document::Variables,
        matcher::FragmentMatcher,
        value::{
            EntityId, EntityRecord, Reference, StorageKey, Value, ROOT_MUTATION, ROOT_QUERY,
            TYPENAME_KEY,
        },
    };
}
