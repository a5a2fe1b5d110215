//! Facade error surface: re-exports `cache-core`'s taxonomy directly.
//!
//! Unlike a multi-crate runtime with its own wire-facing error shape,
//! this facade has no translation to do — the engine's [`CacheError`]
//! already is the stable, caller-facing error type.

pub use cache_core::error::{CacheError as Error, ErrorKind, ErrorOrigin, Result};
