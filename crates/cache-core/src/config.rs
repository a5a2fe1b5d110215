//! Cache-wide configuration: fragment matcher mode and read/write policy
//! defaults (SPEC_FULL.md §1, "Config surface").

use std::collections::HashMap;

/// `typeCondition -> set of concrete type tags` seed for the explicit
/// fragment matcher (C3).
pub type PossibleTypesTable = HashMap<String, Vec<String>>;

///
/// MatcherMode
/// Selects between the two C3 strategies.
///

#[derive(Clone, Debug)]
pub enum MatcherMode {
    /// Shape-based: a missing/unknown type tag still matches (§9 Open
    /// Questions — "best effort" means "match succeeds"), optionally
    /// warning once per matcher instance.
    Heuristic { warn_once: bool },
    /// Explicit strategy, seeded with a `typeCondition -> possible types`
    /// table once it has loaded; `None` while a caller has selected this
    /// strategy but the table (typically fetched from a schema
    /// introspection step) has not arrived yet, a state the matcher must
    /// reject rather than guess at (spec.md §7, "Fragment matcher not
    /// ready").
    Explicit(Option<PossibleTypesTable>),
}

impl Default for MatcherMode {
    fn default() -> Self {
        Self::Heuristic { warn_once: true }
    }
}

///
/// CacheConfig
/// Constructed via [`CacheConfig::builder`]; every field has a spec-derived
/// default so `CacheConfig::default()` alone is a valid configuration.
///

#[derive(Clone, Debug, Default)]
pub struct CacheConfig {
    pub matcher_mode: MatcherMode,
    /// Default for `read`'s `returnPartial` when the caller omits it.
    pub return_partial_default: bool,
    /// When false, a `SchemaShapeMismatch` on write is fatal instead of
    /// a logged warning (spec.md §7).
    pub strict_writes: bool,
    /// Run the missing-field write-time diagnostic (spec.md §4.5 step 5).
    pub validate_on_write: bool,
}

impl CacheConfig {
    #[must_use]
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }
}

///
/// CacheConfigBuilder
///

#[derive(Default)]
pub struct CacheConfigBuilder {
    config: CacheConfig,
}

impl CacheConfigBuilder {
    #[must_use]
    pub fn matcher_mode(mut self, mode: MatcherMode) -> Self {
        self.config.matcher_mode = mode;
        self
    }

    #[must_use]
    pub const fn return_partial_default(mut self, value: bool) -> Self {
        self.config.return_partial_default = value;
        self
    }

    #[must_use]
    pub const fn strict_writes(mut self, value: bool) -> Self {
        self.config.strict_writes = value;
        self
    }

    #[must_use]
    pub const fn validate_on_write(mut self, value: bool) -> Self {
        self.config.validate_on_write = value;
        self
    }

    #[must_use]
    pub fn build(self) -> CacheConfig {
        self.config
    }
}
