//! Request option structs for [`crate::Cache`]'s public entry points.
//!
//! These wrap `cache-core`'s bare option structs with the defaults
//! SPEC_FULL.md §6 expects a facade to supply (`rootID = ROOT_QUERY`,
//! `matcher`/`strict`/`validate` sourced from the cache's own config)
//! so callers only spell out what differs from the default.

use cache_core::document::{Doc, Variables};
use cache_core::key::ConnectionFilter;
use cache_core::read::FieldResolverMap;
use cache_core::value::{EntityId, ROOT_QUERY};
use cache_core::write::IdExtractor;

/// Options for [`crate::Cache::write`] / [`crate::Cache::write_query`].
pub struct WriteRequest<'a> {
    pub(crate) document: &'a Doc<'a>,
    pub(crate) variables: Variables,
    pub(crate) result: serde_json::Value,
    pub(crate) root_id: EntityId,
    pub(crate) operation_name: Option<&'a str>,
    pub(crate) id_extractor: Option<&'a IdExtractor<'a>>,
    pub(crate) connection_filter: Option<&'a ConnectionFilter<'a>>,
}

impl<'a> WriteRequest<'a> {
    #[must_use]
    pub fn new(document: &'a Doc<'a>, variables: Variables, result: serde_json::Value) -> Self {
        Self {
            document,
            variables,
            result,
            root_id: ROOT_QUERY.to_string(),
            operation_name: None,
            id_extractor: None,
            connection_filter: None,
        }
    }

    #[must_use]
    pub fn root_id(mut self, root_id: impl Into<EntityId>) -> Self {
        self.root_id = root_id.into();
        self
    }

    #[must_use]
    pub const fn operation_name(mut self, name: &'a str) -> Self {
        self.operation_name = Some(name);
        self
    }

    #[must_use]
    pub const fn id_extractor(mut self, extractor: &'a IdExtractor<'a>) -> Self {
        self.id_extractor = Some(extractor);
        self
    }

    #[must_use]
    pub const fn connection_filter(mut self, filter: &'a ConnectionFilter<'a>) -> Self {
        self.connection_filter = Some(filter);
        self
    }
}

/// Options for [`crate::Cache::write_fragment`].
pub struct WriteFragmentRequest<'a> {
    pub(crate) document: &'a Doc<'a>,
    pub(crate) fragment_name: &'a str,
    pub(crate) variables: Variables,
    pub(crate) result: serde_json::Value,
    pub(crate) root_id: EntityId,
    pub(crate) id_extractor: Option<&'a IdExtractor<'a>>,
    pub(crate) connection_filter: Option<&'a ConnectionFilter<'a>>,
}

impl<'a> WriteFragmentRequest<'a> {
    #[must_use]
    pub fn new(
        document: &'a Doc<'a>,
        fragment_name: &'a str,
        variables: Variables,
        result: serde_json::Value,
        root_id: impl Into<EntityId>,
    ) -> Self {
        Self {
            document,
            fragment_name,
            variables,
            result,
            root_id: root_id.into(),
            id_extractor: None,
            connection_filter: None,
        }
    }

    #[must_use]
    pub const fn id_extractor(mut self, extractor: &'a IdExtractor<'a>) -> Self {
        self.id_extractor = Some(extractor);
        self
    }

    #[must_use]
    pub const fn connection_filter(mut self, filter: &'a ConnectionFilter<'a>) -> Self {
        self.connection_filter = Some(filter);
        self
    }
}

/// Options for [`crate::Cache::read`] / [`crate::Cache::read_query`].
pub struct ReadRequest<'a> {
    pub(crate) document: &'a Doc<'a>,
    pub(crate) variables: Variables,
    pub(crate) root_id: EntityId,
    pub(crate) operation_name: Option<&'a str>,
    pub(crate) optimistic: bool,
    pub(crate) field_resolvers: Option<&'a FieldResolverMap<'a>>,
    pub(crate) return_partial: Option<bool>,
}

impl<'a> ReadRequest<'a> {
    #[must_use]
    pub fn new(document: &'a Doc<'a>, variables: Variables) -> Self {
        Self {
            document,
            variables,
            root_id: ROOT_QUERY.to_string(),
            operation_name: None,
            optimistic: false,
            field_resolvers: None,
            return_partial: None,
        }
    }

    #[must_use]
    pub fn root_id(mut self, root_id: impl Into<EntityId>) -> Self {
        self.root_id = root_id.into();
        self
    }

    #[must_use]
    pub const fn operation_name(mut self, name: &'a str) -> Self {
        self.operation_name = Some(name);
        self
    }

    #[must_use]
    pub const fn optimistic(mut self, optimistic: bool) -> Self {
        self.optimistic = optimistic;
        self
    }

    #[must_use]
    pub const fn field_resolvers(mut self, resolvers: &'a FieldResolverMap<'a>) -> Self {
        self.field_resolvers = Some(resolvers);
        self
    }

    #[must_use]
    pub const fn return_partial(mut self, value: bool) -> Self {
        self.return_partial = Some(value);
        self
    }
}

/// Options for [`crate::Cache::read_fragment`].
pub struct ReadFragmentRequest<'a> {
    pub(crate) document: &'a Doc<'a>,
    pub(crate) fragment_name: &'a str,
    pub(crate) variables: Variables,
    pub(crate) root_id: EntityId,
    pub(crate) optimistic: bool,
    pub(crate) field_resolvers: Option<&'a FieldResolverMap<'a>>,
    pub(crate) return_partial: Option<bool>,
}

impl<'a> ReadFragmentRequest<'a> {
    #[must_use]
    pub fn new(
        document: &'a Doc<'a>,
        fragment_name: &'a str,
        variables: Variables,
        root_id: impl Into<EntityId>,
    ) -> Self {
        Self {
            document,
            fragment_name,
            variables,
            root_id: root_id.into(),
            optimistic: false,
            field_resolvers: None,
            return_partial: None,
        }
    }

    #[must_use]
    pub const fn optimistic(mut self, optimistic: bool) -> Self {
        self.optimistic = optimistic;
        self
    }

    #[must_use]
    pub const fn return_partial(mut self, value: bool) -> Self {
        self.return_partial = Some(value);
        self
    }
}

/// Options for [`crate::Cache::watch`].
pub struct WatchRequest<'a> {
    pub(crate) document: &'a Doc<'a>,
    pub(crate) variables: Variables,
    pub(crate) root_id: EntityId,
    pub(crate) operation_name: Option<&'a str>,
    pub(crate) optimistic: bool,
    pub(crate) callback: Box<dyn FnMut(&cache_core::diff::SharedValue)>,
}

impl<'a> WatchRequest<'a> {
    #[must_use]
    pub fn new(
        document: &'a Doc<'a>,
        variables: Variables,
        callback: impl FnMut(&cache_core::diff::SharedValue) + 'static,
    ) -> Self {
        Self {
            document,
            variables,
            root_id: ROOT_QUERY.to_string(),
            operation_name: None,
            optimistic: false,
            callback: Box::new(callback),
        }
    }

    #[must_use]
    pub fn root_id(mut self, root_id: impl Into<EntityId>) -> Self {
        self.root_id = root_id.into();
        self
    }

    #[must_use]
    pub const fn operation_name(mut self, name: &'a str) -> Self {
        self.operation_name = Some(name);
        self
    }

    #[must_use]
    pub const fn optimistic(mut self, optimistic: bool) -> Self {
        self.optimistic = optimistic;
        self
    }
}
