//! Store Reader / Executor (C6, spec.md §4.6): walks `(document,
//! variables)` against the entity store, following references, applying
//! resolvers, memoizing per `(selection-set, entity)` pair.

use crate::document::{self, Doc, Variables};
use crate::error::CacheError;
use crate::key;
use crate::matcher::FragmentMatcher;
use crate::query_key::QueryKeyMaker;
use crate::store::{DepTracker, EntityStore, MemoKey};
use crate::value::{EntityId, Value, TYPENAME_KEY};
use graphql_parser::query::{Field, Selection, SelectionSet};
use std::collections::{hash_map::DefaultHasher, HashMap};
use std::hash::{Hash, Hasher};

/// A field resolver: `(parent, args, context) -> value-or-reference`,
/// used for read-time redirection and client-only fields (spec.md §6).
pub type FieldResolver<'a> =
    dyn Fn(&serde_json::Value, &serde_json::Map<String, serde_json::Value>) -> Option<Value> + 'a;

/// `parentTypeTag -> fieldName -> resolver`.
pub type FieldResolverMap<'a> = HashMap<(String, String), Box<FieldResolver<'a>>>;

/// Options for [`read`], mirroring spec.md §4.6's entry point.
pub struct ReadOptions<'d, 'a, 'c> {
    pub document: &'d Doc<'a>,
    pub variables: Variables,
    pub root_id: EntityId,
    pub operation_name: Option<&'d str>,
    pub matcher: &'c FragmentMatcher,
    pub field_resolvers: Option<&'d FieldResolverMap<'d>>,
    pub return_partial: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MissingField {
    pub entity_id: EntityId,
    pub field: String,
}

/// Outcome of a read: the projected tree plus a completeness flag
/// (spec.md §4.6, §8).
#[derive(Debug, Clone)]
pub struct ReadOutcome {
    pub data: serde_json::Value,
    pub complete: bool,
    pub missing: Vec<MissingField>,
}

/// Per-call memoization cache: `(selection-set, entity, variables+matcher
/// +resolvers identity) -> previously computed subtree`. Lives across
/// calls on a [`crate::read::ReadEngine`] so referential equality holds
/// between successive reads (spec.md §4.6 step 5, S5).
#[derive(Debug, Default)]
pub struct MemoCache {
    entries: HashMap<MemoKey, serde_json::Value>,
}

impl MemoCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evict(&mut self, key: &MemoKey) {
        self.entries.remove(key);
    }

    pub fn evict_many(&mut self, keys: &[MemoKey]) {
        for key in keys {
            self.entries.remove(key);
        }
    }
}

///
/// ReadEngine
/// Owns the query-key intern table and the per-call memo cache, so
/// repeated reads of structurally equal documents share memoization
/// (spec.md §4.4, §4.6).
///

#[derive(Debug, Default)]
pub struct ReadEngine {
    pub query_keys: QueryKeyMaker,
    pub memo: MemoCache,
}

impl ReadEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(
        &mut self,
        opts: ReadOptions<'_, '_, '_>,
        store: &dyn EntityStore,
        deps: Option<&mut DepTracker>,
    ) -> Result<ReadOutcome, CacheError> {
        let operation = document::locate_operation(opts.document, opts.operation_name)?;
        let defaults = document::variable_defaults(operation);
        let selection_set = document::operation_selection_set(operation);
        let fragments = document::fragments_by_name(opts.document);

        self.run_read(
            selection_set,
            &opts.root_id,
            &opts.variables,
            &defaults,
            &fragments,
            opts.matcher,
            opts.field_resolvers,
            opts.return_partial,
            store,
            deps,
        )
    }

    /// Same walk as [`ReadEngine::read`], rooted at a named fragment's
    /// selection set instead of an operation (spec.md §6, mirroring
    /// [`crate::write::write_fragment`]'s approach of reusing the
    /// fragment's existing selection set rather than synthesizing a
    /// wrapper operation).
    #[allow(clippy::too_many_arguments)]
    pub fn read_fragment(
        &mut self,
        opts: ReadFragmentOptions<'_, '_, '_>,
        store: &dyn EntityStore,
        deps: Option<&mut DepTracker>,
    ) -> Result<ReadOutcome, CacheError> {
        let fragments = document::fragments_by_name(opts.document);
        let frag = fragments
            .get(opts.fragment_name)
            .ok_or_else(|| CacheError::missing_fragment(opts.fragment_name))?;
        let defaults = Variables::new();

        self.run_read(
            &frag.selection_set,
            &opts.root_id,
            &opts.variables,
            &defaults,
            &fragments,
            opts.matcher,
            opts.field_resolvers,
            opts.return_partial,
            store,
            deps,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn run_read<'d, 'a, 'c>(
        &mut self,
        selection_set: &SelectionSet<'_, String>,
        root_id: &EntityId,
        variables: &'c Variables,
        defaults: &'c Variables,
        fragments: &'c HashMap<&'d str, &'d graphql_parser::query::FragmentDefinition<'a, String>>,
        matcher: &'c FragmentMatcher,
        field_resolvers: Option<&'c FieldResolverMap<'c>>,
        return_partial: bool,
        store: &'c dyn EntityStore,
        deps: Option<&'c mut DepTracker>,
    ) -> Result<ReadOutcome, CacheError> {
        let variables_hash = hash_variables(variables);
        // A resolver map is identified by its address, not its contents: two
        // calls can pass different maps that happen to be value-equal and
        // still must not collide (spec.md §4.6 step 5 names resolver
        // identity, not resolver value, as part of the composite key).
        let resolvers_identity: u64 = field_resolvers.map_or(0, |r| {
            std::ptr::from_ref::<FieldResolverMap<'_>>(r) as u64
        });

        let mut hasher = DefaultHasher::new();
        variables_hash.hash(&mut hasher);
        resolvers_identity.hash(&mut hasher);
        let variables_identity = hasher.finish();

        let mut ctx = ReadCtx {
            variables,
            defaults,
            fragments,
            matcher,
            field_resolvers,
            return_partial,
            store,
            query_keys: &mut self.query_keys,
            memo: &mut self.memo,
            deps,
            variables_identity,
            ancestors: Vec::new(),
            missing: Vec::new(),
        };

        let data = ctx.read_selection_set(selection_set, root_id)?;
        let complete = ctx.missing.is_empty();
        let missing = ctx.missing;

        Ok(ReadOutcome { data, complete, missing })
    }
}

/// Options for [`ReadEngine::read_fragment`]: same shape as
/// [`ReadOptions`] but rooted at a named fragment.
pub struct ReadFragmentOptions<'d, 'a, 'c> {
    pub document: &'d Doc<'a>,
    pub fragment_name: &'d str,
    pub variables: Variables,
    pub root_id: EntityId,
    pub matcher: &'c FragmentMatcher,
    pub field_resolvers: Option<&'d FieldResolverMap<'d>>,
    pub return_partial: bool,
}

fn hash_variables(variables: &Variables) -> u64 {
    let mut entries: Vec<(&String, String)> = variables
        .iter()
        .map(|(k, v)| (k, v.to_string()))
        .collect();
    entries.sort();
    let mut hasher = DefaultHasher::new();
    entries.hash(&mut hasher);
    hasher.finish()
}

struct ReadCtx<'d, 'a, 'c> {
    variables: &'c Variables,
    defaults: &'c Variables,
    fragments: &'c HashMap<&'d str, &'d graphql_parser::query::FragmentDefinition<'a, String>>,
    matcher: &'c FragmentMatcher,
    field_resolvers: Option<&'c FieldResolverMap<'c>>,
    return_partial: bool,
    store: &'c dyn EntityStore,
    query_keys: &'c mut QueryKeyMaker,
    memo: &'c mut MemoCache,
    deps: Option<&'c mut DepTracker>,
    variables_identity: u64,
    /// `(entity, selection-set)` pairs on the active recursion path, for
    /// cycle detection (spec.md §4.6 step 4).
    ancestors: Vec<(EntityId, u64)>,
    missing: Vec<MissingField>,
}

impl<'d, 'a, 'c> ReadCtx<'d, 'a, 'c> {
    fn read_selection_set(
        &mut self,
        set: &SelectionSet<'_, String>,
        entity_id: &EntityId,
    ) -> Result<serde_json::Value, CacheError> {
        let query_key = self.query_keys.key_for(set).as_u64();

        if self.ancestors.iter().any(|(id, qk)| id == entity_id && *qk == query_key) {
            // Cycle: cut recursion, return an empty partial subtree rather
            // than produce a structure containing a cycle.
            return Ok(serde_json::Value::Object(serde_json::Map::new()));
        }

        let memo_key: MemoKey = (query_key, entity_id.clone(), self.variables_identity);
        if let Some(cached) = self.memo.entries.get(&memo_key) {
            return Ok(cached.clone());
        }

        self.ancestors.push((entity_id.clone(), query_key));
        let record = self.store.get(entity_id);
        self.note_dependency(&memo_key, entity_id);
        let type_tag = record.and_then(|r| r.get(TYPENAME_KEY)).and_then(Self::scalar_str);

        let mut out = serde_json::Map::new();
        for selection in &set.items {
            self.read_selection(selection, entity_id, record, type_tag.as_deref(), &mut out, &memo_key)?;
        }
        self.ancestors.pop();

        let value = serde_json::Value::Object(out);
        if let Some(deps) = self.deps.as_deref_mut() {
            deps.clear_memo(&memo_key);
        }
        self.memo.entries.insert(memo_key, value.clone());
        Ok(value)
    }

    fn note_dependency(&mut self, memo_key: &MemoKey, entity_id: &str) {
        if let Some(deps) = self.deps.as_deref_mut() {
            deps.record(memo_key.clone(), entity_id);
        }
    }

    fn scalar_str(value: &Value) -> Option<String> {
        match value {
            Value::Scalar(serde_json::Value::String(s)) => Some(s.clone()),
            _ => None,
        }
    }

    fn read_selection(
        &mut self,
        selection: &Selection<'_, String>,
        entity_id: &EntityId,
        record: Option<&crate::value::EntityRecord>,
        type_tag: Option<&str>,
        out: &mut serde_json::Map<String, serde_json::Value>,
        memo_key: &MemoKey,
    ) -> Result<(), CacheError> {
        match selection {
            Selection::Field(field) => self.read_field(field, entity_id, record, type_tag, out, memo_key),
            Selection::FragmentSpread(spread) => {
                let Some(frag) = self.fragments.get(spread.fragment_name.as_str()) else {
                    return Err(CacheError::missing_fragment(&spread.fragment_name));
                };
                let graphql_parser::query::TypeCondition::On(condition) = &frag.type_condition;
                if self.matcher.matches(type_tag, condition)? {
                    let frag_set = frag.selection_set.clone();
                    for inner in &frag_set.items {
                        self.read_selection(inner, entity_id, record, type_tag, out, memo_key)?;
                    }
                }
                Ok(())
            }
            Selection::InlineFragment(inline) => {
                let matched = match &inline.type_condition {
                    None => true,
                    Some(graphql_parser::query::TypeCondition::On(condition)) => {
                        self.matcher.matches(type_tag, condition)?
                    }
                };
                if matched {
                    for inner in &inline.selection_set.items {
                        self.read_selection(inner, entity_id, record, type_tag, out, memo_key)?;
                    }
                }
                Ok(())
            }
        }
    }

    fn read_field(
        &mut self,
        field: &Field<'_, String>,
        entity_id: &EntityId,
        record: Option<&crate::value::EntityRecord>,
        type_tag: Option<&str>,
        out: &mut serde_json::Map<String, serde_json::Value>,
        memo_key: &MemoKey,
    ) -> Result<(), CacheError> {
        if !document::should_include(&field.directives, self.variables, self.defaults) {
            return Ok(());
        }

        let response_key = field.alias.clone().unwrap_or_else(|| field.name.clone());
        let storage_key = key::encode_field_key(field, self.variables, self.defaults, None);

        if let Some(resolvers) = self.field_resolvers {
            let lookup_tag = type_tag.unwrap_or_default().to_string();
            if let Some(resolver) = resolvers.get(&(lookup_tag, field.name.clone())) {
                let args = substitute_args(&field.arguments, self.variables, self.defaults);
                let parent_json = record.map_or(serde_json::Value::Null, Self::record_to_json);
                if let Some(value) = resolver(&parent_json, &args) {
                    let projected = self.project_value(&value, &field.selection_set, memo_key)?;
                    out.insert(response_key, projected);
                    return Ok(());
                }
            }
        }

        let Some(field_value) = record.and_then(|r| r.get(&storage_key)) else {
            self.record_missing(entity_id, &storage_key);
            if !self.return_partial {
                return Err(CacheError::missing_field(entity_id, &storage_key));
            }
            return Ok(());
        };

        let projected = self.project_value(field_value, &field.selection_set, memo_key)?;
        out.insert(response_key, projected);
        Ok(())
    }

    fn record_missing(&mut self, entity_id: &str, field: &str) {
        self.missing.push(MissingField {
            entity_id: entity_id.to_string(),
            field: field.to_string(),
        });
    }

    fn record_to_json(record: &crate::value::EntityRecord) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (k, v) in record {
            map.insert(k.clone(), v.to_wire());
        }
        serde_json::Value::Object(map)
    }

    /// Project a stored [`Value`] through a sub-selection, following
    /// references and recursing; readers never return live references
    /// into the store (spec.md §4.6 step 2, "Embedded JSON").
    fn project_value(
        &mut self,
        value: &Value,
        sub_selection: &SelectionSet<'_, String>,
        memo_key: &MemoKey,
    ) -> Result<serde_json::Value, CacheError> {
        match value {
            Value::Scalar(v) => Ok(v.clone()),
            Value::EmbeddedJson(v) => Ok(v.clone()),
            Value::Reference(reference) => {
                if self.store.get(&reference.id).is_none() && !self.store.is_tombstoned(&reference.id) {
                    self.record_missing(&reference.id, "<entity>");
                    if !self.return_partial {
                        return Err(CacheError::new(
                            crate::error::ErrorKind::DanglingReference,
                            crate::error::ErrorOrigin::Read,
                            format!("reference to absent entity '{}'", reference.id),
                        ));
                    }
                    return Ok(serde_json::Value::Null);
                }
                if let Some(deps) = self.deps.as_deref_mut() {
                    deps.record(memo_key.clone(), &reference.id);
                }
                self.read_selection_set(sub_selection, &reference.id)
            }
            Value::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    if item.is_null() {
                        out.push(serde_json::Value::Null);
                    } else {
                        out.push(self.project_value(item, sub_selection, memo_key)?);
                    }
                }
                Ok(serde_json::Value::Array(out))
            }
        }
    }

}

fn substitute_args(
    arguments: &[(String, graphql_parser::query::Value<'_, String>)],
    variables: &Variables,
    defaults: &Variables,
) -> serde_json::Map<String, serde_json::Value> {
    arguments
        .iter()
        .map(|(name, value)| (name.clone(), document::substitute(value, variables, defaults)))
        .collect()
}
