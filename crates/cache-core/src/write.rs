//! Normalization Writer (C5, spec.md §4.5): walks `(document, variables,
//! result)` and emits writes to the entity store, assigning IDs via a
//! caller-supplied extractor or synthesizing path-based IDs.

use crate::document::{self, Doc, Variables};
use crate::error::CacheError;
use crate::key;
use crate::matcher::FragmentMatcher;
use crate::store::EntityStore;
use crate::value::{EntityId, EntityRecord, Reference, Value, TYPENAME_KEY};
use graphql_parser::query::{Field, Selection, SelectionSet};
use std::collections::HashMap;

/// `object -> string | number | 0 | null | undefined`. Returning `None`
/// means "no stable ID"; `0`, `""` and `false`-ish JSON scalars are
/// handled by the caller stringifying them before returning `Stable`
/// (spec.md §6, "ID extractor").
pub enum IdExtract {
    Stable(EntityId),
    None,
}

pub type IdExtractor<'a> = dyn Fn(&serde_json::Value) -> IdExtract + 'a;

/// Options for [`write`], mirroring spec.md §4.5's entry point.
pub struct WriteOptions<'a, 'c> {
    pub document: &'a Doc<'a>,
    pub variables: Variables,
    pub result: serde_json::Value,
    pub root_id: EntityId,
    pub operation_name: Option<&'a str>,
    pub id_extractor: Option<&'a IdExtractor<'a>>,
    pub matcher: &'c FragmentMatcher,
    pub validate: bool,
    pub strict: bool,
    pub connection_filter: Option<&'a key::ConnectionFilter<'a>>,
}

/// One write pass's outcome: the IDs that were touched, for the caller
/// to forward to the dependency tracker and watch broadcaster, plus any
/// non-fatal missing-field diagnostics collected when `validate` is set.
#[derive(Debug, Default)]
pub struct WriteOutcome {
    pub touched_ids: Vec<EntityId>,
    pub diagnostics: Vec<String>,
}

/// Stage writes into a scratch map and commit atomically at the end, so a
/// raised error rolls back in-progress field merges for this call
/// (spec.md §7, "Recovery policy").
struct Scratch {
    pending: HashMap<EntityId, EntityRecord>,
}

impl Scratch {
    fn new() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }

    fn merge_field(&mut self, store: &dyn EntityStore, entity_id: &str, field_key: &str, value: Value) {
        let record = self.pending.entry(entity_id.to_string()).or_insert_with(|| {
            store.get(entity_id).cloned().unwrap_or_default()
        });
        record.insert(field_key.to_string(), value);
    }
}

pub fn write(opts: WriteOptions<'_, '_>, store: &mut dyn EntityStore) -> Result<WriteOutcome, CacheError> {
    let operation = document::locate_operation(opts.document, opts.operation_name)?;
    let defaults = document::variable_defaults(operation);
    let selection_set = document::operation_selection_set(operation);
    let fragments = document::fragments_by_name(opts.document);

    run_write(
        selection_set,
        &opts.root_id,
        &opts.result,
        &opts.variables,
        &defaults,
        &fragments,
        opts.matcher,
        opts.id_extractor,
        opts.validate,
        opts.strict,
        opts.connection_filter,
        store,
    )
}

/// Options for [`write_fragment`]: same shape as [`WriteOptions`] but
/// rooted at a named fragment's selection set instead of an operation
/// (spec.md §6, "the fragment-oriented variants wrap the document with a
/// synthetic operation whose root is the named fragment's selection set").
pub struct WriteFragmentOptions<'a, 'c> {
    pub document: &'a Doc<'a>,
    pub fragment_name: &'a str,
    pub variables: Variables,
    pub result: serde_json::Value,
    pub root_id: EntityId,
    pub id_extractor: Option<&'a IdExtractor<'a>>,
    pub matcher: &'c FragmentMatcher,
    pub validate: bool,
    pub strict: bool,
    pub connection_filter: Option<&'a key::ConnectionFilter<'a>>,
}

pub fn write_fragment(
    opts: WriteFragmentOptions<'_, '_>,
    store: &mut dyn EntityStore,
) -> Result<WriteOutcome, CacheError> {
    let fragments = document::fragments_by_name(opts.document);
    let frag = fragments
        .get(opts.fragment_name)
        .ok_or_else(|| CacheError::missing_fragment(opts.fragment_name))?;
    let defaults = Variables::new();

    run_write(
        &frag.selection_set,
        &opts.root_id,
        &opts.result,
        &opts.variables,
        &defaults,
        &fragments,
        opts.matcher,
        opts.id_extractor,
        opts.validate,
        opts.strict,
        opts.connection_filter,
        store,
    )
}

#[allow(clippy::too_many_arguments)]
fn run_write<'doc, 'c>(
    selection_set: &SelectionSet<'_, String>,
    root_id: &EntityId,
    result: &serde_json::Value,
    variables: &'c Variables,
    defaults: &'c Variables,
    fragments: &'c HashMap<&'doc str, &'doc graphql_parser::query::FragmentDefinition<'doc, String>>,
    matcher: &'c FragmentMatcher,
    id_extractor: Option<&'c IdExtractor<'c>>,
    validate: bool,
    strict: bool,
    connection_filter: Option<&'c key::ConnectionFilter<'c>>,
    store: &mut dyn EntityStore,
) -> Result<WriteOutcome, CacheError> {
    let mut scratch = Scratch::new();
    let mut outcome = WriteOutcome::default();

    let mut ctx = WriteCtx {
        variables,
        defaults,
        fragments,
        matcher,
        id_extractor,
        validate,
        strict,
        connection_filter,
        store: &*store,
        scratch: &mut scratch,
        outcome: &mut outcome,
    };

    ctx.write_selection_set(selection_set, root_id, result)?;
    drop(ctx);

    for (id, record) in scratch.pending {
        outcome.touched_ids.push(id.clone());
        store.set(id, record);
    }

    Ok(outcome)
}

struct WriteCtx<'doc, 'c> {
    variables: &'c Variables,
    defaults: &'c Variables,
    fragments: &'c HashMap<&'doc str, &'doc graphql_parser::query::FragmentDefinition<'doc, String>>,
    matcher: &'c FragmentMatcher,
    id_extractor: Option<&'c IdExtractor<'c>>,
    validate: bool,
    strict: bool,
    connection_filter: Option<&'c key::ConnectionFilter<'c>>,
    store: &'c dyn EntityStore,
    scratch: &'c mut Scratch,
    outcome: &'c mut WriteOutcome,
}

impl<'doc, 'c> WriteCtx<'doc, 'c> {
    /// Recursively walk a selection set paired with its result subtree,
    /// writing into `entity_id`'s record (spec.md §4.5 step 3).
    fn write_selection_set(
        &mut self,
        set: &SelectionSet<'_, String>,
        entity_id: &EntityId,
        result: &serde_json::Value,
    ) -> Result<(), CacheError> {
        let result_obj = result.as_object();

        for selection in &set.items {
            match selection {
                Selection::Field(field) => self.write_field(field, entity_id, result_obj)?,
                Selection::FragmentSpread(spread) => {
                    let Some(frag) = self.fragments.get(spread.fragment_name.as_str()) else {
                        return Err(CacheError::missing_fragment(&spread.fragment_name));
                    };
                    let graphql_parser::query::TypeCondition::On(condition) = &frag.type_condition;
                    let type_tag = result_obj.and_then(|o| o.get(TYPENAME_KEY)).and_then(|v| v.as_str());
                    if self.matcher.matches(type_tag, condition)? {
                        self.write_selection_set(&frag.selection_set, entity_id, result)?;
                    }
                }
                Selection::InlineFragment(inline) => {
                    let matched = match &inline.type_condition {
                        None => true,
                        Some(graphql_parser::query::TypeCondition::On(condition)) => {
                            let type_tag =
                                result_obj.and_then(|o| o.get(TYPENAME_KEY)).and_then(|v| v.as_str());
                            self.matcher.matches(type_tag, condition)?
                        }
                    };
                    if matched {
                        self.write_selection_set(&inline.selection_set, entity_id, result)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn write_field(
        &mut self,
        field: &Field<'_, String>,
        entity_id: &EntityId,
        result_obj: Option<&serde_json::Map<String, serde_json::Value>>,
    ) -> Result<(), CacheError> {
        if !document::should_include(&field.directives, self.variables, self.defaults) {
            return Ok(());
        }

        let storage_key = key::encode_field_key(field, self.variables, self.defaults, self.connection_filter);
        let response_key = field.alias.clone().unwrap_or_else(|| field.name.clone());
        let field_result = result_obj.and_then(|o| o.get(&response_key));

        let Some(field_result) = field_result else {
            if self.validate {
                self.outcome
                    .diagnostics
                    .push(format!("{entity_id}.{response_key} missing from write result"));
            }
            return Ok(());
        };

        let has_sub_selection = !field.selection_set.items.is_empty();

        if !has_sub_selection {
            let value = if field_result.is_array() {
                Value::EmbeddedJson(field_result.clone())
            } else {
                Value::Scalar(field_result.clone())
            };
            self.scratch.merge_field(self.store, entity_id, &storage_key, value);
            return Ok(());
        }

        if field_result.is_null() {
            self.scratch.merge_field(self.store, entity_id, &storage_key, Value::null());
            return Ok(());
        }

        if let Some(list) = field_result.as_array() {
            let mut items = Vec::with_capacity(list.len());
            for (index, element) in list.iter().enumerate() {
                items.push(self.write_list_element(field, entity_id, &storage_key, index, element)?);
            }
            self.scratch.merge_field(self.store, entity_id, &storage_key, Value::List(items));
            return Ok(());
        }

        if field_result.is_object() {
            let child_id = self.resolve_child_id(field_result, entity_id, &storage_key, None);
            let synthetic = matches!(&child_id, ChildId::Synthetic(_));
            let id = child_id.into_id();
            let type_tag = field_result.get(TYPENAME_KEY).and_then(|v| v.as_str()).map(ToString::to_string);

            if synthetic {
                self.check_reference_overwrite(entity_id, &storage_key, type_tag.as_deref())?;
            }

            self.scratch.merge_field(
                self.store,
                entity_id,
                &storage_key,
                Value::Reference(Reference::new(id.clone(), synthetic, type_tag)),
            );
            self.write_selection_set(&field.selection_set, &id, field_result)?;
            return Ok(());
        }

        // Schema-shape mismatch: selection expects a sub-selectable type
        // but the result is a bare scalar.
        let message = format!("{entity_id}.{storage_key} expected an object or list, got a scalar");
        if self.strict {
            return Err(CacheError::schema_shape_mismatch(message));
        }
        tracing::warn!(%message, "schema shape mismatch (non-strict)");
        self.scratch
            .merge_field(self.store, entity_id, &storage_key, Value::Scalar(field_result.clone()));
        Ok(())
    }

    fn write_list_element(
        &mut self,
        field: &Field<'_, String>,
        parent_id: &EntityId,
        storage_key: &str,
        index: usize,
        element: &serde_json::Value,
    ) -> Result<Value, CacheError> {
        if element.is_null() {
            return Ok(Value::null());
        }
        let child_id = self.resolve_child_id(element, parent_id, storage_key, Some(index));
        let synthetic = matches!(&child_id, ChildId::Synthetic(_));
        let id = child_id.into_id();
        let type_tag = element.get(TYPENAME_KEY).and_then(|v| v.as_str()).map(ToString::to_string);

        self.write_selection_set(&field.selection_set, &id, element)?;
        Ok(Value::Reference(Reference::new(id, synthetic, type_tag)))
    }

    /// Compute a child object's ID via the caller's extractor, falling
    /// back to a synthetic `<parentID>.<storageKey>[.<index>]` path
    /// (spec.md §4.5 step 3, "If `f`'s value is an object/list").
    fn resolve_child_id(
        &self,
        object: &serde_json::Value,
        parent_id: &str,
        storage_key: &str,
        index: Option<usize>,
    ) -> ChildId {
        if let Some(extractor) = self.id_extractor {
            if let IdExtract::Stable(id) = extractor(object) {
                return ChildId::Stable(id);
            }
        }
        let path = index.map_or_else(
            || format!("{parent_id}.{storage_key}"),
            |i| format!("{parent_id}.{storage_key}.{i}"),
        );
        ChildId::Synthetic(path)
    }

    /// Spec.md §3 invariant / §4.5 "Tie-breaks": a field previously
    /// written with a stable ID-bearing reference must not later be
    /// overwritten at the same storage key with an ID-less object of the
    /// *same* declared type — that is an error (strict) or a warning
    /// (non-strict, spec.md §7). A *different* declared type is allowed;
    /// the prior reference is clobbered and its target entity orphaned
    /// (§9 Open Questions, resolved: both orphaning paths are allowed).
    fn check_reference_overwrite(
        &self,
        entity_id: &str,
        storage_key: &str,
        incoming_type_tag: Option<&str>,
    ) -> Result<(), CacheError> {
        let existing = self
            .scratch
            .pending
            .get(entity_id)
            .and_then(|r| r.get(storage_key))
            .or_else(|| self.store.get(entity_id).and_then(|r| r.get(storage_key)));

        let Some(Value::Reference(existing_ref)) = existing else {
            return Ok(());
        };
        if existing_ref.synthetic {
            return Ok(());
        }
        if existing_ref.type_tag.as_deref() != incoming_type_tag {
            return Ok(());
        }

        let message = format!(
            "{entity_id}.{storage_key} previously held a stable reference to '{}'; \
             overwriting with an ID-less object of the same declared type is not allowed",
            existing_ref.id
        );
        if self.strict {
            return Err(CacheError::schema_shape_mismatch(message));
        }
        tracing::warn!(%message, "schema shape mismatch (non-strict)");
        Ok(())
    }
}

enum ChildId {
    Stable(EntityId),
    Synthetic(EntityId),
}

impl ChildId {
    fn into_id(self) -> EntityId {
        match self {
            Self::Stable(id) | Self::Synthetic(id) => id,
        }
    }
}
