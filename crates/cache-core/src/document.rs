//! Helpers over the external document AST (spec.md §6).
//!
//! The document parser and its grammar are out of scope; we consume a
//! pre-parsed, read-only `graphql_parser::query::Document` and only ever
//! walk it, never mutate or reprint it except through the canonical
//! printer in [`crate::query_key`].

use crate::error::{CacheError, ErrorKind, ErrorOrigin};
use graphql_parser::query::{
    Definition, Directive, Document, FragmentDefinition, OperationDefinition, Selection,
    SelectionSet, Value as GqlValue,
};
use std::collections::HashMap;

/// A parsed query/mutation document, owned-text flavored (this crate never
/// borrows source text across a call boundary).
pub type Doc<'a> = Document<'a, String>;

/// A mapping from variable name to a JSON value (spec.md §3, "Variables").
pub type Variables = HashMap<String, serde_json::Value>;

/// Locate the single operation definition to execute, resolving an
/// explicit `operation_name` when the document defines more than one.
/// Errors on zero operations or an ambiguous unnamed set (spec.md §7,
/// "Malformed document").
pub fn locate_operation<'d, 'a>(
    doc: &'d Doc<'a>,
    operation_name: Option<&str>,
) -> Result<&'d OperationDefinition<'a, String>, CacheError> {
    let operations: Vec<&OperationDefinition<'a, String>> = doc
        .definitions
        .iter()
        .filter_map(|def| match def {
            Definition::Operation(op) => Some(op),
            Definition::Fragment(_) => None,
        })
        .collect();

    if let Some(name) = operation_name {
        return operations
            .into_iter()
            .find(|op| operation_name_of(op).as_deref() == Some(name))
            .ok_or_else(|| {
                CacheError::malformed_document(format!("no operation named '{name}' in document"))
            });
    }

    match operations.len() {
        0 => Err(CacheError::malformed_document(
            "document contains no operation definitions",
        )),
        1 => Ok(operations[0]),
        _ => Err(CacheError::malformed_document(
            "document defines multiple operations; an explicit name is required",
        )),
    }
}

fn operation_name_of<'a>(op: &OperationDefinition<'a, String>) -> Option<String> {
    match op {
        OperationDefinition::SelectionSet(_) => None,
        OperationDefinition::Query(q) => q.name.clone(),
        OperationDefinition::Mutation(m) => m.name.clone(),
        OperationDefinition::Subscription(s) => s.name.clone(),
    }
}

/// Borrow the selection set of an operation, regardless of its kind.
#[must_use]
pub fn operation_selection_set<'d, 'a>(
    op: &'d OperationDefinition<'a, String>,
) -> &'d SelectionSet<'a, String> {
    match op {
        OperationDefinition::SelectionSet(s) => s,
        OperationDefinition::Query(q) => &q.selection_set,
        OperationDefinition::Mutation(m) => &m.selection_set,
        OperationDefinition::Subscription(s) => &s.selection_set,
    }
}

/// Declared-default map for an operation's variable definitions, keyed by
/// variable name. Default values are literals (the GraphQL grammar forbids
/// variable references inside a default value), so no substitution pass
/// is needed to resolve them.
#[must_use]
pub fn variable_defaults<'a>(op: &OperationDefinition<'a, String>) -> Variables {
    let defs: &[graphql_parser::query::VariableDefinition<'a, String>] = match op {
        OperationDefinition::SelectionSet(_) => return Variables::new(),
        OperationDefinition::Query(q) => &q.variable_definitions,
        OperationDefinition::Mutation(m) => &m.variable_definitions,
        OperationDefinition::Subscription(s) => &s.variable_definitions,
    };

    defs.iter()
        .filter_map(|def| {
            def.default_value
                .as_ref()
                .map(|v| (def.name.clone(), literal_to_json(v)))
        })
        .collect()
}

/// Index fragment definitions in a document by name, for spread lookup.
#[must_use]
pub fn fragments_by_name<'d, 'a>(
    doc: &'d Doc<'a>,
) -> HashMap<&'d str, &'d FragmentDefinition<'a, String>> {
    doc.definitions
        .iter()
        .filter_map(|def| match def {
            Definition::Fragment(frag) => Some((frag.name.as_str(), frag)),
            Definition::Operation(_) => None,
        })
        .collect()
}

/// Substitute variable references inside an argument/default value tree,
/// applying declared defaults when a variable binding is absent
/// (spec.md §4.2, "Rules").
#[must_use]
pub fn substitute(
    value: &GqlValue<'_, String>,
    variables: &Variables,
    defaults: &Variables,
) -> serde_json::Value {
    match value {
        GqlValue::Variable(name) => variables
            .get(name)
            .or_else(|| defaults.get(name))
            .cloned()
            .unwrap_or(serde_json::Value::Null),
        GqlValue::Int(n) => n
            .as_i64()
            .map_or(serde_json::Value::Null, |i| serde_json::Value::from(i)),
        GqlValue::Float(f) => serde_json::Value::from(*f),
        GqlValue::String(s) => serde_json::Value::String(s.clone()),
        GqlValue::Boolean(b) => serde_json::Value::Bool(*b),
        GqlValue::Null => serde_json::Value::Null,
        GqlValue::Enum(e) => serde_json::Value::String(e.clone()),
        GqlValue::List(items) => serde_json::Value::Array(
            items.iter().map(|v| substitute(v, variables, defaults)).collect(),
        ),
        GqlValue::Object(obj) => {
            let mut map = serde_json::Map::new();
            for (k, v) in obj {
                map.insert(k.clone(), substitute(v, variables, defaults));
            }
            serde_json::Value::Object(map)
        }
    }
}

/// Convert a literal (variable-free) document value straight to JSON; used
/// for default values, which the grammar guarantees are variable-free.
fn literal_to_json(value: &GqlValue<'_, String>) -> serde_json::Value {
    substitute(value, &Variables::new(), &Variables::new())
}

/// Evaluate `@skip(if: ...)` / `@include(if: ...)` for a selection's
/// directive list. Returns `false` when the field/fragment must be
/// omitted from both writes and reads.
#[must_use]
pub fn should_include(
    directives: &[Directive<'_, String>],
    variables: &Variables,
    defaults: &Variables,
) -> bool {
    for directive in directives {
        let arg_if = directive
            .arguments
            .iter()
            .find(|(name, _)| name == "if")
            .map(|(_, v)| substitute(v, variables, defaults));

        match (directive.name.as_str(), arg_if) {
            ("skip", Some(serde_json::Value::Bool(true))) => return false,
            ("include", Some(serde_json::Value::Bool(false))) => return false,
            _ => {}
        }
    }
    true
}

/// Find a directive by name on a selection.
#[must_use]
pub fn find_directive<'d, 'a>(
    directives: &'d [Directive<'a, String>],
    name: &str,
) -> Option<&'d Directive<'a, String>> {
    directives.iter().find(|d| d.name == name)
}

pub(crate) fn document_error(message: impl Into<String>) -> CacheError {
    CacheError::new(ErrorKind::MalformedDocument, ErrorOrigin::Document, message)
}
