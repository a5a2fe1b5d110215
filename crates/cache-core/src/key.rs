//! Field-Key Encoder (C2, spec.md §4.2): canonicalizes a field's name,
//! arguments and storage-affecting directives into a stable storage key.

use crate::document::{self, Variables};
use crate::value::StorageKey;
use graphql_parser::query::{Directive, Field};

/// Caller hook for `@connection(key, filter?)`: given the connection name
/// and the field's already-substituted arguments, return the subset of
/// argument keys (in document order) that should be folded into the
/// rewritten storage key. `None` means "include none" (bare connection
/// name only).
pub type ConnectionFilter<'a> = dyn Fn(&str, &serde_json::Map<String, serde_json::Value>) -> Option<Vec<String>> + 'a;

/// Encode a field's storage key (spec.md §4.2).
///
/// Two calls with the same field node and the same substituted arguments
/// yield identical strings (the canonicalization law C4/C2 rely on).
#[must_use]
pub fn encode_field_key(
    field: &Field<'_, String>,
    variables: &Variables,
    defaults: &Variables,
    connection_filter: Option<&ConnectionFilter<'_>>,
) -> StorageKey {
    let args = substitute_arguments(&field.arguments, variables, defaults);

    if let Some(connection) = document::find_directive(&field.directives, "connection") {
        return encode_connection_key(connection, &args, variables, defaults, connection_filter);
    }

    let base = if args.is_empty() {
        field.name.clone()
    } else {
        format!("{}({})", field.name, serde_json::Value::Object(args))
    };

    append_unknown_directives(base, &field.directives)
}

/// Arguments, evaluated with variable substitution and default
/// application, JSON-serialized with keys ordered as they appear in the
/// document (spec.md: "the resulting key format is
/// `<name>({"<arg>":<value>,...})`").
fn substitute_arguments(
    arguments: &[(String, graphql_parser::query::Value<'_, String>)],
    variables: &Variables,
    defaults: &Variables,
) -> serde_json::Map<String, serde_json::Value> {
    let mut map = serde_json::Map::new();
    for (name, value) in arguments {
        map.insert(name.clone(), document::substitute(value, variables, defaults));
    }
    map
}

fn encode_connection_key(
    directive: &Directive<'_, String>,
    args: &serde_json::Map<String, serde_json::Value>,
    variables: &Variables,
    defaults: &Variables,
    connection_filter: Option<&ConnectionFilter<'_>>,
) -> StorageKey {
    let connection_name = directive
        .arguments
        .iter()
        .find(|(name, _)| name == "key")
        .map(|(_, v)| document::substitute(v, variables, defaults))
        .and_then(|v| v.as_str().map(ToString::to_string))
        .unwrap_or_else(|| "connection".to_string());

    let included = connection_filter.and_then(|f| f(&connection_name, args));

    match included {
        None => connection_name,
        Some(keys) if keys.is_empty() => connection_name,
        Some(keys) => {
            let mut filtered = serde_json::Map::new();
            for key in keys {
                if let Some(value) = args.get(&key) {
                    filtered.insert(key, value.clone());
                }
            }
            format!("{connection_name}({})", serde_json::Value::Object(filtered))
        }
    }
}

/// Every storage-affecting directive other than `@skip`/`@include`
/// (handled upstream by [`document::should_include`]) and `@connection`
/// (handled by [`encode_connection_key`]) appends `@<name>(<args>)` to the
/// storage key, in directive order.
fn append_unknown_directives(mut base: StorageKey, directives: &[Directive<'_, String>]) -> StorageKey {
    for directive in directives {
        if matches!(directive.name.as_str(), "skip" | "include" | "connection") {
            continue;
        }
        if directive.arguments.is_empty() {
            base.push_str(&format!("@{}", directive.name));
        } else {
            let args: serde_json::Map<_, _> = directive
                .arguments
                .iter()
                .map(|(k, v)| (k.clone(), document::substitute(v, &Variables::new(), &Variables::new())))
                .collect();
            base.push_str(&format!("@{}({})", directive.name, serde_json::Value::Object(args)));
        }
    }
    base
}
