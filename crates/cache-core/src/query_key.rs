//! Query Key Maker (C4, spec.md §4.4): assigns a stable identity to each
//! selection-set node so two documents that differ only in whitespace,
//! comments or fragment-definition order share memoization keys.

use graphql_parser::query::{Directive, Field, Selection, SelectionSet};
use std::collections::HashMap;

/// A small `Copy` identity for a canonicalized selection-set node, cheap
/// to fold into the reader's memoization key (spec.md §4.6 step 5).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct QueryKeyId(u64);

impl QueryKeyId {
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

///
/// QueryKeyMaker
/// Prints each selection-set node with a canonical printer and interns
/// the resulting string at a shared table, so structurally equal nodes —
/// even from different `Document` instances — collapse to the same
/// [`QueryKeyId`].
///

#[derive(Debug, Default)]
pub struct QueryKeyMaker {
    table: HashMap<String, QueryKeyId>,
    next: u64,
}

impl QueryKeyMaker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign (or recall) the identity for one selection-set node.
    pub fn key_for(&mut self, set: &SelectionSet<'_, String>) -> QueryKeyId {
        let printed = print_selection_set(set);
        self.intern(printed)
    }

    fn intern(&mut self, printed: String) -> QueryKeyId {
        if let Some(id) = self.table.get(&printed) {
            return *id;
        }
        let id = QueryKeyId(self.next);
        self.next += 1;
        self.table.insert(printed, id);
        id
    }
}

/// Canonical printer: whitespace- and comment-free, document-order
/// arguments, directives in order, fragment spreads printed by name
/// (not inlined — two documents sharing a spread name but differing
/// fragment bodies is a caller error this layer does not detect).
fn print_selection_set(set: &SelectionSet<'_, String>) -> String {
    let mut items: Vec<String> = set.items.iter().map(print_selection).collect();
    items.sort();
    format!("{{{}}}", items.join(","))
}

fn print_selection(selection: &Selection<'_, String>) -> String {
    match selection {
        Selection::Field(field) => print_field(field),
        Selection::FragmentSpread(spread) => {
            let directives = print_directives(&spread.directives);
            format!("...{}{directives}", spread.fragment_name)
        }
        Selection::InlineFragment(inline) => {
            let condition = inline
                .type_condition
                .as_ref()
                .map(|c| match c {
                    graphql_parser::query::TypeCondition::On(name) => name.clone(),
                })
                .unwrap_or_default();
            let directives = print_directives(&inline.directives);
            let selection_set = print_selection_set(&inline.selection_set);
            format!("...on {condition}{directives}{selection_set}")
        }
    }
}

fn print_field(field: &Field<'_, String>) -> String {
    let args = print_arguments(&field.arguments);
    let directives = print_directives(&field.directives);
    let sub = if field.selection_set.items.is_empty() {
        String::new()
    } else {
        print_selection_set(&field.selection_set)
    };
    let alias = field
        .alias
        .as_ref()
        .map_or_else(String::new, |alias| format!("{alias}:"));
    format!("{alias}{}{args}{directives}{sub}", field.name)
}

fn print_arguments(arguments: &[(String, graphql_parser::query::Value<'_, String>)]) -> String {
    if arguments.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = arguments
        .iter()
        .map(|(name, value)| format!("{name}:{}", print_value(value)))
        .collect();
    format!("({})", parts.join(","))
}

fn print_value(value: &graphql_parser::query::Value<'_, String>) -> String {
    use graphql_parser::query::Value as V;
    match value {
        V::Variable(name) => format!("${name}"),
        V::Int(n) => n.as_i64().unwrap_or_default().to_string(),
        V::Float(f) => f.to_string(),
        V::String(s) => format!("{s:?}"),
        V::Boolean(b) => b.to_string(),
        V::Null => "null".to_string(),
        V::Enum(e) => e.clone(),
        V::List(items) => {
            let parts: Vec<String> = items.iter().map(print_value).collect();
            format!("[{}]", parts.join(","))
        }
        V::Object(obj) => {
            let parts: Vec<String> = obj.iter().map(|(k, v)| format!("{k}:{}", print_value(v))).collect();
            format!("{{{}}}", parts.join(","))
        }
    }
}

fn print_directives(directives: &[Directive<'_, String>]) -> String {
    if directives.is_empty() {
        return String::new();
    }
    directives
        .iter()
        .map(|d| format!("@{}{}", d.name, print_arguments(&d.arguments)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphql_parser::query::parse_query;

    fn first_selection_set(source: &str) -> SelectionSet<'static, String> {
        let doc = parse_query::<String>(source).unwrap().into_static();
        match &doc.definitions[0] {
            graphql_parser::query::Definition::Operation(
                graphql_parser::query::OperationDefinition::Query(q),
            ) => q.selection_set.clone(),
            graphql_parser::query::Definition::Operation(
                graphql_parser::query::OperationDefinition::SelectionSet(s),
            ) => s.clone(),
            _ => panic!("expected an operation"),
        }
    }

    #[test]
    fn whitespace_and_comments_do_not_change_identity() {
        let mut maker = QueryKeyMaker::new();
        let a = first_selection_set("query { a b }");
        let b = first_selection_set(
            "query {\n  # comment\n  a\n  b\n}\n",
        );

        assert_eq!(maker.key_for(&a), maker.key_for(&b));
    }

    #[test]
    fn different_selections_get_different_identities() {
        let mut maker = QueryKeyMaker::new();
        let a = first_selection_set("query { a }");
        let b = first_selection_set("query { b }");

        assert_ne!(maker.key_for(&a), maker.key_for(&b));
    }
}
