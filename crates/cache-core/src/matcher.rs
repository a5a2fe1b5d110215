//! Fragment Matcher (C3, spec.md §4.3): decides whether an entity of type
//! `T` satisfies a fragment's type condition `C`.

use crate::config::{MatcherMode, PossibleTypesTable};
use crate::error::CacheError;
use std::cell::Cell;
use std::collections::HashSet;

/// `match(entityRef, typeCondition, context) -> bool`, modeled as a
/// concrete type over [`MatcherMode`] rather than a trait object: the two
/// strategies are closed (spec.md never asks for a third), so a trait
/// would only add an indirection with no extension point anyone needs.
pub struct FragmentMatcher {
    mode: MatcherMode,
    warned: Cell<bool>,
}

impl FragmentMatcher {
    #[must_use]
    pub const fn new(mode: MatcherMode) -> Self {
        Self {
            mode,
            warned: Cell::new(false),
        }
    }

    /// Decide whether a concrete `type_tag` (possibly absent) satisfies
    /// `type_condition`. Called before descending into inline fragments
    /// and spreads.
    pub fn matches(&self, type_tag: Option<&str>, type_condition: &str) -> Result<bool, CacheError> {
        match &self.mode {
            MatcherMode::Heuristic { warn_once } => {
                Ok(self.match_heuristic(type_tag, type_condition, *warn_once))
            }
            MatcherMode::Explicit(None) => Err(CacheError::matcher_not_ready()),
            MatcherMode::Explicit(Some(table)) => Ok(Self::match_explicit(table, type_tag, type_condition)),
        }
    }

    /// Seed the explicit strategy's possible-types table once it has
    /// loaded (e.g. after a schema-introspection fetch completes). A
    /// no-op under the heuristic strategy, since it has no table to load.
    pub fn load_possible_types(&mut self, table: PossibleTypesTable) {
        if self.is_explicit() {
            self.mode = MatcherMode::Explicit(Some(table));
        }
    }

    fn match_heuristic(&self, type_tag: Option<&str>, type_condition: &str, warn_once: bool) -> bool {
        match type_tag {
            Some(tag) => tag == type_condition,
            None => {
                if warn_once && !self.warned.replace(true) {
                    tracing::warn!(
                        type_condition,
                        "fragment matcher: entity has no type tag; matching best-effort (succeeds)"
                    );
                }
                // §9 Open Questions: "the exact criterion for best effort
                // when the entity lacks a type tag is: match succeeds."
                true
            }
        }
    }

    /// A concrete tag `T` satisfies condition `C` iff there is a path in
    /// the table from `C` to `T`; cycles in the table are ignored during
    /// traversal.
    fn match_explicit(table: &PossibleTypesTable, type_tag: Option<&str>, type_condition: &str) -> bool {
        let Some(tag) = type_tag else { return false };
        if tag == type_condition {
            return true;
        }

        let mut visited = HashSet::new();
        let mut frontier = vec![type_condition.to_string()];
        while let Some(condition) = frontier.pop() {
            if !visited.insert(condition.clone()) {
                continue;
            }
            let Some(possible) = table.get(&condition) else {
                continue;
            };
            for candidate in possible {
                if candidate == tag {
                    return true;
                }
                frontier.push(candidate.clone());
            }
        }
        false
    }

    /// True when the matcher is the explicit strategy and its table has
    /// been seeded (used to surface "matcher not ready" at the call site,
    /// since a table that is present but empty is a legitimate — if
    /// unusual — configuration).
    #[must_use]
    pub const fn is_explicit(&self) -> bool {
        matches!(self.mode, MatcherMode::Explicit(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_matches_exact_tag() {
        let matcher = FragmentMatcher::new(MatcherMode::Heuristic { warn_once: false });
        assert!(matcher.matches(Some("Book"), "Book").unwrap());
        assert!(!matcher.matches(Some("Book"), "Author").unwrap());
    }

    #[test]
    fn heuristic_best_effort_on_missing_tag() {
        let matcher = FragmentMatcher::new(MatcherMode::Heuristic { warn_once: false });
        assert!(matcher.matches(None, "Book").unwrap());
    }

    #[test]
    fn explicit_matches_union_chain() {
        let mut table = PossibleTypesTable::new();
        table.insert("SearchResult".to_string(), vec!["Media".to_string()]);
        table.insert("Media".to_string(), vec!["Book".to_string(), "Movie".to_string()]);
        let matcher = FragmentMatcher::new(MatcherMode::Explicit(Some(table)));

        assert!(matcher.matches(Some("Book"), "SearchResult").unwrap());
        assert!(matcher.matches(Some("Movie"), "Media").unwrap());
        assert!(!matcher.matches(Some("Author"), "SearchResult").unwrap());
        assert!(!matcher.matches(None, "SearchResult").unwrap());
    }

    #[test]
    fn explicit_ignores_cycles() {
        let mut table = PossibleTypesTable::new();
        table.insert("A".to_string(), vec!["B".to_string()]);
        table.insert("B".to_string(), vec!["A".to_string()]);
        let matcher = FragmentMatcher::new(MatcherMode::Explicit(Some(table)));

        assert!(!matcher.matches(Some("C"), "A").unwrap());
    }

    #[test]
    fn explicit_without_a_loaded_table_is_not_ready() {
        let matcher = FragmentMatcher::new(MatcherMode::Explicit(None));
        let err = matcher.matches(Some("Book"), "SearchResult").unwrap_err();
        assert!(matches!(err.kind, crate::error::ErrorKind::MatcherNotReady));
    }

    #[test]
    fn loading_the_table_makes_the_matcher_ready() {
        let mut matcher = FragmentMatcher::new(MatcherMode::Explicit(None));
        assert!(matcher.is_explicit());

        let mut table = PossibleTypesTable::new();
        table.insert("SearchResult".to_string(), vec!["Book".to_string()]);
        matcher.load_possible_types(table);

        assert!(matcher.matches(Some("Book"), "SearchResult").unwrap());
    }
}
