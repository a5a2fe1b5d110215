//! Result Diff Engine (C7, spec.md §4.7): reconciles a freshly read tree
//! against a previous projection so unchanged subtrees keep their
//! identity, letting callers use reference equality as a cheap
//! change-detection signal (spec.md §8, "referential stability").

use serde_json::{Map, Value};
use std::sync::Arc;

/// A JSON tree whose container children are each individually `Arc`-
/// wrapped, so a subtree nested arbitrarily deep can be reused by
/// pointer — not just the root of the whole result (spec.md §8,
/// "unchanged sub-objects satisfy `prev.sub === next.sub`", which a bare
/// `Arc<serde_json::Value>` cannot express: `serde_json::Value`'s own
/// container variants hold their children inline, not behind a pointer).
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// `null`, a number, a string or a boolean — compared and reused as
    /// a whole, never walked further.
    Scalar(Value),
    Array(Vec<Arc<Node>>),
    /// Field order preserved (matches `serde_json`'s own
    /// `preserve_order`-enabled `Map`); linear lookup is fine at the
    /// field counts a single selection set produces.
    Object(Vec<(String, Arc<Node>)>),
}

/// A previously produced read result. Kept behind `Arc` at every level so
/// reusing a subtree is a pointer copy rather than a clone (spec.md
/// §4.7's "reuse the previous object").
pub type SharedValue = Arc<Node>;

impl Node {
    /// Rebuild the plain `serde_json::Value` this node represents.
    /// Callers that need to serialize a watch/diff result (as opposed to
    /// just comparing identity) go through this.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Scalar(v) => v.clone(),
            Self::Array(items) => Value::Array(items.iter().map(|n| n.to_json()).collect()),
            Self::Object(fields) => {
                let mut map = Map::with_capacity(fields.len());
                for (key, value) in fields {
                    map.insert(key.clone(), value.to_json());
                }
                Value::Object(map)
            }
        }
    }

    fn from_json(value: &Value) -> Self {
        match value {
            Value::Array(items) => Self::Array(items.iter().map(|v| Arc::new(Self::from_json(v))).collect()),
            Value::Object(obj) => {
                Self::Object(obj.iter().map(|(k, v)| (k.clone(), Arc::new(Self::from_json(v)))).collect())
            }
            scalar => Self::Scalar(scalar.clone()),
        }
    }

    /// Structural equality against a plain `Value`, without
    /// materializing either side — just a deep walk.
    fn eq_json(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Scalar(a), b) => a == b,
            (Self::Array(items), Value::Array(values)) => {
                items.len() == values.len() && items.iter().zip(values).all(|(n, v)| n.eq_json(v))
            }
            (Self::Object(fields), Value::Object(map)) => {
                fields.len() == map.len() && fields.iter().all(|(k, v)| map.get(k).is_some_and(|mv| v.eq_json(mv)))
            }
            _ => false,
        }
    }
}

/// Reconcile `fresh` against `previous`: returns a tree equal in content
/// to `fresh`, but sharing structure with `previous` wherever a subtree
/// — at any depth — did not change. `id_of` extracts a stable alignment
/// key from a list element (spec.md §4.7, "Lists are walked
/// element-wise... aligned by extracted ID").
pub fn diff(fresh: &Value, previous: Option<&SharedValue>, id_of: &dyn Fn(&Value) -> Option<String>) -> SharedValue {
    match previous {
        Some(previous) if previous.eq_json(fresh) => Arc::clone(previous),
        Some(previous) => reconcile(fresh, previous, id_of),
        None => Arc::new(Node::from_json(fresh)),
    }
}

fn reconcile(fresh: &Value, previous: &Arc<Node>, id_of: &dyn Fn(&Value) -> Option<String>) -> Arc<Node> {
    match (fresh, previous.as_ref()) {
        (Value::Object(fresh_obj), Node::Object(prev_fields)) => {
            let fields = fresh_obj
                .iter()
                .map(|(key, fresh_val)| {
                    let prev_child = prev_fields.iter().find(|(k, _)| k == key).map(|(_, v)| v);
                    let reconciled = match prev_child {
                        Some(prev_child) => reconcile_or_reuse(fresh_val, prev_child, id_of),
                        None => Arc::new(Node::from_json(fresh_val)),
                    };
                    (key.clone(), reconciled)
                })
                .collect();
            Arc::new(Node::Object(fields))
        }
        (Value::Array(fresh_items), Node::Array(prev_items)) => {
            let items = fresh_items
                .iter()
                .enumerate()
                .map(|(index, fresh_item)| {
                    let previous_item = id_of(fresh_item)
                        .and_then(|id| prev_items.iter().find(|candidate| node_id(candidate, id_of).as_deref() == Some(id.as_str())))
                        .or_else(|| prev_items.get(index));
                    match previous_item {
                        Some(prev_item) => reconcile_or_reuse(fresh_item, prev_item, id_of),
                        None => Arc::new(Node::from_json(fresh_item)),
                    }
                })
                .collect();
            Arc::new(Node::Array(items))
        }
        _ => Arc::new(Node::from_json(fresh)),
    }
}

/// Reuse `previous` by pointer when it already equals `fresh`;
/// otherwise recurse. This is the step that lets an unchanged field or
/// list element keep its identity even though an ancestor changed.
fn reconcile_or_reuse(fresh: &Value, previous: &Arc<Node>, id_of: &dyn Fn(&Value) -> Option<String>) -> Arc<Node> {
    if previous.eq_json(fresh) {
        Arc::clone(previous)
    } else {
        reconcile(fresh, previous, id_of)
    }
}

fn node_id(node: &Node, id_of: &dyn Fn(&Value) -> Option<String>) -> Option<String> {
    id_of(&node.to_json())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn no_ids(_: &Value) -> Option<String> {
        None
    }

    #[test]
    fn identical_trees_reuse_the_previous_pointer() {
        let previous = diff(&json!({"a": 1, "b": {"c": 2}}), None, &no_ids);
        let fresh = json!({"a": 1, "b": {"c": 2}});

        let result = diff(&fresh, Some(&previous), &no_ids);
        assert!(Arc::ptr_eq(&result, &previous));
    }

    #[test]
    fn unchanged_subtree_is_reused_by_pointer() {
        let previous = diff(&json!({"a": 1, "b": {"c": 2}}), None, &no_ids);
        let fresh = json!({"a": 2, "b": {"c": 2}});

        let result = diff(&fresh, Some(&previous), &no_ids);
        assert_eq!(result.to_json(), json!({"a": 2, "b": {"c": 2}}));

        let (Node::Object(prev_fields), Node::Object(result_fields)) = (previous.as_ref(), result.as_ref()) else {
            unreachable!()
        };
        let prev_b = &prev_fields.iter().find(|(k, _)| k == "b").unwrap().1;
        let result_b = &result_fields.iter().find(|(k, _)| k == "b").unwrap().1;
        assert!(Arc::ptr_eq(prev_b, result_b), "an untouched field must keep its previous pointer, not just its value");
    }

    #[test]
    fn list_elements_align_by_extracted_id_across_a_permutation_and_keep_identity() {
        let previous = diff(
            &json!([
                {"id": "1", "name": "alice"},
                {"id": "2", "name": "bob"}
            ]),
            None,
            &no_ids,
        );
        let fresh = json!([
            {"id": "2", "name": "bob"},
            {"id": "1", "name": "alice"}
        ]);

        let id_of = |v: &Value| v.get("id").and_then(|id| id.as_str()).map(ToString::to_string);
        let result = diff(&fresh, Some(&previous), &id_of);
        assert_eq!(result.to_json(), fresh);

        let (Node::Array(prev_items), Node::Array(result_items)) = (previous.as_ref(), result.as_ref()) else {
            unreachable!()
        };
        assert!(
            Arc::ptr_eq(&prev_items[0], &result_items[1]),
            "an unchanged element must keep its pointer even after the list permutes"
        );
    }

    #[test]
    fn no_previous_result_clones_fresh() {
        let fresh = json!({"a": 1});
        let result = diff(&fresh, None, &no_ids);
        assert_eq!(result.to_json(), fresh);
    }
}
