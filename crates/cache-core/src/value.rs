//! Data model: entity identity, field values and the entity record they
//! live in (spec.md §3).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Well-known root entity for top-level query projections.
pub const ROOT_QUERY: &str = "ROOT_QUERY";

/// Well-known root entity for cached mutation results.
pub const ROOT_MUTATION: &str = "ROOT_MUTATION";

/// Distinguished storage key holding an entity's declared type tag.
pub const TYPENAME_KEY: &str = "__typename";

/// An entity identity: a string, either caller-supplied and stable, or a
/// `<parentID>.<storageKey>[.<index>]` path synthesized by the writer.
pub type EntityId = String;

/// A canonicalized `<name>(<args>)[@<directive>...]` storage key, as
/// produced by the field-key encoder (C2).
pub type StorageKey = String;

/// An unordered mapping from field storage key to field value — an entity
/// record (spec.md §3, "Entity record").
pub type EntityRecord = HashMap<StorageKey, Value>;

///
/// Reference
/// A tagged value identifying another entity by ID. The only way one
/// entity points at another.
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub id: EntityId,
    pub synthetic: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub type_tag: Option<String>,
}

impl Reference {
    #[must_use]
    pub const fn new(id: EntityId, synthetic: bool, type_tag: Option<String>) -> Self {
        Self {
            id,
            synthetic,
            type_tag,
        }
    }
}

///
/// Value
/// One field's stored value: scalar, reference, embedded JSON, or an
/// ordered list of any of the above (possibly containing `null`).
///
/// No duck typing: the tagged union is explicit, matching the teacher's
/// refusal to model dynamic shapes as untyped objects (see DESIGN.md).
///

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// `null`, a number, a string or a boolean.
    Scalar(serde_json::Value),
    /// A pointer to another entity.
    Reference(Reference),
    /// An opaque tree for fields with no sub-selection; compared
    /// structurally and never normalized into its own entity.
    EmbeddedJson(serde_json::Value),
    /// An ordered list of any of the above; elements may be `Value::Scalar(Null)`.
    List(Vec<Value>),
}

impl Value {
    #[must_use]
    pub const fn null() -> Self {
        Self::Scalar(serde_json::Value::Null)
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Scalar(serde_json::Value::Null))
    }

    #[must_use]
    pub const fn as_reference(&self) -> Option<&Reference> {
        match self {
            Self::Reference(r) => Some(r),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_list(&self) -> Option<&Vec<Self>> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Serialize this value to its persistence-format JSON shape
    /// (spec.md §6, "Persistence format"): references and embedded JSON
    /// carry their discriminator tags as own fields.
    #[must_use]
    pub fn to_wire(&self) -> serde_json::Value {
        match self {
            Self::Scalar(v) => v.clone(),
            Self::Reference(r) => {
                let mut obj = serde_json::Map::new();
                obj.insert("$ref".to_string(), serde_json::Value::String(r.id.clone()));
                obj.insert("synthetic".to_string(), serde_json::Value::Bool(r.synthetic));
                if let Some(tag) = &r.type_tag {
                    obj.insert("typeTag".to_string(), serde_json::Value::String(tag.clone()));
                }
                serde_json::Value::Object(obj)
            }
            Self::EmbeddedJson(v) => {
                let mut obj = serde_json::Map::new();
                obj.insert("$json".to_string(), v.clone());
                serde_json::Value::Object(obj)
            }
            Self::List(items) => serde_json::Value::Array(items.iter().map(Self::to_wire).collect()),
        }
    }

    /// Inverse of [`Value::to_wire`]. Returns `None` on a shape that is
    /// neither a recognized tag nor a plain JSON scalar/array-of-scalars.
    #[must_use]
    pub fn from_wire(wire: &serde_json::Value) -> Self {
        match wire {
            serde_json::Value::Object(obj) if obj.contains_key("$ref") => {
                let id = obj.get("$ref").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                let synthetic = obj.get("synthetic").and_then(serde_json::Value::as_bool).unwrap_or(false);
                let type_tag = obj
                    .get("typeTag")
                    .and_then(|v| v.as_str())
                    .map(ToString::to_string);
                Self::Reference(Reference::new(id, synthetic, type_tag))
            }
            serde_json::Value::Object(obj) if obj.contains_key("$json") => {
                Self::EmbeddedJson(obj.get("$json").cloned().unwrap_or(serde_json::Value::Null))
            }
            serde_json::Value::Array(items) => Self::List(items.iter().map(Self::from_wire).collect()),
            other => Self::Scalar(other.clone()),
        }
    }
}
