//! Declarative schema model.
//!
//! A [`SchemaDef`] is loaded once at startup and compiled by the
//! [`registry`](crate::schema::SchemaRegistry) into per-label validators.
//! The schema is the anti-hallucination gate: nothing reaches the store
//! without passing through a compiled validator.

mod registry;
mod validator;

pub use registry::{is_valid_identifier, SchemaRegistry};
pub use validator::{EdgeValidator, NodeValidator};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// The kind of a schema property, with per-kind validation behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PropertyKind {
    String,
    Number,
    Boolean,
    Date,
    Url,
    Email,
    Enum,
    StringList,
    Json,
}

impl std::fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Url => "url",
            Self::Email => "email",
            Self::Enum => "enum",
            Self::StringList => "stringList",
            Self::Json => "json",
        };
        write!(f, "{s}")
    }
}

/// Definition of one property on a node or edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDef {
    pub kind: PropertyKind,
    #[serde(default)]
    pub required: bool,
    /// Enum members; only meaningful for `kind: enum`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
    /// Applied when the key is absent from the input
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
}

impl PropertyDef {
    /// A bare property of the given kind, optional, no default.
    pub fn of(kind: PropertyKind) -> Self {
        Self {
            kind,
            required: false,
            values: None,
            default: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: JsonValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_values(mut self, values: Vec<String>) -> Self {
        self.values = Some(values);
        self
    }
}

/// Definition of one node label.
///
/// Property order is kept stable (BTreeMap) so compiled validators and
/// rendered schema resources are deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDef {
    pub label: String,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyDef>,
    /// Properties whose values must be unique within the label
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unique_keys: Vec<String>,
}

/// Definition of one edge type between two node labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDef {
    #[serde(rename = "type")]
    pub edge_type: String,
    pub from: String,
    pub to: String,
    /// Declared edge properties; an absent map accepts any property set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, PropertyDef>>,
}

/// A storage-level index/constraint declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintDef {
    pub label: String,
    pub property: String,
    pub kind: ConstraintKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConstraintKind {
    Unique,
    Index,
}

/// The full declarative schema, loaded at startup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDef {
    #[serde(default)]
    pub nodes: Vec<NodeDef>,
    #[serde(default)]
    pub edges: Vec<EdgeDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<ConstraintDef>,
}

impl SchemaDef {
    pub fn node(&self, label: &str) -> Option<&NodeDef> {
        self.nodes.iter().find(|n| n.label == label)
    }

    pub fn edge(&self, from: &str, edge_type: &str, to: &str) -> Option<&EdgeDef> {
        self.edges
            .iter()
            .find(|e| e.edge_type == edge_type && e.from == from && e.to == to)
    }
}
