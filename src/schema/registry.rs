//! Schema registry: compiles a [`SchemaDef`] into lookup tables of
//! validators, once, at startup.
//!
//! The registry is immutable after compilation and shared without locks.
//! Compilation failures (malformed identifiers, reserved edge types, enums
//! without members) are fatal; per-mutation validation failures surface as
//! [`GraphError::Validation`].

use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{GraphError, GraphResult};
use crate::types::RESERVED_EDGE_TYPES;

use super::validator::{EdgeValidator, NodeValidator};
use super::{ConstraintDef, PropertyKind, SchemaDef};

const EMAIL_PATTERN: &str = r"^[^@\s]+@[^@\s]+\.[^@\s]+$";

/// Whether `s` is a safe label or relationship-type identifier.
///
/// Labels and types are interpolated into storage statements, so this is a
/// hard contract: `[A-Za-z_][A-Za-z0-9_]*` only. Values never need this
/// check; they are always bound as parameters.
pub fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Compiled schema: O(1) validator lookup by label and by edge triple.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schema: Arc<SchemaDef>,
    nodes: Arc<HashMap<String, NodeValidator>>,
    edges: Arc<HashMap<(String, String, String), EdgeValidator>>,
}

impl SchemaRegistry {
    /// Compile the declarative schema into validator tables.
    pub fn compile(schema: &SchemaDef) -> GraphResult<Self> {
        let email_re = Arc::new(
            Regex::new(EMAIL_PATTERN)
                .map_err(|e| GraphError::Config(format!("email pattern: {e}")))?,
        );

        let mut nodes = HashMap::new();
        for node in &schema.nodes {
            if !is_valid_identifier(&node.label) {
                return Err(GraphError::Config(format!(
                    "invalid node label '{}'",
                    node.label
                )));
            }
            check_properties(&node.label, &node.properties)?;
            for key in &node.unique_keys {
                if !node.properties.contains_key(key) {
                    return Err(GraphError::Config(format!(
                        "unique key '{key}' is not a property of label '{}'",
                        node.label
                    )));
                }
            }
            if nodes
                .insert(
                    node.label.clone(),
                    NodeValidator::new(node.label.clone(), node.properties.clone(), email_re.clone()),
                )
                .is_some()
            {
                return Err(GraphError::Config(format!(
                    "duplicate node label '{}'",
                    node.label
                )));
            }
        }

        let mut edges = HashMap::new();
        for edge in &schema.edges {
            if !is_valid_identifier(&edge.edge_type) {
                return Err(GraphError::Config(format!(
                    "invalid edge type '{}'",
                    edge.edge_type
                )));
            }
            if RESERVED_EDGE_TYPES.contains(&edge.edge_type.as_str()) {
                return Err(GraphError::Config(format!(
                    "edge type '{}' collides with the reserved structural namespace",
                    edge.edge_type
                )));
            }
            for endpoint in [&edge.from, &edge.to] {
                if !nodes.contains_key(endpoint) {
                    return Err(GraphError::Config(format!(
                        "edge '{}' references undeclared label '{endpoint}'",
                        edge.edge_type
                    )));
                }
            }
            let descriptor = format!("{}-[{}]->{}", edge.from, edge.edge_type, edge.to);
            let inner = match &edge.properties {
                Some(props) => {
                    check_properties(&descriptor, props)?;
                    Some(NodeValidator::new(
                        descriptor.clone(),
                        props.clone(),
                        email_re.clone(),
                    ))
                }
                None => None,
            };
            let key = (
                edge.from.clone(),
                edge.edge_type.clone(),
                edge.to.clone(),
            );
            if edges
                .insert(key, EdgeValidator::new(descriptor.clone(), inner))
                .is_some()
            {
                return Err(GraphError::Config(format!("duplicate edge '{descriptor}'")));
            }
        }

        Ok(Self {
            schema: Arc::new(schema.clone()),
            nodes: Arc::new(nodes),
            edges: Arc::new(edges),
        })
    }

    /// The declarative schema this registry was compiled from.
    pub fn schema(&self) -> &SchemaDef {
        &self.schema
    }

    pub fn node_validator(&self, label: &str) -> GraphResult<&NodeValidator> {
        self.nodes
            .get(label)
            .ok_or_else(|| GraphError::UnknownLabel(label.to_string()))
    }

    pub fn edge_validator(
        &self,
        from: &str,
        edge_type: &str,
        to: &str,
    ) -> GraphResult<&EdgeValidator> {
        self.edges
            .get(&(from.to_string(), edge_type.to_string(), to.to_string()))
            .ok_or_else(|| GraphError::UnknownEdge {
                from: from.to_string(),
                edge_type: edge_type.to_string(),
                to: to.to_string(),
            })
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.nodes.contains_key(label)
    }

    /// Whether any declared edge carries this type, regardless of endpoints.
    pub fn has_edge_type(&self, edge_type: &str) -> bool {
        self.edges.keys().any(|(_, t, _)| t == edge_type)
    }

    pub fn labels(&self) -> Vec<String> {
        let mut labels: Vec<_> = self.nodes.keys().cloned().collect();
        labels.sort();
        labels
    }

    /// Storage-level constraints to install: explicit `constraints` entries
    /// plus one unique constraint per declared `uniqueKeys` member.
    pub fn constraints(&self) -> Vec<ConstraintDef> {
        let mut out = self.schema.constraints.clone();
        for node in &self.schema.nodes {
            for key in &node.unique_keys {
                out.push(ConstraintDef {
                    label: node.label.clone(),
                    property: key.clone(),
                    kind: super::ConstraintKind::Unique,
                });
            }
        }
        out
    }
}

fn check_properties(
    owner: &str,
    properties: &std::collections::BTreeMap<String, super::PropertyDef>,
) -> GraphResult<()> {
    for (name, def) in properties {
        if def.kind == PropertyKind::Enum
            && def.values.as_ref().map_or(true, |v| v.is_empty())
        {
            return Err(GraphError::Config(format!(
                "enum property '{owner}.{name}' declares no members"
            )));
        }
    }
    Ok(())
}
