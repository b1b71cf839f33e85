//! Mapping: artifacts become schema-labeled entities.
//!
//! Declarative rules pick a label per artifact kind and resolve each
//! target property from the artifact: a bare field name (top-level, then
//! meta), a dotted path, a literal, or a compute closure. The first
//! matching rule wins; artifacts whose label the schema does not declare
//! route to the unmapped bucket instead of emitting a broken entity.

use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::schema::SchemaRegistry;
use crate::types::PropMap;

use super::parsers::{ArtifactKind, RawArtifact};

/// How one target property gets its value.
#[derive(Clone, Deserialize)]
#[serde(untagged)]
pub enum PropertyMapping {
    /// `{from: "meta.version"}`: dotted path into the artifact
    From { from: String },
    /// `{value: ...}`: literal
    Value { value: JsonValue },
    /// Bare field name, looked up on the artifact top-level then `meta`
    Field(String),
    /// Programmatic mapping; not expressible in config files
    #[serde(skip)]
    Compute(Arc<dyn Fn(&RawArtifact) -> JsonValue + Send + Sync>),
}

impl std::fmt::Debug for PropertyMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::From { from } => write!(f, "From({from})"),
            Self::Value { value } => write!(f, "Value({value})"),
            Self::Field(name) => write!(f, "Field({name})"),
            Self::Compute(_) => write!(f, "Compute(..)"),
        }
    }
}

impl PropertyMapping {
    /// Resolve against an artifact; `None` drops the property.
    pub fn resolve(&self, artifact: &RawArtifact) -> Option<JsonValue> {
        match self {
            Self::Field(name) => lookup_field(artifact, name),
            Self::From { from } => lookup_path(artifact, from),
            Self::Value { value } => Some(value.clone()),
            Self::Compute(compute) => Some(compute(artifact)),
        }
    }
}

/// One declarative mapping rule.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingRule {
    pub artifact_kind: ArtifactKind,
    pub label: String,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyMapping>,
    /// Programmatic short-circuit; not expressible in config files
    #[serde(skip)]
    pub filter: Option<Arc<dyn Fn(&RawArtifact) -> bool + Send + Sync>>,
}

impl std::fmt::Debug for MappingRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingRule")
            .field("artifact_kind", &self.artifact_kind)
            .field("label", &self.label)
            .field("properties", &self.properties)
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

impl MappingRule {
    /// Identity rule: artifact kind maps to the label of the same name
    /// with the standard property set. The `hash` mapping resolves only
    /// for file artifacts, which keeps file entities in step with their
    /// content digest.
    pub fn identity(kind: ArtifactKind) -> Self {
        let mut properties = BTreeMap::new();
        properties.insert("name".to_string(), PropertyMapping::Field("name".to_string()));
        properties.insert(
            "path".to_string(),
            PropertyMapping::Field("filePath".to_string()),
        );
        properties.insert(
            "language".to_string(),
            PropertyMapping::Field("language".to_string()),
        );
        properties.insert(
            "hash".to_string(),
            PropertyMapping::Field("hash".to_string()),
        );
        Self {
            artifact_kind: kind,
            label: kind.to_string(),
            properties,
            filter: None,
        }
    }

    fn matches(&self, artifact: &RawArtifact) -> bool {
        self.artifact_kind == artifact.kind
            && self.filter.as_ref().map_or(true, |f| f(artifact))
    }
}

/// Default rules: every artifact kind maps to its own label.
pub fn default_mappings() -> Vec<MappingRule> {
    [
        ArtifactKind::File,
        ArtifactKind::Module,
        ArtifactKind::Function,
        ArtifactKind::Class,
        ArtifactKind::Interface,
        ArtifactKind::Type,
        ArtifactKind::ApiEndpoint,
        ArtifactKind::Dependency,
        ArtifactKind::EnvVar,
        ArtifactKind::ConfigKey,
        ArtifactKind::Export,
    ]
    .into_iter()
    .map(MappingRule::identity)
    .collect()
}

/// A mapped artifact, ready for ingest.
#[derive(Debug, Clone)]
pub struct MappedEntity {
    pub label: String,
    pub props: PropMap,
    pub artifact: RawArtifact,
}

/// Outcome of the mapping stage.
#[derive(Debug, Default)]
pub struct MapOutcome {
    pub mapped: Vec<MappedEntity>,
    /// Artifacts whose rule named a label the schema does not declare
    pub unmapped: Vec<RawArtifact>,
    /// Artifacts no rule matched
    pub unmatched: usize,
}

/// Apply the rules to a batch of artifacts. First matching rule wins.
pub fn map_artifacts(
    artifacts: Vec<RawArtifact>,
    rules: &[MappingRule],
    registry: &SchemaRegistry,
) -> MapOutcome {
    let mut outcome = MapOutcome::default();
    for artifact in artifacts {
        let Some(rule) = rules.iter().find(|r| r.matches(&artifact)) else {
            outcome.unmatched += 1;
            continue;
        };
        if !registry.has_label(&rule.label) {
            outcome.unmapped.push(artifact);
            continue;
        }
        let mut props = PropMap::new();
        for (target, mapping) in &rule.properties {
            if let Some(value) = mapping.resolve(&artifact) {
                props.insert(target.clone(), value);
            }
        }
        outcome.mapped.push(MappedEntity {
            label: rule.label.clone(),
            props,
            artifact,
        });
    }
    outcome
}

/// Bare field lookup: artifact top-level first, then `meta`.
fn lookup_field(artifact: &RawArtifact, name: &str) -> Option<JsonValue> {
    match name {
        "name" => Some(JsonValue::String(artifact.name.clone())),
        "kind" => Some(JsonValue::String(artifact.kind.to_string())),
        "filePath" | "file_path" => Some(JsonValue::String(artifact.file_path.clone())),
        "language" => Some(JsonValue::String(artifact.language.to_string())),
        "location" => artifact.location.map(|l| JsonValue::from(l as u64)),
        _ => artifact.meta.get(name).cloned(),
    }
}

/// Dotted-path lookup starting from the same roots as bare fields.
fn lookup_path(artifact: &RawArtifact, path: &str) -> Option<JsonValue> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = if first == "meta" {
        JsonValue::Object(artifact.meta.clone())
    } else {
        lookup_field(artifact, first)?
    };
    for segment in segments {
        current = current.get(segment)?.clone();
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{NodeDef, PropertyDef, PropertyKind, SchemaDef};
    use serde_json::json;

    fn registry_with(labels: &[&str]) -> SchemaRegistry {
        let nodes = labels
            .iter()
            .map(|label| NodeDef {
                label: label.to_string(),
                properties: [
                    ("name".to_string(), PropertyDef::of(PropertyKind::String)),
                    ("path".to_string(), PropertyDef::of(PropertyKind::String)),
                    ("language".to_string(), PropertyDef::of(PropertyKind::String)),
                    ("version".to_string(), PropertyDef::of(PropertyKind::String)),
                ]
                .into_iter()
                .collect(),
                unique_keys: vec![],
            })
            .collect();
        SchemaRegistry::compile(&SchemaDef {
            nodes,
            edges: vec![],
            constraints: vec![],
        })
        .unwrap()
    }

    fn artifact(kind: ArtifactKind, name: &str) -> RawArtifact {
        RawArtifact {
            kind,
            name: name.to_string(),
            file_path: "src/a.ts".to_string(),
            language: super::super::parsers::Language::TypeScript,
            meta: json!({"version": "1.0", "nested": {"deep": 42}})
                .as_object()
                .unwrap()
                .clone(),
            location: Some(3),
            refs: vec![],
        }
    }

    #[test]
    fn identity_rule_maps_standard_properties() {
        let registry = registry_with(&["function"]);
        let outcome = map_artifacts(
            vec![artifact(ArtifactKind::Function, "createUser")],
            &default_mappings(),
            &registry,
        );
        assert_eq!(outcome.mapped.len(), 1);
        let entity = &outcome.mapped[0];
        assert_eq!(entity.label, "function");
        assert_eq!(entity.props["name"], json!("createUser"));
        assert_eq!(entity.props["path"], json!("src/a.ts"));
        assert_eq!(entity.props["language"], json!("typescript"));
    }

    #[test]
    fn unknown_labels_route_to_unmapped() {
        let registry = registry_with(&["function"]);
        let outcome = map_artifacts(
            vec![
                artifact(ArtifactKind::Function, "f"),
                artifact(ArtifactKind::Class, "C"),
            ],
            &default_mappings(),
            &registry,
        );
        assert_eq!(outcome.mapped.len(), 1);
        assert_eq!(outcome.unmapped.len(), 1);
        assert_eq!(outcome.unmapped[0].name, "C");
    }

    #[test]
    fn first_matching_rule_wins_and_filters_short_circuit() {
        let registry = registry_with(&["function", "module"]);
        let filtered = MappingRule {
            artifact_kind: ArtifactKind::Function,
            label: "module".to_string(),
            properties: BTreeMap::new(),
            filter: Some(Arc::new(|a: &RawArtifact| a.name.starts_with("handle"))),
        };
        let rules = vec![filtered, MappingRule::identity(ArtifactKind::Function)];

        let outcome = map_artifacts(
            vec![
                artifact(ArtifactKind::Function, "handleRequest"),
                artifact(ArtifactKind::Function, "helper"),
            ],
            &rules,
            &registry,
        );
        assert_eq!(outcome.mapped[0].label, "module");
        assert_eq!(outcome.mapped[1].label, "function");
    }

    #[test]
    fn mapping_variants_resolve() {
        let a = artifact(ArtifactKind::Function, "f");

        assert_eq!(
            PropertyMapping::Field("version".to_string()).resolve(&a),
            Some(json!("1.0"))
        );
        assert_eq!(
            PropertyMapping::From {
                from: "meta.nested.deep".to_string()
            }
            .resolve(&a),
            Some(json!(42))
        );
        assert_eq!(
            PropertyMapping::Value { value: json!(true) }.resolve(&a),
            Some(json!(true))
        );
        let compute = PropertyMapping::Compute(Arc::new(|a: &RawArtifact| {
            json!(format!("{}@{}", a.name, a.file_path))
        }));
        assert_eq!(compute.resolve(&a), Some(json!("f@src/a.ts")));
        assert_eq!(PropertyMapping::Field("missing".to_string()).resolve(&a), None);
    }

    #[test]
    fn rules_deserialize_from_yaml() {
        let yaml = r#"
artifactKind: function
label: CodeFunction
properties:
  name: name
  file: { from: filePath }
  discovered: { value: true }
"#;
        let rule: MappingRule = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rule.label, "CodeFunction");
        let a = artifact(ArtifactKind::Function, "f");
        assert_eq!(rule.properties["file"].resolve(&a), Some(json!("src/a.ts")));
        assert_eq!(rule.properties["discovered"].resolve(&a), Some(json!(true)));
        assert_eq!(rule.properties["name"].resolve(&a), Some(json!("f")));
    }
}
