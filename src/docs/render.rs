//! Rendering entity state to the document tree.
//!
//! Each current-state entity maps to one file at `{label}/{id}.{ext}`
//! (template-overridable). The frontmatter carries the reserved sync
//! metadata and every non-underscore property; the body is a readable
//! projection of the `content` property plus a relationship diagram. A
//! file whose bytes already equal the render is never rewritten.

use serde_json::{json, Value as JsonValue};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::error::{GraphError, GraphResult};
use crate::types::{DirectedRelationship, Entity, EntityState, PropMap, RelationshipDirection};

use super::adapter::FormatAdapter;
use super::hash::compute_sync_hash;

/// Default path pattern under the output directory.
const DEFAULT_PATH_TEMPLATE: &str = "{label}/{id}.{ext}";

/// A fully rendered document, not yet written.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedDoc {
    pub relative_path: String,
    pub contents: String,
}

/// Outcome of one tree render.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderStats {
    pub written: usize,
    pub unchanged: usize,
}

/// Projects entity state onto a file tree.
pub struct DocumentProjector {
    output_dir: PathBuf,
    adapter: Arc<dyn FormatAdapter>,
    path_template: String,
}

impl DocumentProjector {
    pub fn new(output_dir: impl Into<PathBuf>, adapter: Arc<dyn FormatAdapter>) -> Self {
        Self {
            output_dir: output_dir.into(),
            adapter,
            path_template: DEFAULT_PATH_TEMPLATE.to_string(),
        }
    }

    pub fn with_path_template(mut self, template: impl Into<String>) -> Self {
        self.path_template = template.into();
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn extension(&self) -> &str {
        self.adapter.extension()
    }

    /// Relative path of an entity's document.
    pub fn relative_path(&self, entity: &Entity) -> String {
        self.path_template
            .replace("{label}", &entity.label)
            .replace("{id}", &entity.id)
            .replace("{ext}", self.adapter.extension())
    }

    /// Render one entity to a document string.
    pub fn render(
        &self,
        entity: &Entity,
        state: &EntityState,
        relationships: &[DirectedRelationship],
    ) -> GraphResult<RenderedDoc> {
        let mut frontmatter = PropMap::new();
        frontmatter.insert("_id".to_string(), json!(entity.id));
        frontmatter.insert("_label".to_string(), json!(entity.label));
        frontmatter.insert("_version".to_string(), json!(state.version));
        frontmatter.insert(
            "_syncHash".to_string(),
            json!(compute_sync_hash(&state.props)),
        );
        for (key, value) in &state.props {
            if !key.starts_with('_') {
                frontmatter.insert(key.clone(), value.clone());
            }
        }
        let frontmatter = self.adapter.transform_frontmatter(frontmatter);

        let yaml = serde_yaml::to_string(&JsonValue::Object(frontmatter)).map_err(|e| {
            GraphError::Parse {
                path: self.relative_path(entity),
                reason: format!("frontmatter serialization: {e}"),
            }
        })?;

        let mut body = String::new();
        if let Some(content) = state.props.get("content").and_then(|v| v.as_str()) {
            body.push_str(content.trim_end());
            body.push('\n');
        }
        if !relationships.is_empty() {
            if !body.is_empty() {
                body.push('\n');
            }
            body.push_str(&self.adapter.wrap_diagram(&diagram_of(entity, relationships)));
            body.push('\n');
        }

        let contents = format!("---\n{yaml}---\n\n{body}");
        Ok(RenderedDoc {
            relative_path: self.relative_path(entity),
            contents,
        })
    }

    /// Write a rendered doc, skipping the write when the on-disk bytes
    /// already match. Returns whether a write happened.
    pub fn write(&self, doc: &RenderedDoc) -> GraphResult<bool> {
        let path = self.output_dir.join(&doc.relative_path);
        if let Ok(existing) = std::fs::read_to_string(&path) {
            if existing == doc.contents {
                return Ok(false);
            }
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| GraphError::Storage(format!("create {}: {e}", parent.display())))?;
        }
        std::fs::write(&path, &doc.contents)
            .map_err(|e| GraphError::Storage(format!("write {}: {e}", path.display())))?;
        debug!(path = %path.display(), "document written");
        Ok(true)
    }

    /// Render and write the whole current-state tree. `relationships` is
    /// keyed by entity id.
    pub fn render_tree(
        &self,
        entities: &[(Entity, EntityState)],
        relationships: &dyn Fn(&str) -> Vec<DirectedRelationship>,
    ) -> GraphResult<RenderStats> {
        let mut stats = RenderStats::default();
        for (entity, state) in entities {
            let doc = self.render(entity, state, &relationships(&entity.id))?;
            if self.write(&doc)? {
                stats.written += 1;
            } else {
                stats.unchanged += 1;
            }
        }
        if let Some((relative_path, contents)) = self.adapter.generate_index(entities) {
            let doc = RenderedDoc {
                relative_path,
                contents,
            };
            if self.write(&doc)? {
                stats.written += 1;
            }
        }
        Ok(stats)
    }

    /// Remove one entity's document, tolerating its absence.
    pub fn remove(&self, entity: &Entity) -> GraphResult<bool> {
        let path = self.output_dir.join(self.relative_path(entity));
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(GraphError::Storage(format!(
                "remove {}: {e}",
                path.display()
            ))),
        }
    }
}

/// Textual graph-description block of an entity's active edges.
fn diagram_of(entity: &Entity, relationships: &[DirectedRelationship]) -> String {
    let mut lines = vec!["graph LR".to_string()];
    for rel in relationships {
        let r = &rel.relationship;
        match rel.direction {
            RelationshipDirection::Outgoing => lines.push(format!(
                "  {}[{}] -->|{}| {}",
                short(&entity.id),
                entity.id,
                r.rel_type,
                short(&r.to_id)
            )),
            RelationshipDirection::Incoming => lines.push(format!(
                "  {} -->|{}| {}[{}]",
                short(&r.from_id),
                r.rel_type,
                short(&entity.id),
                entity.id
            )),
        }
    }
    lines.join("\n")
}

/// Mermaid node ids must stay short and alphanumeric.
fn short(id: &str) -> String {
    id.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(12)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docs::adapter::PassthroughAdapter;
    use crate::types::Relationship;
    use chrono::Utc;
    use serde_json::json;

    fn entity(id: &str) -> Entity {
        Entity {
            id: id.to_string(),
            label: "Service".to_string(),
            created_at: Utc::now(),
            deleted_at: None,
            deleted_by: None,
        }
    }

    fn state(id: &str, props: serde_json::Value) -> EntityState {
        EntityState {
            entity_id: id.to_string(),
            version: 1,
            valid_from: Utc::now(),
            valid_to: None,
            recorded_at: Utc::now(),
            actor: "test".to_string(),
            props: props.as_object().unwrap().clone(),
        }
    }

    fn projector(dir: &Path) -> DocumentProjector {
        DocumentProjector::new(dir, Arc::new(PassthroughAdapter))
    }

    #[test]
    fn default_path_is_label_slash_id() {
        let dir = tempfile::tempdir().unwrap();
        let p = projector(dir.path());
        assert_eq!(p.relative_path(&entity("svc-1")), "Service/svc-1.md");

        let custom = projector(dir.path()).with_path_template("notes/{id}.{ext}");
        assert_eq!(custom.relative_path(&entity("svc-1")), "notes/svc-1.md");
    }

    #[test]
    fn render_stamps_reserved_frontmatter() {
        let dir = tempfile::tempdir().unwrap();
        let p = projector(dir.path());
        let s = state("svc-1", json!({"name": "Auth", "content": "The auth service."}));
        let doc = p.render(&entity("svc-1"), &s, &[]).unwrap();

        assert!(doc.contents.starts_with("---\n"));
        assert!(doc.contents.contains("_id: svc-1"));
        assert!(doc.contents.contains("_label: Service"));
        assert!(doc.contents.contains("_version: 1"));
        assert!(doc
            .contents
            .contains(&format!("_syncHash: {}", compute_sync_hash(&s.props))));
        assert!(doc.contents.contains("name: Auth"));
        assert!(doc.contents.ends_with("The auth service.\n"));
    }

    #[test]
    fn render_appends_relationship_diagram() {
        let dir = tempfile::tempdir().unwrap();
        let p = projector(dir.path());
        let rels = vec![DirectedRelationship {
            direction: RelationshipDirection::Outgoing,
            relationship: Relationship {
                rel_type: "DEPENDS_ON".to_string(),
                from_id: "svc-1".to_string(),
                to_id: "db-1".to_string(),
                valid_from: Utc::now(),
                valid_to: None,
                actor: "test".to_string(),
                props: PropMap::new(),
            },
        }];
        let doc = p
            .render(&entity("svc-1"), &state("svc-1", json!({"name": "Auth"})), &rels)
            .unwrap();
        assert!(doc.contents.contains("```mermaid"));
        assert!(doc.contents.contains("-->|DEPENDS_ON|"));
    }

    #[test]
    fn write_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let p = projector(dir.path());
        let doc = p
            .render(&entity("svc-1"), &state("svc-1", json!({"name": "Auth"})), &[])
            .unwrap();
        assert!(p.write(&doc).unwrap());
        assert!(!p.write(&doc).unwrap());

        let stats = p
            .render_tree(
                &[(entity("svc-1"), state("svc-1", json!({"name": "Auth"})))],
                &|_| Vec::new(),
            )
            .unwrap();
        assert_eq!(stats.written, 0);
        assert_eq!(stats.unchanged, 1);
    }

    #[test]
    fn remove_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let p = projector(dir.path());
        assert!(!p.remove(&entity("ghost")).unwrap());
    }
}
