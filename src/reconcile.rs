//! Bidirectional reconciliation between the graph and the document tree.
//!
//! `sync` computes a changeset per entity id seen on either side, resolves
//! conflicts by the configured strategy, applies graph writes through the
//! mutation pipeline, and finishes with a full re-render of the
//! current-state tree so every surviving document carries the current sync
//! hash.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::docs::{
    adapter_for, compute_sync_hash, parse_tree, DocumentProjector, FormatAdapter, ParsedDoc,
};
use crate::error::{GraphError, GraphResult};
use crate::mutation::MutationPipeline;
use crate::reader::TemporalReader;
use crate::types::{DirectedRelationship, Entity, EntityState, PropMap};

/// How a two-sided drift is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStrategy {
    /// Docs follow the graph
    GraphWins,
    /// Graph follows the docs
    DocsWins,
    /// Graph ∪ doc, doc overriding on overlap; graph is the target
    Merge,
    /// First conflict aborts the sync
    Fail,
}

impl ConflictStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GraphWins => "graph-wins",
            Self::DocsWins => "docs-wins",
            Self::Merge => "merge",
            Self::Fail => "fail",
        }
    }
}

impl FromStr for ConflictStrategy {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "graph-wins" => Ok(Self::GraphWins),
            "docs-wins" => Ok(Self::DocsWins),
            "merge" => Ok(Self::Merge),
            "fail" => Ok(Self::Fail),
            other => Err(GraphError::Config(format!(
                "unknown conflict strategy '{other}'"
            ))),
        }
    }
}

/// One detected conflict and how it was settled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub entity_id: String,
    pub label: String,
    pub graph_hash: String,
    pub doc_hash: String,
    pub resolution: String,
}

/// A non-fatal per-change failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncError {
    pub entity_id: String,
    pub message: String,
}

/// Accounting for one sync run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncResult {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub conflicts: Vec<ConflictRecord>,
    pub errors: Vec<SyncError>,
}

/// One planned change, computed before anything is applied.
#[derive(Debug)]
enum Change {
    /// Graph-only id: the re-render will create the doc
    CreateDoc,
    /// Doc-only id: create the entity from the doc's properties
    CreateEntity { label: String, props: PropMap },
    /// Doc edited in place: the graph follows
    UpdateGraph { label: String, props: PropMap },
    /// Both sides drifted
    Conflict {
        label: String,
        graph_hash: String,
        doc_hash: String,
        winning_props: Option<PropMap>,
    },
    /// Doc for a soft-deleted entity: remove the file
    DeleteDoc { entity: Entity },
    /// Hashes and properties agree
    None,
}

/// The reconciliation engine.
pub struct SyncEngine {
    pipeline: MutationPipeline,
    reader: TemporalReader,
}

impl SyncEngine {
    pub fn new(pipeline: MutationPipeline, reader: TemporalReader) -> Self {
        Self { pipeline, reader }
    }

    /// Reconcile the graph with the document tree under `docs_dir`.
    pub async fn sync(
        &self,
        docs_dir: &Path,
        format: &str,
        strategy: ConflictStrategy,
        actor: &str,
        labels: Option<&[String]>,
    ) -> GraphResult<SyncResult> {
        let adapter = adapter_for(format);
        let target_labels: Vec<String> = match labels {
            Some(ls) => ls.to_vec(),
            None => self.pipeline.registry().labels(),
        };

        // Graph side.
        let mut graph: HashMap<String, (Entity, EntityState)> = HashMap::new();
        for label in &target_labels {
            for (entity, state) in self.reader.query_by_label(label).await? {
                graph.insert(entity.id.clone(), (entity, state));
            }
        }

        // Doc side.
        let docs: HashMap<String, ParsedDoc> = parse_tree(docs_dir, adapter.extension())?
            .into_iter()
            .filter(|doc| target_labels.iter().any(|l| l == doc.label()))
            .map(|doc| (doc.id().to_string(), doc))
            .collect();

        // Changeset per id seen on either side.
        let mut ids: Vec<String> = graph.keys().chain(docs.keys()).cloned().collect();
        ids.sort();
        ids.dedup();

        let mut changes: Vec<(String, Change)> = Vec::new();
        for id in ids {
            let change = match (graph.get(&id), docs.get(&id)) {
                (Some(_), None) => Change::CreateDoc,
                (None, Some(doc)) => self.classify_doc_only(&id, doc).await?,
                (Some((_, state)), Some(doc)) => {
                    classify_both(state, doc, strategy)?
                }
                (None, None) => unreachable!("id came from one of the maps"),
            };
            changes.push((id, change));
        }

        // Under `fail`, the first conflict aborts before anything applies.
        if strategy == ConflictStrategy::Fail {
            for (id, change) in &changes {
                if let Change::Conflict {
                    label,
                    graph_hash,
                    doc_hash,
                    ..
                } = change
                {
                    return Err(GraphError::Conflict {
                        entity_id: id.clone(),
                        label: label.clone(),
                        graph_hash: graph_hash.clone(),
                        doc_hash: doc_hash.clone(),
                    });
                }
            }
        }

        // Apply: graph writes first.
        let mut result = SyncResult::default();
        let mut doc_removals: Vec<Entity> = Vec::new();
        for (id, change) in changes {
            match change {
                Change::None => result.unchanged += 1,
                Change::CreateDoc => result.created += 1,
                Change::CreateEntity { label, props } => {
                    match self.pipeline.upsert(&label, Some(&id), &props, actor).await {
                        Ok(_) => result.created += 1,
                        Err(e) => result.errors.push(SyncError {
                            entity_id: id,
                            message: e.to_string(),
                        }),
                    }
                }
                Change::UpdateGraph { label, props } => {
                    match self.pipeline.upsert(&label, Some(&id), &props, actor).await {
                        Ok(_) => result.updated += 1,
                        Err(e) => result.errors.push(SyncError {
                            entity_id: id,
                            message: e.to_string(),
                        }),
                    }
                }
                Change::Conflict {
                    label,
                    graph_hash,
                    doc_hash,
                    winning_props,
                } => {
                    // Exactly one conflict record per conflicted entity;
                    // never double-counted as an update.
                    if let Some(props) = winning_props {
                        if let Err(e) =
                            self.pipeline.upsert(&label, Some(&id), &props, actor).await
                        {
                            result.errors.push(SyncError {
                                entity_id: id.clone(),
                                message: e.to_string(),
                            });
                        }
                    }
                    result.conflicts.push(ConflictRecord {
                        entity_id: id,
                        label,
                        graph_hash,
                        doc_hash,
                        resolution: strategy.as_str().to_string(),
                    });
                }
                Change::DeleteDoc { entity } => {
                    doc_removals.push(entity);
                    result.deleted += 1;
                }
            }
        }

        // Re-project the whole current-state tree; every surviving doc
        // ends with the current hash.
        self.render_tree(docs_dir, adapter, &target_labels).await?;
        let projector = DocumentProjector::new(docs_dir, adapter_for(format));
        for entity in &doc_removals {
            projector.remove(entity)?;
        }

        info!(
            created = result.created,
            updated = result.updated,
            deleted = result.deleted,
            conflicts = result.conflicts.len(),
            errors = result.errors.len(),
            "sync finished"
        );
        Ok(result)
    }

    /// A doc with no live graph entity is either brand new or the remnant
    /// of a soft delete.
    async fn classify_doc_only(&self, id: &str, doc: &ParsedDoc) -> GraphResult<Change> {
        // A live entity outside the target labels is not ours to touch;
        // the upsert below will surface any label mismatch as an error.
        if self.reader.get_current(id).await?.is_none() {
            let history = self.reader.history(id).await?;
            if let Some(newest) = history.first() {
                // Known id with no current head: soft-deleted, doc is stale.
                if let Some((entity, _)) =
                    self.reader.get_at_time(id, newest.valid_from).await?
                {
                    return Ok(Change::DeleteDoc { entity });
                }
            }
        }
        Ok(Change::CreateEntity {
            label: doc.label().to_string(),
            props: doc.user_props(),
        })
    }

    async fn render_tree(
        &self,
        docs_dir: &Path,
        adapter: Arc<dyn FormatAdapter>,
        labels: &[String],
    ) -> GraphResult<()> {
        let projector = DocumentProjector::new(docs_dir, adapter);
        let mut entities = Vec::new();
        for label in labels {
            entities.extend(self.reader.query_by_label(label).await?);
        }
        let mut relationships: HashMap<String, Vec<DirectedRelationship>> = HashMap::new();
        for (entity, _) in &entities {
            relationships.insert(entity.id.clone(), self.reader.relationships(&entity.id).await?);
        }
        projector.render_tree(&entities, &|id| {
            relationships.get(id).cloned().unwrap_or_default()
        })?;
        Ok(())
    }
}

/// Classify an id present on both sides.
fn classify_both(
    state: &EntityState,
    doc: &ParsedDoc,
    strategy: ConflictStrategy,
) -> GraphResult<Change> {
    let graph_hash = compute_sync_hash(&state.props);
    let doc_hash = doc.sync_hash().unwrap_or_default().to_string();
    let doc_props = doc.user_props();

    if graph_hash == doc_hash {
        if doc_props == state.props {
            return Ok(Change::None);
        }
        // Hash still matches the graph: only the doc moved.
        return Ok(Change::UpdateGraph {
            label: doc.label().to_string(),
            props: doc_props,
        });
    }

    // Both sides drifted.
    if doc_hash.is_empty() {
        warn!(entity = doc.id(), "doc carries no sync hash, treating as conflict");
    }
    let winning_props = match strategy {
        ConflictStrategy::GraphWins | ConflictStrategy::Fail => None,
        ConflictStrategy::DocsWins => Some(doc_props),
        ConflictStrategy::Merge => {
            let mut merged = state.props.clone();
            for (key, value) in doc_props {
                merged.insert(key, value);
            }
            Some(merged)
        }
    };
    Ok(Change::Conflict {
        label: doc.label().to_string(),
        graph_hash,
        doc_hash,
        winning_props,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::in_memory_pipeline;
    use crate::schema::{NodeDef, PropertyDef, PropertyKind, SchemaDef, SchemaRegistry};
    use serde_json::json;

    fn engine() -> SyncEngine {
        let schema = SchemaDef {
            nodes: vec![NodeDef {
                label: "Service".to_string(),
                properties: [
                    (
                        "name".to_string(),
                        PropertyDef::of(PropertyKind::String).required(),
                    ),
                    ("status".to_string(), PropertyDef::of(PropertyKind::String)),
                    (
                        "description".to_string(),
                        PropertyDef::of(PropertyKind::String),
                    ),
                ]
                .into_iter()
                .collect(),
                unique_keys: vec![],
            }],
            edges: vec![],
            constraints: vec![],
        };
        let pipeline = in_memory_pipeline(SchemaRegistry::compile(&schema).unwrap());
        let reader = TemporalReader::new(pipeline.store().clone());
        SyncEngine::new(pipeline, reader)
    }

    fn props(value: serde_json::Value) -> PropMap {
        value.as_object().unwrap().clone()
    }

    fn write_doc(dir: &Path, id: &str, frontmatter: &str) {
        let service_dir = dir.join("Service");
        std::fs::create_dir_all(&service_dir).unwrap();
        std::fs::write(
            service_dir.join(format!("{id}.md")),
            format!("---\n_id: {id}\n_label: Service\n_version: 1\n{frontmatter}---\n\n"),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn graph_only_entity_creates_doc() {
        let engine = engine();
        let dir = tempfile::tempdir().unwrap();
        engine
            .pipeline
            .upsert("Service", Some("svc-1"), &props(json!({"name": "Auth"})), "alice")
            .await
            .unwrap();

        let result = engine
            .sync(dir.path(), "markdown", ConflictStrategy::GraphWins, "sync", None)
            .await
            .unwrap();
        assert_eq!(result.created, 1);
        assert!(dir.path().join("Service/svc-1.md").exists());

        // Second run: everything agrees.
        let again = engine
            .sync(dir.path(), "markdown", ConflictStrategy::GraphWins, "sync", None)
            .await
            .unwrap();
        assert_eq!(again.created, 0);
        assert_eq!(again.unchanged, 1);
    }

    #[tokio::test]
    async fn doc_only_creates_graph_entity() {
        let engine = engine();
        let dir = tempfile::tempdir().unwrap();
        write_doc(dir.path(), "svc-9", "_syncHash: none\nname: FromDoc\n");

        let result = engine
            .sync(dir.path(), "markdown", ConflictStrategy::GraphWins, "sync", None)
            .await
            .unwrap();
        assert_eq!(result.created, 1);

        let (_, state) = engine.reader.get_current("svc-9").await.unwrap().unwrap();
        assert_eq!(state.props["name"], json!("FromDoc"));

        // The re-render stamped the real hash.
        let docs = parse_tree(dir.path(), "md").unwrap();
        assert_eq!(docs[0].sync_hash(), Some(compute_sync_hash(&state.props).as_str()));
    }

    #[tokio::test]
    async fn stale_doc_conflict_graph_wins_rewrites_doc() {
        let engine = engine();
        let dir = tempfile::tempdir().unwrap();
        engine
            .pipeline
            .upsert(
                "Service",
                Some("svc-1"),
                &props(json!({"name": "X", "status": "A"})),
                "alice",
            )
            .await
            .unwrap();
        write_doc(dir.path(), "svc-1", "_syncHash: stale\nname: X\nstatus: B\n");

        let result = engine
            .sync(dir.path(), "markdown", ConflictStrategy::GraphWins, "sync", None)
            .await
            .unwrap();
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].resolution, "graph-wins");
        assert_eq!(result.updated, 0);

        // Graph unchanged; doc rewritten from the graph.
        let (_, state) = engine.reader.get_current("svc-1").await.unwrap().unwrap();
        assert_eq!(state.version, 1);
        assert_eq!(state.props["status"], json!("A"));

        let docs = parse_tree(dir.path(), "md").unwrap();
        assert_eq!(docs[0].frontmatter["status"], json!("A"));
        assert_eq!(docs[0].sync_hash(), Some(compute_sync_hash(&state.props).as_str()));
    }

    #[tokio::test]
    async fn doc_edit_propagates_to_graph() {
        let engine = engine();
        let dir = tempfile::tempdir().unwrap();
        engine
            .pipeline
            .upsert("Service", Some("svc-1"), &props(json!({"name": "X"})), "alice")
            .await
            .unwrap();
        let (_, state) = engine.reader.get_current("svc-1").await.unwrap().unwrap();
        let hash = compute_sync_hash(&state.props);
        write_doc(
            dir.path(),
            "svc-1",
            &format!("_syncHash: {hash}\nname: X\ndescription: new text\n"),
        );

        let result = engine
            .sync(dir.path(), "markdown", ConflictStrategy::GraphWins, "sync", None)
            .await
            .unwrap();
        assert_eq!(result.updated, 1);
        assert!(result.conflicts.is_empty());

        let (_, state) = engine.reader.get_current("svc-1").await.unwrap().unwrap();
        assert_eq!(state.version, 2);
        assert_eq!(state.props["description"], json!("new text"));

        let docs = parse_tree(dir.path(), "md").unwrap();
        assert_eq!(docs[0].sync_hash(), Some(compute_sync_hash(&state.props).as_str()));
    }

    #[tokio::test]
    async fn merge_overlays_doc_onto_graph() {
        let engine = engine();
        let dir = tempfile::tempdir().unwrap();
        engine
            .pipeline
            .upsert(
                "Service",
                Some("svc-1"),
                &props(json!({"name": "X", "status": "graph-side"})),
                "alice",
            )
            .await
            .unwrap();
        write_doc(
            dir.path(),
            "svc-1",
            "_syncHash: stale\nname: X\ndescription: doc-side\n",
        );

        let result = engine
            .sync(dir.path(), "markdown", ConflictStrategy::Merge, "sync", None)
            .await
            .unwrap();
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.updated, 0);

        let (_, state) = engine.reader.get_current("svc-1").await.unwrap().unwrap();
        assert_eq!(state.props["status"], json!("graph-side"));
        assert_eq!(state.props["description"], json!("doc-side"));
    }

    #[tokio::test]
    async fn fail_strategy_aborts_without_applying() {
        let engine = engine();
        let dir = tempfile::tempdir().unwrap();
        engine
            .pipeline
            .upsert("Service", Some("svc-1"), &props(json!({"name": "X"})), "alice")
            .await
            .unwrap();
        write_doc(dir.path(), "svc-1", "_syncHash: stale\nname: Y\n");
        write_doc(dir.path(), "svc-2", "_syncHash: none\nname: New\n");

        let err = engine
            .sync(dir.path(), "markdown", ConflictStrategy::Fail, "sync", None)
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::Conflict { .. }));

        // Nothing applied: svc-2 was not created.
        assert!(engine.reader.get_current("svc-2").await.unwrap().is_none());
        let (_, state) = engine.reader.get_current("svc-1").await.unwrap().unwrap();
        assert_eq!(state.version, 1);
    }

    #[tokio::test]
    async fn deleted_entity_doc_is_removed() {
        let engine = engine();
        let dir = tempfile::tempdir().unwrap();
        engine
            .pipeline
            .upsert("Service", Some("svc-1"), &props(json!({"name": "X"})), "alice")
            .await
            .unwrap();
        engine
            .sync(dir.path(), "markdown", ConflictStrategy::GraphWins, "sync", None)
            .await
            .unwrap();
        assert!(dir.path().join("Service/svc-1.md").exists());

        engine.pipeline.delete("svc-1", "alice").await.unwrap();
        let result = engine
            .sync(dir.path(), "markdown", ConflictStrategy::GraphWins, "sync", None)
            .await
            .unwrap();
        assert_eq!(result.deleted, 1);
        assert!(!dir.path().join("Service/svc-1.md").exists());
    }

    #[test]
    fn strategy_parses_from_kebab_case() {
        assert_eq!(
            "graph-wins".parse::<ConflictStrategy>().unwrap(),
            ConflictStrategy::GraphWins
        );
        assert_eq!(
            "merge".parse::<ConflictStrategy>().unwrap(),
            ConflictStrategy::Merge
        );
        assert!("chaos".parse::<ConflictStrategy>().is_err());
    }
}
