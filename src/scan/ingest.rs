//! Ingest: mapped entities into the graph, two passes.
//!
//! Pass one upserts every mapped entity under its deterministic id,
//! skipping entities whose normalized properties already match the graph.
//! Pass two resolves refs against the batch and creates edges for the ref
//! kinds the schema declares. One bad artifact never aborts the batch;
//! relationship failures are silent because the schema may not declare
//! every ref kind.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::error::GraphResult;
use crate::mutation::MutationPipeline;

use super::map::MappedEntity;
use super::parsers::ArtifactKind;

/// Deterministic entity identity: the first half of
/// `sha256(root ":" relativePath ":" kind ":" name)`, stable across runs.
pub fn entity_id(root: &str, relative_path: &str, kind: ArtifactKind, name: &str) -> String {
    let digest = Sha256::digest(format!("{root}:{relative_path}:{kind}:{name}").as_bytes());
    hex::encode(&digest[..16])
}

/// Counters from one ingest.
#[derive(Debug, Default, Clone, PartialEq, serde::Serialize)]
pub struct IngestStats {
    pub entities_upserted: usize,
    pub entities_skipped: usize,
    pub relationships_created: usize,
    pub errors: Vec<String>,
}

/// Ingest a batch of mapped entities under the given scan root.
pub async fn ingest(
    pipeline: &MutationPipeline,
    root: &str,
    batch: &[MappedEntity],
    actor: &str,
) -> GraphResult<IngestStats> {
    let mut stats = IngestStats::default();

    // Lookup tables for ref resolution, built over the whole batch.
    let mut by_id: HashMap<String, usize> = HashMap::new();
    let mut by_name: HashMap<&str, Vec<usize>> = HashMap::new();
    let mut file_by_path: HashMap<&str, usize> = HashMap::new();
    let mut ids = Vec::with_capacity(batch.len());

    for (i, entity) in batch.iter().enumerate() {
        let id = entity_id(
            root,
            &entity.artifact.file_path,
            entity.artifact.kind,
            &entity.artifact.name,
        );
        by_id.insert(id.clone(), i);
        by_name.entry(&entity.artifact.name).or_default().push(i);
        if entity.artifact.kind == ArtifactKind::File {
            file_by_path.insert(&entity.artifact.file_path, i);
        }
        ids.push(id);
    }

    // Pass 1: upsert, skipping no-op writes.
    let mut ingested = vec![false; batch.len()];
    for (i, entity) in batch.iter().enumerate() {
        let unchanged = match pipeline.store().get_current(&ids[i]).await? {
            Some((_, state)) => {
                // Compare against the normalized form the validator will
                // produce, or version numbers inflate on every scan.
                match pipeline
                    .registry()
                    .node_validator(&entity.label)
                    .and_then(|v| v.validate(&entity.props))
                {
                    Ok(normalized) => normalized == state.props,
                    Err(_) => false,
                }
            }
            None => false,
        };
        if unchanged {
            stats.entities_skipped += 1;
            ingested[i] = true;
            continue;
        }
        match pipeline
            .upsert(&entity.label, Some(&ids[i]), &entity.props, actor)
            .await
        {
            Ok(_) => {
                stats.entities_upserted += 1;
                ingested[i] = true;
            }
            Err(e) => {
                warn!(name = %entity.artifact.name, error = %e, "ingest skipped one entity");
                stats.errors.push(format!("{}: {e}", entity.artifact.name));
            }
        }
    }

    // Pass 2: refs become edges where the schema declares the type.
    for (i, entity) in batch.iter().enumerate() {
        if !ingested[i] {
            continue;
        }
        for artifact_ref in &entity.artifact.refs {
            let target_index = resolve_ref(
                &artifact_ref.target,
                &entity.artifact.file_path,
                batch,
                &by_id,
                &by_name,
                &file_by_path,
            );
            let Some(target_index) = target_index else {
                continue;
            };
            if !ingested[target_index] {
                continue;
            }
            let target = &batch[target_index];
            let edge_type = artifact_ref.kind.edge_type();
            match pipeline
                .relate(
                    &ids[i],
                    &ids[target_index],
                    edge_type,
                    &entity.label,
                    &target.label,
                    None,
                    actor,
                )
                .await
            {
                Ok(()) => stats.relationships_created += 1,
                // The schema may not declare this ref kind, or the edge
                // already exists from a prior scan.
                Err(e) => debug!(edge_type, error = %e, "ref not materialized"),
            }
        }
    }

    Ok(stats)
}

/// Resolve a ref target: direct id, then same-file name, then global
/// name, then file path for `file` targets.
fn resolve_ref(
    target: &str,
    from_file: &str,
    batch: &[MappedEntity],
    by_id: &HashMap<String, usize>,
    by_name: &HashMap<&str, Vec<usize>>,
    file_by_path: &HashMap<&str, usize>,
) -> Option<usize> {
    if let Some(&i) = by_id.get(target) {
        return Some(i);
    }
    if let Some(candidates) = by_name.get(target) {
        if let Some(&same_file) = candidates
            .iter()
            .find(|&&i| batch[i].artifact.file_path == from_file)
        {
            return Some(same_file);
        }
        if let Some(&first) = candidates.first() {
            return Some(first);
        }
    }
    // Module-specifier style targets resolve against file paths.
    let normalized = target.trim_start_matches("./").trim_start_matches('/');
    if let Some(&i) = file_by_path.get(normalized) {
        return Some(i);
    }
    for ext in [".ts", ".tsx", ".js", ".jsx", ".py", ".go"] {
        let with_ext = format!("{normalized}{ext}");
        if let Some(&i) = file_by_path.get(with_ext.as_str()) {
            return Some(i);
        }
        // Relative to the importing file's directory.
        if let Some(dir) = from_file.rsplit_once('/').map(|(d, _)| d) {
            let joined = format!("{dir}/{with_ext}");
            if let Some(&i) = file_by_path.get(joined.as_str()) {
                return Some(i);
            }
        }
    }
    None
}
