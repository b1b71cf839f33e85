//! Document projection: entity state as a tree of human-readable files.
//!
//! The renderer stamps each document with a deterministic sync hash; the
//! parser reads the tree back into structured form. Together they give the
//! reconciliation engine its doc-side view of the world.

mod adapter;
mod hash;
mod parse;
mod render;

pub use adapter::{adapter_for, FormatAdapter, ObsidianAdapter, PassthroughAdapter};
pub use hash::compute_sync_hash;
pub use parse::{parse_doc, parse_tree, ParsedDoc};
pub use render::{DocumentProjector, RenderStats, RenderedDoc};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Entity, EntityState};
    use chrono::Utc;
    use serde_json::json;
    use std::sync::Arc;

    /// parse(render(e)) must reproduce the user properties and sync
    /// metadata exactly.
    #[test]
    fn render_parse_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let projector = DocumentProjector::new(dir.path(), Arc::new(PassthroughAdapter));

        let entity = Entity {
            id: "svc-1".to_string(),
            label: "Service".to_string(),
            created_at: Utc::now(),
            deleted_at: None,
            deleted_by: None,
        };
        let props = json!({
            "name": "Auth",
            "port": 8080,
            "enabled": true,
            "tags": ["core", "infra"],
            "content": "The **auth** service.",
        });
        let state = EntityState {
            entity_id: "svc-1".to_string(),
            version: 3,
            valid_from: Utc::now(),
            valid_to: None,
            recorded_at: Utc::now(),
            actor: "test".to_string(),
            props: props.as_object().unwrap().clone(),
        };

        let doc = projector.render(&entity, &state, &[]).unwrap();
        projector.write(&doc).unwrap();

        let parsed = parse_tree(dir.path(), "md").unwrap();
        assert_eq!(parsed.len(), 1);
        let parsed = &parsed[0];

        assert_eq!(parsed.id(), "svc-1");
        assert_eq!(parsed.label(), "Service");
        assert_eq!(parsed.frontmatter["_version"], json!(3));
        assert_eq!(
            parsed.sync_hash(),
            Some(compute_sync_hash(&state.props).as_str())
        );
        assert_eq!(parsed.user_props(), state.props);
    }
}
