//! Format adapters.
//!
//! A format adapter owns the cosmetic choices of one documentation
//! framework: file extension, frontmatter shape, diagram fencing, and an
//! optional index page. The projection core stays framework-agnostic;
//! adapters must preserve the reserved frontmatter keys (`_id`, `_label`,
//! `_syncHash`, `_version`) or reconciliation loses its content identity.

use serde_json::json;
use std::sync::Arc;

use crate::types::{Entity, EntityState, PropMap};

/// One documentation framework's rendering conventions.
pub trait FormatAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Target file extension, without the dot.
    fn extension(&self) -> &str {
        "md"
    }

    /// Reshape frontmatter for the framework. Reserved keys must survive.
    fn transform_frontmatter(&self, frontmatter: PropMap) -> PropMap {
        frontmatter
    }

    /// Fence a relationship diagram for the framework.
    fn wrap_diagram(&self, code: &str) -> String {
        format!("```mermaid\n{code}\n```")
    }

    /// Optional index page over all rendered entities: `(relative path,
    /// contents)`.
    fn generate_index(&self, _entities: &[(Entity, EntityState)]) -> Option<(String, String)> {
        None
    }
}

/// The default adapter: plain markdown, frontmatter as-is.
pub struct PassthroughAdapter;

impl FormatAdapter for PassthroughAdapter {
    fn name(&self) -> &str {
        "markdown"
    }
}

/// Obsidian vault flavor: aliases the entity name so graph view and
/// quick-switcher resolve it.
pub struct ObsidianAdapter;

impl FormatAdapter for ObsidianAdapter {
    fn name(&self) -> &str {
        "obsidian"
    }

    fn transform_frontmatter(&self, mut frontmatter: PropMap) -> PropMap {
        if let Some(name) = frontmatter.get("name").and_then(|v| v.as_str()) {
            frontmatter.insert("aliases".to_string(), json!([name]));
        }
        frontmatter
    }
}

/// Resolve an adapter by name; unknown names fall back to pass-through.
pub fn adapter_for(name: &str) -> Arc<dyn FormatAdapter> {
    match name {
        "obsidian" => Arc::new(ObsidianAdapter),
        _ => Arc::new(PassthroughAdapter),
    }
}
