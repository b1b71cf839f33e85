//! Parsing the document tree back into structured form.
//!
//! The parser is the inverse of the renderer: it walks the output tree,
//! splits each file into frontmatter and body, and returns the structured
//! pieces. Files without the `_id`/`_label` frontmatter keys are not
//! documents the graph owns; they are skipped with a warning rather than
//! aborting the walk.

use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

use crate::error::{GraphError, GraphResult};
use crate::types::PropMap;

/// One parsed document.
#[derive(Debug, Clone)]
pub struct ParsedDoc {
    pub file_path: PathBuf,
    pub relative_path: String,
    pub frontmatter: PropMap,
    pub content: String,
    pub raw: String,
}

impl ParsedDoc {
    pub fn id(&self) -> &str {
        self.frontmatter
            .get("_id")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
    }

    pub fn label(&self) -> &str {
        self.frontmatter
            .get("_label")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
    }

    pub fn sync_hash(&self) -> Option<&str> {
        self.frontmatter.get("_syncHash").and_then(JsonValue::as_str)
    }

    /// The document's user properties: every non-underscore frontmatter
    /// key.
    pub fn user_props(&self) -> PropMap {
        self.frontmatter
            .iter()
            .filter(|(k, _)| !k.starts_with('_'))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Split a raw document into YAML frontmatter and body.
fn split_frontmatter(raw: &str) -> Option<(&str, &str)> {
    let rest = raw.strip_prefix("---\n").or_else(|| raw.strip_prefix("---\r\n"))?;
    let fence = rest.find("\n---")?;
    let yaml = &rest[..fence + 1];
    let body = rest
        .get(fence + 4..)
        .unwrap_or("")
        .trim_start_matches(['\r', '\n']);
    Some((yaml, body))
}

/// Parse one document string. `Ok(None)` means the file is not a graph
/// document (missing fences or identity keys).
pub fn parse_doc(raw: &str, file_path: &Path, relative_path: &str) -> GraphResult<Option<ParsedDoc>> {
    let Some((yaml, body)) = split_frontmatter(raw) else {
        warn!(path = relative_path, "no frontmatter fences, skipping");
        return Ok(None);
    };
    let value: JsonValue = serde_yaml::from_str(yaml).map_err(|e| GraphError::Parse {
        path: relative_path.to_string(),
        reason: format!("frontmatter YAML: {e}"),
    })?;
    let Some(frontmatter) = value.as_object().cloned() else {
        warn!(path = relative_path, "frontmatter is not a mapping, skipping");
        return Ok(None);
    };
    let has_identity = frontmatter.get("_id").and_then(JsonValue::as_str).is_some()
        && frontmatter.get("_label").and_then(JsonValue::as_str).is_some();
    if !has_identity {
        warn!(path = relative_path, "missing _id or _label, skipping");
        return Ok(None);
    }
    Ok(Some(ParsedDoc {
        file_path: file_path.to_path_buf(),
        relative_path: relative_path.to_string(),
        frontmatter,
        content: body.trim_end().to_string(),
        raw: raw.to_string(),
    }))
}

/// Parse every `.{ext}` file under `dir`. A missing directory is an empty
/// tree. Unparseable files are skipped with a warning; I/O failures on the
/// directory itself are errors.
pub fn parse_tree(dir: &Path, ext: &str) -> GraphResult<Vec<ParsedDoc>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut docs = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| GraphError::Storage(format!("walk {}: {e}", dir.display())))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(ext) {
            continue;
        }
        let relative = path
            .strip_prefix(dir)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %relative, error = %e, "unreadable document, skipping");
                continue;
            }
        };
        match parse_doc(&raw, path, &relative) {
            Ok(Some(doc)) => docs.push(doc),
            Ok(None) => {}
            Err(e) => warn!(path = %relative, error = %e, "unparseable document, skipping"),
        }
    }
    Ok(docs)
}
