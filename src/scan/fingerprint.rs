//! The fingerprint store: scan-to-scan memory.
//!
//! A JSON map of relative path → content fingerprint, persisted under
//! `<root>/.scanstate/fingerprints` and rewritten whole at the end of
//! every non-dry scan. The diff against the previous store is what makes
//! re-scans incremental.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{GraphError, GraphResult};

const STATE_DIR: &str = ".scanstate";
const STORE_FILE: &str = "fingerprints";

/// Content identity of one file at scan time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFingerprint {
    pub relative_path: String,
    /// 256-bit content digest, lowercase hex
    pub hash: String,
    pub size: u64,
    pub recorded_at: DateTime<Utc>,
}

/// The persisted map.
pub type FingerprintStore = BTreeMap<String, FileFingerprint>;

fn store_path(root: &Path) -> PathBuf {
    root.join(STATE_DIR).join(STORE_FILE)
}

/// Load the previous store; `None` on first scan.
pub fn load(root: &Path) -> GraphResult<Option<FingerprintStore>> {
    let path = store_path(root);
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(GraphError::Storage(format!("read {}: {e}", path.display()))),
    };
    let store = serde_json::from_str(&raw)?;
    Ok(Some(store))
}

/// Rewrite the store whole.
pub fn save(root: &Path, store: &FingerprintStore) -> GraphResult<()> {
    let path = store_path(root);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| GraphError::Storage(format!("create {}: {e}", parent.display())))?;
    }
    let raw = serde_json::to_string_pretty(store)?;
    std::fs::write(&path, raw)
        .map_err(|e| GraphError::Storage(format!("write {}: {e}", path.display())))?;
    Ok(())
}

/// The incremental diff between two stores.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct StoreDiff {
    pub added: Vec<String>,
    pub changed: Vec<String>,
    pub removed: Vec<String>,
}

/// Compare the fresh fingerprints against the previous store.
pub fn diff(previous: &FingerprintStore, current: &FingerprintStore) -> StoreDiff {
    let mut out = StoreDiff::default();
    for (path, fingerprint) in current {
        match previous.get(path) {
            None => out.added.push(path.clone()),
            Some(old) if old.hash != fingerprint.hash => out.changed.push(path.clone()),
            Some(_) => {}
        }
    }
    for path in previous.keys() {
        if !current.contains_key(path) {
            out.removed.push(path.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(path: &str, hash: &str) -> FileFingerprint {
        FileFingerprint {
            relative_path: path.to_string(),
            hash: hash.to_string(),
            size: 10,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(dir.path()).unwrap().is_none());

        let mut store = FingerprintStore::new();
        store.insert("a.ts".to_string(), fp("a.ts", "h1"));
        save(dir.path(), &store).unwrap();

        let loaded = load(dir.path()).unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["a.ts"].hash, "h1");
    }

    #[test]
    fn diff_classifies_added_changed_removed() {
        let mut previous = FingerprintStore::new();
        previous.insert("same.ts".to_string(), fp("same.ts", "h1"));
        previous.insert("edited.ts".to_string(), fp("edited.ts", "h2"));
        previous.insert("gone.ts".to_string(), fp("gone.ts", "h3"));

        let mut current = FingerprintStore::new();
        current.insert("same.ts".to_string(), fp("same.ts", "h1"));
        current.insert("edited.ts".to_string(), fp("edited.ts", "h2-new"));
        current.insert("fresh.ts".to_string(), fp("fresh.ts", "h4"));

        let d = diff(&previous, &current);
        assert_eq!(d.added, vec!["fresh.ts"]);
        assert_eq!(d.changed, vec!["edited.ts"]);
        assert_eq!(d.removed, vec!["gone.ts"]);
    }
}
