//! Deterministic content hashing for reconciliation.
//!
//! The sync hash is the sole content identity of an entity's user
//! properties: temporal metadata is stripped, the remainder is
//! canonicalized (stable key order, preserved list order), and the result
//! is digested to 160 bits of lowercase hex. Two states hash equal exactly
//! when their user-property projections are deep-equal.

use serde_json::Value as JsonValue;
use sha1::{Digest, Sha1};

use crate::types::PropMap;

/// Compute the 160-bit sync hash of a state's user properties.
pub fn compute_sync_hash(props: &PropMap) -> String {
    let stripped: PropMap = props
        .iter()
        .filter(|(k, _)| !k.starts_with('_'))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let mut canonical = String::new();
    write_canonical(&JsonValue::Object(stripped), &mut canonical);
    let digest = Sha1::digest(canonical.as_bytes());
    hex::encode(digest)
}

/// Serialize a JSON value with object keys sorted at every depth.
///
/// Numbers, booleans, and nulls keep their serde_json rendering; lists
/// retain order.
fn write_canonical(value: &JsonValue, out: &mut String) {
    match value {
        JsonValue::Object(map) => {
            out.push('{');
            let mut keys: Vec<_> = map.keys().collect();
            keys.sort();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&JsonValue::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        JsonValue::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
