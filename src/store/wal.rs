//! Write-ahead persistence for the embedded store.
//!
//! Every committed mutation appends one checksummed JSON line to
//! `graph.wal` under the store directory; the log is the history, and
//! startup replays it to rebuild the in-memory graph. A corrupt tail
//! (torn write, truncation) stops replay at the last good record.
//!
//! # Log entry format
//!
//! ```text
//! {"version":1,"seq":42,"op":{...},"checksum":"crc32:deadbeef"}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::warn;

use crate::error::{GraphError, GraphResult};
use crate::types::{AuditEntry, Entity, EntityState, Relationship};

/// Current WAL format version.
const WAL_VERSION: u32 = 1;

const WAL_FILE: &str = "graph.wal";

/// One replayable mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum WalOp {
    CreateEntity {
        entity: Entity,
        state: EntityState,
        audit: AuditEntry,
    },
    UpdateEntity {
        state: EntityState,
        closed_at: DateTime<Utc>,
        audit: AuditEntry,
    },
    SoftDelete {
        id: String,
        at: DateTime<Utc>,
        by: String,
        audit: AuditEntry,
    },
    CreateRelationship {
        relationship: Relationship,
        audit: AuditEntry,
    },
    CloseRelationship {
        from_id: String,
        to_id: String,
        rel_type: String,
        at: DateTime<Utc>,
        audit: AuditEntry,
    },
}

fn checksum_of(payload: &str) -> String {
    format!("crc32:{:08x}", crc32fast::hash(payload.as_bytes()))
}

fn payload_json(seq: u64, op: &WalOp) -> GraphResult<JsonValue> {
    Ok(serde_json::json!({
        "version": WAL_VERSION,
        "seq": seq,
        "op": serde_json::to_value(op)?,
    }))
}

/// Append-only writer over the store's WAL file.
#[derive(Debug)]
pub(crate) struct WalWriter {
    path: PathBuf,
    seq: AtomicU64,
    file: tokio::sync::Mutex<fs::File>,
}

impl WalWriter {
    /// Open (creating if needed) the WAL under `dir`, positioned after the
    /// last replayed sequence number.
    pub(crate) async fn open(dir: &Path, last_seq: u64) -> GraphResult<Self> {
        fs::create_dir_all(dir)
            .await
            .map_err(|e| GraphError::Storage(format!("create store dir: {e}")))?;
        let path = dir.join(WAL_FILE);
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| GraphError::Storage(format!("open WAL: {e}")))?;
        Ok(Self {
            path,
            seq: AtomicU64::new(last_seq),
            file: tokio::sync::Mutex::new(file),
        })
    }

    /// Append one mutation; flushes before returning.
    pub(crate) async fn append(&self, op: &WalOp) -> GraphResult<()> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let payload = payload_json(seq, op)?;
        let payload_str = payload.to_string();
        let mut record = payload;
        record["checksum"] = JsonValue::String(checksum_of(&payload_str));

        let mut line = record.to_string();
        line.push('\n');

        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| GraphError::Storage(format!("WAL append ({}): {e}", self.path.display())))?;
        file.flush()
            .await
            .map_err(|e| GraphError::Storage(format!("WAL flush: {e}")))?;
        Ok(())
    }
}

/// Replay the WAL under `dir`, returning the ops in append order and the
/// last good sequence number. A missing file is an empty log.
pub(crate) async fn replay(dir: &Path) -> GraphResult<(Vec<WalOp>, u64)> {
    let path = dir.join(WAL_FILE);
    let file = match fs::File::open(&path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(e) => return Err(GraphError::Storage(format!("open WAL for replay: {e}"))),
    };

    let mut ops = Vec::new();
    let mut last_seq = 0u64;
    let mut lines = BufReader::new(file).lines();
    let mut line_no = 0usize;
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| GraphError::Storage(format!("read WAL: {e}")))?
    {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        match decode_line(&line) {
            Ok((seq, op)) => {
                last_seq = seq;
                ops.push(op);
            }
            Err(reason) => {
                // Torn tail: keep what replayed cleanly.
                warn!(line = line_no, %reason, "WAL replay stopped at corrupt record");
                break;
            }
        }
    }
    Ok((ops, last_seq))
}

fn decode_line(line: &str) -> Result<(u64, WalOp), String> {
    let mut record: JsonValue =
        serde_json::from_str(line).map_err(|e| format!("malformed JSON: {e}"))?;
    let Some(obj) = record.as_object_mut() else {
        return Err("record is not an object".to_string());
    };
    let Some(JsonValue::String(checksum)) = obj.remove("checksum") else {
        return Err("missing checksum".to_string());
    };
    let seq = obj
        .get("seq")
        .and_then(JsonValue::as_u64)
        .ok_or_else(|| "missing seq".to_string())?;
    let op_value = obj
        .get("op")
        .cloned()
        .ok_or_else(|| "missing op".to_string())?;

    // Reconstruct the exact payload the writer hashed.
    let op: WalOp = serde_json::from_value(op_value)
        .map_err(|e| format!("undecodable op: {e}"))?;
    let payload = payload_json(seq, &op)
        .map_err(|e| format!("re-encode: {e}"))?
        .to_string();
    if checksum_of(&payload) != checksum {
        return Err("checksum mismatch".to_string());
    }
    Ok((seq, op))
}
