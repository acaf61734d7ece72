//! Helpers for constructing and reading Qdrant point payloads.

use crate::processing::types::Chunk;
use crate::store::ChunkRecord;
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use time::OffsetDateTime;
use uuid::Uuid;

/// Payload field holding chunk text; carries the full-text index used by hybrid search.
pub(crate) const CONTENT_FIELD: &str = "content";
const METADATA_FIELD: &str = "metadata";

/// Serialize one record into a Qdrant point.
pub(crate) fn build_point(record: ChunkRecord, indexed_at: &str) -> Value {
    let ChunkRecord {
        chunk,
        vector,
        source,
    } = record;
    json!({
        "id": generate_point_id(),
        "vector": vector,
        "payload": build_payload(&chunk, source.as_deref(), indexed_at),
    })
}

/// Build the payload object stored alongside each indexed chunk.
pub(crate) fn build_payload(chunk: &Chunk, source: Option<&str>, indexed_at: &str) -> Value {
    let mut payload = Map::new();
    payload.insert(
        CONTENT_FIELD.into(),
        Value::String(chunk.content.clone()),
    );
    payload.insert(
        METADATA_FIELD.into(),
        Value::Object(
            chunk
                .metadata
                .iter()
                .map(|(label, heading)| (label.clone(), Value::String(heading.clone())))
                .collect(),
        ),
    );
    payload.insert(
        "chunk_hash".into(),
        Value::String(compute_chunk_hash(&chunk.content)),
    );
    payload.insert("indexed_at".into(), Value::String(indexed_at.to_string()));

    if let Some(source) = source.filter(|value| !value.is_empty()) {
        payload.insert("source".into(), Value::String(source.to_string()));
    }

    Value::Object(payload)
}

/// Recover a chunk from a stored payload. Returns `None` when `content` is missing.
pub(crate) fn chunk_from_payload(payload: &Map<String, Value>) -> Option<Chunk> {
    let content = payload.get(CONTENT_FIELD)?.as_str()?.to_string();
    let metadata: BTreeMap<String, String> = payload
        .get(METADATA_FIELD)
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(label, heading)| {
                    heading.as_str().map(|text| (label.clone(), text.to_string()))
                })
                .collect()
        })
        .unwrap_or_default();
    Some(Chunk::new(content, metadata))
}

/// Compute a deterministic SHA-256 hash for the chunk text.
pub fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)
}

/// Current timestamp formatted for payload storage.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

fn generate_point_id() -> String {
    Uuid::new_v4().to_string()
}
