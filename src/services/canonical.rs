//! Canonical serialization and content digests.
//!
//! Deterministic identities (bundle ids, candidate digests, failure
//! signature ids, GOAP state digests) all hash the same canonical byte
//! form: JSON with recursively sorted object keys and no insignificant
//! whitespace. Hashed payloads carry integers only; anything continuous is
//! quantized before it gets here.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::domain::errors::{CoreError, CoreResult};

/// Serialize a value to canonical JSON bytes.
///
/// Object keys are sorted recursively; array order is preserved (callers
/// sort arrays that are semantically sets before encoding).
pub fn canonical_json_bytes<T: Serialize>(value: &T) -> CoreResult<Vec<u8>> {
    let value = serde_json::to_value(value)?;
    let canonical = canonicalize_value(value);
    Ok(serde_json::to_vec(&canonical)?)
}

/// Recursively rebuild a value with sorted object keys.
fn canonicalize_value(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = serde_json::Map::new();
            for (key, inner) in entries {
                sorted.insert(key, canonicalize_value(inner));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize_value).collect()),
        other => other,
    }
}

/// Full SHA-256 content digest, hex encoded.
pub fn content_digest_full<T: Serialize>(value: &T) -> CoreResult<String> {
    let bytes = canonical_json_bytes(value)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// 16-hex content digest: the first 8 bytes of the SHA-256.
///
/// Infallible form: serialization of in-memory domain values does not fail
/// in practice; if it somehow does, the digest of the error string keeps the
/// function total without masking the problem in logs.
pub fn content_digest16<T: Serialize>(value: &T) -> String {
    match content_digest_full(value) {
        Ok(full) => full[..16].to_string(),
        Err(err) => {
            tracing::error!(error = %err, "canonical digest failed; hashing error text");
            let mut hasher = Sha256::new();
            hasher.update(err.to_string().as_bytes());
            hex::encode(hasher.finalize())[..16].to_string()
        }
    }
}

/// Canonicalize an arbitrary JSON payload for wire transmission.
pub fn canonicalize_payload(payload: &Value) -> CoreResult<Value> {
    let bytes = canonical_json_bytes(payload)?;
    serde_json::from_slice(&bytes).map_err(|e| CoreError::SchemaInvalid(e.to_string()))
}
