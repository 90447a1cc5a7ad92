//! Content hashing over a canonical JSON encoding.
//!
//! Objects are written with keys sorted by code point, no whitespace, and
//! non-ASCII text left unescaped, so values that differ only in key order or
//! formatting hash identically.

use serde::Serialize;
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

pub fn canonical_json(value: &JsonValue) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &JsonValue, out: &mut String) {
    match value {
        JsonValue::Null | JsonValue::Bool(_) | JsonValue::Number(_) => {
            out.push_str(&value.to_string())
        }
        JsonValue::String(s) => write_string(s, out),
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
        JsonValue::Object(map) => {
            // serde_json's map is only sorted without `preserve_order`; don't rely on it.
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
    }
}

fn write_string(s: &str, out: &mut String) {
    out.push_str(&JsonValue::String(s.to_owned()).to_string());
}

/// SHA-256 hex digest of the canonical encoding of `value`.
pub fn content_digest(value: &JsonValue) -> String {
    sha256_hex(canonical_json(value).as_bytes())
}

/// Digest of any serializable value. Fails only when `value` cannot be
/// represented as JSON (for example a map with non-string keys).
pub fn digest_of<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(value)?;
    Ok(content_digest(&value))
}
