//! Deterministic JSON encoding.
//!
//! Two payloads that are logically equal encode to identical bytes:
//!
//! - object keys are emitted in byte order at every nesting level
//! - no insignificant whitespace
//! - integral floats within ±2^53 are written as integers (`5.0` → `5`)
//! - other floats use the shortest round-trip form
//! - strings are UTF-8 with JSON escaping
//!
//! Array element order is preserved and is part of the value: `["a","b"]`
//! and `["b","a"]` encode, and therefore hash, differently. Producers that
//! treat a list as a set must sort it before committing.

use serde::Serialize;
use serde_json::{Number, Value};

/// Deepest nesting accepted before encoding gives up.
pub const MAX_DEPTH: usize = 128;

/// Largest integer magnitude an f64 represents exactly (2^53).
const MAX_SAFE_INT: f64 = 9_007_199_254_740_992.0;

/// Errors from canonical encoding.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CanonicalError {
    #[error("value is not serializable: {0}")]
    Serialization(String),

    #[error("value nests deeper than {max} levels")]
    TooDeep { max: usize },
}

/// Canonical bytes of a structured value.
pub fn canonicalize(value: &Value) -> Result<Vec<u8>, CanonicalError> {
    let mut out = Vec::with_capacity(64);
    write_value(&mut out, value, 0)?;
    Ok(out)
}

/// Canonical encoding as a `String`.
pub fn canonical_string(value: &Value) -> Result<String, CanonicalError> {
    let bytes = canonicalize(value)?;
    String::from_utf8(bytes).map_err(|e| CanonicalError::Serialization(e.to_string()))
}

/// Canonical bytes of any serializable value.
///
/// Fails for values JSON cannot represent, such as maps with non-string keys.
pub fn canonicalize_serializable<T: Serialize>(value: &T) -> Result<Vec<u8>, CanonicalError> {
    let value =
        serde_json::to_value(value).map_err(|e| CanonicalError::Serialization(e.to_string()))?;
    canonicalize(&value)
}

fn write_value(out: &mut Vec<u8>, value: &Value, depth: usize) -> Result<(), CanonicalError> {
    if depth > MAX_DEPTH {
        return Err(CanonicalError::TooDeep { max: MAX_DEPTH });
    }

    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(n) => write_number(out, n),
        Value::String(s) => write_str(out, s)?,
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(out, item, depth + 1)?;
            }
            out.push(b']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_unstable_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

            out.push(b'{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_str(out, key)?;
                out.push(b':');
                write_value(out, item, depth + 1)?;
            }
            out.push(b'}');
        }
    }
    Ok(())
}

fn write_number(out: &mut Vec<u8>, n: &Number) {
    if n.is_i64() || n.is_u64() {
        out.extend_from_slice(n.to_string().as_bytes());
        return;
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INT => {
            out.extend_from_slice((f as i64).to_string().as_bytes());
        }
        _ => out.extend_from_slice(n.to_string().as_bytes()),
    }
}

fn write_str(out: &mut Vec<u8>, s: &str) -> Result<(), CanonicalError> {
    serde_json::to_writer(&mut *out, s).map_err(|e| CanonicalError::Serialization(e.to_string()))
}
