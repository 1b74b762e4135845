//! Canonical JSON encoding: UTF-8, key-sorted, compact separators, and
//! numeric formatting that round-trips floats exactly (`spec.md` §6).

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CanonicalJsonError {
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// Serialize `value` to its canonical byte representation.
///
/// `serde_json`'s default map type is insertion-ordered (we enable the
/// `preserve_order` feature upstream), so canonicalization walks the value
/// tree and sorts object keys explicitly rather than relying on a `BTreeMap`
/// everywhere a nested `custom` blob might appear.
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>, CanonicalJsonError> {
    let value = serde_json::to_value(value)?;
    let sorted = sort_keys(value);
    let mut buf = Vec::new();
    serde_json::to_writer(&mut buf, &sorted)?;
    Ok(buf)
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> =
                map.into_iter().map(|(k, v)| (k, sort_keys(v))).collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}
