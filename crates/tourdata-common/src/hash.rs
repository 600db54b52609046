//! Content fingerprints for raw API items
//!
//! A fingerprint is the lowercase hex SHA-256 digest of the item's canonical
//! JSON text. Canonical text sorts object keys recursively (array order is
//! kept) and uses `", "` / `": "` separators with non-ASCII characters
//! written verbatim, the same text Python's
//! `json.dumps(item, sort_keys=True, ensure_ascii=False)` produces. Rows
//! stored by earlier tooling therefore keep matching digests.

use crate::error::Result;
use serde::Serialize;
use serde_json::ser::{Formatter, Serializer};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::io;
use tracing::warn;

/// SHA-256 of the empty string.
///
/// Returned when an item cannot be serialized. Two records carrying this
/// digest are not known to be equal.
pub const EMPTY_DIGEST: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// JSON formatter using Python's default item and key separators
struct CanonicalFormatter;

impl Formatter for CanonicalFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

/// Rebuild `value` with every object's keys in ascending order
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, inner)| (key.clone(), canonicalize(inner)))
                    .collect(),
            )
        },
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Serialize `record` to its canonical JSON text
pub fn canonical_json<T: Serialize + ?Sized>(record: &T) -> Result<String> {
    let value = serde_json::to_value(record)?;
    let canonical = canonicalize(&value);

    let mut buffer = Vec::with_capacity(256);
    let mut serializer = Serializer::with_formatter(&mut buffer, CanonicalFormatter);
    canonical.serialize(&mut serializer)?;

    Ok(String::from_utf8(buffer)?)
}

/// Lowercase hex SHA-256 of raw bytes
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Fingerprint a record's content.
///
/// Key order never affects the result. Falls back to [`EMPTY_DIGEST`] when
/// the record cannot be represented as JSON.
pub fn data_hash<T: Serialize + ?Sized>(record: &T) -> String {
    match canonical_json(record) {
        Ok(text) => sha256_hex(text.as_bytes()),
        Err(e) => {
            warn!(error = %e, "Failed to serialize record for hashing, using empty digest");
            EMPTY_DIGEST.to_string()
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn test_canonical_json_matches_python_format() {
        let item = json!({"title": "한옥마을", "contentid": "126508", "tags": [2, 1]});
        let text = canonical_json(&item).unwrap();
        assert_eq!(text, r#"{"contentid": "126508", "tags": [2, 1], "title": "한옥마을"}"#);
    }

    #[test]
    fn test_nested_objects_are_sorted() {
        let item = json!({"b": {"z": 1, "a": {"y": null, "x": true}}, "a": []});
        let text = canonical_json(&item).unwrap();
        assert_eq!(text, r#"{"a": [], "b": {"a": {"x": true, "y": null}, "z": 1}}"#);
    }

    #[test]
    fn test_empty_digest_is_sha256_of_empty_string() {
        assert_eq!(sha256_hex(b""), EMPTY_DIGEST);
    }

    #[test]
    fn test_known_digest() {
        assert_eq!(
            data_hash(&json!({})),
            "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
    }

    #[test]
    fn test_unserializable_record_falls_back() {
        let mut record = BTreeMap::new();
        record.insert(vec![1u8, 2], "binary key");
        assert_eq!(data_hash(&record), EMPTY_DIGEST);
    }

    #[test]
    fn test_value_change_changes_digest() {
        let before = json!({"contentid": "1", "tel": "063-123-4567"});
        let after = json!({"contentid": "1", "tel": "063-123-4568"});
        assert_ne!(data_hash(&before), data_hash(&after));
    }

    #[test]
    fn test_array_order_matters() {
        assert_ne!(data_hash(&json!({"a": [1, 2]})), data_hash(&json!({"a": [2, 1]})));
    }

    proptest! {
        #[test]
        fn prop_key_order_does_not_change_digest(
            entries in proptest::collection::btree_map("[a-zA-Z]{1,8}", "[ -~가-힣]{0,12}", 0..12)
        ) {
            let forward: serde_json::Map<String, Value> = entries
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            let reversed: serde_json::Map<String, Value> = entries
                .iter()
                .rev()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();

            prop_assert_eq!(
                data_hash(&Value::Object(forward)),
                data_hash(&Value::Object(reversed))
            );
        }
    }
}
