//! JSON encoding for documents.

use serde::Serialize;
use serde_json::Value;

use crate::error::{Result, StoreError};

/// Encodes a value the way documents are stored: pretty JSON plus newline.
pub fn encode<T: Serialize + ?Sized>(name: &str, value: &T) -> Result<Vec<u8>> {
    let mut bytes =
        serde_json::to_vec_pretty(value).map_err(|source| StoreError::Serialization {
            name: name.to_string(),
            source,
        })?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Parses stored bytes as a JSON tree.
pub fn decode(bytes: &[u8]) -> serde_json::Result<Value> {
    serde_json::from_slice(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn test_encode_is_pretty_with_newline() {
        let bytes = encode("doc", &json!({ "a": 1 })).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "{\n  \"a\": 1\n}\n");
    }

    #[test]
    fn test_encode_reports_unencodable_keys() {
        let mut map = BTreeMap::new();
        map.insert(vec![1u8, 2], 3);

        let err = encode("weird", &map).unwrap_err();
        assert!(matches!(err, StoreError::Serialization { ref name, .. } if name == "weird"));
    }

    #[test]
    fn test_decode() {
        assert_eq!(decode(b"[1, 2]").unwrap(), json!([1, 2]));
        assert!(decode(b"{\"a\":1,}").is_err());
    }
}
