//! # Canonical Serialization
//!
//! `CanonicalBytes` is the only input accepted by [`crate::sha256_digest`].
//! Values are serialized to JSON, checked for floats, then rendered with
//! `serde_jcs` (RFC 8785): sorted keys, compact separators, one byte
//! sequence per logical value.
//!
//! Floats are rejected because monetary amounts must travel as decimal
//! strings. A float that slipped into an audit record would make the
//! digest depend on formatting rather than on the amount.

use serde::Serialize;
use serde_json::Value;

use crate::error::CanonicalizationError;

/// Bytes produced by JCS canonicalization. The inner buffer is private.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Canonicalize any serializable value.
    pub fn new(obj: &impl Serialize) -> Result<Self, CanonicalizationError> {
        let value = serde_json::to_value(obj)?;
        reject_floats(&value)?;
        let bytes = serde_jcs::to_vec(&value)?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn reject_floats(value: &Value) -> Result<(), CanonicalizationError> {
    match value {
        Value::Null | Value::Bool(_) | Value::String(_) => Ok(()),
        Value::Number(n) => {
            if n.is_f64() {
                if let Some(f) = n.as_f64() {
                    return Err(CanonicalizationError::FloatRejected(f));
                }
            }
            Ok(())
        }
        Value::Array(items) => items.iter().try_for_each(reject_floats),
        Value::Object(map) => map.values().try_for_each(reject_floats),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_are_sorted() {
        let cb = CanonicalBytes::new(&json!({"b": 2, "a": 1, "c": {"z": true, "y": null}})).unwrap();
        assert_eq!(
            std::str::from_utf8(cb.as_bytes()).unwrap(),
            r#"{"a":1,"b":2,"c":{"y":null,"z":true}}"#
        );
    }

    #[test]
    fn test_floats_rejected_anywhere() {
        assert!(CanonicalBytes::new(&json!({"amount": 10.5})).is_err());
        assert!(CanonicalBytes::new(&json!([1, 2, [0.1]])).is_err());
    }

    #[test]
    fn test_decimal_strings_accepted() {
        let cb = CanonicalBytes::new(&json!({"amount": "1190.00"})).unwrap();
        assert!(!cb.is_empty());
    }
}
