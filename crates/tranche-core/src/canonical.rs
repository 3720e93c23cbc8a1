//! # Canonical Serialization: JCS Byte Production
//!
//! `CanonicalBytes` is the only input accepted for signing attestations and
//! for hashing vesting configurations into settlement leaves.
//!
//! ## Security Invariant
//!
//! The inner `Vec<u8>` is private and the only constructor is
//! [`CanonicalBytes::new()`], which rejects floats and then serializes with
//! RFC 8785 (JSON Canonicalization Scheme): sorted keys, compact separators.
//! An off-ledger signer and the sale therefore agree on the exact bytes of
//! every attestation regardless of field order in the source document.

use serde::Serialize;
use serde_json::Value;

use crate::error::CanonicalizationError;

/// Bytes produced exclusively by JCS canonicalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Construct canonical bytes from any serializable value.
    ///
    /// # Errors
    ///
    /// `FloatRejected` if the value contains a non-integer number,
    /// `SerializationFailed` if JSON conversion fails (for example a bare
    /// `u128` above `u64::MAX`; use [`crate::amount::decimal`]).
    pub fn new(obj: &impl Serialize) -> Result<Self, CanonicalizationError> {
        let value = serde_json::to_value(obj)?;
        reject_floats(&value)?;
        let s = serde_jcs::to_string(&value)?;
        Ok(Self(s.into_bytes()))
    }

    /// Access the canonical bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the length of the canonical byte sequence.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the canonical byte sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

fn reject_floats(value: &Value) -> Result<(), CanonicalizationError> {
    match value {
        Value::Null | Value::Bool(_) | Value::String(_) => Ok(()),
        Value::Number(n) => {
            if n.is_f64() && !n.is_i64() && !n.is_u64() {
                if let Some(f) = n.as_f64() {
                    return Err(CanonicalizationError::FloatRejected(f));
                }
            }
            Ok(())
        }
        Value::Object(map) => map.values().try_for_each(reject_floats),
        Value::Array(arr) => arr.iter().try_for_each(reject_floats),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_keys_compact() {
        let data = serde_json::json!({"b": 2, "a": 1, "c": "hello"});
        let cb = CanonicalBytes::new(&data).unwrap();
        assert_eq!(cb.as_bytes(), br#"{"a":1,"b":2,"c":"hello"}"#);
    }

    #[test]
    fn test_nested_objects_sorted() {
        let data = serde_json::json!({"outer": {"b": 2, "a": 1}, "list": [3, 2, 1]});
        let cb = CanonicalBytes::new(&data).unwrap();
        assert_eq!(cb.as_bytes(), br#"{"list":[3,2,1],"outer":{"a":1,"b":2}}"#);
    }

    #[test]
    fn test_float_rejection() {
        let data = serde_json::json!({"nested": [{"amount": 1.5}]});
        match CanonicalBytes::new(&data) {
            Err(CanonicalizationError::FloatRejected(f)) => assert_eq!(f, 1.5),
            other => panic!("expected FloatRejected, got {other:?}"),
        }
    }

    #[test]
    fn test_field_order_independent() {
        #[derive(Serialize)]
        struct Ab {
            a: u64,
            b: &'static str,
        }
        #[derive(Serialize)]
        struct Ba {
            b: &'static str,
            a: u64,
        }
        let x = CanonicalBytes::new(&Ab { a: 1, b: "x" }).unwrap();
        let y = CanonicalBytes::new(&Ba { b: "x", a: 1 }).unwrap();
        assert_eq!(x, y);
    }
}
