//! 128-bit integer sub-field codec.
//!
//! The store cannot sort native 128-bit integers, so ordered `uint128` /
//! `int128` fields keep their sort key in a binary sub-document:
//! `{ <field>: { binary: <16 bytes> } }`. The encoding is big-endian with
//! the sign bit flipped for signed values, which makes bytewise
//! lexicographic order equal numeric order, negatives included. Queries and
//! physical index keys address the sub-field as `<field>.binary`.

use chainstore_common::value::{Document, Value};

/// Name of the binary sub-field.
pub const BINARY_FIELD: &str = "binary";

/// True for ABI types stored through this codec.
pub fn is_bigint_type(type_name: &str) -> bool {
    type_name == "uint128" || type_name == "int128"
}

pub fn encode_u128(value: u128) -> [u8; 16] {
    value.to_be_bytes()
}

pub fn encode_i128(value: i128) -> [u8; 16] {
    ((value as u128) ^ (1u128 << 127)).to_be_bytes()
}

pub fn decode_u128(bytes: &[u8]) -> Option<u128> {
    let arr: [u8; 16] = bytes.try_into().ok()?;
    Some(u128::from_be_bytes(arr))
}

pub fn decode_i128(bytes: &[u8]) -> Option<i128> {
    let arr: [u8; 16] = bytes.try_into().ok()?;
    Some((u128::from_be_bytes(arr) ^ (1u128 << 127)) as i128)
}

/// Wrap a numeric value into its stored `{ binary: … }` form. Non-numeric
/// values pass through unchanged.
pub fn to_stored(type_name: &str, value: &Value) -> Value {
    let bytes = match (type_name, value) {
        ("uint128", Value::Uint128(v)) => encode_u128(*v),
        ("uint128", Value::Uint(v)) => encode_u128(*v as u128),
        ("uint128", Value::Int(v)) if *v >= 0 => encode_u128(*v as u128),
        ("int128", Value::Int128(v)) => encode_i128(*v),
        ("int128", Value::Int(v)) => encode_i128(*v as i128),
        ("int128", Value::Uint(v)) => encode_i128(*v as i128),
        _ => return value.clone(),
    };
    let mut doc = Document::new();
    doc.insert(BINARY_FIELD, Value::Binary(bytes.to_vec()));
    Value::Object(doc)
}

/// Unwrap a stored `{ binary: … }` form back to its numeric value. Values
/// that are not in stored form pass through unchanged.
pub fn from_stored(type_name: &str, value: &Value) -> Value {
    let Some(doc) = value.as_object() else {
        return value.clone();
    };
    let Some(Value::Binary(bytes)) = doc.get(BINARY_FIELD) else {
        return value.clone();
    };
    match type_name {
        "uint128" => decode_u128(bytes).map(Value::Uint128),
        "int128" => decode_i128(bytes).map(Value::Int128),
        _ => None,
    }
    .unwrap_or_else(|| value.clone())
}

/// The bound-document value for an ordered big-int field: raw sortable
/// bytes, addressed at `<field>.binary`.
pub fn to_bound_bytes(type_name: &str, value: &Value) -> Value {
    match to_stored(type_name, value) {
        Value::Object(doc) => doc.get(BINARY_FIELD).cloned().unwrap_or_else(|| value.clone()),
        other => other,
    }
}

#[cfg(test)]
mod bigint_tests {
    use super::*;

    #[test]
    fn test_unsigned_order_is_bytewise() {
        let values = [0u128, 1, u64::MAX as u128, (u64::MAX as u128) + 1, 1 << 127, u128::MAX];
        for pair in values.windows(2) {
            assert!(
                encode_u128(pair[0]) < encode_u128(pair[1]),
                "{} < {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_signed_order_is_bytewise() {
        let values = [i128::MIN, -1, 0, 1, i128::MAX];
        for pair in values.windows(2) {
            assert!(
                encode_i128(pair[0]) < encode_i128(pair[1]),
                "{} < {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_roundtrip() {
        for v in [0u128, 42, 1 << 100, u128::MAX] {
            assert_eq!(decode_u128(&encode_u128(v)), Some(v));
        }
        for v in [i128::MIN, -7, 0, 9, i128::MAX] {
            assert_eq!(decode_i128(&encode_i128(v)), Some(v));
        }
    }

    #[test]
    fn test_stored_form_roundtrip() {
        let original = Value::Uint128(1 << 77);
        let stored = to_stored("uint128", &original);
        assert!(stored.is_object());
        assert_eq!(from_stored("uint128", &stored), original);
    }

    #[test]
    fn test_small_numeric_widths_promote() {
        assert_eq!(
            to_bound_bytes("uint128", &Value::Uint(5)),
            Value::Binary(encode_u128(5).to_vec())
        );
        assert_eq!(
            to_bound_bytes("int128", &Value::Int(-5)),
            Value::Binary(encode_i128(-5).to_vec())
        );
    }
}
