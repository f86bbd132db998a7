//! Canonical JSON for jsonvc.
//!
//! Every content-addressed object is hashed over a single canonical byte
//! form, unique up to JSON equivalence:
//! - Object keys are sorted lexicographically by code point
//! - Arrays preserve order
//! - Compact separators (`,` and `:`), no insignificant whitespace
//! - Non-ASCII characters are escaped, so the bytes are ASCII-safe
//! - Finite numbers only, formatted unambiguously
//!
//! `serde_json::to_vec` is not used for the byte form because it emits raw
//! UTF-8 for non-ASCII strings.

use std::fmt::Write as _;

use serde_json::{Map, Value};

use crate::errors::{VcError, VcResult};

/// Canonicalize a JSON value recursively.
///
/// Produces a new `Value` in which all objects (at any depth) have their
/// keys sorted. Array order is preserved.
pub fn canonicalize(value: &Value) -> VcResult<Value> {
    match value {
        Value::Object(map) => canonicalize_object(map),
        Value::Array(arr) => {
            let mut out = Vec::with_capacity(arr.len());
            for v in arr {
                out.push(canonicalize(v)?);
            }
            Ok(Value::Array(out))
        }
        _ => Ok(value.clone()),
    }
}

fn canonicalize_object(map: &Map<String, Value>) -> VcResult<Value> {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();

    let mut out = Map::new();
    for k in keys {
        let v = map
            .get(k)
            .ok_or_else(|| VcError::serialization("key disappeared during canonicalization"))?;
        out.insert(k.clone(), canonicalize(v)?);
    }

    Ok(Value::Object(out))
}

/// Convert a JSON value into its canonical UTF-8 (ASCII-safe) byte form.
///
/// This representation is stable across machines and runs and is the sole
/// input to content hashing.
pub fn to_canonical_bytes(value: &Value) -> VcResult<Vec<u8>> {
    let mut out = Vec::new();
    write_value(value, &mut out)?;
    Ok(out)
}

/// Canonical form as a string. Always pure ASCII.
pub fn to_canonical_string(value: &Value) -> VcResult<String> {
    let bytes = to_canonical_bytes(value)?;
    String::from_utf8(bytes)
        .map_err(|_| VcError::serialization("canonical bytes are not valid UTF-8"))
}

/// Compare two JSON values for canonical equality.
///
/// Returns true if their canonical forms are byte-equal.
pub fn canonical_eq(a: &Value, b: &Value) -> VcResult<bool> {
    let ba = to_canonical_bytes(a)?;
    let bb = to_canonical_bytes(b)?;
    Ok(ba == bb)
}

fn write_value(value: &Value, out: &mut Vec<u8>) -> VcResult<()> {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if !f.is_finite() {
                    return Err(VcError::serialization(
                        "non-finite numbers cannot be canonicalized",
                    ));
                }
            }
            out.extend_from_slice(n.to_string().as_bytes());
        }
        Value::String(s) => write_string(s, out),
        Value::Array(arr) => {
            out.push(b'[');
            for (i, v) in arr.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(v, out)?;
            }
            out.push(b']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push(b'{');
            for (i, k) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_string(k, out);
                out.push(b':');
                let v = map.get(*k).ok_or_else(|| {
                    VcError::serialization("key disappeared during canonicalization")
                })?;
                write_value(v, out)?;
            }
            out.push(b'}');
        }
    }
    Ok(())
}

fn write_string(s: &str, out: &mut Vec<u8>) {
    out.push(b'"');
    for c in s.chars() {
        match c {
            '"' => out.extend_from_slice(b"\\\""),
            '\\' => out.extend_from_slice(b"\\\\"),
            '\u{08}' => out.extend_from_slice(b"\\b"),
            '\u{0c}' => out.extend_from_slice(b"\\f"),
            '\n' => out.extend_from_slice(b"\\n"),
            '\r' => out.extend_from_slice(b"\\r"),
            '\t' => out.extend_from_slice(b"\\t"),
            c if c.is_ascii() && (c as u32) >= 0x20 => out.push(c as u8),
            c => {
                // Control characters and everything outside ASCII become
                // \uXXXX escapes; astral-plane characters use surrogate pairs.
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    let mut esc = String::with_capacity(6);
                    let _ = write!(esc, "\\u{unit:04x}");
                    out.extend_from_slice(esc.as_bytes());
                }
            }
        }
    }
    out.push(b'"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonicalize_sorts_keys_recursively() {
        let v = json!({
            "b": 1,
            "a": {
                "d": 2,
                "c": 3
            }
        });

        let c = canonicalize(&v).unwrap();
        let obj = c.as_object().unwrap();
        let keys: Vec<_> = obj.keys().cloned().collect();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn canonical_bytes_are_compact_and_sorted() {
        let v = json!({"b": 7, "a": [1, 2, {"z": null, "y": true}]});
        let s = to_canonical_string(&v).unwrap();
        assert_eq!(s, r#"{"a":[1,2,{"y":true,"z":null}],"b":7}"#);
    }

    #[test]
    fn canonical_bytes_escape_non_ascii() {
        let v = json!({"k": "füür"});
        let s = to_canonical_string(&v).unwrap();
        assert_eq!(s, r#"{"k":"f\u00fc\u00fcr"}"#);
        assert!(s.is_ascii());
    }

    #[test]
    fn canonical_bytes_escape_astral_plane() {
        let v = json!("𝄞");
        let s = to_canonical_string(&v).unwrap();
        assert_eq!(s, r#""\ud834\udd1e""#);
    }

    #[test]
    fn canonical_bytes_escape_control_chars() {
        let v = json!("a\nb\u{01}");
        let s = to_canonical_string(&v).unwrap();
        assert_eq!(s, r#""a\nb\u0001""#);
    }

    #[test]
    fn canonical_eq_true_for_different_key_order() {
        let a = json!({"a": 1, "b": 2});
        let b = json!({"b": 2, "a": 1});
        assert!(canonical_eq(&a, &b).unwrap());
    }

    #[test]
    fn canonical_eq_false_for_different_values() {
        let a = json!({"a": 1});
        let b = json!({"a": 2});
        assert!(!canonical_eq(&a, &b).unwrap());
    }

    #[test]
    fn numbers_format_unambiguously() {
        let v = json!([0, -7, 2.5]);
        let s = to_canonical_string(&v).unwrap();
        assert_eq!(s, "[0,-7,2.5]");
    }
}
