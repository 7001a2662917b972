//! Canonical JSON serialization.
//!
//! Two JSON texts that are structurally equal must fingerprint identically,
//! so hashing always runs over this canonical form: object keys sorted
//! lexicographically, no insignificant whitespace.

use serde_json::Value;

/// Serialize a parsed document to its canonical byte sequence.
pub fn canonical_bytes(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(n) => out.extend_from_slice(n.to_string().as_bytes()),
        Value::String(s) => write_escaped(s, out),
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out);
            }
            out.push(b']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_unstable_by_key(|(key, _)| *key);
            out.push(b'{');
            for (i, (key, item)) in entries.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_escaped(key, out);
                out.push(b':');
                write_canonical(item, out);
            }
            out.push(b'}');
        }
    }
}

fn write_escaped(s: &str, out: &mut Vec<u8>) {
    // serde_json string escaping is deterministic, reuse it.
    let escaped = serde_json::to_string(s).expect("string serialization is infallible");
    out.extend_from_slice(escaped.as_bytes());
}
