//! Node id construction, symbol-id normalization, and the string-to-u32
//! bridge into the vector store.
//!
//! The vector store accepts only unsigned integer point ids, so string
//! node ids are hashed with FNV-1a. The hash is the point id; the string
//! id travels in the payload under `original_id` and is what callers see.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Largest integer exactly representable in an IEEE-754 double.
/// Values outside this range are encoded as strings at the RPC boundary.
const MAX_SAFE_JS_INT: i64 = 9_007_199_254_740_991;

/// SHA-256 of the file bytes, hex encoded
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Stable 32-bit FNV-1a hash used as the vector point id
#[must_use]
pub fn fnv1a_32(s: &str) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in s.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// Id of a FILE node: `<project>:file:<path>`
#[must_use]
pub fn file_node_id(project_id: &str, path: &str) -> String {
    format!("{project_id}:file:{path}")
}

/// Id of a FUNCTION node: `<project>:func:<path>:<name>:<line>`
#[must_use]
pub fn function_node_id(project_id: &str, path: &str, name: &str, line: usize) -> String {
    format!("{project_id}:func:{path}:{name}:{line}")
}

/// Id of a CLASS node: `<project>:class:<path>:<name>`
#[must_use]
pub fn class_node_id(project_id: &str, path: &str, name: &str) -> String {
    format!("{project_id}:class:{path}:{name}")
}

/// Id of an IMPORT node: `<project>:import:<source>`
#[must_use]
pub fn import_node_id(project_id: &str, source: &str) -> String {
    format!("{project_id}:import:{source}")
}

/// Id of a COMMUNITY node: `<project>:community:<n>`
#[must_use]
pub fn community_node_id(project_id: &str, ordinal: usize) -> String {
    format!("{project_id}:community:{ordinal}")
}

/// SCIP-style id for a free function: `path::name`
#[must_use]
pub fn scip_function_id(path: &str, name: &str) -> String {
    format!("{path}::{name}")
}

/// SCIP-style id for a class: `path#Name`
#[must_use]
pub fn scip_class_id(path: &str, name: &str) -> String {
    format!("{path}#{name}")
}

/// Extract the symbol name from an id of the form `basename:name:line`.
///
/// The name is the second-to-last `:`-segment when the last segment is
/// purely numeric; otherwise the last segment is the name. Returns `None`
/// for ids without any colon.
#[must_use]
pub fn normalize_symbol_name(symbol_id: &str) -> Option<&str> {
    let segments: Vec<&str> = symbol_id.split(':').collect();
    if segments.len() < 2 {
        return None;
    }
    let last = segments[segments.len() - 1];
    if !last.is_empty() && last.bytes().all(|b| b.is_ascii_digit()) {
        Some(segments[segments.len() - 2])
    } else {
        Some(last)
    }
}

/// Encode an integer for JSON output, falling back to a string when the
/// value cannot be represented exactly in a double
#[must_use]
pub fn narrow_js_int(value: i64) -> Value {
    if value.abs() <= MAX_SAFE_JS_INT {
        Value::from(value)
    } else {
        Value::String(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fnv1a_is_stable() {
        // Reference values from the FNV-1a 32-bit specification
        assert_eq!(fnv1a_32(""), 0x811c_9dc5);
        assert_eq!(fnv1a_32("a"), 0xe40c_292c);
        // Determinism across calls
        assert_eq!(fnv1a_32("p:func:src/a.ts:foo:10"), fnv1a_32("p:func:src/a.ts:foo:10"));
        assert_ne!(fnv1a_32("p:func:a"), fnv1a_32("p:func:b"));
    }

    #[test]
    fn test_content_hash_deterministic() {
        assert_eq!(content_hash(b"abc"), content_hash(b"abc"));
        assert_ne!(content_hash(b"abc"), content_hash(b"abd"));
        assert_eq!(content_hash(b"abc").len(), 64);
    }

    #[test]
    fn test_normalize_symbol_name() {
        // Trailing line number: name is the second-to-last segment
        assert_eq!(normalize_symbol_name("auth.ts:login:42"), Some("login"));
        // No trailing number: last segment is the name
        assert_eq!(normalize_symbol_name("auth.ts:login"), Some("login"));
        // Structured node ids behave the same way
        assert_eq!(
            normalize_symbol_name("p:func:src/a.ts:foo:10"),
            Some("foo")
        );
        // Colon-free ids are not symbol references
        assert_eq!(normalize_symbol_name("standalone"), None);
    }

    #[test]
    fn test_node_id_shapes() {
        assert_eq!(file_node_id("p", "src/a.ts"), "p:file:src/a.ts");
        assert_eq!(
            function_node_id("p", "src/a.ts", "foo", 3),
            "p:func:src/a.ts:foo:3"
        );
        assert_eq!(scip_function_id("src/a.ts", "foo"), "src/a.ts::foo");
        assert_eq!(scip_class_id("src/a.ts", "Auth"), "src/a.ts#Auth");
    }

    #[test]
    fn test_narrow_js_int() {
        assert_eq!(narrow_js_int(42), Value::from(42));
        assert_eq!(
            narrow_js_int(i64::MAX),
            Value::String(i64::MAX.to_string())
        );
    }
}
