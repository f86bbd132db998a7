//! Content hashing for jsonvc.
//!
//! The hash of a JSON value is the SHA-256 of its canonical byte form,
//! encoded as 64 lowercase hex characters. This is the identity of every
//! content-addressed object (documents, patches, graph nodes).

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::canonical::to_canonical_bytes;
use crate::errors::{VcError, VcResult};

/// Number of hex characters in a full content hash.
pub const HASH_LEN: usize = 64;

/// Compute the content hash of a JSON value.
pub fn compute_hash(value: &Value) -> VcResult<String> {
    let bytes = to_canonical_bytes(value)?;
    Ok(compute_bytes_hash(&bytes))
}

/// SHA-256 of raw bytes as lowercase hex.
pub fn compute_bytes_hash(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    hex::encode(h.finalize())
}

/// Check if a string qualifies as a hexadecimal number.
pub fn is_hexadecimal(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// A full hash is exactly 64 hex characters.
pub fn is_hash_wellformed(s: &str) -> bool {
    s.len() == HASH_LEN && is_hexadecimal(s)
}

/// A hash prefix is any non-empty hex substring of a full hash.
pub fn is_hash_prefix_wellformed(s: &str) -> bool {
    is_hexadecimal(s)
}

/// Fail with `InvalidArgument` unless `s` is a well-formed full hash.
pub fn check_hash_wellformed(s: &str) -> VcResult<()> {
    if !is_hash_wellformed(s) {
        return Err(VcError::invalid_argument(format!(
            "hash string is not well-formed: {s}"
        )));
    }
    Ok(())
}
