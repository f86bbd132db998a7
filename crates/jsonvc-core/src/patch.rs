//! JSON Patch engine.
//!
//! Thin wrappers over the `json-patch` crate (RFC 6902), plus the
//! build/apply helpers for extended multi-source patches. The underlying
//! diff is treated as a black box; callers that must trust a generated
//! patch re-apply it and compare hashes before committing anything.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::errors::{VcError, VcResult};
use crate::model::ExtJsonPatch;

/// Alias used when an extended patch wraps a single source document.
pub const DEFAULT_ALIAS: &str = "object";

/// Compute the JSON Patch turning `old` into `new`.
pub fn create_patch(old: &Value, new: &Value) -> VcResult<Vec<Value>> {
    let patch = json_patch::diff(old, new);
    let value = serde_json::to_value(&patch)
        .map_err(|e| VcError::serialization(format!("failed to serialize patch: {e}")))?;
    match value {
        Value::Array(ops) => Ok(ops),
        _ => Err(VcError::patch("diff did not produce an operation array")),
    }
}

/// Apply a JSON Patch to a document, returning a fresh value.
pub fn apply_patch(doc: &Value, operations: &[Value]) -> VcResult<Value> {
    let patch: json_patch::Patch = serde_json::from_value(Value::Array(operations.to_vec()))
        .map_err(|e| VcError::patch(format!("invalid patch operations: {e}")))?;
    let mut out = doc.clone();
    json_patch::patch(&mut out, &patch)
        .map_err(|e| VcError::patch(format!("failed to apply patch: {e}")))?;
    Ok(out)
}

/// Build an extended patch transforming `old` into `new`.
///
/// Both documents are wrapped under the single alias `object`, so the
/// recorded operations run over `{"object": old}` vs `{"object": new}`.
/// `hash_fn` supplies the storage backend's hash for the old document.
pub fn create_ext_patch<F>(old: &Value, new: &Value, hash_fn: F) -> VcResult<ExtJsonPatch>
where
    F: Fn(&Value) -> VcResult<String>,
{
    let old_hash = hash_fn(old)?;
    let old_wrapped = Value::Object(Map::from_iter([(DEFAULT_ALIAS.to_string(), old.clone())]));
    let new_wrapped = Value::Object(Map::from_iter([(DEFAULT_ALIAS.to_string(), new.clone())]));
    let operations = create_patch(&old_wrapped, &new_wrapped)?;

    let mut source_hashes = BTreeMap::new();
    source_hashes.insert(DEFAULT_ALIAS.to_string(), old_hash);
    ExtJsonPatch::new(source_hashes, DEFAULT_ALIAS, operations)
}

/// Apply an extended patch, loading each declared source through `load`.
///
/// The sources are assembled into a synthetic object `{alias: doc, …}`, the
/// operations are applied to it, and the value under the target alias is
/// returned. Loader failures (missing or corrupt sources) propagate.
pub fn apply_ext_patch<F>(ext_patch: &ExtJsonPatch, load: F) -> VcResult<Value>
where
    F: Fn(&str) -> VcResult<Value>,
{
    let mut sources = Map::new();
    for (alias, hash) in ext_patch.source_hashes() {
        sources.insert(alias.clone(), load(hash)?);
    }

    let patched = apply_patch(&Value::Object(sources), ext_patch.operations())?;
    patched
        .get(ext_patch.target())
        .cloned()
        .ok_or_else(|| {
            VcError::patch(format!(
                "patch removed the target alias `{}`",
                ext_patch.target()
            ))
        })
}
