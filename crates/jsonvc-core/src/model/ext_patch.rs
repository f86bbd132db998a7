//! Extended multi-source patch model.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{VcError, VcResult};
use crate::hashing::is_hash_wellformed;

/// A JSON Patch over a synthetic object assembled from several source
/// documents.
///
/// `sourceHashes` maps an alias to the document hash of the source it
/// refers to; `operations` is an RFC 6902 patch over the object
/// `{alias1: doc1, alias2: doc2, …}`; `target` names the alias whose
/// post-patch state is the result. The alias map is a `BTreeMap`, so it is
/// always emitted with lexicographically sorted keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtJsonPatch {
    #[serde(rename = "sourceHashes")]
    source_hashes: BTreeMap<String, String>,

    target: String,

    operations: Vec<Value>,
}

impl ExtJsonPatch {
    pub fn new(
        source_hashes: BTreeMap<String, String>,
        target: impl Into<String>,
        operations: Vec<Value>,
    ) -> VcResult<Self> {
        let patch = Self {
            source_hashes,
            target: target.into(),
            operations,
        };
        patch.validate()?;
        Ok(patch)
    }

    /// Parse a stored JSON value as an extended patch.
    pub fn from_value(value: Value) -> VcResult<Self> {
        let patch: Self = serde_json::from_value(value)
            .map_err(|e| VcError::patch(format!("not a valid extended patch: {e}")))?;
        patch.validate()?;
        Ok(patch)
    }

    /// The canonical JSON value of this patch, as stored and hashed.
    pub fn to_value(&self) -> VcResult<Value> {
        serde_json::to_value(self)
            .map_err(|e| VcError::serialization(format!("failed to serialize extended patch: {e}")))
    }

    pub fn source_hashes(&self) -> &BTreeMap<String, String> {
        &self.source_hashes
    }

    /// The set of document hashes this patch draws from.
    pub fn source_hash_values(&self) -> BTreeSet<String> {
        self.source_hashes.values().cloned().collect()
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn operations(&self) -> &[Value] {
        &self.operations
    }

    /// Apply this patch, loading each source through `load`.
    pub fn apply<F>(&self, load: F) -> VcResult<Value>
    where
        F: Fn(&str) -> VcResult<Value>,
    {
        crate::patch::apply_ext_patch(self, load)
    }

    fn validate(&self) -> VcResult<()> {
        if self.source_hashes.is_empty() {
            return Err(VcError::patch("sourceHashes must not be empty"));
        }
        for (alias, hash) in &self.source_hashes {
            if !is_alias_wellformed(alias) {
                return Err(VcError::patch(format!(
                    "source alias contains invalid characters: {alias}"
                )));
            }
            if !is_hash_wellformed(hash) {
                return Err(VcError::patch(format!(
                    "source hash for alias `{alias}` is not well-formed: {hash}"
                )));
            }
        }
        if !self.source_hashes.contains_key(&self.target) {
            return Err(VcError::patch(format!(
                "target alias `{}` does not appear in sourceHashes",
                self.target
            )));
        }
        Ok(())
    }
}

/// Aliases are restricted to `[0-9a-zA-Z_-]+`.
fn is_alias_wellformed(alias: &str) -> bool {
    !alias.is_empty()
        && alias
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn h(c: char) -> String {
        std::iter::repeat(c).take(64).collect()
    }

    fn single_source(alias: &str) -> BTreeMap<String, String> {
        let mut m = BTreeMap::new();
        m.insert(alias.to_string(), h('a'));
        m
    }

    #[test]
    fn valid_patch_roundtrips() {
        let patch = ExtJsonPatch::new(single_source("object"), "object", vec![]).unwrap();
        let v = patch.to_value().unwrap();
        let parsed = ExtJsonPatch::from_value(v).unwrap();
        assert_eq!(parsed, patch);
        assert_eq!(parsed.target(), "object");
    }

    #[test]
    fn target_must_be_a_source_alias() {
        let err = ExtJsonPatch::new(single_source("object"), "other", vec![]).unwrap_err();
        assert!(matches!(err, VcError::Patch { .. }));
    }

    #[test]
    fn alias_charset_is_enforced() {
        let mut m = BTreeMap::new();
        m.insert("bad alias".to_string(), h('a'));
        assert!(ExtJsonPatch::new(m, "bad alias", vec![]).is_err());
    }

    #[test]
    fn source_hashes_must_be_wellformed() {
        let mut m = BTreeMap::new();
        m.insert("object".to_string(), "xyz".to_string());
        assert!(ExtJsonPatch::new(m, "object", vec![]).is_err());
    }

    #[test]
    fn alias_map_serializes_sorted() {
        let mut m = BTreeMap::new();
        m.insert("zz".to_string(), h('a'));
        m.insert("aa".to_string(), h('b'));
        let patch = ExtJsonPatch::new(m, "aa", vec![json!({"op": "test", "path": "", "value": 1})])
            .unwrap();
        let v = patch.to_value().unwrap();
        let keys: Vec<_> = v["sourceHashes"].as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["aa".to_string(), "zz".to_string()]);
    }
}
