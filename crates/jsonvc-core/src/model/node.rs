//! Graph node model.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{VcError, VcResult};
use crate::hashing::is_hash_wellformed;

/// An immutable record in the version DAG.
///
/// A node points at the document it records (`documentHash`), the extended
/// patch that produced that document (`extJsonPatchHash`, absent on genesis
/// nodes), and the node hashes it descends from (`sourceHashes`, absent on
/// genesis nodes). `meta` is a free-form object; the engine only reads
/// `meta.message`.
///
/// Source hashes are sorted lexicographically and deduplicated at
/// construction, so two nodes with semantically equal sources canonicalize
/// to the same bytes and share a hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphNode {
    #[serde(rename = "extJsonPatchHash", default)]
    ext_json_patch_hash: Option<String>,

    #[serde(rename = "documentHash")]
    document_hash: String,

    #[serde(rename = "sourceHashes", default)]
    source_hashes: Option<Vec<String>>,

    #[serde(default)]
    meta: Option<Value>,
}

impl GraphNode {
    /// Build a genesis node: no patch, no sources.
    pub fn genesis<H: Into<String>>(document_hash: H, meta: Option<Value>) -> VcResult<Self> {
        let node = Self {
            ext_json_patch_hash: None,
            document_hash: document_hash.into(),
            source_hashes: None,
            meta,
        };
        node.validate()?;
        Ok(node)
    }

    /// Build a derived node from its generating patch and source nodes.
    pub fn derived<H1, H2>(
        ext_json_patch_hash: H1,
        document_hash: H2,
        source_hashes: &[String],
        meta: Option<Value>,
    ) -> VcResult<Self>
    where
        H1: Into<String>,
        H2: Into<String>,
    {
        if source_hashes.is_empty() {
            return Err(VcError::invalid_argument(
                "a derived node requires at least one source node hash",
            ));
        }
        let node = Self {
            ext_json_patch_hash: Some(ext_json_patch_hash.into()),
            document_hash: document_hash.into(),
            source_hashes: Some(normalize_sources(source_hashes)),
            meta,
        };
        node.validate()?;
        Ok(node)
    }

    /// Parse a stored JSON value as a graph node.
    ///
    /// Unknown fields and missing required fields are rejected, so arbitrary
    /// documents in a shared store do not masquerade as nodes. Source hashes
    /// are re-normalized on the way in.
    pub fn from_value(value: Value) -> VcResult<Self> {
        let mut node: Self = serde_json::from_value(value)
            .map_err(|e| VcError::serialization(format!("not a valid graph node: {e}")))?;
        if let Some(sources) = node.source_hashes.take() {
            node.source_hashes = Some(normalize_sources(&sources));
        }
        node.validate()?;
        Ok(node)
    }

    /// The canonical JSON value of this node. Absent fields serialize as
    /// explicit nulls; this value is what gets stored and hashed.
    pub fn to_value(&self) -> VcResult<Value> {
        serde_json::to_value(self)
            .map_err(|e| VcError::serialization(format!("failed to serialize graph node: {e}")))
    }

    pub fn document_hash(&self) -> &str {
        &self.document_hash
    }

    pub fn ext_json_patch_hash(&self) -> Option<&str> {
        self.ext_json_patch_hash.as_deref()
    }

    /// Source node hashes as a set; empty for genesis nodes.
    pub fn source_hashes(&self) -> BTreeSet<String> {
        self.source_hashes
            .as_ref()
            .map(|v| v.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_genesis(&self) -> bool {
        self.source_hashes.is_none()
    }

    pub fn meta(&self) -> Option<&Value> {
        self.meta.as_ref()
    }

    /// The `meta.message` string, if present.
    pub fn message(&self) -> Option<&str> {
        self.meta
            .as_ref()
            .and_then(|m| m.get("message"))
            .and_then(Value::as_str)
    }

    fn validate(&self) -> VcResult<()> {
        if !is_hash_wellformed(&self.document_hash) {
            return Err(VcError::invalid_argument(format!(
                "documentHash is not a well-formed hash: {}",
                self.document_hash
            )));
        }
        if let Some(h) = &self.ext_json_patch_hash {
            if !is_hash_wellformed(h) {
                return Err(VcError::invalid_argument(format!(
                    "extJsonPatchHash is not a well-formed hash: {h}"
                )));
            }
        }
        if let Some(sources) = &self.source_hashes {
            for h in sources {
                if !is_hash_wellformed(h) {
                    return Err(VcError::invalid_argument(format!(
                        "source node hash is not well-formed: {h}"
                    )));
                }
            }
        }
        if let Some(meta) = &self.meta {
            if !meta.is_object() {
                return Err(VcError::invalid_argument("meta must be an object or null"));
            }
        }
        Ok(())
    }
}

fn normalize_sources(hashes: &[String]) -> Vec<String> {
    let set: BTreeSet<&String> = hashes.iter().collect();
    set.into_iter().cloned().collect()
}
