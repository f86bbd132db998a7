//! Graph node creation.
//!
//! The two ways a node enters the DAG: as a genesis node recording a fresh
//! document, or as a derived node produced by applying an extended patch to
//! already-tracked sources. Creation performs the full consistency checks
//! and stores the node last, so any node present in the store is guaranteed
//! to have its document, patch, and sources already durable.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use jsonvc_core::errors::{VcError, VcResult};
use jsonvc_core::model::{ExtJsonPatch, GraphNode};
use jsonvc_store::StorageProvider;

pub struct TrackGraph {
    storage: Arc<dyn StorageProvider>,
}

impl TrackGraph {
    pub fn new(storage: Arc<dyn StorageProvider>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<dyn StorageProvider> {
        &self.storage
    }

    /// Store `doc` and a genesis node recording it; returns the node hash.
    pub fn create_genesis_node(&self, doc: &Value, meta: Option<Value>) -> VcResult<String> {
        let doc_hash = self.storage.store(doc)?;
        let node = GraphNode::genesis(doc_hash, meta)?;
        let node_hash = self.storage.store(&node.to_value()?)?;
        debug!(%node_hash, "created genesis node");
        Ok(node_hash)
    }

    /// Create a derived node from `ext_patch` and its source nodes.
    ///
    /// The patch's document-level sources must match exactly the document
    /// hashes of the claimed node-level sources; the patched document must
    /// hash to `expected_doc_hash` (this catches patches the underlying
    /// library generated incorrectly). Returns the new node hash.
    pub fn create_node(
        &self,
        ext_patch: &ExtJsonPatch,
        source_node_hashes: &[String],
        meta: Option<Value>,
        expected_doc_hash: &str,
    ) -> VcResult<String> {
        let mut doc_map: BTreeMap<String, String> = BTreeMap::new();
        for node_hash in source_node_hashes {
            let source_node = GraphNode::from_value(self.storage.load(node_hash)?)?;
            doc_map.insert(source_node.document_hash().to_string(), node_hash.clone());
        }
        let node_doc_hashes: BTreeSet<String> = doc_map.keys().cloned().collect();
        if ext_patch.source_hash_values() != node_doc_hashes {
            return Err(VcError::consistency(
                "document sources in the extended patch are inconsistent \
                 with the document hashes of the source nodes",
            ));
        }

        let new_doc = ext_patch.apply(|hash| self.storage.load(hash))?;
        let patch_hash = self.storage.store(&ext_patch.to_value()?)?;
        let new_doc_hash = self.storage.store(&new_doc)?;
        if new_doc_hash != expected_doc_hash {
            return Err(VcError::patch(
                "the new document does not hash to the expected value; the \
                 patch library may have produced an unsuitable patch for \
                 this source/destination pair",
            ));
        }

        let node = GraphNode::derived(patch_hash, new_doc_hash, source_node_hashes, meta)?;
        let node_hash = self.storage.store(&node.to_value()?)?;
        debug!(%node_hash, "created derived node");
        Ok(node_hash)
    }
}
