//! Version-control operations over JSON documents.
//!
//! `DocVersionControl` is the public surface of the engine: track a
//! document, update it, walk its history, recover any version, diff two
//! versions, and resolve hash prefixes. It owns the track graph and the
//! node cache over one shared storage provider.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::{json, Value};

use jsonvc_core::errors::{VcError, VcResult};
use jsonvc_core::model::GraphNode;
use jsonvc_core::patch::{apply_patch, create_ext_patch, create_patch};
use jsonvc_store::StorageProvider;

use crate::cache::NodeCache;
use crate::track::TrackGraph;

/// One step of a linear history: the node and the hash it is stored under.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub node_hash: String,
    pub node: GraphNode,
}

pub struct DocVersionControl {
    storage: Arc<dyn StorageProvider>,
    graph: TrackGraph,
    cache: NodeCache,
}

impl DocVersionControl {
    pub fn new(storage: Arc<dyn StorageProvider>) -> VcResult<Self> {
        let graph = TrackGraph::new(Arc::clone(&storage));
        let cache = NodeCache::new(Arc::clone(&storage))?;
        Ok(Self {
            storage,
            graph,
            cache,
        })
    }

    pub fn storage(&self) -> &Arc<dyn StorageProvider> {
        &self.storage
    }

    pub fn cache(&self) -> &NodeCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut NodeCache {
        &mut self.cache
    }

    /// Hashes of the nodes recording `doc`, per the cache.
    pub fn get_associated_node_hashes(&self, doc: &Value) -> VcResult<BTreeSet<String>> {
        let doc_hash = self.storage.compute_hash(doc)?;
        Ok(self.cache.find_associated_node_hashes(&doc_hash))
    }

    pub fn is_tracked(&self, doc: &Value) -> VcResult<bool> {
        Ok(!self.get_associated_node_hashes(doc)?.is_empty())
    }

    /// Create a genesis node for `doc`; fails if the document is already
    /// tracked unless `force` is given.
    pub fn track(&mut self, doc: &Value, message: &str, force: bool) -> VcResult<String> {
        if self.is_tracked(doc)? && !force {
            return Err(VcError::doc_already_tracked(
                "the JSON document is already being tracked",
            ));
        }
        let meta = json!({ "message": message });
        let node_hash = self.graph.create_genesis_node(doc, Some(meta))?;
        self.cache.update(&node_hash)?;
        Ok(node_hash)
    }

    /// Record `new_doc` as the successor of the node at `old_node_hash`.
    pub fn update(
        &mut self,
        old_node_hash: &str,
        new_doc: &Value,
        message: &str,
        force: bool,
    ) -> VcResult<String> {
        if self.is_tracked(new_doc)? && !force {
            return Err(VcError::doc_already_tracked(
                "the new JSON document is already in the system",
            ));
        }
        let old_doc = self.get_doc(old_node_hash)?;
        let storage = Arc::clone(&self.storage);
        let ext_patch = create_ext_patch(&old_doc, new_doc, |v| storage.compute_hash(v))?;
        let new_doc_hash = self.storage.compute_hash(new_doc)?;
        let meta = json!({ "message": message });
        let source_node_hashes = vec![old_node_hash.to_string()];
        let node_hash =
            self.graph
                .create_node(&ext_patch, &source_node_hashes, Some(meta), &new_doc_hash)?;
        self.cache.update(&node_hash)?;
        Ok(node_hash)
    }

    /// Walk the ancestry of `node_hash` back to its genesis node and return
    /// the chain oldest-first. Fails with `SeveralAncestors` at any merge
    /// point; the error carries the ambiguous ancestor set.
    pub fn get_linear_history(&mut self, node_hash: &str) -> VcResult<Vec<HistoryEntry>> {
        let mut frontier = vec![node_hash.to_string()];
        let mut entries: Vec<HistoryEntry> = Vec::new();
        loop {
            if frontier.len() > 1 {
                return Err(VcError::several_ancestors(
                    "several ancestors detected",
                    frontier,
                ));
            }
            let current = match frontier.pop() {
                Some(h) => h,
                None => break,
            };
            let node = self.cache.get_node(&current)?;
            frontier = self
                .cache
                .ancestor_hashes(&current)?
                .into_iter()
                .collect();
            entries.push(HistoryEntry {
                node_hash: current,
                node,
            });
        }
        entries.reverse();
        Ok(entries)
    }

    /// The document recorded by the node at `node_hash`.
    pub fn get_doc(&mut self, node_hash: &str) -> VcResult<Value> {
        let node = self.cache.get_node(node_hash)?;
        self.storage.load(node.document_hash())
    }

    /// Diff two documents, verifying that the generated patch actually
    /// reproduces `new_doc` before handing it out.
    pub fn get_diff(&self, old_doc: &Value, new_doc: &Value) -> VcResult<Vec<Value>> {
        let operations = create_patch(old_doc, new_doc)?;
        let test_doc = apply_patch(old_doc, &operations)?;
        let new_hash = self.storage.compute_hash(new_doc)?;
        let test_hash = self.storage.compute_hash(&test_doc)?;
        if new_hash != test_hash {
            return Err(VcError::patch(
                "an invalid patch was produced for the comparison; this is \
                 likely a bug in the underlying patch library",
            ));
        }
        Ok(operations)
    }

    /// Resolve a hash prefix against the known nodes.
    pub fn expand_hash_prefix(&self, prefix: &str) -> VcResult<String> {
        self.cache.expand_hash_prefix(prefix)
    }

    /// The `meta.message` of each listed node, in input order. Nodes
    /// without a message yield an empty string.
    pub fn get_messages(&mut self, node_hashes: &[String]) -> VcResult<Vec<(String, String)>> {
        let mut messages = Vec::with_capacity(node_hashes.len());
        for node_hash in node_hashes {
            let node = self.cache.get_node(node_hash)?;
            let message = node.message().unwrap_or_default().to_string();
            messages.push((node_hash.clone(), message));
        }
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonvc_store::LocalStore;
    use serde_json::json;
    use tempfile::TempDir;

    fn open_vc(td: &TempDir) -> DocVersionControl {
        let storage: Arc<dyn StorageProvider> = Arc::new(LocalStore::open(td.path()).unwrap());
        DocVersionControl::new(storage).unwrap()
    }

    #[test]
    fn basic_lifecycle() {
        let td = TempDir::new().unwrap();
        let mut vc = open_vc(&td);

        let d0 = json!({"a": 23});
        let d1 = json!({"a": 27});
        let h0 = vc.track(&d0, "m1", false).unwrap();
        let h1 = vc.update(&h0, &d1, "m2", false).unwrap();

        let history = vc.get_linear_history(&h1).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].node_hash, h0);
        assert_eq!(history[1].node_hash, h1);
        assert_eq!(history[0].node.message(), Some("m1"));
        assert_eq!(history[1].node.message(), Some("m2"));
        assert_eq!(
            history[0].node.document_hash(),
            vc.storage().compute_hash(&d0).unwrap()
        );
        assert_eq!(
            history[1].node.document_hash(),
            vc.storage().compute_hash(&d1).unwrap()
        );
        assert_eq!(
            history[1].node.source_hashes().into_iter().collect::<Vec<_>>(),
            vec![h0]
        );

        assert_eq!(vc.get_doc(&h1).unwrap(), d1);
    }

    #[test]
    fn tracking_is_key_order_insensitive() {
        let td = TempDir::new().unwrap();
        let mut vc = open_vc(&td);

        vc.track(&json!({"b": 7, "a": 5}), "m", false).unwrap();
        assert!(vc.is_tracked(&json!({"a": 5, "b": 7})).unwrap());
    }

    #[test]
    fn retrack_requires_force_and_creates_ambiguity() {
        let td = TempDir::new().unwrap();
        let mut vc = open_vc(&td);

        let doc = json!({"a": 1});
        let h0 = vc.track(&doc, "first", false).unwrap();

        let err = vc.track(&doc, "again", false).unwrap_err();
        assert!(matches!(err, VcError::DocAlreadyTracked { .. }));

        let h1 = vc.track(&doc, "again", true).unwrap();
        assert_ne!(h0, h1);

        let assoc = vc.get_associated_node_hashes(&doc).unwrap();
        assert_eq!(assoc.len(), 2);
        assert!(assoc.contains(&h0) && assoc.contains(&h1));
    }

    #[test]
    fn update_rejects_already_tracked_doc() {
        let td = TempDir::new().unwrap();
        let mut vc = open_vc(&td);

        let d0 = json!({"a": 1});
        let d1 = json!({"a": 2});
        let h0 = vc.track(&d0, "m1", false).unwrap();
        vc.track(&d1, "other", false).unwrap();

        let err = vc.update(&h0, &d1, "m2", false).unwrap_err();
        assert!(matches!(err, VcError::DocAlreadyTracked { .. }));

        // force records the update as a second node for the same document
        let h2 = vc.update(&h0, &d1, "m2", true).unwrap();
        assert_eq!(vc.get_associated_node_hashes(&d1).unwrap().len(), 2);
        assert_eq!(vc.get_doc(&h2).unwrap(), d1);
    }

    #[test]
    fn linear_history_reports_merge_points() {
        let td = TempDir::new().unwrap();
        let mut vc = open_vc(&td);

        // two independent genesis nodes for the same document, then an
        // update applied to one of them
        let doc = json!({"a": 1});
        let h0 = vc.track(&doc, "m", false).unwrap();
        let h1 = vc.track(&doc, "m2", true).unwrap();

        // hand-build a node claiming both as sources to simulate a merge
        let storage = Arc::clone(vc.storage());
        let doc_hash = storage.compute_hash(&doc).unwrap();
        let patch_hash = storage
            .store(
                &jsonvc_core::patch::create_ext_patch(&doc, &doc, |v| storage.compute_hash(v))
                    .unwrap()
                    .to_value()
                    .unwrap(),
            )
            .unwrap();
        let merge_node = GraphNode::derived(
            patch_hash,
            doc_hash,
            &[h0.clone(), h1.clone()],
            None,
        )
        .unwrap();
        let merge_hash = storage.store(&merge_node.to_value().unwrap()).unwrap();
        vc.cache_mut().update(&merge_hash).unwrap();

        let err = vc.get_linear_history(&merge_hash).unwrap_err();
        match err {
            VcError::SeveralAncestors {
                ancestor_hashes, ..
            } => {
                let set: BTreeSet<_> = ancestor_hashes.into_iter().collect();
                assert_eq!(set, BTreeSet::from([h0, h1]));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn diff_roundtrip_is_verified() {
        let td = TempDir::new().unwrap();
        let vc = open_vc(&td);

        let old = json!({"a": 1, "nested": {"x": [1, 2]}});
        let new = json!({"a": 2, "nested": {"x": [1, 2, 3]}});
        let ops = vc.get_diff(&old, &new).unwrap();
        assert_eq!(apply_patch(&old, &ops).unwrap(), new);
    }

    #[test]
    fn messages_resolve_in_input_order() {
        let td = TempDir::new().unwrap();
        let mut vc = open_vc(&td);

        let h0 = vc.track(&json!({"a": 1}), "first", false).unwrap();
        let h1 = vc.update(&h0, &json!({"a": 2}), "second", false).unwrap();

        let messages = vc.get_messages(&[h1.clone(), h0.clone()]).unwrap();
        assert_eq!(
            messages,
            vec![(h1, "second".to_string()), (h0, "first".to_string())]
        );
    }
}
