//! In-memory node cache.
//!
//! The cache indexes the store: which node hashes are known, which source
//! nodes each descends from, and which document each records. It also keeps
//! the set of nodes known only by reference but missing from the store, so
//! partially available stores stay usable. State is held in B-tree maps and
//! sets keyed by hash only; nodes never hold references to each other.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use jsonvc_core::errors::{VcError, VcResult};
use jsonvc_core::model::GraphNode;
use jsonvc_store::StorageProvider;

/// Objects larger than this are assumed to be documents, not graph nodes,
/// and are skipped during discovery.
pub const NODE_SIZE_LIMIT: u64 = 1024;

pub struct NodeCache {
    storage: Arc<dyn StorageProvider>,
    known_nodes: BTreeMap<String, BTreeSet<String>>,
    known_docs: BTreeMap<String, BTreeSet<String>>,
    unavailable_nodes: BTreeSet<String>,
}

impl NodeCache {
    /// Build a cache over `storage`. If the backend exposes an object
    /// index, discovery runs over every indexed hash; otherwise the cache
    /// starts empty and fills incrementally.
    pub fn new(storage: Arc<dyn StorageProvider>) -> VcResult<Self> {
        let seeds = match storage.as_object_index() {
            Some(index) => Some(index.index()?),
            None => None,
        };
        let mut cache = Self {
            storage,
            known_nodes: BTreeMap::new(),
            known_docs: BTreeMap::new(),
            unavailable_nodes: BTreeSet::new(),
        };
        if let Some(seeds) = seeds {
            let found = cache.discover_nodes(&seeds);
            debug!(seeded = seeds.len(), found = found.len(), "cache discovery");
        }
        Ok(cache)
    }

    pub fn storage(&self) -> &Arc<dyn StorageProvider> {
        &self.storage
    }

    /// Index the node stored under `node_hash`.
    ///
    /// No-op for already-known nodes. A node missing from the store is
    /// recorded as unavailable; a present object that fails to parse as a
    /// graph node propagates its error.
    pub fn update(&mut self, node_hash: &str) -> VcResult<()> {
        if self.known_nodes.contains_key(node_hash) {
            return Ok(());
        }
        if !self.storage.exists(node_hash)? {
            self.unavailable_nodes.insert(node_hash.to_string());
            return Ok(());
        }
        self.unavailable_nodes.remove(node_hash);

        let node = GraphNode::from_value(self.storage.load(node_hash)?)?;
        let source_hashes = node.source_hashes();
        self.known_nodes
            .insert(node_hash.to_string(), source_hashes);
        self.known_docs
            .entry(node.document_hash().to_string())
            .or_default()
            .insert(node_hash.to_string());
        Ok(())
    }

    /// Traverse the graph from `seeds`, indexing every reachable node.
    ///
    /// Oversized objects are skipped and per-object failures (non-node
    /// objects in a shared store, unreadable entries) are swallowed, so one
    /// bad object cannot poison indexing. Returns the newly indexed node
    /// hashes.
    pub fn discover_nodes(&mut self, seeds: &[String]) -> Vec<String> {
        let mut added = Vec::new();
        let mut worklist: Vec<String> = seeds.to_vec();
        while let Some(node_hash) = worklist.pop() {
            if self.known_nodes.contains_key(&node_hash) {
                continue;
            }
            if self.should_skip(&node_hash) {
                continue;
            }
            if self.update(&node_hash).is_err() {
                continue;
            }
            if let Some(sources) = self.known_nodes.get(&node_hash) {
                for source in sources {
                    if !self.known_nodes.contains_key(source) {
                        worklist.push(source.clone());
                    }
                }
                added.push(node_hash);
            }
        }
        added
    }

    /// Nodes recording the document with `doc_hash` (empty set if none).
    pub fn find_associated_node_hashes(&self, doc_hash: &str) -> BTreeSet<String> {
        self.known_docs.get(doc_hash).cloned().unwrap_or_default()
    }

    pub fn node_hashes(&self) -> Vec<String> {
        self.known_nodes.keys().cloned().collect()
    }

    pub fn doc_hashes(&self) -> Vec<String> {
        self.known_docs.keys().cloned().collect()
    }

    pub fn unavailable_node_hashes(&self) -> &BTreeSet<String> {
        &self.unavailable_nodes
    }

    /// Source-node hashes of a known node.
    pub fn ancestor_hashes(&self, node_hash: &str) -> VcResult<BTreeSet<String>> {
        self.known_nodes.get(node_hash).cloned().ok_or_else(|| {
            VcError::hash_not_found(format!("no node registered under hash {node_hash}"))
        })
    }

    /// Load the node stored under `node_hash`, indexing it on the way.
    pub fn get_node(&mut self, node_hash: &str) -> VcResult<GraphNode> {
        self.update(node_hash)?;
        GraphNode::from_value(self.storage.load(node_hash)?)
    }

    /// Resolve a hash prefix to the unique known node hash it abbreviates.
    pub fn expand_hash_prefix(&self, prefix: &str) -> VcResult<String> {
        let mut matches = self
            .known_nodes
            .keys()
            .filter(|h| h.starts_with(prefix))
            .cloned();
        let first = matches.next().ok_or_else(|| {
            VcError::hash_not_found("no node registered under the hash provided")
        })?;
        if matches.next().is_some() {
            return Err(VcError::hash_prefix_ambiguous(
                "shortform hash ambiguous, provide more leading characters",
            ));
        }
        Ok(first)
    }

    /// Serializable snapshot with sorted lists, suitable for a cache file.
    pub fn to_snapshot(&self) -> CacheSnapshot {
        CacheSnapshot {
            known_nodes: sets_to_sorted_lists(&self.known_nodes),
            known_docs: sets_to_sorted_lists(&self.known_docs),
        }
    }

    /// Inflate a snapshot, merging into or replacing the current state.
    pub fn load_snapshot(&mut self, snapshot: CacheSnapshot, mode: SnapshotMode) {
        let known_nodes = lists_to_sets(snapshot.known_nodes);
        let known_docs = lists_to_sets(snapshot.known_docs);
        match mode {
            SnapshotMode::Merge => {
                self.known_nodes.extend(known_nodes);
                self.known_docs.extend(known_docs);
            }
            SnapshotMode::Replace => {
                self.known_nodes = known_nodes;
                self.known_docs = known_docs;
            }
        }
    }

    fn should_skip(&self, node_hash: &str) -> bool {
        match self.storage.as_object_index() {
            // A missing object must not be skipped: update() records it as
            // unavailable instead of failing the traversal.
            Some(index) => matches!(index.size(node_hash), Ok(n) if n > NODE_SIZE_LIMIT),
            None => false,
        }
    }
}

/// On-disk form of the cache: `{known_nodes: {hash: [hash…]},
/// known_docs: {hash: [hash…]}}`, all lists sorted for stability.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub known_nodes: BTreeMap<String, Vec<String>>,
    pub known_docs: BTreeMap<String, Vec<String>>,
}

impl CacheSnapshot {
    pub fn from_value(value: Value) -> VcResult<Self> {
        serde_json::from_value(value)
            .map_err(|e| VcError::serialization(format!("invalid cache snapshot: {e}")))
    }

    pub fn to_value(&self) -> VcResult<Value> {
        serde_json::to_value(self)
            .map_err(|e| VcError::serialization(format!("failed to serialize cache snapshot: {e}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotMode {
    Merge,
    Replace,
}

fn sets_to_sorted_lists(
    map: &BTreeMap<String, BTreeSet<String>>,
) -> BTreeMap<String, Vec<String>> {
    map.iter()
        .map(|(k, v)| (k.clone(), v.iter().cloned().collect()))
        .collect()
}

fn lists_to_sets(map: BTreeMap<String, Vec<String>>) -> BTreeMap<String, BTreeSet<String>> {
    map.into_iter()
        .map(|(k, v)| (k, v.into_iter().collect()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::TrackGraph;
    use jsonvc_core::patch::create_ext_patch;
    use jsonvc_store::LocalStore;
    use serde_json::json;
    use tempfile::TempDir;

    fn open_storage(td: &TempDir) -> Arc<dyn StorageProvider> {
        Arc::new(LocalStore::open(td.path()).unwrap())
    }

    fn track_pair(storage: &Arc<dyn StorageProvider>) -> (String, String) {
        let graph = TrackGraph::new(Arc::clone(storage));
        let old = json!({"a": 23});
        let new = json!({"a": 27});
        let h0 = graph.create_genesis_node(&old, None).unwrap();
        let ext = create_ext_patch(&old, &new, |v| storage.compute_hash(v)).unwrap();
        let expected = storage.compute_hash(&new).unwrap();
        let h1 = graph.create_node(&ext, &[h0.clone()], None, &expected).unwrap();
        (h0, h1)
    }

    #[test]
    fn discovery_indexes_linked_nodes_and_ignores_garbage() {
        let td = TempDir::new().unwrap();
        let storage = open_storage(&td);
        let (h0, h1) = track_pair(&storage);
        // a non-node object sitting in the same store
        let garbage_hash = storage.store(&json!({"unrelated": true})).unwrap();

        let cache = NodeCache::new(Arc::clone(&storage)).unwrap();
        let mut nodes = cache.node_hashes();
        nodes.sort();
        let mut expected = vec![h0.clone(), h1.clone()];
        expected.sort();
        assert_eq!(nodes, expected);
        assert!(!cache.node_hashes().contains(&garbage_hash));

        let doc_hash = storage.compute_hash(&json!({"a": 23})).unwrap();
        let assoc = cache.find_associated_node_hashes(&doc_hash);
        assert_eq!(assoc.into_iter().collect::<Vec<_>>(), vec![h0]);
    }

    #[test]
    fn discovery_skips_oversized_objects() {
        let td = TempDir::new().unwrap();
        let storage = open_storage(&td);
        let big: Vec<u64> = (0..1000).collect();
        storage.store(&json!({ "payload": big })).unwrap();
        let (h0, h1) = track_pair(&storage);

        let cache = NodeCache::new(Arc::clone(&storage)).unwrap();
        let mut nodes = cache.node_hashes();
        nodes.sort();
        let mut expected = vec![h0, h1];
        expected.sort();
        assert_eq!(nodes, expected);
    }

    #[test]
    fn update_records_missing_nodes_as_unavailable() {
        let td = TempDir::new().unwrap();
        let storage = open_storage(&td);
        let mut cache = NodeCache::new(Arc::clone(&storage)).unwrap();

        let absent = "0".repeat(64);
        cache.update(&absent).unwrap();
        assert!(cache.unavailable_node_hashes().contains(&absent));
        assert!(cache.node_hashes().is_empty());
    }

    #[test]
    fn cache_coherence_after_updates() {
        let td = TempDir::new().unwrap();
        let storage = open_storage(&td);
        let (_, _) = track_pair(&storage);
        let mut cache = NodeCache::new(Arc::clone(&storage)).unwrap();

        for doc_hash in cache.doc_hashes() {
            for node_hash in cache.find_associated_node_hashes(&doc_hash) {
                let node = cache.get_node(&node_hash).unwrap();
                assert_eq!(node.document_hash(), doc_hash);
            }
        }
    }

    #[test]
    fn prefix_expansion() {
        let td = TempDir::new().unwrap();
        let storage = open_storage(&td);
        let (h0, h1) = track_pair(&storage);
        let cache = NodeCache::new(Arc::clone(&storage)).unwrap();

        // the full hash always resolves to itself
        assert_eq!(cache.expand_hash_prefix(&h0).unwrap(), h0);

        // the empty prefix matches everything
        let err = cache.expand_hash_prefix("").unwrap_err();
        assert!(matches!(err, VcError::HashPrefixAmbiguous { .. }));

        let err = cache.expand_hash_prefix(&"f".repeat(65)).unwrap_err();
        assert!(matches!(err, VcError::HashNotFound { .. }));

        // find the shortest unambiguous prefix of h1
        let mut prefix_len = 1;
        while h0.starts_with(&h1[..prefix_len]) {
            prefix_len += 1;
        }
        assert_eq!(cache.expand_hash_prefix(&h1[..prefix_len]).unwrap(), h1);
    }

    #[test]
    fn snapshot_roundtrip_and_merge() {
        let td = TempDir::new().unwrap();
        let storage = open_storage(&td);
        let (_, _) = track_pair(&storage);
        let cache = NodeCache::new(Arc::clone(&storage)).unwrap();

        let snapshot = cache.to_snapshot();
        let value = snapshot.to_value().unwrap();
        let parsed = CacheSnapshot::from_value(value).unwrap();
        assert_eq!(parsed, snapshot);

        // merge into a fresh cache backed by an empty store
        let td2 = TempDir::new().unwrap();
        let storage2 = open_storage(&td2);
        let mut fresh = NodeCache::new(storage2).unwrap();
        assert!(fresh.node_hashes().is_empty());
        fresh.load_snapshot(parsed.clone(), SnapshotMode::Merge);
        assert_eq!(fresh.to_snapshot(), snapshot);

        fresh.load_snapshot(CacheSnapshot::default(), SnapshotMode::Replace);
        assert!(fresh.node_hashes().is_empty());
    }
}
