//! File-level version control.
//!
//! Wraps `DocVersionControl` for callers that reference documents through
//! "objrefs": either a filesystem path holding a JSON document or a
//! node-hash prefix. Each operation documents which sources it accepts.

use std::fs;
use std::path::Path;

use serde_json::Value;

use jsonvc_core::errors::{VcError, VcResult};
use jsonvc_store::StorageProvider;

use crate::vc::{DocVersionControl, HistoryEntry};

/// Where an objref may be resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjrefSource {
    /// Try the filesystem first, then fall back to the cache.
    Any,
    /// Filesystem path only.
    File,
    /// Node-hash prefix only.
    Cache,
}

pub struct FileVersionControl {
    docvc: DocVersionControl,
}

impl FileVersionControl {
    pub fn new(storage: std::sync::Arc<dyn StorageProvider>) -> VcResult<Self> {
        Ok(Self {
            docvc: DocVersionControl::new(storage)?,
        })
    }

    pub fn doc_vc(&self) -> &DocVersionControl {
        &self.docvc
    }

    pub fn doc_vc_mut(&mut self) -> &mut DocVersionControl {
        &mut self.docvc
    }

    /// Resolve an objref to a node hash.
    ///
    /// A path resolves through the document it holds; this fails with
    /// `DocNotTracked` when no node records it and `SeveralNodesWithDoc`
    /// when more than one does. A non-path objref is treated as a hash
    /// prefix.
    fn node_hash_from_objref(&self, objref: &str, source: ObjrefSource) -> VcResult<String> {
        if matches!(source, ObjrefSource::Any | ObjrefSource::File) {
            match load_json_file(Path::new(objref))? {
                Some(doc) => {
                    let node_hashes = self.docvc.get_associated_node_hashes(&doc)?;
                    let mut hashes = node_hashes.into_iter();
                    return match (hashes.next(), hashes.next()) {
                        (None, _) => Err(VcError::doc_not_tracked(
                            "JSON document not tracked in the system",
                        )),
                        (Some(single), None) => Ok(single),
                        (Some(first), Some(second)) => {
                            let mut candidates = vec![first, second];
                            candidates.extend(hashes);
                            Err(VcError::several_nodes_with_doc(
                                "encountered several nodes associated with the same JSON document",
                                candidates,
                            ))
                        }
                    };
                }
                None if source == ObjrefSource::File => {
                    return Err(VcError::storage(format!("file not found: {objref}")));
                }
                None => {}
            }
        }
        self.docvc.expand_hash_prefix(objref)
    }

    /// Resolve an objref to the document it denotes.
    fn doc_from_objref(&mut self, objref: &str, source: ObjrefSource) -> VcResult<Value> {
        if matches!(source, ObjrefSource::Any | ObjrefSource::File) {
            match load_json_file(Path::new(objref))? {
                Some(doc) => return Ok(doc),
                None if source == ObjrefSource::File => {
                    return Err(VcError::storage(format!("file not found: {objref}")));
                }
                None => {}
            }
        }
        let node_hash = self.docvc.expand_hash_prefix(objref)?;
        self.docvc.get_doc(&node_hash)
    }

    pub fn get_associated_node_hashes(
        &self,
        json_file: &Path,
    ) -> VcResult<std::collections::BTreeSet<String>> {
        let doc = require_json_file(json_file)?;
        self.docvc.get_associated_node_hashes(&doc)
    }

    pub fn get_messages(&mut self, json_file: &Path) -> VcResult<Vec<(String, String)>> {
        let node_hashes: Vec<String> = self
            .get_associated_node_hashes(json_file)?
            .into_iter()
            .collect();
        self.docvc.get_messages(&node_hashes)
    }

    pub fn is_tracked(&self, json_file: &Path) -> VcResult<bool> {
        let doc = require_json_file(json_file)?;
        self.docvc.is_tracked(&doc)
    }

    pub fn track(&mut self, json_file: &Path, message: &str, force: bool) -> VcResult<String> {
        let doc = require_json_file(json_file)?;
        self.docvc.track(&doc, message, force)
    }

    /// Update the node referenced by `old_objref` with the document
    /// referenced by `new_objref`.
    pub fn update(
        &mut self,
        old_objref: &str,
        new_objref: &str,
        message: &str,
        force: bool,
    ) -> VcResult<String> {
        let old_node_hash = self.node_hash_from_objref(old_objref, ObjrefSource::Any)?;
        let new_doc = self.doc_from_objref(new_objref, ObjrefSource::Any)?;
        self.docvc.update(&old_node_hash, &new_doc, message, force)
    }

    /// Update the document in `target_file` with the one in `update_file`,
    /// then move `update_file` over `target_file`. When the target document
    /// is recorded by several nodes, `target_hash_prefix` picks one.
    pub fn replace(
        &mut self,
        target_file: &Path,
        update_file: &Path,
        message: &str,
        force: bool,
        target_hash_prefix: Option<&str>,
    ) -> VcResult<String> {
        let target_node_hash = match target_hash_prefix {
            None => {
                self.node_hash_from_objref(&target_file.to_string_lossy(), ObjrefSource::File)?
            }
            Some(prefix) => {
                let candidates = self.get_associated_node_hashes(target_file)?;
                let matches: Vec<String> = candidates
                    .into_iter()
                    .filter(|h| h.starts_with(prefix))
                    .collect();
                match matches.as_slice() {
                    [] => {
                        return Err(VcError::invalid_argument(
                            "no target node matches the given hash prefix",
                        ))
                    }
                    [single] => single.clone(),
                    _ => {
                        return Err(VcError::hash_prefix_ambiguous(
                            "the hash prefix matches several node hashes",
                        ))
                    }
                }
            }
        };
        let new_doc = self.doc_from_objref(&update_file.to_string_lossy(), ObjrefSource::File)?;
        let node_hash = self
            .docvc
            .update(&target_node_hash, &new_doc, message, force)?;
        fs::rename(update_file, target_file).map_err(|e| {
            VcError::storage(format!(
                "cannot replace {} with {}: {e}",
                target_file.display(),
                update_file.display()
            ))
        })?;
        Ok(node_hash)
    }

    pub fn get_linear_history(&mut self, objref: &str) -> VcResult<Vec<HistoryEntry>> {
        let node_hash = self.node_hash_from_objref(objref, ObjrefSource::Any)?;
        self.docvc.get_linear_history(&node_hash)
    }

    /// The document denoted by a node-hash prefix.
    pub fn get_doc(&mut self, objref: &str) -> VcResult<Value> {
        self.doc_from_objref(objref, ObjrefSource::Cache)
    }

    pub fn get_diff(&mut self, old_objref: &str, new_objref: &str) -> VcResult<Vec<Value>> {
        let old_doc = self.doc_from_objref(old_objref, ObjrefSource::Any)?;
        let new_doc = self.doc_from_objref(new_objref, ObjrefSource::Any)?;
        self.docvc.get_diff(&old_doc, &new_doc)
    }
}

/// Read a JSON file; `Ok(None)` when the path does not point at a file. A
/// present but unparsable file is an error in every resolution mode.
fn load_json_file(path: &Path) -> VcResult<Option<Value>> {
    if !path.is_file() {
        return Ok(None);
    }
    let bytes =
        fs::read(path).map_err(|e| VcError::storage(format!("cannot read {path:?}: {e}")))?;
    let doc = serde_json::from_slice(&bytes).map_err(|e| {
        VcError::invalid_argument(format!("the file {} is not in JSON format: {e}", path.display()))
    })?;
    Ok(Some(doc))
}

fn require_json_file(path: &Path) -> VcResult<Value> {
    load_json_file(path)?
        .ok_or_else(|| VcError::storage(format!("file not found: {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonvc_store::LocalStore;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Fixture {
        _storage_dir: TempDir,
        work_dir: TempDir,
        fvc: FileVersionControl,
    }

    fn fixture() -> Fixture {
        let storage_dir = TempDir::new().unwrap();
        let work_dir = TempDir::new().unwrap();
        let storage: Arc<dyn StorageProvider> =
            Arc::new(LocalStore::open(storage_dir.path()).unwrap());
        Fixture {
            fvc: FileVersionControl::new(storage).unwrap(),
            _storage_dir: storage_dir,
            work_dir,
        }
    }

    fn write_json(dir: &Path, name: &str, doc: &Value) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, serde_json::to_vec(doc).unwrap()).unwrap();
        path
    }

    #[test]
    fn track_and_update_through_files() {
        let mut fx = fixture();
        let orig = write_json(fx.work_dir.path(), "orig.json", &json!({"a": 23}));
        let upd = write_json(fx.work_dir.path(), "upd.json", &json!({"a": 27}));

        fx.fvc.track(&orig, "first message", false).unwrap();
        fx.fvc
            .update(
                &orig.to_string_lossy(),
                &upd.to_string_lossy(),
                "second message",
                false,
            )
            .unwrap();

        let history = fx
            .fvc
            .get_linear_history(&upd.to_string_lossy())
            .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].node.message(), Some("first message"));
        assert_eq!(history[1].node.message(), Some("second message"));
        assert_eq!(history[1].node.source_hashes().len(), 1);
        assert!(history[1]
            .node
            .source_hashes()
            .contains(&history[0].node_hash));
    }

    #[test]
    fn objref_falls_back_to_hash_prefix() {
        let mut fx = fixture();
        let orig = write_json(fx.work_dir.path(), "orig.json", &json!({"a": 1}));
        let node_hash = fx.fvc.track(&orig, "m", false).unwrap();

        // a prefix of the node hash resolves even though no such file exists
        let history = fx.fvc.get_linear_history(&node_hash[..12]).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].node_hash, node_hash);
    }

    #[test]
    fn ambiguous_document_reference_is_reported() {
        let mut fx = fixture();
        let orig = write_json(fx.work_dir.path(), "orig.json", &json!({"a": 1}));
        let upd = write_json(fx.work_dir.path(), "upd.json", &json!({"a": 2}));

        fx.fvc.track(&orig, "m1", false).unwrap();
        {
            let doc = json!({"a": 1});
            fx.fvc.doc_vc_mut().track(&doc, "m2", true).unwrap();
        }

        let err = fx
            .fvc
            .update(
                &orig.to_string_lossy(),
                &upd.to_string_lossy(),
                "m3",
                false,
            )
            .unwrap_err();
        match err {
            VcError::SeveralNodesWithDoc { node_hashes, .. } => {
                assert_eq!(node_hashes.len(), 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn replace_moves_the_update_file_over_the_target() {
        let mut fx = fixture();
        let target = write_json(fx.work_dir.path(), "target.json", &json!({"a": 1}));
        let update = write_json(fx.work_dir.path(), "update.json", &json!({"a": 2}));

        fx.fvc.track(&target, "m1", false).unwrap();
        fx.fvc
            .replace(&target, &update, "m2", false, None)
            .unwrap();

        assert!(!update.exists());
        let doc: Value = serde_json::from_slice(&fs::read(&target).unwrap()).unwrap();
        assert_eq!(doc, json!({"a": 2}));

        let history = fx
            .fvc
            .get_linear_history(&target.to_string_lossy())
            .unwrap();
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn replace_disambiguates_with_target_hash_prefix() {
        let mut fx = fixture();
        let target = write_json(fx.work_dir.path(), "target.json", &json!({"a": 1}));
        let update = write_json(fx.work_dir.path(), "update.json", &json!({"a": 2}));

        let h0 = fx.fvc.track(&target, "m1", false).unwrap();
        fx.fvc.doc_vc_mut().track(&json!({"a": 1}), "m2", true).unwrap();

        // without a prefix the reference is ambiguous
        let err = fx
            .fvc
            .replace(&target, &update, "m3", false, None)
            .unwrap_err();
        assert!(matches!(err, VcError::SeveralNodesWithDoc { .. }));

        fx.fvc
            .replace(&target, &update, "m3", false, Some(&h0[..16]))
            .unwrap();
        assert!(!update.exists());
    }

    #[test]
    fn unparsable_file_is_rejected() {
        let fx = fixture();
        let path = fx.work_dir.path().join("broken.json");
        fs::write(&path, b"{not json").unwrap();
        let err = fx.fvc.is_tracked(&path).unwrap_err();
        assert!(matches!(err, VcError::InvalidArgument { .. }));
    }

    #[test]
    fn get_doc_resolves_from_cache_only() {
        let mut fx = fixture();
        let orig = write_json(fx.work_dir.path(), "orig.json", &json!({"a": 1}));
        let node_hash = fx.fvc.track(&orig, "m", false).unwrap();

        assert_eq!(fx.fvc.get_doc(&node_hash[..10]).unwrap(), json!({"a": 1}));
        // a path is not accepted here
        assert!(fx.fvc.get_doc(&orig.to_string_lossy()).is_err());
    }
}
