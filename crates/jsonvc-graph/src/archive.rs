//! Document archive.
//!
//! Maps a directory tree of JSON files to tracked graph nodes. The archive
//! itself is a nested JSON structure rooted at `rootPath`: directories are
//! objects, files are node-hash strings. It can be saved/loaded as a JSON
//! file and materialized back into a directory tree.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use walkdir::WalkDir;

use jsonvc_core::errors::{VcError, VcResult};

use crate::files::FileVersionControl;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ArchiveState {
    #[serde(rename = "rootPath")]
    root_path: Option<String>,
    archive: Map<String, Value>,
}

pub struct DocumentArchive {
    fvc: FileVersionControl,
    root_path: Option<PathBuf>,
    archive: Map<String, Value>,
}

impl DocumentArchive {
    pub fn new(fvc: FileVersionControl) -> Self {
        Self {
            fvc,
            root_path: None,
            archive: Map::new(),
        }
    }

    pub fn file_vc(&self) -> &FileVersionControl {
        &self.fvc
    }

    pub fn file_vc_mut(&mut self) -> &mut FileVersionControl {
        &mut self.fvc
    }

    pub fn root_path(&self) -> Option<&Path> {
        self.root_path.as_deref()
    }

    /// Define the directory the archive mirrors. An already-set root is
    /// only replaced with `allow_change`; an existing directory is only
    /// accepted with `allow_exist`.
    pub fn set_root_path(
        &mut self,
        root_path: &Path,
        allow_change: bool,
        allow_exist: bool,
    ) -> VcResult<()> {
        if self.root_path.is_some() && !allow_change {
            return Err(VcError::invalid_argument("the root path is already defined"));
        }
        if root_path.is_dir() {
            if !allow_exist {
                return Err(VcError::invalid_argument(format!(
                    "the directory {} already exists",
                    root_path.display()
                )));
            }
        } else {
            fs::create_dir(root_path).map_err(|e| {
                VcError::storage(format!("cannot create {}: {e}", root_path.display()))
            })?;
        }
        self.root_path = Some(root_path.to_path_buf());
        Ok(())
    }

    /// Track a file that is not yet in the archive.
    pub fn add(&mut self, filepath: &Path, message: &str, force: bool) -> VcResult<String> {
        let rel = self.relative_path(filepath)?;
        if self.entry_for(&rel)?.is_some() {
            return Err(VcError::invalid_argument(
                "file already in document archive, use `update` instead",
            ));
        }
        let node_hash = self.fvc.track(filepath, message, force)?;
        self.set_entry(&rel, node_hash.clone())?;
        Ok(node_hash)
    }

    /// Record a new version of a file already in the archive.
    pub fn update(&mut self, filepath: &Path, message: &str, force: bool) -> VcResult<String> {
        let rel = self.relative_path(filepath)?;
        let old_node_hash = self.entry_for(&rel)?.ok_or_else(|| {
            VcError::invalid_argument("file not in document archive, use `add` instead")
        })?;
        let node_hash = self.fvc.update(
            &old_node_hash,
            &filepath.to_string_lossy(),
            message,
            force,
        )?;
        self.set_entry(&rel, node_hash.clone())?;
        Ok(node_hash)
    }

    /// Drop a file from the archive, pruning directories left empty.
    pub fn remove(&mut self, filepath: &Path) -> VcResult<()> {
        let rel = self.relative_path(filepath)?;
        let parts = path_parts(&rel)?;
        remove_entry(&mut self.archive, &parts)
    }

    /// Whether the working file differs from the version the archive
    /// records.
    pub fn is_modified(&mut self, filepath: &Path) -> VcResult<bool> {
        let rel = self.relative_path(filepath)?;
        let node_hash = self.entry_for(&rel)?.ok_or_else(|| {
            VcError::invalid_argument(format!(
                "file {} not registered in document archive",
                filepath.display()
            ))
        })?;
        let node = self.fvc.doc_vc_mut().cache_mut().get_node(&node_hash)?;
        let registered_doc_hash = node.document_hash().to_string();

        let bytes = fs::read(filepath)
            .map_err(|e| VcError::storage(format!("cannot read {}: {e}", filepath.display())))?;
        let doc: Value = serde_json::from_slice(&bytes).map_err(|e| {
            VcError::invalid_argument(format!(
                "the file {} is not in JSON format: {e}",
                filepath.display()
            ))
        })?;
        let current_doc_hash = self.fvc.doc_vc().storage().compute_hash(&doc)?;
        Ok(registered_doc_hash != current_doc_hash)
    }

    /// Archived files whose working copies have diverged.
    pub fn modified_files(&mut self) -> VcResult<Vec<PathBuf>> {
        let root = self.require_root()?.to_path_buf();
        let mut files = Vec::new();
        collect_archived_files(&self.archive, &root, &mut files);
        let mut modified = Vec::new();
        for filepath in files {
            if self.is_modified(&filepath)? {
                modified.push(filepath);
            }
        }
        Ok(modified)
    }

    /// Files under the root directory with no archive entry.
    pub fn untracked_files(&self) -> VcResult<Vec<PathBuf>> {
        let root = self.require_root()?;
        let mut untracked = Vec::new();
        for entry in WalkDir::new(root) {
            let entry =
                entry.map_err(|e| VcError::storage(format!("cannot walk archive root: {e}")))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(root)
                .map_err(|_| VcError::invalid_argument("walked file escapes the archive root"))?;
            if self.entry_for(rel)?.is_none() {
                untracked.push(entry.path().to_path_buf());
            }
        }
        Ok(untracked)
    }

    /// Materialize every archived document into `dirpath`, mirroring the
    /// archive's directory structure. Refuses to overwrite existing files.
    pub fn write_to_dir(&mut self, dirpath: &Path) -> VcResult<()> {
        let archive = self.archive.clone();
        write_tree(&mut self.fvc, &archive, dirpath)
    }

    /// Save the archive state as a JSON file.
    pub fn save(&self, filepath: &Path, overwrite: bool) -> VcResult<()> {
        if filepath.is_file() && !overwrite {
            return Err(VcError::invalid_argument(format!(
                "file {} exists, aborting",
                filepath.display()
            )));
        }
        let state = ArchiveState {
            root_path: self
                .root_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
            archive: self.archive.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&state)
            .map_err(|e| VcError::serialization(format!("failed to serialize archive: {e}")))?;
        fs::write(filepath, bytes)
            .map_err(|e| VcError::storage(format!("cannot write {}: {e}", filepath.display())))
    }

    /// Load the archive state from a JSON file.
    pub fn load(&mut self, filepath: &Path) -> VcResult<()> {
        let bytes = fs::read(filepath)
            .map_err(|e| VcError::storage(format!("cannot read {}: {e}", filepath.display())))?;
        let state: ArchiveState = serde_json::from_slice(&bytes)
            .map_err(|e| VcError::serialization(format!("invalid archive file: {e}")))?;
        self.root_path = state.root_path.map(PathBuf::from);
        self.archive = state.archive;
        Ok(())
    }

    fn require_root(&self) -> VcResult<&Path> {
        self.root_path
            .as_deref()
            .ok_or_else(|| VcError::invalid_argument("root_path not set"))
    }

    /// The path of `filepath` relative to the archive root; fails when the
    /// file lies outside the root.
    fn relative_path(&self, filepath: &Path) -> VcResult<PathBuf> {
        let root = self.require_root()?;
        let root_abs = std::path::absolute(root)
            .map_err(|e| VcError::storage(format!("cannot resolve root path: {e}")))?;
        let file_abs = std::path::absolute(filepath)
            .map_err(|e| VcError::storage(format!("cannot resolve file path: {e}")))?;
        file_abs
            .strip_prefix(&root_abs)
            .map(Path::to_path_buf)
            .map_err(|_| VcError::invalid_argument("file is not inside the archive root"))
    }

    fn entry_for(&self, rel: &Path) -> VcResult<Option<String>> {
        let parts = path_parts(rel)?;
        let mut current: &Map<String, Value> = &self.archive;
        for (i, part) in parts.iter().enumerate() {
            match current.get(part.as_str()) {
                None => return Ok(None),
                Some(Value::Object(child)) => {
                    if i == parts.len() - 1 {
                        return Err(VcError::invalid_argument(
                            "archive path refers to a directory, not a file",
                        ));
                    }
                    current = child;
                }
                Some(Value::String(hash)) => {
                    if i == parts.len() - 1 {
                        return Ok(Some(hash.clone()));
                    }
                    return Err(VcError::invalid_argument(
                        "archive path descends through a file entry",
                    ));
                }
                Some(_) => {
                    return Err(VcError::invalid_argument(
                        "archive entry is neither a directory nor a node hash",
                    ))
                }
            }
        }
        Ok(None)
    }

    fn set_entry(&mut self, rel: &Path, node_hash: String) -> VcResult<()> {
        let parts = path_parts(rel)?;
        let mut current: &mut Map<String, Value> = &mut self.archive;
        for part in &parts[..parts.len() - 1] {
            let slot = current
                .entry(part.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            current = slot.as_object_mut().ok_or_else(|| {
                VcError::invalid_argument("archive path descends through a file entry")
            })?;
        }
        current.insert(
            parts[parts.len() - 1].clone(),
            Value::String(node_hash),
        );
        Ok(())
    }
}

fn path_parts(rel: &Path) -> VcResult<Vec<String>> {
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        return Err(VcError::invalid_argument("empty archive path"));
    }
    Ok(parts)
}

fn remove_entry(map: &mut Map<String, Value>, parts: &[String]) -> VcResult<()> {
    match parts {
        [] => Err(VcError::invalid_argument("empty archive path")),
        [leaf] => {
            map.remove(leaf.as_str())
                .ok_or_else(|| VcError::invalid_argument("file not in document archive"))?;
            Ok(())
        }
        [head, rest @ ..] => {
            let child = map
                .get_mut(head.as_str())
                .and_then(Value::as_object_mut)
                .ok_or_else(|| VcError::invalid_argument("file not in document archive"))?;
            remove_entry(child, rest)?;
            if child_is_empty(map, head) {
                map.remove(head.as_str());
            }
            Ok(())
        }
    }
}

fn child_is_empty(map: &Map<String, Value>, key: &str) -> bool {
    matches!(map.get(key), Some(Value::Object(o)) if o.is_empty())
}

fn collect_archived_files(map: &Map<String, Value>, dir: &Path, out: &mut Vec<PathBuf>) {
    for (name, entry) in map {
        match entry {
            Value::Object(child) => collect_archived_files(child, &dir.join(name), out),
            _ => out.push(dir.join(name)),
        }
    }
}

fn write_tree(
    fvc: &mut FileVersionControl,
    map: &Map<String, Value>,
    dir: &Path,
) -> VcResult<()> {
    create_or_accept_empty_dir(dir)?;
    for (name, entry) in map {
        let path = dir.join(name);
        match entry {
            Value::Object(child) => write_tree(fvc, child, &path)?,
            Value::String(node_hash) => {
                if path.is_file() {
                    return Err(VcError::invalid_argument(format!(
                        "the file {} already exists",
                        path.display()
                    )));
                }
                let doc = fvc.doc_vc_mut().get_doc(node_hash)?;
                let bytes = serde_json::to_vec_pretty(&doc).map_err(|e| {
                    VcError::serialization(format!("failed to serialize document: {e}"))
                })?;
                fs::write(&path, bytes).map_err(|e| {
                    VcError::storage(format!("cannot write {}: {e}", path.display()))
                })?;
            }
            _ => {
                return Err(VcError::invalid_argument(
                    "archive entry is neither a directory nor a node hash",
                ))
            }
        }
    }
    Ok(())
}

fn create_or_accept_empty_dir(dir: &Path) -> VcResult<()> {
    if dir.is_dir() {
        let mut entries = fs::read_dir(dir)
            .map_err(|e| VcError::storage(format!("cannot list {}: {e}", dir.display())))?;
        if entries.next().is_some() {
            return Err(VcError::invalid_argument(format!(
                "directory {} is not empty",
                dir.display()
            )));
        }
        return Ok(());
    }
    fs::create_dir(dir)
        .map_err(|e| VcError::storage(format!("cannot create {}: {e}", dir.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonvc_store::{LocalStore, StorageProvider};
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Fixture {
        _storage_dir: TempDir,
        work_dir: TempDir,
        archive: DocumentArchive,
    }

    fn fixture() -> Fixture {
        let storage_dir = TempDir::new().unwrap();
        let work_dir = TempDir::new().unwrap();
        let storage: Arc<dyn StorageProvider> =
            Arc::new(LocalStore::open(storage_dir.path()).unwrap());
        let mut archive = DocumentArchive::new(FileVersionControl::new(storage).unwrap());
        archive
            .set_root_path(work_dir.path(), false, true)
            .unwrap();
        Fixture {
            _storage_dir: storage_dir,
            work_dir,
            archive,
        }
    }

    fn write_json(dir: &Path, rel: &str, doc: &Value) -> PathBuf {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, serde_json::to_vec(doc).unwrap()).unwrap();
        path
    }

    #[test]
    fn add_update_and_modification_tracking() {
        let mut fx = fixture();
        let file = write_json(fx.work_dir.path(), "sub/doc.json", &json!({"a": 1}));

        fx.archive.add(&file, "first", false).unwrap();
        assert!(!fx.archive.is_modified(&file).unwrap());

        // adding twice is rejected
        assert!(fx.archive.add(&file, "again", false).is_err());

        write_json(fx.work_dir.path(), "sub/doc.json", &json!({"a": 2}));
        assert!(fx.archive.is_modified(&file).unwrap());
        assert_eq!(fx.archive.modified_files().unwrap(), vec![file.clone()]);

        fx.archive.update(&file, "second", false).unwrap();
        assert!(!fx.archive.is_modified(&file).unwrap());

        let history = fx
            .archive
            .file_vc_mut()
            .get_linear_history(&file.to_string_lossy())
            .unwrap();
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn remove_prunes_empty_directories() {
        let mut fx = fixture();
        let file = write_json(fx.work_dir.path(), "a/b/doc.json", &json!({"x": 1}));
        fx.archive.add(&file, "m", false).unwrap();

        fx.archive.remove(&file).unwrap();
        assert!(fx.archive.archive.is_empty());
        assert!(fx.archive.remove(&file).is_err());
    }

    #[test]
    fn untracked_files_are_listed() {
        let mut fx = fixture();
        let tracked = write_json(fx.work_dir.path(), "tracked.json", &json!({"a": 1}));
        let loose = write_json(fx.work_dir.path(), "loose.json", &json!({"b": 2}));

        fx.archive.add(&tracked, "m", false).unwrap();
        let untracked = fx.archive.untracked_files().unwrap();
        assert_eq!(untracked, vec![loose]);
    }

    #[test]
    fn save_load_and_materialize() {
        let mut fx = fixture();
        let file = write_json(fx.work_dir.path(), "nested/doc.json", &json!({"a": 1}));
        fx.archive.add(&file, "m", false).unwrap();

        let state_file = fx.work_dir.path().join("archive-state.json");
        fx.archive.save(&state_file, false).unwrap();
        assert!(fx.archive.save(&state_file, false).is_err());
        fx.archive.save(&state_file, true).unwrap();

        let out_root = TempDir::new().unwrap();
        let out_dir = out_root.path().join("out");
        fx.archive.write_to_dir(&out_dir).unwrap();
        let rebuilt: Value =
            serde_json::from_slice(&fs::read(out_dir.join("nested/doc.json")).unwrap()).unwrap();
        assert_eq!(rebuilt, json!({"a": 1}));

        // reload the saved state into a fresh archive over the same store
        let storage: Arc<dyn StorageProvider> =
            Arc::new(LocalStore::open(fx._storage_dir.path()).unwrap());
        let mut reloaded = DocumentArchive::new(FileVersionControl::new(storage).unwrap());
        reloaded.load(&state_file).unwrap();
        assert_eq!(
            reloaded.root_path().unwrap(),
            fx.archive.root_path().unwrap()
        );
        assert!(!reloaded.is_modified(&file).unwrap());
    }
}
