//! Local filesystem backend.
//!
//! One file per object at `<dir>/<hash>.json`, holding the canonical byte
//! form. Loads are verified: bytes that do not hash back to their filename
//! fail with an integrity error. Writes go through a temp file and rename,
//! so a referenced object is either fully durable or absent.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use jsonvc_core::canonical::to_canonical_bytes;
use jsonvc_core::errors::{VcError, VcResult};
use jsonvc_core::hashing::{check_hash_wellformed, compute_bytes_hash, compute_hash, HASH_LEN};

use crate::{ObjectIndex, StorageProvider};

const OBJECT_SUFFIX: &str = "json";

pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    /// Open (creating if necessary) a storage directory.
    pub fn open<P: AsRef<Path>>(dir: P) -> VcResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .map_err(|e| VcError::storage(format!("cannot create storage dir {dir:?}: {e}")))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, hash: &str) -> PathBuf {
        self.dir.join(format!("{hash}.{OBJECT_SUFFIX}"))
    }

    fn load_verified(&self, hash: &str) -> VcResult<Value> {
        let path = self.path_for(hash);
        let bytes = fs::read(&path)
            .map_err(|e| VcError::storage(format!("cannot read object {hash}: {e}")))?;
        let value: Value = serde_json::from_slice(&bytes)
            .map_err(|e| VcError::storage(format!("object {hash} is not valid JSON: {e}")))?;
        let actual = compute_hash(&value)?;
        if actual != hash {
            return Err(VcError::integrity(format!(
                "object {hash} is compromised: contents hash to {actual}"
            )));
        }
        Ok(value)
    }
}

impl StorageProvider for LocalStore {
    fn store(&self, value: &Value) -> VcResult<String> {
        let bytes = to_canonical_bytes(value)?;
        let hash = compute_bytes_hash(&bytes);
        let path = self.path_for(&hash);
        if path.exists() {
            // already present: verify instead of rewriting
            self.load_verified(&hash)?;
            return Ok(hash);
        }

        let tmp = path.with_extension("tmp");
        {
            let mut f = fs::File::create(&tmp)
                .map_err(|e| VcError::storage(format!("cannot create {tmp:?}: {e}")))?;
            f.write_all(&bytes)
                .map_err(|e| VcError::storage(format!("cannot write {tmp:?}: {e}")))?;
            f.sync_all()
                .map_err(|e| VcError::storage(format!("cannot sync {tmp:?}: {e}")))?;
        }
        fs::rename(&tmp, &path)
            .map_err(|e| VcError::storage(format!("cannot move object into place: {e}")))?;
        debug!(%hash, "stored object");
        Ok(hash)
    }

    fn load(&self, hash: &str) -> VcResult<Value> {
        check_hash_wellformed(hash)?;
        self.load_verified(hash)
    }

    fn exists(&self, hash: &str) -> VcResult<bool> {
        check_hash_wellformed(hash)?;
        Ok(self.path_for(hash).is_file())
    }

    fn compute_hash(&self, value: &Value) -> VcResult<String> {
        compute_hash(value)
    }

    fn as_object_index(&self) -> Option<&dyn ObjectIndex> {
        Some(self)
    }
}

impl ObjectIndex for LocalStore {
    fn index(&self) -> VcResult<Vec<String>> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| VcError::storage(format!("cannot list storage dir: {e}")))?;
        let mut hashes = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|e| VcError::storage(format!("cannot list storage dir: {e}")))?;
            if let Some(stem) = wellformed_stem(&entry.path()) {
                hashes.push(stem);
            }
        }
        hashes.sort();
        Ok(hashes)
    }

    fn size(&self, hash: &str) -> VcResult<u64> {
        check_hash_wellformed(hash)?;
        let meta = fs::metadata(self.path_for(hash))
            .map_err(|e| VcError::storage(format!("cannot stat object {hash}: {e}")))?;
        Ok(meta.len())
    }
}

/// The hash stem of a well-formed object filename (`<64 hex>.json`), if any.
fn wellformed_stem(path: &Path) -> Option<String> {
    if path.extension().and_then(|e| e.to_str()) != Some(OBJECT_SUFFIX) {
        return None;
    }
    let stem = path.file_stem().and_then(|s| s.to_str())?;
    if stem.len() != HASH_LEN || !stem.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    Some(stem.to_string())
}
