//! Cache file persistence.
//!
//! The node cache snapshot lives next to the config file as `cache.json`.
//! It is merged into the in-memory cache before a command runs and written
//! back after every successful mutation.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

use jsonvc_graph::CacheSnapshot;

use crate::config::config_dir;

const CACHE_FILENAME: &str = "cache.json";

pub fn cache_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CACHE_FILENAME))
}

pub fn read_cache_file() -> Result<CacheSnapshot> {
    let path = cache_file_path()?;
    if !path.is_file() {
        return Ok(CacheSnapshot::default());
    }
    let raw = fs::read_to_string(&path)
        .with_context(|| format!("cannot read cache file {}", path.display()))?;
    let snapshot = serde_json::from_str(&raw)
        .with_context(|| format!("invalid cache file {}", path.display()))?;
    Ok(snapshot)
}

pub fn write_cache_file(snapshot: &CacheSnapshot) -> Result<()> {
    let path = cache_file_path()?;
    let value = snapshot.to_value()?;
    let bytes = jsonvc_core::canonical::to_canonical_bytes(&value)?;
    fs::write(&path, bytes)
        .with_context(|| format!("cannot write cache file {}", path.display()))
}
