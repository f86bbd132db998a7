//! Configuration file handling.
//!
//! The configuration lives as JSON under the user config directory
//! (`<config-dir>/jsonvc/config.json`). Keys use the hyphenated names the
//! `config set` subcommand accepts. The `JSON_STORAGE_PATH` environment
//! variable overrides the configured local storage directory.

use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "jsonvc";
const CONFIG_FILENAME: &str = "config.json";

pub const ALLOWED_KEYS: &[&str] = &[
    "storage-backend",
    "local-storage-path",
    "ipfs-gateway-url",
    "ipfs-rpc-url",
    "ipfs-rpc-url-upload",
    "ipfs-cache-dir",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// "local" | "ipfs"
    #[serde(rename = "storage-backend", skip_serializing_if = "Option::is_none")]
    pub storage_backend: Option<String>,

    #[serde(rename = "local-storage-path", skip_serializing_if = "Option::is_none")]
    pub local_storage_path: Option<String>,

    #[serde(rename = "ipfs-gateway-url", skip_serializing_if = "Option::is_none")]
    pub ipfs_gateway_url: Option<String>,

    #[serde(rename = "ipfs-rpc-url", skip_serializing_if = "Option::is_none")]
    pub ipfs_rpc_url: Option<String>,

    #[serde(rename = "ipfs-rpc-url-upload", skip_serializing_if = "Option::is_none")]
    pub ipfs_rpc_url_upload: Option<String>,

    #[serde(rename = "ipfs-cache-dir", skip_serializing_if = "Option::is_none")]
    pub ipfs_cache_dir: Option<String>,
}

impl AppConfig {
    /// Apply a `config set` assignment. The key must be one of
    /// `ALLOWED_KEYS`; `storage-backend` additionally restricts its value.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "storage-backend" => {
                if value != "local" && value != "ipfs" {
                    bail!("value must be in (local, ipfs)");
                }
                self.storage_backend = Some(value.to_string());
            }
            "local-storage-path" => self.local_storage_path = Some(value.to_string()),
            "ipfs-gateway-url" => self.ipfs_gateway_url = Some(value.to_string()),
            "ipfs-rpc-url" => self.ipfs_rpc_url = Some(value.to_string()),
            "ipfs-rpc-url-upload" => self.ipfs_rpc_url_upload = Some(value.to_string()),
            "ipfs-cache-dir" => self.ipfs_cache_dir = Some(value.to_string()),
            _ => bail!("key must be in ({})", ALLOWED_KEYS.join(", ")),
        }
        Ok(())
    }
}

/// The per-user configuration directory, created on first use.
pub fn config_dir() -> Result<PathBuf> {
    let base = dirs::config_dir().ok_or_else(|| anyhow!("no user config directory available"))?;
    let dir = base.join(APP_NAME);
    fs::create_dir_all(&dir)
        .with_context(|| format!("cannot create config dir {}", dir.display()))?;
    Ok(dir)
}

pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILENAME))
}

pub fn read_config() -> Result<AppConfig> {
    let path = config_file_path()?;
    if !path.is_file() {
        return Ok(AppConfig::default());
    }
    let raw = fs::read_to_string(&path)
        .with_context(|| format!("cannot read config file {}", path.display()))?;
    serde_json::from_str(&raw).map_err(|e| anyhow!("invalid config json: {e}"))
}

pub fn write_config(config: &AppConfig) -> Result<()> {
    let path = config_file_path()?;
    let raw = serde_json::to_string_pretty(config)?;
    fs::write(&path, raw)
        .with_context(|| format!("cannot write config file {}", path.display()))
}
