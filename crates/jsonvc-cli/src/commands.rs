//! Subcommand implementations.
//!
//! Each action prints its user-facing output and returns the process exit
//! code: 0 on success, 1 on user error or failure. Precondition failures
//! with dedicated guidance (re-tracking, ambiguous references) are handled
//! here; everything else bubbles up to `main` as an error.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use serde_json::Value;
use tracing::debug;

use jsonvc_core::VcError;
use jsonvc_graph::FileVersionControl;
use jsonvc_store::{IpfsStore, LocalStore, StorageProvider};

use crate::cache_file::write_cache_file;
use crate::config::AppConfig;

/// Build the storage provider selected by the configuration.
pub fn build_storage(config: &AppConfig, provide: bool) -> Result<Arc<dyn StorageProvider>> {
    match config.storage_backend.as_deref() {
        Some("local") => {
            let storage_path = match std::env::var_os("JSON_STORAGE_PATH") {
                Some(v) => PathBuf::from(v),
                None => PathBuf::from(config.local_storage_path.clone().ok_or_else(|| {
                    anyhow!(
                        "please define environment variable JSON_STORAGE_PATH with the \
                         path to the JSON document storage or set the \
                         `local-storage-path` variable in the configuration"
                    )
                })?),
            };
            if !storage_path.is_dir() {
                bail!(
                    "the directory `{}` to store JSON objects does not exist; either \
                     create it, point the JSON_STORAGE_PATH environment variable at an \
                     existing directory, or set the `local-storage-path` variable in \
                     the configuration",
                    storage_path.display()
                );
            }
            debug!(path = %storage_path.display(), "using local storage backend");
            Ok(Arc::new(LocalStore::open(&storage_path)?))
        }
        Some("ipfs") => {
            let cache_dir = require_key(config.ipfs_cache_dir.as_deref(), "ipfs-cache-dir")?;
            let gateway_url = require_key(config.ipfs_gateway_url.as_deref(), "ipfs-gateway-url")?;
            let rpc_url = require_key(config.ipfs_rpc_url.as_deref(), "ipfs-rpc-url")?;
            let mut store = IpfsStore::open(
                cache_dir,
                gateway_url,
                rpc_url,
                config.ipfs_rpc_url_upload.clone(),
            )?;
            if provide {
                store.enable_provide();
            }
            Ok(Arc::new(store))
        }
        Some(other) => bail!("unknown storage backend `{other}` in configuration"),
        None => bail!(
            "set the `storage-backend` configuration variable (local or ipfs), \
             e.g. `jsonvc config set storage-backend local`"
        ),
    }
}

fn require_key<'a>(value: Option<&'a str>, key: &str) -> Result<&'a str> {
    value.ok_or_else(|| anyhow!("please set variable `{key}` in configuration"))
}

fn save_cache(fvc: &FileVersionControl) -> Result<()> {
    write_cache_file(&fvc.doc_vc().cache().to_snapshot())
}

fn abbrev(hash: &str, full_hash: bool) -> &str {
    if full_hash || hash.len() < 10 {
        hash
    } else {
        &hash[..10]
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn print_json(value: &Value, indent: bool) -> Result<()> {
    let rendered = if indent {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{rendered}");
    Ok(())
}

pub fn track(fvc: &mut FileVersionControl, filename: &Path, message: &str) -> Result<ExitCode> {
    let node_hash = fvc.track(filename, message, false)?;
    save_cache(fvc)?;
    println!("Now tracking file {}.", display_name(filename));
    println!("Associated node hash: {node_hash}");
    Ok(ExitCode::SUCCESS)
}

pub fn istracked(fvc: &FileVersionControl, filename: &Path) -> Result<ExitCode> {
    if !fvc.is_tracked(filename)? {
        println!("The file {} is not tracked", display_name(filename));
        return Ok(ExitCode::FAILURE);
    }
    let node_hashes = fvc.get_associated_node_hashes(filename)?;
    let suffix = if node_hashes.len() > 1 { "es" } else { "" };
    let listing: Vec<String> = node_hashes.into_iter().collect();
    println!(
        "The file {} is tracked and associated with node hash{suffix}:\n{}",
        display_name(filename),
        listing.join("\n")
    );
    Ok(ExitCode::SUCCESS)
}

pub fn update(
    fvc: &mut FileVersionControl,
    old_objref: &str,
    new_objref: &str,
    message: &str,
    force: bool,
) -> Result<ExitCode> {
    match fvc.update(old_objref, new_objref, message, force) {
        Ok(_) => {}
        Err(VcError::DocAlreadyTracked { .. }) => {
            println!(
                "The new document is already in the system.\n\
                 Use the `showassoc` subcommand to list associated nodes.\n\
                 If you want to force the creation of a new node, use the --force flag"
            );
            return Ok(ExitCode::FAILURE);
        }
        Err(VcError::SeveralNodesWithDoc { node_hashes, .. }) => {
            println!("The reference to the object to be updated is ambiguous:\n");
            println!("{}\n", node_hashes.join("\n"));
            println!("Please use a hash prefix instead of a filename to remove this ambiguity");
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => return Err(e.into()),
    }
    save_cache(fvc)?;
    println!("Successfully registered update to json object {old_objref}");
    Ok(ExitCode::SUCCESS)
}

pub fn replace(
    fvc: &mut FileVersionControl,
    target_file: &Path,
    update_file: &Path,
    message: &str,
    force: bool,
    target_hash_prefix: Option<&str>,
) -> Result<ExitCode> {
    match fvc.replace(target_file, update_file, message, force, target_hash_prefix) {
        Ok(_) => {}
        Err(VcError::DocAlreadyTracked { .. }) => {
            println!(
                "The JSON document in {} is already in the system.\n\
                 Use the `showassoc` subcommand to list associated nodes.\n\
                 If you want to force the replacement and creation of a new node, \
                 use the --force flag",
                display_name(update_file)
            );
            return Ok(ExitCode::FAILURE);
        }
        Err(VcError::SeveralNodesWithDoc { node_hashes, .. }) => {
            println!(
                "Several nodes exist with the JSON document in {}:\n",
                display_name(target_file)
            );
            println!("{}\n", node_hashes.join("\n"));
            println!("Please specify the --targethash argument to eliminate this ambiguity");
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => return Err(e.into()),
    }
    save_cache(fvc)?;
    println!(
        "Successfully replaced json file {} by {}",
        display_name(target_file),
        display_name(update_file)
    );
    Ok(ExitCode::SUCCESS)
}

pub fn showassoc(
    fvc: &mut FileVersionControl,
    objref: &Path,
    full_hash: bool,
) -> Result<ExitCode> {
    let node_hashes = fvc.get_associated_node_hashes(objref)?;
    if node_hashes.is_empty() {
        println!("The referenced JSON document is not tracked.");
        return Ok(ExitCode::FAILURE);
    }
    println!("The referenced JSON document is associated with the following nodes:");
    for (node_hash, message) in fvc.get_messages(objref)? {
        println!("{}: {message}", abbrev(&node_hash, full_hash));
    }
    Ok(ExitCode::SUCCESS)
}

pub fn showlog(fvc: &mut FileVersionControl, objref: &str, full_hash: bool) -> Result<ExitCode> {
    match fvc.get_linear_history(objref) {
        Ok(history) => {
            for entry in history {
                println!(
                    "{}: {}",
                    abbrev(&entry.node_hash, full_hash),
                    entry.node.message().unwrap_or_default()
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(VcError::SeveralNodesWithDoc { node_hashes, .. }) => {
            println!("This JSON document is associated with several nodes:\n");
            println!("{}\n", node_hashes.join("\n"));
            println!(
                "You can use `showassoc` to see the available nodes and use one of \
                 the hashes (or a hash prefix) to display the particular history"
            );
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e.into()),
    }
}

pub fn showdoc(fvc: &mut FileVersionControl, objref: &str, indent: bool) -> Result<ExitCode> {
    let doc = fvc.get_doc(objref)?;
    print_json(&doc, indent)?;
    Ok(ExitCode::SUCCESS)
}

pub fn showdiff(
    fvc: &mut FileVersionControl,
    old_objref: &str,
    new_objref: &str,
    indent: bool,
) -> Result<ExitCode> {
    let operations = fvc.get_diff(old_objref, new_objref)?;
    print_json(&Value::Array(operations), indent)?;
    Ok(ExitCode::SUCCESS)
}

pub fn discover(fvc: &mut FileVersionControl, node_hashes: &[String]) -> Result<ExitCode> {
    let discovered = fvc.doc_vc_mut().cache_mut().discover_nodes(node_hashes);
    save_cache(fvc)?;
    println!("Discovered nodes:");
    println!("{}", discovered.join("\n"));
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abbrev_respects_full_hash_flag() {
        let hash = "abcdef0123456789";
        assert_eq!(abbrev(hash, false), "abcdef0123");
        assert_eq!(abbrev(hash, true), hash);
    }

    #[test]
    fn build_storage_requires_a_backend() {
        let config = AppConfig::default();
        assert!(build_storage(&config, false).is_err());
    }

    #[test]
    fn build_storage_rejects_missing_local_dir() {
        // run without JSON_STORAGE_PATH interference
        if std::env::var_os("JSON_STORAGE_PATH").is_some() {
            return;
        }
        let mut config = AppConfig::default();
        config.set("storage-backend", "local").unwrap();
        config
            .set("local-storage-path", "/definitely/not/a/real/dir")
            .unwrap();
        assert!(build_storage(&config, false).is_err());
    }

    #[test]
    fn build_storage_opens_local_backend() {
        if std::env::var_os("JSON_STORAGE_PATH").is_some() {
            return;
        }
        let td = tempfile::TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.set("storage-backend", "local").unwrap();
        config
            .set("local-storage-path", &td.path().to_string_lossy())
            .unwrap();
        let storage = build_storage(&config, false).unwrap();
        assert!(storage.as_object_index().is_some());
    }
}
