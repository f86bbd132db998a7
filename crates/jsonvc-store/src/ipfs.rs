//! IPFS gateway backend.
//!
//! Reads go through an HTTP gateway (`<gateway>/ipfs/<cid>`), writes and
//! hash computation through the RPC API (`<rpc>/v0/add`, with
//! `only-hash=true` for the latter). The content identifier is whatever the
//! RPC endpoint assigns, which is not the raw canonical SHA-256; all graph
//! invariants hold in terms of this backend's hashes. Fetched and uploaded
//! objects are mirrored into a local cache directory so repeated loads stay
//! off the network.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::{multipart, Client};
use serde_json::Value;
use tracing::debug;

use jsonvc_core::canonical::to_canonical_bytes;
use jsonvc_core::errors::{VcError, VcResult};

use crate::StorageProvider;

pub struct IpfsStore {
    cache_dir: PathBuf,
    gateway_url: String,
    rpc_api_url: String,
    rpc_api_url_upload: String,
    provide: bool,
    client: Client,
}

impl IpfsStore {
    /// Open the backend. `rpc_api_url_upload` defaults to `rpc_api_url`
    /// when not given (uploads may be routed to a different node).
    pub fn open<P: AsRef<Path>>(
        cache_dir: P,
        gateway_url: impl Into<String>,
        rpc_api_url: impl Into<String>,
        rpc_api_url_upload: Option<String>,
    ) -> VcResult<Self> {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        fs::create_dir_all(&cache_dir)
            .map_err(|e| VcError::storage(format!("cannot create cache dir {cache_dir:?}: {e}")))?;
        let rpc_api_url = rpc_api_url.into();
        let rpc_api_url_upload = rpc_api_url_upload.unwrap_or_else(|| rpc_api_url.clone());
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| VcError::storage(format!("cannot build http client: {e}")))?;
        Ok(Self {
            cache_dir,
            gateway_url: gateway_url.into(),
            rpc_api_url,
            rpc_api_url_upload,
            provide: false,
            client,
        })
    }

    /// Announce uploaded objects to peers after each store.
    pub fn enable_provide(&mut self) {
        self.provide = true;
    }

    fn gateway_object_url(&self, cid: &str) -> String {
        format!("{}/ipfs/{cid}", self.gateway_url.trim_end_matches('/'))
    }

    fn rpc_url(base: &str, endpoint: &str) -> String {
        format!("{}/{endpoint}", base.trim_end_matches('/'))
    }

    fn cache_path(&self, cid: &str) -> PathBuf {
        self.cache_dir.join(cid)
    }

    fn load_cached(&self, cid: &str) -> VcResult<Option<Value>> {
        let path = self.cache_path(cid);
        if !path.is_file() {
            return Ok(None);
        }
        let bytes = fs::read(&path)
            .map_err(|e| VcError::storage(format!("cannot read cached object {cid}: {e}")))?;
        let value = serde_json::from_slice(&bytes)
            .map_err(|e| VcError::storage(format!("cached object {cid} is not valid JSON: {e}")))?;
        Ok(Some(value))
    }

    fn store_cached(&self, cid: &str, value: &Value) -> VcResult<()> {
        let bytes = to_canonical_bytes(value)?;
        fs::write(self.cache_path(cid), bytes)
            .map_err(|e| VcError::storage(format!("cannot cache object {cid}: {e}")))
    }

    /// Run `v0/add` against the upload RPC endpoint. With `only_hash` the
    /// node computes the CID without pinning the content.
    fn rpc_add(&self, value: &Value, only_hash: bool) -> VcResult<String> {
        let bytes = to_canonical_bytes(value)?;
        let form = multipart::Form::new().part(
            "file",
            multipart::Part::bytes(bytes).file_name("object.json"),
        );
        let url = Self::rpc_url(&self.rpc_api_url_upload, "v0/add");
        let response = self
            .client
            .post(&url)
            .query(&[("only-hash", only_hash)])
            .multipart(form)
            .send()
            .map_err(|e| VcError::storage(format!("rpc add failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let prefix = if only_hash {
                "cid determination failed"
            } else {
                "upload failed"
            };
            return Err(VcError::storage(format!("{prefix}: http {status}")));
        }
        let body: Value = response
            .json()
            .map_err(|e| VcError::storage(format!("rpc add returned invalid JSON: {e}")))?;
        body.get("Hash")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| VcError::storage("rpc add response carries no Hash field"))
    }

    fn rpc_provide(&self, cid: &str) -> VcResult<()> {
        let url = Self::rpc_url(&self.rpc_api_url, "v0/routing/provide");
        let response = self
            .client
            .post(&url)
            .query(&[("arg", cid)])
            .send()
            .map_err(|e| VcError::storage(format!("provide failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(VcError::storage(format!("provide failed: http {status}")));
        }
        Ok(())
    }
}

impl StorageProvider for IpfsStore {
    fn store(&self, value: &Value) -> VcResult<String> {
        let cid = self.rpc_add(value, false)?;
        self.store_cached(&cid, value)?;
        if self.provide {
            self.rpc_provide(&cid)?;
        }
        debug!(%cid, "uploaded object");
        Ok(cid)
    }

    fn load(&self, hash: &str) -> VcResult<Value> {
        if let Some(value) = self.load_cached(hash)? {
            return Ok(value);
        }
        let url = self.gateway_object_url(hash);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| VcError::storage(format!("failed to fetch cid {hash}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(VcError::storage(format!(
                "failed to fetch cid {hash}: http {status}"
            )));
        }
        let value: Value = response
            .json()
            .map_err(|e| VcError::storage(format!("cid {hash} is not valid JSON: {e}")))?;
        self.store_cached(hash, &value)?;
        Ok(value)
    }

    fn exists(&self, hash: &str) -> VcResult<bool> {
        if self.cache_path(hash).is_file() {
            return Ok(true);
        }
        let url = self.gateway_object_url(hash);
        let response = self
            .client
            .head(&url)
            .send()
            .map_err(|e| VcError::storage(format!("failed to probe cid {hash}: {e}")))?;
        Ok(response.status().is_success())
    }

    fn compute_hash(&self, value: &Value) -> VcResult<String> {
        // TODO: compute the CID locally instead of round-tripping to the
        // RPC endpoint.
        self.rpc_add(value, true)
    }
}
