//! Storage backends for jsonvc.
//!
//! Every backend stores JSON values under the hash of their canonical byte
//! form and retrieves them by that hash. The `ObjectIndex` capability is
//! optional; backends that can enumerate their contents expose it so the
//! node cache can seed discovery, and everything else degrades gracefully.

mod ipfs;
mod local;

use jsonvc_core::VcResult;
use serde_json::Value;

pub use ipfs::IpfsStore;
pub use local::LocalStore;

/// Capability set shared by all storage backends.
pub trait StorageProvider {
    /// Store a JSON value; returns the hash it is now addressable under.
    /// Idempotent: storing the same value twice yields the same hash and
    /// writes nothing new.
    fn store(&self, value: &Value) -> VcResult<String>;

    /// Retrieve the JSON value stored under `hash`.
    fn load(&self, hash: &str) -> VcResult<Value>;

    /// Check whether an object is stored under `hash`.
    fn exists(&self, hash: &str) -> VcResult<bool>;

    /// The hash this backend would assign to `value` without storing it.
    ///
    /// Usually the canonical SHA-256; backends with their own content-id
    /// scheme may differ, in which case every invariant is expressed in
    /// terms of the backend's hash.
    fn compute_hash(&self, value: &Value) -> VcResult<String>;

    /// Downcast to the optional enumeration capability.
    fn as_object_index(&self) -> Option<&dyn ObjectIndex> {
        None
    }
}

/// Optional capability: enumerate stored objects and report their sizes.
pub trait ObjectIndex {
    /// Hashes of all stored objects with well-formed names.
    fn index(&self) -> VcResult<Vec<String>>;

    /// Size in bytes of the object stored under `hash`.
    fn size(&self, hash: &str) -> VcResult<u64>;
}
