//! Version graph engine for jsonvc.
//!
//! Builds the content-addressed DAG (track graph), indexes it (node cache),
//! and exposes the public version-control operations over documents and
//! files. Storage is shared as an `Arc<dyn StorageProvider>`; the engine
//! itself is single-threaded and synchronous, and all waiting happens
//! inside storage I/O.

pub mod archive;
pub mod cache;
pub mod files;
pub mod track;
pub mod vc;

pub use archive::DocumentArchive;
pub use cache::{CacheSnapshot, NodeCache, SnapshotMode};
pub use files::{FileVersionControl, ObjrefSource};
pub use track::TrackGraph;
pub use vc::{DocVersionControl, HistoryEntry};
