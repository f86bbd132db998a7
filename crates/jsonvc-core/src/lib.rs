//! Core primitives for jsonvc.
//!
//! This crate defines the deterministic foundations of the version graph:
//! canonical JSON bytes, SHA-256 content hashing, the content-addressed
//! wire models (graph nodes and extended patches), the RFC 6902 patch
//! engine, and the error taxonomy shared by every jsonvc crate.
//!
//! It performs no I/O.

pub mod canonical;
pub mod errors;
pub mod hashing;
pub mod model;
pub mod patch;

pub use errors::{VcError, VcResult};
pub use model::{ExtJsonPatch, GraphNode};
