//! Content-addressed wire models.
//!
//! The two stored shapes of the version graph: the graph node and the
//! extended multi-source patch. Both are validated on construction and on
//! parse, and both normalize their source collections so that semantic
//! equality yields identical canonical bytes (and therefore identical
//! hashes).

mod ext_patch;
mod node;

pub use ext_patch::ExtJsonPatch;
pub use node::GraphNode;
