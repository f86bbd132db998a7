//! Error types for jsonvc-core.
//!
//! Errors are structured, explicit, and stable. Every kind corresponds to a
//! distinct failure surfaced to callers; the library recovers nothing on its
//! own. Messages are intended to be human-readable while preserving
//! machine-level categorization.

use std::fmt::{self, Display};

/// Result type used throughout the jsonvc crates.
pub type VcResult<T> = Result<T, VcError>;

/// Top-level error type for the version-graph engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VcError {
    /// Invalid or unsupported argument.
    InvalidArgument {
        message: String,
    },

    /// JSON value is not canonicalizable.
    Serialization {
        message: String,
    },

    /// Stored bytes do not hash back to their content identifier.
    Integrity {
        message: String,
    },

    /// Ext-patch source set does not match the source-node document hashes.
    Consistency {
        message: String,
    },

    /// Patch construction, validation, or round-trip failure.
    Patch {
        message: String,
    },

    /// Document is not tracked by any graph node.
    DocNotTracked {
        message: String,
    },

    /// Document is already tracked and `force` was not given.
    DocAlreadyTracked {
        message: String,
    },

    /// No node hash matches the given prefix.
    HashNotFound {
        message: String,
    },

    /// More than one node hash matches the given prefix.
    HashPrefixAmbiguous {
        message: String,
    },

    /// Several distinct nodes record the same document.
    SeveralNodesWithDoc {
        message: String,
        node_hashes: Vec<String>,
    },

    /// A linear-history walk hit a merge point.
    SeveralAncestors {
        message: String,
        ancestor_hashes: Vec<String>,
    },

    /// Backend I/O failure.
    Storage {
        message: String,
    },
}

impl VcError {
    /// Construct an invalid argument error.
    pub fn invalid_argument<M: Into<String>>(message: M) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Construct a serialization error.
    pub fn serialization<M: Into<String>>(message: M) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Construct an integrity error.
    pub fn integrity<M: Into<String>>(message: M) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }

    /// Construct a consistency error.
    pub fn consistency<M: Into<String>>(message: M) -> Self {
        Self::Consistency {
            message: message.into(),
        }
    }

    /// Construct a patch error.
    pub fn patch<M: Into<String>>(message: M) -> Self {
        Self::Patch {
            message: message.into(),
        }
    }

    /// Construct a doc-not-tracked error.
    pub fn doc_not_tracked<M: Into<String>>(message: M) -> Self {
        Self::DocNotTracked {
            message: message.into(),
        }
    }

    /// Construct a doc-already-tracked error.
    pub fn doc_already_tracked<M: Into<String>>(message: M) -> Self {
        Self::DocAlreadyTracked {
            message: message.into(),
        }
    }

    /// Construct a hash-not-found error.
    pub fn hash_not_found<M: Into<String>>(message: M) -> Self {
        Self::HashNotFound {
            message: message.into(),
        }
    }

    /// Construct a hash-prefix-ambiguous error.
    pub fn hash_prefix_ambiguous<M: Into<String>>(message: M) -> Self {
        Self::HashPrefixAmbiguous {
            message: message.into(),
        }
    }

    /// Construct a several-nodes-with-doc error carrying the candidate set.
    pub fn several_nodes_with_doc<M, I>(message: M, node_hashes: I) -> Self
    where
        M: Into<String>,
        I: IntoIterator<Item = String>,
    {
        Self::SeveralNodesWithDoc {
            message: message.into(),
            node_hashes: node_hashes.into_iter().collect(),
        }
    }

    /// Construct a several-ancestors error carrying the ancestor set.
    pub fn several_ancestors<M, I>(message: M, ancestor_hashes: I) -> Self
    where
        M: Into<String>,
        I: IntoIterator<Item = String>,
    {
        Self::SeveralAncestors {
            message: message.into(),
            ancestor_hashes: ancestor_hashes.into_iter().collect(),
        }
    }

    /// Construct a storage error.
    pub fn storage<M: Into<String>>(message: M) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}

impl Display for VcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument { message } => {
                write!(f, "invalid argument: {message}")
            }
            Self::Serialization { message } => {
                write!(f, "serialization error: {message}")
            }
            Self::Integrity { message } => {
                write!(f, "integrity error: {message}")
            }
            Self::Consistency { message } => {
                write!(f, "consistency error: {message}")
            }
            Self::Patch { message } => {
                write!(f, "patch error: {message}")
            }
            Self::DocNotTracked { message } => {
                write!(f, "document not tracked: {message}")
            }
            Self::DocAlreadyTracked { message } => {
                write!(f, "document already tracked: {message}")
            }
            Self::HashNotFound { message } => {
                write!(f, "hash not found: {message}")
            }
            Self::HashPrefixAmbiguous { message } => {
                write!(f, "hash prefix ambiguous: {message}")
            }
            Self::SeveralNodesWithDoc {
                message,
                node_hashes,
            } => {
                write!(
                    f,
                    "several nodes with document: {message} ({})",
                    node_hashes.join(", ")
                )
            }
            Self::SeveralAncestors {
                message,
                ancestor_hashes,
            } => {
                write!(
                    f,
                    "several ancestors: {message} ({})",
                    ancestor_hashes.join(", ")
                )
            }
            Self::Storage { message } => {
                write!(f, "storage error: {message}")
            }
        }
    }
}

impl std::error::Error for VcError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_integrity_error() {
        let e = VcError::integrity("digest mismatch");
        assert_eq!(format!("{e}"), "integrity error: digest mismatch");
    }

    #[test]
    fn several_nodes_error_carries_hashes() {
        let e = VcError::several_nodes_with_doc(
            "ambiguous",
            vec!["aa".to_string(), "bb".to_string()],
        );
        match e {
            VcError::SeveralNodesWithDoc { node_hashes, .. } => {
                assert_eq!(node_hashes, vec!["aa", "bb"]);
            }
            other => panic!("unexpected error kind: {other:?}"),
        }
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<VcError>();
    }
}
