use depot_types::{ObjectHash, TypeError};

use crate::object::ObjectKind;

/// Errors from object store and repository operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object was not found.
    #[error("{kind} not found: {hash}")]
    NotFound { kind: ObjectKind, hash: ObjectHash },

    /// The requested repository does not exist.
    #[error("repository not found: {0}")]
    RepositoryNotFound(String),

    /// The caller-supplied key does not match the recomputed hash.
    #[error("hash mismatch for {kind}: expected {expected}, computed {computed}")]
    HashMismatch {
        kind: ObjectKind,
        expected: ObjectHash,
        computed: ObjectHash,
    },

    /// A commit document lacks a usable `commitHash` field.
    #[error("invalid commit document: {0}")]
    InvalidCommit(String),

    /// A hash or repository name failed validation.
    #[error(transparent)]
    InvalidIdentifier(#[from] TypeError),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
