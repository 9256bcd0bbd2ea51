//! Content-addressed object storage for Depot.
//!
//! Every repository is a directory with one subspace per object kind:
//!
//! ```text
//! <root>/<repo>/.blobs/blob_<hash>.txt       raw bytes
//! <root>/<repo>/.trees/tree_<hash>.json      {"blobs": {..}, "trees": {..}}
//! <root>/<repo>/.commits/commit_<hash>.json  opaque client document
//! ```
//!
//! # Object Types
//!
//! - [`Blob`] -- raw content, keyed by the SHA-1 of its bytes
//! - [`Tree`] -- one directory level, keyed by the SHA-1 of its children's
//!   hashes taken in name order
//! - [`Commit`] -- client document, keyed by its own `commitHash` field
//!
//! # Design Rules
//!
//! 1. Objects are logically immutable once written.
//! 2. Writes go through a temporary file and a rename; readers never see a
//!    partial object.
//! 3. Repository layout creation is idempotent and race-tolerant.
//! 4. There is no locking layer: identical concurrent writes are safe because
//!    of rule 2, and nothing else is coordinated.

pub mod error;
pub mod hasher;
pub mod object;
pub mod repository;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use hasher::{compute_hash, ContentHasher};
pub use object::{Blob, Commit, ObjectKind, Tree, TreeBuilder, TreeData, COMMIT_HASH_FIELD};
pub use repository::{Repository, RepositoryManager};
pub use store::{write_atomic, ObjectStore, TEMP_PREFIX};
