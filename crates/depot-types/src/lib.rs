//! Foundation types for Depot.
//!
//! Every other Depot crate depends on `depot-types` for the two identifiers
//! that end up in file names on the server: object hashes and repository
//! names. Both are validated on construction, so anything holding one can
//! join it onto a path without further checks.
//!
//! # Key Types
//!
//! - [`ObjectHash`] -- Content-addressed identifier (SHA-1, 40 hex characters)
//! - [`RepoName`] -- Repository name restricted to one plain path component

pub mod error;
pub mod name;
pub mod object;

pub use error::TypeError;
pub use name::{validate_repo_name, RepoName};
pub use object::{ObjectHash, HASH_HEX_LEN, HASH_LEN};
