//! Client library for depot.
//!
//! [`DepotClient`] speaks the wire protocol to a server; [`snapshot_directory`]
//! and [`CommitProposal`] turn a working directory into the blobs, trees and
//! commit document a push uploads.

pub mod client;
pub mod commit;
pub mod error;
pub mod worktree;

pub use client::{DepotClient, PushSummary};
pub use commit::CommitProposal;
pub use error::{ClientError, ClientResult};
pub use worktree::{snapshot_directory, Snapshot};

// Re-export key types
pub use depot_pack::unpack_archive;
pub use depot_protocol::Framing;
pub use depot_store::{Blob, Commit, Tree};
pub use depot_types::{ObjectHash, RepoName};
