use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use depot_types::ObjectHash;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::hasher::compute_hash;
use crate::object::{Blob, Commit, ObjectKind, Tree};
use crate::repository::Repository;

/// Prefix of in-flight temporary files inside an object subspace.
///
/// Readers that walk a subspace (such as archive export) skip these.
pub const TEMP_PREFIX: &str = ".tmp-";

/// Filesystem object store.
///
/// Objects live in per-kind subspaces of a repository and are keyed by the
/// hash the caller supplies. Every write lands in a temporary file in the
/// target directory and is renamed over the final name, so a concurrent
/// reader sees either the old file, the new file, or no file, never a
/// partial one.
///
/// With hash verification on (the default), blob and tree writes recompute
/// the hash and refuse a mismatching key. Commits are opaque and their key is
/// always trusted.
#[derive(Clone, Debug)]
pub struct ObjectStore {
    verify_hashes: bool,
}

impl ObjectStore {
    /// A store that verifies blob and tree keys.
    pub fn new() -> Self {
        Self {
            verify_hashes: true,
        }
    }

    /// A store that files objects under whatever key the caller supplies.
    pub fn trusting() -> Self {
        Self {
            verify_hashes: false,
        }
    }

    pub fn with_verification(verify_hashes: bool) -> Self {
        Self { verify_hashes }
    }

    pub fn verifies_hashes(&self) -> bool {
        self.verify_hashes
    }

    pub fn compute_hash(content: &[u8]) -> ObjectHash {
        compute_hash(content)
    }

    pub fn store_blob(
        &self,
        repo: &Repository,
        hash: &ObjectHash,
        content: &[u8],
    ) -> StoreResult<PathBuf> {
        if self.verify_hashes {
            self.check(ObjectKind::Blob, hash, compute_hash(content))?;
        }
        let path = repo.object_path(ObjectKind::Blob, hash);
        write_atomic(&path, content)?;
        debug!(repository = %repo.name(), blob = %hash, bytes = content.len(), "blob stored");
        Ok(path)
    }

    pub fn load_blob(&self, repo: &Repository, hash: &ObjectHash) -> StoreResult<Blob> {
        let content = self.read(repo, ObjectKind::Blob, hash)?;
        Ok(Blob::from_parts(*hash, content))
    }

    pub fn store_tree(
        &self,
        repo: &Repository,
        hash: &ObjectHash,
        tree: &Tree,
    ) -> StoreResult<PathBuf> {
        if self.verify_hashes {
            self.check(ObjectKind::Tree, hash, tree.compute_hash())?;
        }
        let path = repo.object_path(ObjectKind::Tree, hash);
        write_atomic(&path, &tree.to_json()?)?;
        debug!(repository = %repo.name(), tree = %hash, children = tree.len(), "tree stored");
        Ok(path)
    }

    /// Load a tree; its cached hash is set to `hash`.
    pub fn load_tree(&self, repo: &Repository, hash: &ObjectHash) -> StoreResult<Tree> {
        let bytes = self.read(repo, ObjectKind::Tree, hash)?;
        let tree = Tree::from_json(&bytes)?;
        if self.verify_hashes {
            self.check(ObjectKind::Tree, hash, tree.compute_hash())?;
        }
        Ok(Tree::with_known_hash(tree.into_data(), *hash))
    }

    pub fn store_commit(&self, repo: &Repository, commit: &Commit) -> StoreResult<PathBuf> {
        let hash = commit.hash();
        let path = repo.object_path(ObjectKind::Commit, &hash);
        write_atomic(&path, &commit.to_json()?)?;
        debug!(repository = %repo.name(), commit = %hash, "commit stored");
        Ok(path)
    }

    pub fn load_commit(&self, repo: &Repository, hash: &ObjectHash) -> StoreResult<Commit> {
        let bytes = self.read(repo, ObjectKind::Commit, hash)?;
        Commit::from_json(&bytes)
    }

    pub fn contains(&self, repo: &Repository, kind: ObjectKind, hash: &ObjectHash) -> bool {
        repo.object_path(kind, hash).is_file()
    }

    fn read(&self, repo: &Repository, kind: ObjectKind, hash: &ObjectHash) -> StoreResult<Vec<u8>> {
        match fs::read(repo.object_path(kind, hash)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound { kind, hash: *hash })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn check(&self, kind: ObjectKind, expected: &ObjectHash, computed: ObjectHash) -> StoreResult<()> {
        if *expected == computed {
            Ok(())
        } else {
            Err(StoreError::HashMismatch {
                kind,
                expected: *expected,
                computed,
            })
        }
    }
}

impl Default for ObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Write `bytes` to `path` through a temporary sibling and a rename.
///
/// Creates the parent directory if absent. An existing file at `path` is
/// replaced atomically.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
