use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use depot_types::{ObjectHash, RepoName};
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::object::ObjectKind;

/// A repository's location on disk.
///
/// Holding a `Repository` does not imply the directory exists; obtain one
/// through [`RepositoryManager::ensure_repository`] or
/// [`RepositoryManager::open_repository`] for that guarantee.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Repository {
    name: RepoName,
    root: PathBuf,
}

impl Repository {
    pub fn name(&self) -> &RepoName {
        &self.name
    }

    /// `<repositories root>/<name>`.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of one object subspace (`.blobs`, `.trees`, `.commits`).
    pub fn subspace(&self, kind: ObjectKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    /// File holding the object of `kind` keyed by `hash`.
    pub fn object_path(&self, kind: ObjectKind, hash: &ObjectHash) -> PathBuf {
        self.subspace(kind).join(kind.file_name(hash))
    }
}

/// Creates and enumerates repositories under a shared root directory.
///
/// There is no registry: the set of repositories is the set of valid
/// repository-named subdirectories of the root.
#[derive(Clone, Debug)]
pub struct RepositoryManager {
    root: PathBuf,
}

impl RepositoryManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of a repository, without touching the filesystem.
    pub fn repository(&self, name: &RepoName) -> Repository {
        Repository {
            root: self.root.join(name.as_str()),
            name: name.clone(),
        }
    }

    /// Create the repository layout if it is missing.
    ///
    /// Safe to call concurrently for the same name: an existing directory,
    /// including one created by a racing caller, counts as success.
    pub fn ensure_repository(&self, name: &RepoName) -> StoreResult<Repository> {
        let repo = self.repository(name);
        let existed = repo.root().is_dir();
        for kind in ObjectKind::ALL {
            fs::create_dir_all(repo.subspace(kind))?;
        }
        if !existed {
            info!(repository = %name, path = %repo.root().display(), "repository created");
        }
        Ok(repo)
    }

    /// Look up an existing repository.
    pub fn open_repository(&self, name: &RepoName) -> StoreResult<Repository> {
        let repo = self.repository(name);
        if repo.root().is_dir() {
            Ok(repo)
        } else {
            Err(StoreError::RepositoryNotFound(name.to_string()))
        }
    }

    pub fn exists(&self, name: &RepoName) -> bool {
        self.repository(name).root().is_dir()
    }

    /// Names of all repositories, sorted.
    ///
    /// A missing root means no repository has been created yet and yields an
    /// empty list. Entries that are not directories, or whose names could not
    /// have been created through [`RepoName`], are skipped.
    pub fn list_repositories(&self) -> StoreResult<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) if RepoName::new(name.as_str()).is_ok() => names.push(name),
                Ok(name) => debug!(entry = %name, "skipping non-repository directory"),
                Err(raw) => warn!(entry = ?raw, "skipping directory with non-UTF-8 name"),
            }
        }
        names.sort();
        Ok(names)
    }
}
