use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use depot_store::{Blob, Tree};
use depot_types::ObjectHash;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{ClientError, ClientResult};

/// Every object needed to reproduce a directory on the server.
#[derive(Debug)]
pub struct Snapshot {
    /// Tree of the snapshotted directory itself.
    pub root: Tree,
    /// All trees, children before parents; `root` is last.
    pub trees: Vec<Tree>,
    /// Distinct blobs, keyed by hash.
    pub blobs: BTreeMap<ObjectHash, Blob>,
}

impl Snapshot {
    pub fn root_hash(&self) -> ObjectHash {
        self.root.hash()
    }
}

/// Build blobs and trees for `dir`.
///
/// Entries whose names start with `.` are skipped, as are symlinks and other
/// special files.
pub fn snapshot_directory(dir: &Path) -> ClientResult<Snapshot> {
    if !dir.is_dir() {
        return Err(ClientError::Snapshot {
            path: dir.display().to_string(),
            reason: "not a directory".into(),
        });
    }
    let mut trees = Vec::new();
    let mut blobs = BTreeMap::new();
    let root = snapshot_level(dir, &mut trees, &mut blobs)?;
    debug!(
        path = %dir.display(),
        trees = trees.len(),
        blobs = blobs.len(),
        root = %root.hash(),
        "directory snapshotted"
    );
    Ok(Snapshot { root, trees, blobs })
}

fn snapshot_level(
    dir: &Path,
    trees: &mut Vec<Tree>,
    blobs: &mut BTreeMap<ObjectHash, Blob>,
) -> ClientResult<Tree> {
    let mut builder = Tree::builder();
    let entries = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();
    for entry in entries {
        let entry = entry?;
        let name = entry
            .file_name()
            .to_str()
            .ok_or_else(|| ClientError::Snapshot {
                path: entry.path().display().to_string(),
                reason: "file name is not valid UTF-8".into(),
            })?
            .to_string();
        if name.starts_with('.') {
            continue;
        }

        let file_type = entry.file_type();
        if file_type.is_dir() {
            let subtree = snapshot_level(entry.path(), trees, blobs)?;
            builder.add_tree(name, &subtree);
        } else if file_type.is_file() {
            let blob = Blob::new(fs::read(entry.path())?);
            builder.add_blob(name, &blob);
            blobs.entry(blob.hash()).or_insert(blob);
        } else {
            debug!(path = %entry.path().display(), "skipping special file");
        }
    }

    let tree = builder.build();
    trees.push(tree.clone());
    Ok(tree)
}
