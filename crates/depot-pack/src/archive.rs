use std::io::Cursor;
use std::path::{Path, PathBuf};

use depot_store::{Repository, TEMP_PREFIX};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::error::{PackError, PackResult};

/// Packages a repository directory into a tar stream.
///
/// The walk runs against the live directory; objects written while it runs
/// may or may not be included. In-flight temporary files are skipped. The
/// archive is assembled in memory, so no temporary archive file is ever left
/// on disk.
#[derive(Clone, Debug, Default)]
pub struct ArchiveExporter {
    _private: (),
}

impl ArchiveExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Archive `repo`, with every entry under `<repo name>/`.
    pub fn export(&self, repo: &Repository) -> PackResult<Vec<u8>> {
        if !repo.root().is_dir() {
            return Err(PackError::RepositoryNotFound(repo.name().to_string()));
        }

        let prefix = Path::new(repo.name().as_str());
        let mut builder = tar::Builder::new(Vec::new());
        builder.mode(tar::HeaderMode::Deterministic);
        builder.follow_symlinks(false);

        let mut files = 0usize;
        let walker = WalkDir::new(repo.root())
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_temp(entry));
        for entry in walker {
            let entry = entry?;
            let relative = entry
                .path()
                .strip_prefix(repo.root())
                .map_err(|_| PackError::EntryOutsideRepository(entry.path().display().to_string()))?;
            let name = if relative.as_os_str().is_empty() {
                prefix.to_path_buf()
            } else {
                prefix.join(relative)
            };
            let file_type = entry.file_type();
            if file_type.is_dir() {
                builder.append_dir(&name, entry.path())?;
            } else if file_type.is_file() {
                builder.append_path_with_name(entry.path(), &name)?;
                files += 1;
            }
        }

        let bytes = builder.into_inner()?;
        debug!(repository = %repo.name(), files, bytes = bytes.len(), "repository archived");
        Ok(bytes)
    }
}

fn is_temp(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with(TEMP_PREFIX))
        .unwrap_or(false)
}

/// Extract a pulled archive into `dest`, returning the extracted entry paths.
///
/// Entries that would escape `dest` are refused by the tar reader.
pub fn unpack_archive(bytes: &[u8], dest: &Path) -> PackResult<Vec<PathBuf>> {
    std::fs::create_dir_all(dest)?;
    let mut archive = tar::Archive::new(Cursor::new(bytes));
    let mut unpacked = Vec::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        if entry.unpack_in(dest)? {
            unpacked.push(dest.join(path));
        }
    }
    Ok(unpacked)
}

/// Paths of all entries in an archive, in archive order.
pub fn archive_entries(bytes: &[u8]) -> PackResult<Vec<PathBuf>> {
    let mut archive = tar::Archive::new(Cursor::new(bytes));
    let mut paths = Vec::new();
    for entry in archive.entries()? {
        paths.push(entry?.path()?.into_owned());
    }
    Ok(paths)
}
