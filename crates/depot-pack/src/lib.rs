//! Repository archives for Depot.
//!
//! A pull transfers a whole repository as one tar stream. Entries are
//! prefixed with the repository name, so unpacking into a directory yields
//! `<dest>/<repo>/.blobs`, `.trees` and `.commits`.
//!
//! - **ArchiveExporter**: packages a live repository directory
//! - **unpack_archive**: client-side extraction of a pulled archive

pub mod archive;
pub mod error;

pub use archive::{archive_entries, unpack_archive, ArchiveExporter};
pub use error::{PackError, PackResult};
