use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackError {
    #[error("repository not found: {0}")]
    RepositoryNotFound(String),

    #[error("failed to walk repository: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("archive entry outside repository: {0}")]
    EntryOutsideRepository(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type PackResult<T> = Result<T, PackError>;
