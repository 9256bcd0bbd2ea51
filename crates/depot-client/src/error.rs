use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("server rejected request: {0}")]
    Rejected(String),

    #[error("unexpected response to {action}: {detail}")]
    UnexpectedResponse { action: &'static str, detail: String },

    #[error("no payload for {0}; the repository may not exist")]
    EmptyResponse(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("cannot snapshot {path}: {reason}")]
    Snapshot { path: String, reason: String },

    #[error("protocol error: {0}")]
    Protocol(#[from] depot_protocol::ProtocolError),

    #[error("store error: {0}")]
    Store(#[from] depot_store::StoreError),

    #[error("archive error: {0}")]
    Archive(#[from] depot_pack::PackError),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(#[from] depot_types::TypeError),

    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ClientResult<T> = Result<T, ClientError>;
