use std::time::Duration;

use depot_protocol::ProtocolError;
use depot_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("archive error: {0}")]
    Archive(#[from] depot_pack::PackError),

    #[error("{phase} timed out after {after:?}")]
    Timeout { phase: &'static str, after: Duration },

    #[error("worker pool is closed")]
    PoolClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Short label for the failure class, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Protocol(ProtocolError::UnsupportedAction(_)) => "unsupported_action",
            Self::Protocol(e) if e.is_parse_failure() => "parse",
            Self::Store(StoreError::HashMismatch { .. }) => "hash_mismatch",
            Self::Store(StoreError::InvalidIdentifier(_)) => "invalid_name",
            Self::Store(StoreError::InvalidCommit(_)) => "parse",
            Self::Archive(_) => "archive",
            Self::Timeout { .. } => "timeout",
            Self::Config(_) | Self::ConfigParse(_) => "config",
            _ => "io",
        }
    }

    /// Failures of the server itself rather than of the request.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::Internal(_)
                | Self::Store(StoreError::Io(_) | StoreError::Serialization(_))
                | Self::Protocol(ProtocolError::Io(_) | ProtocolError::Serialization(_))
        )
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
