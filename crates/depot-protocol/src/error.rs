use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("request has no action")]
    MissingAction,

    #[error("unsupported action: {0}")]
    UnsupportedAction(String),

    #[error("invalid {action} request: {reason}")]
    InvalidRequest { action: String, reason: String },

    #[error("invalid base64 content: {0}")]
    InvalidContent(String),

    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("framing error: {0}")]
    FramingError(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Errors caused by the request content rather than the transport.
    pub fn is_parse_failure(&self) -> bool {
        matches!(
            self,
            Self::Malformed(_)
                | Self::MissingAction
                | Self::InvalidRequest { .. }
                | Self::InvalidContent(_)
        )
    }
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
