use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Rejected(String),
    #[error("media element error: {0}")]
    Media(String),
    #[error("render engine error: {0}")]
    Render(String),
    #[error("platform internal error: {0}")]
    Internal(String),
}

impl PlatformError {
    /// Message carried by the error without the category prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Unavailable(message)
            | Self::Rejected(message)
            | Self::Media(message)
            | Self::Render(message)
            | Self::Internal(message) => message,
        }
    }
}

pub type PlatformResult<T> = Result<T, PlatformError>;
