//! Error types for transport operations

/// Errors raised before a usable response exists.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("response body read failed: {0}")]
    Body(String),

    #[error("request encoding failed: {0}")]
    Encode(String),

    #[error("response decoding failed: {0}")]
    Decode(String),

    #[error("invalid header value: {0}")]
    InvalidHeader(String),
}

impl Error {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }

    /// True when the backend could not be reached at all.
    pub fn is_connect(&self) -> bool {
        matches!(self, Error::Connect(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else if e.is_connect() {
            Error::Connect(e.to_string())
        } else {
            Error::Request(e.to_string())
        }
    }
}

/// Result alias for transport operations.
pub type Result<T> = std::result::Result<T, Error>;
