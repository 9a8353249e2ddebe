//! Error types for authenticated API calls
//!
//! Every failure a caller can see is one `Error`. `Error::code()` maps it onto
//! the small set of categories the UI layer branches on.

use bytes::Bytes;
use serde_json::Value;
use transport::{ApiResponse, StatusCode};

/// Coarse failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Network,
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    Server,
    Timeout,
    Unknown,
}

impl ErrorCode {
    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            s if s >= 500 => Self::Server,
            s if s >= 400 => Self::Validation,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "NETWORK",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::Validation => "VALIDATION",
            Self::Server => "SERVER",
            Self::Timeout => "TIMEOUT",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The backend answered with a non-2xx status.
    #[error("request failed with status {status}: {message}")]
    Status {
        status: StatusCode,
        message: String,
        body: Bytes,
    },

    /// No response at all (connect failure, timeout, broken body).
    #[error("transport error: {0}")]
    Transport(#[from] transport::Error),

    /// The access token expired and could not be renewed. Credentials have
    /// been cleared.
    #[error("session expired: {0}")]
    Refresh(marketplace_auth::Error),

    /// Login or token verification failed.
    #[error("authentication failed: {0}")]
    Auth(marketplace_auth::Error),

    #[error("request cancelled")]
    Cancelled,

    #[error("invalid response body: {0}")]
    Decode(String),
}

impl Error {
    /// Build a `Status` error from a non-2xx response.
    pub fn from_response(response: ApiResponse) -> Self {
        let message = extract_message(&response.body, response.status);
        Self::Status {
            status: response.status,
            message,
            body: response.body,
        }
    }

    /// HTTP status, when the backend answered.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Status { status, .. } => ErrorCode::from_status(*status),
            Self::Transport(e) if e.is_timeout() => ErrorCode::Timeout,
            Self::Transport(e) if e.is_connect() => ErrorCode::Network,
            Self::Refresh(_) => ErrorCode::Unauthorized,
            Self::Auth(marketplace_auth::Error::InvalidCredentials(_)) => ErrorCode::Unauthorized,
            _ => ErrorCode::Unknown,
        }
    }

    /// Human-readable message: the backend's own message for status errors,
    /// the display text otherwise.
    pub fn message(&self) -> String {
        match self {
            Self::Status { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Pull a message out of an error body.
///
/// Order: a bare JSON string, then `detail`, `message`, `error`, then the
/// first field of the object (its first element if it is a list, as DRF
/// reports field errors). Non-JSON text is used as-is. Falls back to the
/// status reason phrase.
pub fn extract_message(body: &[u8], status: StatusCode) -> String {
    let fallback = || {
        status
            .canonical_reason()
            .map(str::to_string)
            .unwrap_or_else(|| status.as_str().to_string())
    };

    let Ok(value) = serde_json::from_slice::<Value>(body) else {
        let text = String::from_utf8_lossy(body);
        let text = text.trim();
        if text.is_empty() {
            return fallback();
        }
        return text.chars().take(200).collect();
    };

    match value {
        Value::String(s) if !s.is_empty() => s,
        Value::Object(map) => {
            for key in ["detail", "message", "error"] {
                if let Some(msg) = map.get(key).and_then(value_text) {
                    return msg;
                }
            }
            map.values()
                .next()
                .and_then(|first| match first {
                    Value::Array(items) => items.first().and_then(value_text),
                    other => value_text(other),
                })
                .unwrap_or_else(fallback)
        }
        _ => fallback(),
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Null | Value::String(_) => None,
        other => Some(other.to_string()),
    }
}
