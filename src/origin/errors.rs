//! Origin Error Types
//!
//! Structured errors for requests against the upstream repository.
//! None of them reach mirror clients; they decide what gets logged.

/// Origin request error types
#[derive(Debug, thiserror::Error)]
pub enum OriginError {
    #[error("Not found on origin")]
    NotFound,

    #[error("Forbidden by origin")]
    Forbidden,

    #[error("Origin server error ({0})")]
    Server(u16),

    #[error("Unexpected origin status ({0})")]
    Status(u16),

    #[error("Request timeout")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Origin sent no Last-Modified header")]
    MissingLastModified,

    #[error("Unparseable Last-Modified header: {0}")]
    InvalidLastModified(String),
}

impl OriginError {
    /// Create an OriginError from a non-success HTTP status code
    pub fn from_status(status: u16) -> Self {
        match status {
            403 => OriginError::Forbidden,
            404 | 410 => OriginError::NotFound,
            408 | 504 => OriginError::Timeout,
            500..=599 => OriginError::Server(status),
            _ => OriginError::Status(status),
        }
    }
}

impl From<reqwest::Error> for OriginError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            OriginError::Timeout
        } else {
            OriginError::Network(e.to_string())
        }
    }
}
