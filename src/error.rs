//! Error handling

use std::path::PathBuf;

use reqwest::StatusCode;

/// A single failed exchange with a remote service.
///
/// Whether one of these is worth retrying is decided by
/// [`crate::retry::RetryPolicy::classify`], not by the error itself.
#[derive(Debug)]
pub enum FetchError {
    /// Connection, timeout or body read failure
    Network(reqwest::Error),
    /// The remote answered with a non-success status
    Status {
        /// Status returned
        status: StatusCode,
        /// Start of the response body, for the logs
        body: String,
    },
    /// The remote answered 2xx but the body wasn't what we expected
    Malformed(String),
    /// Local I/O while handling the response
    Io(std::io::Error),
}

impl FetchError {
    /// The HTTP status, when the remote sent one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Network(err) => err.status(),
            Self::Malformed(_) | Self::Io(_) => None,
        }
    }

    /// Builds a [`FetchError::Status`] from a response body, truncating it for display.
    pub fn from_status(status: StatusCode, body: &[u8]) -> Self {
        let text = String::from_utf8_lossy(body);
        let body = text.chars().take(500).collect();
        Self::Status { status, body }
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network(err) => write!(f, "Request failed: {err}"),
            Self::Status { status, body } if body.is_empty() => write!(f, "Remote returned {status}"),
            Self::Status { status, body } => write!(f, "Remote returned {status}: {body}"),
            Self::Malformed(msg) => write!(f, "Malformed response: {msg}"),
            Self::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for FetchError {}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Network(err)
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Malformed(err.to_string())
    }
}

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        FetchError::Io(err)
    }
}

/// Errors that stop a whole run before any item is processed.
#[derive(Debug)]
pub enum PipelineError {
    /// A reference image every item depends on is missing
    MissingReference(PathBuf),
    /// The catalog couldn't be read or parsed
    Catalog(String),
    /// An endpoint or base URL is invalid
    InvalidUrl(String),
    /// Filesystem setup failed, eg the output directory
    Io(std::io::Error),
    /// The HTTP client couldn't be built
    Http(reqwest::Error),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingReference(path) => {
                write!(f, "Reference image not found: {}", path.display())
            }
            Self::Catalog(msg) => write!(f, "Invalid catalog: {msg}"),
            Self::InvalidUrl(msg) => write!(f, "Invalid URL: {msg}"),
            Self::Io(err) => write!(f, "I/O error: {err}"),
            Self::Http(err) => write!(f, "HTTP client error: {err}"),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Io(err)
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        PipelineError::Http(err)
    }
}

impl From<url::ParseError> for PipelineError {
    fn from(err: url::ParseError) -> Self {
        PipelineError::InvalidUrl(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_truncates_body() {
        let body = "x".repeat(2000);
        let err = FetchError::from_status(StatusCode::BAD_GATEWAY, body.as_bytes());
        assert!(matches!(&err, FetchError::Status { body, .. } if body.len() == 500));
        assert_eq!(err.status(), Some(StatusCode::BAD_GATEWAY));
    }

    #[test]
    fn display_omits_empty_body() {
        let err = FetchError::from_status(StatusCode::TOO_MANY_REQUESTS, b"");
        assert_eq!(err.to_string(), "Remote returned 429 Too Many Requests");
    }
}
