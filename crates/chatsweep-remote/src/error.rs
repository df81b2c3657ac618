//! Error types for the remote client.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while talking to the remote services.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error while reading the event stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid endpoint URL.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Server answered with a non-success status.
    #[error("Server returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body (possibly truncated).
        body: String,
    },

    /// Server rejected the command in its acknowledgement.
    #[error("Command rejected: {0}")]
    Rejected(String),

    /// Operation timed out.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The event stream was closed by the server.
    #[error("Event stream closed")]
    StreamClosed,

    /// Malformed event stream data.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl Error {
    /// Returns true if the failure is worth retrying.
    ///
    /// Connection problems, timeouts, dropped streams and 5xx/429 answers are
    /// transient. Client errors and malformed payloads are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io(_) | Self::Timeout(_) | Self::StreamClosed => true,
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Json(_) | Self::Url(_) | Self::Rejected(_) | Self::Protocol(_) => false,
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
