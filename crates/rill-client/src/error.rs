//! Error types for rill-client

use thiserror::Error;

/// Result type alias using rill-client Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to the chat backend
///
/// All of these are fatal to at most the operation that raised them; the
/// rest of the client stays interactive.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Backend returned a non-success status
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// An operation that needs a session was invoked without one
    #[error("No active session")]
    NoActiveSession,

    /// Unexpected response format
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl Error {
    /// Create an API error from a status code and response body
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Check whether this error came from the backend rather than transport
    pub fn is_backend_declared(&self) -> bool {
        matches!(self, Error::Api { .. })
    }
}
