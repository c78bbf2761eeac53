//! Error types shared by transports and the session controller.

use thiserror::Error;

/// Normalized stream failure.
///
/// Transport adapters translate their client-specific errors into this type at
/// the adapter boundary, so the session controller never inspects `reqwest`
/// errors directly.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// The server answered with a non-success status before any body was read.
    #[error("HTTP error! status: {0}")]
    Status(u16),

    /// The request could not be sent or the connection could not be opened.
    #[error("Failed to connect: {0}")]
    Connect(String),

    /// The connection broke while the body was being read.
    #[error("Stream read failed: {0}")]
    Read(String),

    /// The request could not be built (bad attachment, bad URL).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The transport went away without reporting completion or failure.
    #[error("Stream ended unexpectedly")]
    Disconnected,
}

impl StreamError {
    /// True for failures that happened before any byte of the body arrived.
    pub fn is_open_failure(&self) -> bool {
        matches!(
            self,
            StreamError::Status(_) | StreamError::Connect(_) | StreamError::InvalidRequest(_)
        )
    }
}
