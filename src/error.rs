//! Error types for the Pagegate service.

use thiserror::Error;

/// Main error type for Pagegate operations.
#[derive(Error, Debug)]
pub enum PagegateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors
    #[error("Server error: {0}")]
    Server(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Pagegate operations.
pub type Result<T> = std::result::Result<T, PagegateError>;

/// Reasons a request is turned away at the admission gate.
///
/// None of these are fatal; callers reject the request and carry on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    /// The source address could not be split into host and port
    #[error("Invalid client address {addr:?}: {reason}")]
    IdentityParse { addr: String, reason: &'static str },

    /// The client's bucket is empty
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// The global backlog is full
    #[error("Server capacity exceeded")]
    BacklogFull,

    /// Waited too long in the global backlog
    #[error("Timed out waiting in the request backlog")]
    BacklogTimeout,
}

impl AdmissionError {
    /// Whether the client may usefully retry the same request later.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, AdmissionError::IdentityParse { .. })
    }
}
