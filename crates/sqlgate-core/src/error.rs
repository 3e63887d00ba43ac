//! Error types for sqlgate

use thiserror::Error;

/// Core error type for sqlgate operations
#[derive(Error, Debug)]
pub enum SqlgateError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Driver error: {0}")]
    Driver(String),

    /// Parameter discovery against the system catalog failed. Never cached.
    #[error("Parameter discovery failed: {0}")]
    Discovery(String),

    /// Caller misuse: empty command text, parameter-count mismatch,
    /// executing through a completed transaction, and the like.
    #[error("Usage error: {0}")]
    Usage(String),

    /// A previous operation on the session failed; the session short-circuits
    /// everything after that until a new session is created.
    #[error("Session failed: {0}")]
    SessionFailed(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Timeout: {0}")]
    Timeout(String),
}

impl SqlgateError {
    /// Whether the error is a caller mistake rather than an execution failure.
    ///
    /// Sessions use this split: usage errors are returned without poisoning
    /// the session, execution errors set the sticky error flag.
    pub fn is_usage(&self) -> bool {
        matches!(self, SqlgateError::Usage(_))
    }
}

/// Result type alias for sqlgate operations
pub type Result<T> = std::result::Result<T, SqlgateError>;
