//! Error types for the fanout service host.

use fanout_retrieval::RetrievalError;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Configuration could not be loaded or is invalid.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The HTTP listener could not be bound.
    #[error("bind error: {0}")]
    Bind(String),

    /// The retrieval core refused to start or serve.
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ServiceError>;
