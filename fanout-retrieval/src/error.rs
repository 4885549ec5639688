//! Error types for the fanout-retrieval crate.
//!
//! Provider- and lane-level variants are recovered inside the orchestrator
//! and never reach the caller; only [`RetrievalError::Config`] and
//! [`RetrievalError::InvalidQuery`] are surfaced as hard errors. No API keys
//! or query text appear in error messages.

/// Errors that can occur while retrieving across lanes.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RetrievalError {
    /// A provider did not answer within its effective timeout.
    #[error("provider timed out: {0}")]
    ProviderTimeout(String),

    /// An HTTP request to a provider failed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// A provider answered but its payload could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// Every provider in a lane failed.
    #[error("lane exhausted: {0}")]
    LaneExhausted(String),

    /// The global deadline fired before every lane finished.
    #[error("global deadline exceeded: {0}")]
    GlobalDeadlineExceeded(String),

    /// A required readiness dependency is unreachable.
    #[error("dependency unhealthy: {0}")]
    DependencyUnhealthy(String),

    /// The query itself cannot be served.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Invalid orchestrator configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl RetrievalError {
    /// Returns `true` for errors recovered locally by advancing a provider chain.
    pub fn is_provider_failure(&self) -> bool {
        matches!(
            self,
            Self::ProviderTimeout(_) | Self::Http(_) | Self::Parse(_)
        )
    }
}

/// Convenience type alias for fanout-retrieval results.
pub type Result<T> = std::result::Result<T, RetrievalError>;
