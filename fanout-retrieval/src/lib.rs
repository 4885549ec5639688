//! # fanout-retrieval
//!
//! Deadline-bounded, health-aware retrieval across independent lanes.
//!
//! A query fans out to every lane active for its mode (web search,
//! knowledge graph, news, vector store, market data). Each lane walks its
//! own provider chain, keyed providers first and keyless fallbacks after,
//! inside a budget carved from the query's global deadline. Results are
//! merged into one ranked, deduplicated response with per-lane metrics.
//!
//! ## Design
//!
//! - One task per lane; providers within a lane are tried strictly in order
//! - Every provider call is raced against `min(timeout, ceiling, remaining)`
//! - A sliding-window health registry demotes flaky providers to the end
//!   of their chain and restores them after consecutive successes
//! - Lanes that miss the global deadline are reported `timed_out` and the
//!   response is flagged `degraded`; partial answers are never errors
//! - Non-degraded responses are cached in memory with a configurable TTL
//!
//! ## Security
//!
//! - API keys are read from environment variables at call time and never
//!   logged or included in errors
//! - Query text is logged only at trace level

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod error;
pub mod health;
pub mod orchestrator;
pub mod provider;
pub mod providers;
pub mod readiness;
pub mod types;

pub use config::{HealthConfig, LaneConfig, ProviderConfig, RankingConfig, RetrievalConfig};
pub use error::{Result, RetrievalError};
pub use health::{HealthRegistry, HealthStatus, ProviderHealthSnapshot};
pub use orchestrator::{Lane, Orchestrator};
pub use provider::{LaneSpec, Provider, ProviderRequest, ProviderSpec};
pub use readiness::{DependencyStatus, ReadinessConfig, ReadinessReport, ReadinessReporter};
pub use types::{AggregatedResponse, Document, LaneResult, LaneStatus, Mode, Query, RankedDocument};

/// Run one query with a freshly built orchestrator.
///
/// Health state and the cache live only for this call; long-running
/// services should build one [`Orchestrator`] and reuse it.
///
/// # Errors
///
/// Returns [`RetrievalError::Config`] if `config` is invalid and
/// [`RetrievalError::InvalidQuery`] if the query cannot be served.
///
/// # Examples
///
/// ```no_run
/// # async fn example() -> fanout_retrieval::Result<()> {
/// use fanout_retrieval::{Mode, Query, RetrievalConfig};
///
/// let query = Query::new("rust async cancellation", Mode::Technical);
/// let response = fanout_retrieval::retrieve(&query, RetrievalConfig::default()).await?;
/// for doc in &response.documents {
///     println!("{:.2} {} ({:?})", doc.relevance_score, doc.title, doc.lanes);
/// }
/// # Ok(())
/// # }
/// ```
pub async fn retrieve(query: &Query, config: RetrievalConfig) -> Result<AggregatedResponse> {
    Orchestrator::from_config(config)?.retrieve(query).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn retrieve_validates_config_no_lanes() {
        let config = RetrievalConfig {
            lanes: vec![],
            ..Default::default()
        };
        let err = retrieve(&Query::new("test", Mode::Simple), config)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("lane"));
    }

    #[tokio::test]
    async fn retrieve_validates_config_zero_ceiling() {
        let config = RetrievalConfig {
            provider_timeout_ceiling_ms: 0,
            ..Default::default()
        };
        let err = retrieve(&Query::new("test", Mode::Simple), config)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("provider_timeout_ceiling_ms"));
    }

    #[tokio::test]
    async fn retrieve_rejects_empty_query() {
        let err = retrieve(&Query::new("", Mode::Simple), RetrievalConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::InvalidQuery(_)));
    }
}
