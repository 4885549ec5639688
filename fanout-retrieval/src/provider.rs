//! The provider capability contract and immutable lane/provider specs.
//!
//! Every backend (web search API, HTML scraper, vector store, knowledge
//! graph, news or market API) implements [`Provider`]. The lane dispatcher
//! and orchestrator only ever see this trait, so lane-specific details
//! never leak into budget or fallback logic.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::EndpointDescriptor;
use crate::error::RetrievalError;
use crate::types::{Document, Mode, ProviderKey, ProviderKind};

/// Immutable configuration of one provider. Health is tracked separately.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSpec {
    /// Provider id, unique within its lane.
    pub id: String,
    /// Lane the provider belongs to.
    pub lane: String,
    /// Keyed or keyless.
    pub kind: ProviderKind,
    /// Provider-specific timeout.
    pub timeout_ms: u64,
    /// How to reach the provider.
    pub endpoint: EndpointDescriptor,
}

impl ProviderSpec {
    /// The `(lane, id)` identity of this provider.
    pub fn key(&self) -> ProviderKey {
        ProviderKey::new(&self.lane, &self.id)
    }

    /// Provider-specific timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Immutable configuration of one lane and its ordered provider chain.
#[derive(Debug, Clone, PartialEq)]
pub struct LaneSpec {
    /// Lane name.
    pub name: String,
    /// Static share weight for the deadline allocator.
    pub weight_ms: u64,
    /// Minimum viable budget.
    pub min_budget_ms: u64,
    /// Lane-priority weight for re-ranking.
    pub priority: f64,
    /// Modes in which the lane runs (empty = all).
    pub modes: Vec<Mode>,
    /// Provider chain: keyed providers, then keyless providers.
    pub providers: Vec<ProviderSpec>,
}

impl LaneSpec {
    /// Returns `true` if the lane runs for `mode`.
    pub fn is_active_for(&self, mode: Mode) -> bool {
        self.modes.is_empty() || self.modes.contains(&mode)
    }
}

/// What a provider is asked for on one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRequest {
    /// Query text.
    pub text: String,
    /// Query mode.
    pub mode: Mode,
    /// Maximum number of documents wanted.
    pub max_results: usize,
    /// Effective timeout for this call. Implementations should pass it to
    /// their transport; the dispatcher enforces it regardless.
    pub timeout: Duration,
}

/// A pluggable retrieval backend.
///
/// Implementors handle their own request construction, credentials and
/// response parsing, returning documents tagged with their lane, id and
/// kind. All implementations must be `Send + Sync`: one instance serves
/// every concurrent request.
#[async_trait]
pub trait Provider: Send + Sync {
    /// The immutable spec this provider was built from.
    fn spec(&self) -> &ProviderSpec;

    /// Fetch documents for `request`.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError`] if the call fails, the response cannot be
    /// parsed, or credentials are missing. The dispatcher records any
    /// error as a failure and moves on to the next provider.
    async fn fetch(&self, request: &ProviderRequest) -> Result<Vec<Document>, RetrievalError>;
}
