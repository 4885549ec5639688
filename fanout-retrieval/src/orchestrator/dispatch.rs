//! Lane dispatch: walk one lane's provider chain under its budget.
//!
//! Providers are tried strictly one at a time in the health-adjusted order.
//! Each call runs as its own task raced against a timer of
//! `min(provider timeout, ceiling, remaining budget)`. When the timer wins
//! the task is detached, not killed: whatever it eventually returns is
//! ignored. No provider is called twice in one dispatch.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::LaneConfig;
use crate::error::RetrievalError;
use crate::health::{CallOutcome, HealthRegistry};
use crate::provider::{LaneSpec, Provider, ProviderRequest, ProviderSpec};
use crate::providers::build_provider;
use crate::types::{
    AttemptOutcome, Document, LaneResult, LaneStatus, Mode, ProviderAttempt, ProviderKey,
};

use super::chain::effective_order;

/// A lane ready for dispatch: its immutable spec plus one provider instance
/// per chain entry, in the same order.
pub struct Lane {
    spec: LaneSpec,
    providers: Vec<Arc<dyn Provider>>,
}

impl std::fmt::Debug for Lane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lane").field("spec", &self.spec).finish_non_exhaustive()
    }
}

impl Lane {
    /// Pair a lane spec with its provider instances.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Config`] if the providers do not match the
    /// spec's chain entry for entry.
    pub fn new(spec: LaneSpec, providers: Vec<Arc<dyn Provider>>) -> Result<Self, RetrievalError> {
        if spec.providers.is_empty() {
            return Err(RetrievalError::Config(format!(
                "lane {} has no providers",
                spec.name
            )));
        }
        if spec.providers.len() != providers.len() {
            return Err(RetrievalError::Config(format!(
                "lane {} declares {} providers but {} were supplied",
                spec.name,
                spec.providers.len(),
                providers.len()
            )));
        }
        for (declared, provider) in spec.providers.iter().zip(&providers) {
            if declared.key() != provider.spec().key() {
                return Err(RetrievalError::Config(format!(
                    "lane {} expected provider {} but got {}",
                    spec.name,
                    declared.key(),
                    provider.spec().key()
                )));
            }
        }
        Ok(Self { spec, providers })
    }

    /// Build a lane and its concrete providers from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Config`] if any provider cannot be built.
    pub fn from_config(config: &LaneConfig, user_agent: Option<&str>) -> Result<Self, RetrievalError> {
        let spec = config.to_spec();
        let providers = spec
            .providers
            .iter()
            .map(|p| build_provider(p, user_agent))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(spec, providers)
    }

    /// The lane's immutable spec.
    pub fn spec(&self) -> &LaneSpec {
        &self.spec
    }

    /// Lane name.
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Keys of every provider in the chain, in configured order.
    pub fn provider_keys(&self) -> Vec<ProviderKey> {
        self.spec.providers.iter().map(ProviderSpec::key).collect()
    }
}

/// Walks provider chains, recording every outcome in the health registry.
#[derive(Debug, Clone)]
pub struct LaneDispatcher {
    registry: Arc<HealthRegistry>,
    provider_timeout_ceiling: Duration,
    allow_keyless: bool,
    max_results: usize,
}

impl LaneDispatcher {
    /// Create a dispatcher.
    pub fn new(
        registry: Arc<HealthRegistry>,
        provider_timeout_ceiling: Duration,
        allow_keyless: bool,
        max_results: usize,
    ) -> Self {
        Self {
            registry,
            provider_timeout_ceiling,
            allow_keyless,
            max_results,
        }
    }

    /// Dispatch `lane` for one query under `budget`.
    ///
    /// A zero budget returns [`LaneStatus::TimedOut`] without calling any
    /// provider. Never returns an error: provider failures advance the
    /// chain and an exhausted chain yields [`LaneStatus::Empty`].
    pub async fn dispatch(&self, lane: &Lane, text: &str, mode: Mode, budget: Duration) -> LaneResult {
        let started = Instant::now();
        let name = lane.name();
        if budget.is_zero() {
            tracing::debug!(lane = name, "zero budget; lane not dispatched");
            return LaneResult::timed_out(name, 0);
        }
        let deadline = started + budget;

        let keys = lane.provider_keys();
        let snapshot = self.registry.snapshot(&keys);
        let order = effective_order(&lane.spec.providers, &snapshot, self.allow_keyless);
        if order.is_empty() {
            tracing::warn!(lane = name, "no eligible providers (keyless fallback disabled)");
        }

        let mut attempts = Vec::with_capacity(order.len());
        let mut budget_cut = false;

        for index in order {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                budget_cut = true;
                break;
            }

            let spec = &lane.spec.providers[index];
            let provider_cap = spec.timeout().min(self.provider_timeout_ceiling);
            let timeout = provider_cap.min(remaining);
            let request = ProviderRequest {
                text: text.to_owned(),
                mode,
                max_results: self.max_results,
                timeout,
            };

            let (outcome, elapsed, documents) =
                call_provider(Arc::clone(&lane.providers[index]), request, timeout).await;

            let key = spec.key();
            match outcome {
                AttemptOutcome::Success | AttemptOutcome::NoResults => {
                    self.registry.record(&key, CallOutcome::Success);
                }
                AttemptOutcome::Failed => {
                    self.registry.record(&key, CallOutcome::Failure);
                }
                AttemptOutcome::TimedOut => {
                    self.registry.record(&key, CallOutcome::Timeout);
                    if timeout < provider_cap {
                        budget_cut = true;
                    }
                }
            }

            attempts.push(ProviderAttempt {
                provider: spec.id.clone(),
                kind: spec.kind,
                timeout_ms: timeout.as_millis() as u64,
                elapsed_ms: elapsed.as_millis() as u64,
                outcome,
            });

            if outcome == AttemptOutcome::Success {
                let mut documents = documents;
                documents.truncate(self.max_results);
                let result = LaneResult {
                    lane: name.to_owned(),
                    documents,
                    latency_ms: started.elapsed().as_millis() as u64,
                    provider_used: Some(spec.id.clone()),
                    source_kind: Some(spec.kind),
                    fallback_used: index != 0,
                    status: LaneStatus::Ok,
                    attempts,
                };
                tracing::debug!(
                    lane = name,
                    provider = %spec.id,
                    fallback_used = result.fallback_used,
                    latency_ms = result.latency_ms,
                    documents = result.documents.len(),
                    "lane answered"
                );
                return result;
            }
        }

        let status = if budget_cut || Instant::now() >= deadline {
            LaneStatus::TimedOut
        } else {
            LaneStatus::Empty
        };
        let latency_ms = started.elapsed().as_millis() as u64;
        let exhausted = RetrievalError::LaneExhausted(format!("{name} after {} attempts", attempts.len()));
        tracing::warn!(lane = name, %status, latency_ms, error = %exhausted, "lane produced no documents");

        LaneResult {
            lane: name.to_owned(),
            documents: Vec::new(),
            latency_ms,
            provider_used: None,
            source_kind: None,
            fallback_used: false,
            status,
            attempts,
        }
    }
}

/// Race one provider call against `timeout`.
///
/// The call runs on its own task so that losing the race only detaches it.
async fn call_provider(
    provider: Arc<dyn Provider>,
    request: ProviderRequest,
    timeout: Duration,
) -> (AttemptOutcome, Duration, Vec<Document>) {
    let key = provider.spec().key();
    let started = Instant::now();
    let handle = tokio::spawn(async move { provider.fetch(&request).await });

    let outcome = match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(Ok(documents))) if !documents.is_empty() => (AttemptOutcome::Success, documents),
        Ok(Ok(Ok(_))) => {
            tracing::debug!(provider = %key, "provider returned no documents");
            (AttemptOutcome::NoResults, Vec::new())
        }
        Ok(Ok(Err(err))) => {
            tracing::warn!(provider = %key, error = %err, "provider call failed");
            (AttemptOutcome::Failed, Vec::new())
        }
        Ok(Err(join_err)) => {
            tracing::error!(provider = %key, error = %join_err, "provider task panicked");
            (AttemptOutcome::Failed, Vec::new())
        }
        Err(_) => {
            let err = RetrievalError::ProviderTimeout(format!(
                "{key} after {}ms",
                timeout.as_millis()
            ));
            tracing::warn!(provider = %key, error = %err, "provider call abandoned");
            (AttemptOutcome::TimedOut, Vec::new())
        }
    };
    (outcome.0, started.elapsed(), outcome.1)
}
