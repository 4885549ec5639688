//! The orchestrator: one query in, one aggregated response out.
//!
//! Every active lane runs as its own task. Collection stops at the global
//! deadline; lanes still running then are aborted and reported as
//! `timed_out`. A panicking lane is isolated and reported the same way.

use std::collections::{BTreeMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::aggregate::Aggregator;
use crate::cache::{CacheKey, ResponseCache};
use crate::config::RetrievalConfig;
use crate::error::RetrievalError;
use crate::health::{HealthRegistry, ProviderHealthSnapshot};
use crate::provider::LaneSpec;
use crate::types::{AggregatedResponse, LaneResult, Query};

use super::deadline::DeadlineAllocator;
use super::dispatch::{Lane, LaneDispatcher};

/// Fans a query out across lanes under one global deadline.
#[derive(Debug)]
pub struct Orchestrator {
    config: RetrievalConfig,
    lanes: Vec<Arc<Lane>>,
    registry: Arc<HealthRegistry>,
    allocator: DeadlineAllocator,
    dispatcher: LaneDispatcher,
    aggregator: Aggregator,
    cache: Option<ResponseCache>,
}

impl Orchestrator {
    /// Build an orchestrator and its concrete providers from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Config`] if the configuration is invalid or
    /// a provider cannot be built.
    pub fn from_config(config: RetrievalConfig) -> Result<Self, RetrievalError> {
        config.validate()?;
        let lanes = config
            .lanes
            .iter()
            .map(|lane| Lane::from_config(lane, config.user_agent.as_deref()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::assemble(config, lanes)
    }

    /// Build an orchestrator over pre-built lanes.
    ///
    /// `config.lanes` is ignored; every other setting applies.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Config`] if the settings are invalid, no
    /// lane is given, or two lanes share a name.
    pub fn with_lanes(config: RetrievalConfig, lanes: Vec<Lane>) -> Result<Self, RetrievalError> {
        config.validate_settings()?;
        if lanes.is_empty() {
            return Err(RetrievalError::Config(
                "at least one lane must be configured".into(),
            ));
        }
        let mut names = HashSet::new();
        if let Some(dup) = lanes.iter().find(|l| !names.insert(l.name().to_owned())) {
            return Err(RetrievalError::Config(format!(
                "duplicate lane name: {}",
                dup.name()
            )));
        }
        Self::assemble(config, lanes)
    }

    fn assemble(config: RetrievalConfig, lanes: Vec<Lane>) -> Result<Self, RetrievalError> {
        let keys = lanes.iter().flat_map(Lane::provider_keys);
        let registry = Arc::new(HealthRegistry::with_providers(config.health, keys));
        let dispatcher = LaneDispatcher::new(
            Arc::clone(&registry),
            config.provider_timeout_ceiling(),
            config.allow_keyless_fallback,
            config.max_results_per_provider,
        );
        let cache = ResponseCache::new(Duration::from_secs(config.cache_ttl_seconds));

        tracing::info!(
            lanes = lanes.len(),
            providers = registry.report().len(),
            ceiling_ms = config.provider_timeout_ceiling_ms,
            keyless_fallback = config.allow_keyless_fallback,
            cache = cache.is_some(),
            "orchestrator ready"
        );

        Ok(Self {
            allocator: DeadlineAllocator::new(config.provider_timeout_ceiling()),
            aggregator: Aggregator::new(config.ranking, config.max_documents),
            lanes: lanes.into_iter().map(Arc::new).collect(),
            registry,
            dispatcher,
            cache,
            config,
        })
    }

    /// Settings in effect.
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Every configured lane spec.
    pub fn lane_specs(&self) -> impl Iterator<Item = &LaneSpec> {
        self.lanes.iter().map(|l| l.spec())
    }

    /// The shared health registry.
    pub fn health(&self) -> &Arc<HealthRegistry> {
        &self.registry
    }

    /// Per-provider health, sorted by lane then provider.
    pub fn health_report(&self) -> Vec<ProviderHealthSnapshot> {
        self.registry.report()
    }

    /// Run `query` across every lane active for its mode.
    ///
    /// Provider and lane failures never surface here: they degrade the
    /// response instead.
    ///
    /// # Errors
    ///
    /// - [`RetrievalError::InvalidQuery`] for empty text or a zero deadline.
    /// - [`RetrievalError::Config`] if no lane is active for the mode.
    pub async fn retrieve(&self, query: &Query) -> Result<AggregatedResponse, RetrievalError> {
        let text = query.text.trim();
        if text.is_empty() {
            return Err(RetrievalError::InvalidQuery(
                "query text must not be empty".into(),
            ));
        }
        let global = self.config.resolve_deadline(query)?;
        let started = Instant::now();
        let deadline = started + global;
        let trace_id = uuid::Uuid::new_v4().to_string();
        tracing::trace!(%trace_id, query = text, "retrieve");

        let cache_key = CacheKey::new(text, query.mode, global);
        if let Some(cache) = &self.cache {
            if let Some(mut cached) = cache.get(&cache_key).await {
                tracing::debug!(%trace_id, mode = %query.mode, "cache hit");
                cached.trace_id = trace_id;
                return Ok(cached);
            }
        }

        let active: Vec<&Arc<Lane>> = self
            .lanes
            .iter()
            .filter(|l| l.spec().is_active_for(query.mode))
            .collect();
        if active.is_empty() {
            return Err(RetrievalError::Config(format!(
                "no lanes active for mode {}",
                query.mode
            )));
        }

        let specs: Vec<&LaneSpec> = active.iter().map(|l| l.spec()).collect();
        let allocation = self.allocator.allocate(global, &specs);
        let expected: BTreeMap<String, f64> = specs
            .iter()
            .map(|s| (s.name.clone(), s.priority))
            .collect();

        let mut tasks = JoinSet::new();
        for lane in active {
            let lane = Arc::clone(lane);
            let dispatcher = self.dispatcher.clone();
            let budget = allocation.budget(lane.name());
            let text = text.to_owned();
            let mode = query.mode;
            tasks.spawn(async move {
                let dispatch = dispatcher.dispatch(&lane, &text, mode, budget);
                match AssertUnwindSafe(dispatch).catch_unwind().await {
                    Ok(result) => result,
                    Err(_) => {
                        tracing::error!(lane = lane.name(), "lane dispatch panicked");
                        LaneResult::timed_out(lane.name(), started.elapsed().as_millis() as u64)
                    }
                }
            });
        }

        let results = collect_lanes(tasks, &expected, started, deadline, &trace_id).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let response = self.aggregator.aggregate(results, &expected, trace_id);
        tracing::info!(
            trace_id = %response.trace_id,
            mode = %query.mode,
            lanes = response.lane_metrics.len(),
            documents = response.documents.len(),
            degraded = response.degraded,
            elapsed_ms,
            "retrieval complete"
        );

        if let Some(cache) = &self.cache {
            cache.insert(cache_key, &response).await;
        }
        Ok(response)
    }
}

/// Collect lane results until every task has finished or `deadline` passes.
///
/// Tasks still running at the deadline are aborted. Every expected lane
/// without a result is reported `timed_out`.
async fn collect_lanes(
    mut tasks: JoinSet<LaneResult>,
    expected: &BTreeMap<String, f64>,
    started: Instant,
    deadline: Instant,
    trace_id: &str,
) -> Vec<LaneResult> {
    let mut results: Vec<LaneResult> = Vec::with_capacity(expected.len());
    loop {
        match tokio::time::timeout_at(deadline, tasks.join_next()).await {
            Ok(Some(Ok(result))) => results.push(result),
            Ok(Some(Err(err))) => {
                tracing::error!(%trace_id, error = %err, "lane task failed");
            }
            Ok(None) => break,
            Err(_) => {
                let err = RetrievalError::GlobalDeadlineExceeded(format!(
                    "{} lanes still running after {}ms",
                    tasks.len(),
                    deadline.saturating_duration_since(started).as_millis()
                ));
                tracing::warn!(%trace_id, error = %err, "abandoning lanes");
                tasks.abort_all();
                break;
            }
        }
    }

    let elapsed_ms = started.elapsed().as_millis() as u64;
    for lane in expected.keys() {
        if !results.iter().any(|r| &r.lane == lane) {
            results.push(LaneResult::timed_out(lane.as_str(), elapsed_ms));
        }
    }
    results
}
