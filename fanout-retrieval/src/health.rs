//! Per-provider health registry with sliding-window auto-demotion.
//!
//! Tracks the last N call outcomes for every `(lane, provider)` pair and
//! derives an advisory status the lane dispatcher uses to reorder its
//! chain. Demotion never removes a provider: a totally-down chain still has
//! a last resort.
//!
//! # State Machine
//!
//! ```text
//!            ratio > warn            ratio > demotion
//! ┌─────────┐ ───────────► ┌──────────┐ ───────────► ┌───────────┐
//! │ Healthy │              │ Degraded │              │ Unhealthy │
//! └─────────┘ ◄─────────── └──────────┘ ◄─────────── └───────────┘
//!            M successes              M successes
//! ```
//!
//! `ratio = failures_in_window / window_size`; timeouts count as failures.
//! Each provider has its own lock. The key map is built once from
//! configuration and only write-locked to register a provider it has never
//! seen, so concurrent lanes never contend across providers.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::HealthConfig;
use crate::types::ProviderKey;

/// Advisory health status of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Failure ratio at or below the warn threshold.
    Healthy,
    /// Failure ratio above the warn threshold.
    Degraded,
    /// Failure ratio above the demotion threshold; moved to the chain's end.
    Unhealthy,
}

impl HealthStatus {
    fn milder(self) -> Self {
        match self {
            Self::Unhealthy => Self::Degraded,
            Self::Degraded | Self::Healthy => Self::Healthy,
        }
    }
}

/// Outcome of one provider call as seen by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// The provider answered.
    Success,
    /// The provider returned an error.
    Failure,
    /// The provider did not answer in time. Counted as a failure.
    Timeout,
}

impl CallOutcome {
    fn is_failure(self) -> bool {
        !matches!(self, Self::Success)
    }
}

/// What the dispatcher needs to know about a provider to order its chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthView {
    /// Current status.
    pub status: HealthStatus,
    /// `true` if the provider is unhealthy but has been quiet long enough to
    /// deserve a probe in its configured position.
    pub probe_eligible: bool,
}

impl Default for HealthView {
    fn default() -> Self {
        Self {
            status: HealthStatus::Healthy,
            probe_eligible: false,
        }
    }
}

impl HealthView {
    /// Returns `true` if the dispatcher should move this provider to the end.
    pub fn is_demoted(&self) -> bool {
        self.status == HealthStatus::Unhealthy && !self.probe_eligible
    }
}

/// Health views for a set of providers, taken once per dispatch.
pub type HealthSnapshot = HashMap<ProviderKey, HealthView>;

/// Point-in-time health report for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderHealthSnapshot {
    /// Lane the provider belongs to.
    pub lane: String,
    /// Provider id.
    pub provider_id: String,
    /// Current status.
    pub status: HealthStatus,
    /// Failures in the window divided by the window size.
    pub failure_ratio: f64,
    /// Outcomes currently held in the window.
    pub window_len: usize,
    /// Current success streak.
    pub consecutive_successes: u32,
    /// Successes since the registry started.
    pub total_successes: u64,
    /// Failures (including timeouts) since the registry started.
    pub total_failures: u64,
    /// When the last outcome was recorded.
    pub last_checked_at: Option<DateTime<Utc>>,
}

/// Sliding window of outcomes for one provider.
#[derive(Debug)]
struct ProviderHealth {
    /// `true` entries are failures.
    window: VecDeque<bool>,
    failures: usize,
    consecutive_successes: u32,
    status: HealthStatus,
    last_outcome_at: Option<Instant>,
    last_checked_at: Option<DateTime<Utc>>,
    total_successes: u64,
    total_failures: u64,
}

impl ProviderHealth {
    fn new(window_size: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(window_size),
            failures: 0,
            consecutive_successes: 0,
            status: HealthStatus::Healthy,
            last_outcome_at: None,
            last_checked_at: None,
            total_successes: 0,
            total_failures: 0,
        }
    }

    fn failure_ratio(&self, window_size: usize) -> f64 {
        self.failures as f64 / window_size as f64
    }

    fn record(&mut self, outcome: CallOutcome, config: &HealthConfig) -> HealthStatus {
        let failed = outcome.is_failure();
        self.window.push_back(failed);
        if failed {
            self.failures += 1;
        }
        while self.window.len() > config.window_size {
            if self.window.pop_front() == Some(true) {
                self.failures -= 1;
            }
        }
        self.last_outcome_at = Some(Instant::now());
        self.last_checked_at = Some(Utc::now());

        if failed {
            self.total_failures += 1;
            self.consecutive_successes = 0;
            let ratio = self.failure_ratio(config.window_size);
            let target = if ratio > config.demotion_ratio {
                HealthStatus::Unhealthy
            } else if ratio > config.warn_ratio {
                HealthStatus::Degraded
            } else {
                HealthStatus::Healthy
            };
            if target > self.status {
                self.status = target;
            }
        } else {
            self.total_successes += 1;
            self.consecutive_successes += 1;
            if self.status != HealthStatus::Healthy
                && self.consecutive_successes >= config.recovery_successes
            {
                self.status = self.status.milder();
                self.consecutive_successes = 0;
            }
        }
        self.status
    }

    fn view(&self, probe_after: Duration) -> HealthView {
        let probe_eligible = self.status == HealthStatus::Unhealthy
            && self
                .last_outcome_at
                .is_none_or(|t| t.elapsed() >= probe_after);
        HealthView {
            status: self.status,
            probe_eligible,
        }
    }
}

type Entry = Arc<Mutex<ProviderHealth>>;

/// Registry of independent per-provider health windows.
#[derive(Debug)]
pub struct HealthRegistry {
    config: HealthConfig,
    entries: RwLock<HashMap<ProviderKey, Entry>>,
}

impl HealthRegistry {
    /// Create an empty registry.
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry pre-populated with every provider in `keys`.
    pub fn with_providers(config: HealthConfig, keys: impl IntoIterator<Item = ProviderKey>) -> Self {
        let entries = keys
            .into_iter()
            .map(|key| (key, Arc::new(Mutex::new(ProviderHealth::new(config.window_size)))))
            .collect();
        Self {
            config,
            entries: RwLock::new(entries),
        }
    }

    /// The settings this registry was built with.
    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    fn lookup(&self, key: &ProviderKey) -> Option<Entry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn entry(&self, key: &ProviderKey) -> Entry {
        if let Some(entry) = self.lookup(key) {
            return entry;
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            entries
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(ProviderHealth::new(self.config.window_size)))),
        )
    }

    /// Record the outcome of one provider call and return the new status.
    pub fn record(&self, key: &ProviderKey, outcome: CallOutcome) -> HealthStatus {
        let entry = self.entry(key);
        let mut health = entry.lock().unwrap_or_else(PoisonError::into_inner);
        let before = health.status;
        let after = health.record(outcome, &self.config);
        drop(health);

        if after != before {
            match after {
                HealthStatus::Unhealthy => {
                    tracing::warn!(provider = %key, "provider demoted to unhealthy");
                }
                _ => tracing::info!(provider = %key, from = ?before, to = ?after, "provider health changed"),
            }
        }
        after
    }

    /// Current status of a provider. Unknown providers are healthy.
    pub fn status(&self, key: &ProviderKey) -> HealthStatus {
        self.view(key).status
    }

    /// Dispatch-time view of a provider.
    pub fn view(&self, key: &ProviderKey) -> HealthView {
        let probe_after = Duration::from_secs(self.config.probe_after_secs);
        self.lookup(key).map_or_else(HealthView::default, |entry| {
            entry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .view(probe_after)
        })
    }

    /// Views for every key in `keys`, for one chain ordering.
    pub fn snapshot<'a>(&self, keys: impl IntoIterator<Item = &'a ProviderKey>) -> HealthSnapshot {
        keys.into_iter()
            .map(|key| (key.clone(), self.view(key)))
            .collect()
    }

    /// Health report for every tracked provider, sorted by lane then id.
    pub fn report(&self) -> Vec<ProviderHealthSnapshot> {
        let entries: Vec<(ProviderKey, Entry)> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect();

        let mut report: Vec<ProviderHealthSnapshot> = entries
            .into_iter()
            .map(|(key, entry)| {
                let health = entry.lock().unwrap_or_else(PoisonError::into_inner);
                ProviderHealthSnapshot {
                    lane: key.lane,
                    provider_id: key.id,
                    status: health.status,
                    failure_ratio: health.failure_ratio(self.config.window_size),
                    window_len: health.window.len(),
                    consecutive_successes: health.consecutive_successes,
                    total_successes: health.total_successes,
                    total_failures: health.total_failures,
                    last_checked_at: health.last_checked_at,
                }
            })
            .collect();
        report.sort_by(|a, b| (&a.lane, &a.provider_id).cmp(&(&b.lane, &b.provider_id)));
        report
    }

    /// Reset every tracked provider to healthy with an empty window.
    pub fn reset(&self) {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        for entry in entries.values() {
            *entry.lock().unwrap_or_else(PoisonError::into_inner) =
                ProviderHealth::new(self.config.window_size);
        }
    }
}
