//! Readiness reporting for downstream infrastructure dependencies.
//!
//! Every configured dependency is probed concurrently and each probe is
//! raced against its own timeout, so a check never hangs on a dependency
//! that does not answer. Only a failing *required* dependency makes the
//! service `not_ready`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::RetrievalError;

/// How a dependency is reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProbeTarget {
    /// `GET url`, expecting a 2xx status.
    Http {
        /// URL to fetch.
        url: String,
    },
    /// A TCP connect to `address` (`host:port`).
    Tcp {
        /// Address to connect to.
        address: String,
    },
}

/// One dependency to check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyConfig {
    /// Display name.
    pub name: String,
    /// Whether a failure makes the service not ready.
    #[serde(default = "default_required")]
    pub required: bool,
    /// How to reach it.
    #[serde(flatten)]
    pub target: ProbeTarget,
}

fn default_required() -> bool {
    true
}

/// Readiness settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Timeout applied to every probe.
    pub probe_timeout_ms: u64,
    /// Dependencies to check.
    pub dependencies: Vec<DependencyConfig>,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 800,
            dependencies: Vec::new(),
        }
    }
}

impl ReadinessConfig {
    /// Validates probe settings.
    pub fn validate(&self) -> Result<(), RetrievalError> {
        if self.probe_timeout_ms == 0 {
            return Err(RetrievalError::Config(
                "readiness.probe_timeout_ms must be greater than 0".into(),
            ));
        }
        if let Some(dep) = self.dependencies.iter().find(|d| d.name.trim().is_empty()) {
            return Err(RetrievalError::Config(format!(
                "readiness dependency with empty name: {:?}",
                dep.target
            )));
        }
        Ok(())
    }
}

/// A reachability check for one dependency.
#[async_trait]
pub trait DependencyProbe: Send + Sync {
    /// Dependency name.
    fn name(&self) -> &str;

    /// Whether a failure flips overall readiness.
    fn required(&self) -> bool;

    /// Check once. Implementations need not enforce a timeout.
    async fn check(&self) -> Result<(), RetrievalError>;
}

/// HTTP `GET` probe.
pub struct HttpProbe {
    name: String,
    required: bool,
    url: String,
    client: reqwest::Client,
}

impl HttpProbe {
    /// Create an HTTP probe sharing `client`.
    pub fn new(name: impl Into<String>, required: bool, url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            name: name.into(),
            required,
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl DependencyProbe for HttpProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn required(&self) -> bool {
        self.required
    }

    async fn check(&self) -> Result<(), RetrievalError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| RetrievalError::DependencyUnhealthy(format!("{}: {e}", self.name)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(RetrievalError::DependencyUnhealthy(format!(
                "{}: HTTP {status}",
                self.name
            )));
        }
        Ok(())
    }
}

/// TCP connect probe.
pub struct TcpProbe {
    name: String,
    required: bool,
    address: String,
}

impl TcpProbe {
    /// Create a TCP probe.
    pub fn new(name: impl Into<String>, required: bool, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required,
            address: address.into(),
        }
    }
}

#[async_trait]
impl DependencyProbe for TcpProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn required(&self) -> bool {
        self.required
    }

    async fn check(&self) -> Result<(), RetrievalError> {
        tokio::net::TcpStream::connect(&self.address)
            .await
            .map(drop)
            .map_err(|e| RetrievalError::DependencyUnhealthy(format!("{}: {e}", self.name)))
    }
}

/// Reachability of one dependency at one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyState {
    /// Probe succeeded.
    Up,
    /// Probe failed or timed out.
    Down,
}

/// Result of probing one dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyStatus {
    /// Dependency name.
    pub name: String,
    /// Up or down.
    pub status: DependencyState,
    /// Whether a failure flips overall readiness.
    pub required: bool,
    /// Time the probe took (capped by the probe timeout).
    pub response_time_ms: u64,
    /// Why the probe failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// When the probe finished.
    pub last_check: DateTime<Utc>,
}

/// Overall readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessState {
    /// Every required dependency is up.
    Ready,
    /// At least one required dependency is down.
    NotReady,
}

/// Outcome of one readiness check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessReport {
    /// Overall readiness.
    pub status: ReadinessState,
    /// Per-dependency results, in configured order.
    pub dependencies: Vec<DependencyStatus>,
    /// Number of failing probes, required or not.
    pub error_count: usize,
}

impl ReadinessReport {
    /// `true` when [`ReadinessState::Ready`].
    pub fn is_ready(&self) -> bool {
        self.status == ReadinessState::Ready
    }
}

/// Runs every probe and folds the results into a [`ReadinessReport`].
pub struct ReadinessReporter {
    probes: Vec<Box<dyn DependencyProbe>>,
    probe_timeout: Duration,
}

impl std::fmt::Debug for ReadinessReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadinessReporter")
            .field("probes", &self.probes.iter().map(|p| p.name()).collect::<Vec<_>>())
            .field("probe_timeout", &self.probe_timeout)
            .finish()
    }
}

impl ReadinessReporter {
    /// Create a reporter over explicit probes.
    pub fn new(probes: Vec<Box<dyn DependencyProbe>>, probe_timeout: Duration) -> Self {
        Self {
            probes,
            probe_timeout,
        }
    }

    /// Build HTTP and TCP probes from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Config`] if the configuration is invalid or
    /// the HTTP client cannot be built.
    pub fn from_config(config: &ReadinessConfig) -> Result<Self, RetrievalError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| RetrievalError::Config(format!("failed to build probe client: {e}")))?;
        let probes = config
            .dependencies
            .iter()
            .map(|dep| -> Box<dyn DependencyProbe> {
                match &dep.target {
                    ProbeTarget::Http { url } => {
                        Box::new(HttpProbe::new(&dep.name, dep.required, url, client.clone()))
                    }
                    ProbeTarget::Tcp { address } => {
                        Box::new(TcpProbe::new(&dep.name, dep.required, address))
                    }
                }
            })
            .collect();
        Ok(Self::new(probes, Duration::from_millis(config.probe_timeout_ms)))
    }

    /// Probe every dependency concurrently.
    pub async fn check(&self) -> ReadinessReport {
        let dependencies =
            futures::future::join_all(self.probes.iter().map(|p| self.probe(p.as_ref()))).await;

        let error_count = dependencies
            .iter()
            .filter(|d| d.status == DependencyState::Down)
            .count();
        let status = if dependencies
            .iter()
            .any(|d| d.required && d.status == DependencyState::Down)
        {
            ReadinessState::NotReady
        } else {
            ReadinessState::Ready
        };
        if status == ReadinessState::NotReady {
            tracing::warn!(error_count, "required dependency unavailable");
        }

        ReadinessReport {
            status,
            dependencies,
            error_count,
        }
    }

    async fn probe(&self, probe: &dyn DependencyProbe) -> DependencyStatus {
        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.probe_timeout, probe.check()).await {
            Ok(result) => result,
            Err(_) => Err(RetrievalError::DependencyUnhealthy(format!(
                "{}: no answer within {}ms",
                probe.name(),
                self.probe_timeout.as_millis()
            ))),
        };
        let response_time_ms = started.elapsed().as_millis() as u64;

        let (status, error_message) = match outcome {
            Ok(()) => (DependencyState::Up, None),
            Err(err) => {
                tracing::debug!(dependency = probe.name(), error = %err, "probe failed");
                (DependencyState::Down, Some(err.to_string()))
            }
        };
        DependencyStatus {
            name: probe.name().to_owned(),
            status,
            required: probe.required(),
            response_time_ms,
            error_message,
            last_check: Utc::now(),
        }
    }
}
