//! Orchestrator configuration with sensible defaults.
//!
//! [`RetrievalConfig`] controls which lanes exist, how each lane's provider
//! chain is ordered (keyed list, then keyless list), per-mode deadlines, the
//! per-provider timeout ceiling, auto-demotion thresholds, and ranking
//! weights. Every section deserializes from TOML with `#[serde(default)]`.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RetrievalError;
use crate::provider::{LaneSpec, ProviderSpec};
use crate::types::{Mode, ProviderKind, Query};

/// Top-level orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Lanes and their provider chains.
    pub lanes: Vec<LaneConfig>,
    /// Global deadline per query mode.
    pub deadlines: ModeDeadlines,
    /// Hard cap on any single provider call, independent of lane budget.
    pub provider_timeout_ceiling_ms: u64,
    /// When `false`, keyless providers are never dispatched.
    pub allow_keyless_fallback: bool,
    /// Auto-demotion settings.
    pub health: HealthConfig,
    /// Re-ranking weights.
    pub ranking: RankingConfig,
    /// Maximum number of documents in an aggregated response.
    pub max_documents: usize,
    /// Maximum number of documents requested from each provider.
    pub max_results_per_provider: usize,
    /// How long to cache non-degraded responses. 0 disables caching.
    pub cache_ttl_seconds: u64,
    /// Custom User-Agent for HTTP providers. `None` rotates built-in agents.
    pub user_agent: Option<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            lanes: default_lanes(),
            deadlines: ModeDeadlines::default(),
            provider_timeout_ceiling_ms: 800,
            allow_keyless_fallback: true,
            health: HealthConfig::default(),
            ranking: RankingConfig::default(),
            max_documents: 20,
            max_results_per_provider: 10,
            cache_ttl_seconds: 300,
            user_agent: None,
        }
    }
}

/// Global deadline per query mode, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeDeadlines {
    /// Deadline for [`Mode::Simple`].
    pub simple_ms: u64,
    /// Deadline for [`Mode::Technical`].
    pub technical_ms: u64,
    /// Deadline for [`Mode::Research`].
    pub research_ms: u64,
}

impl Default for ModeDeadlines {
    fn default() -> Self {
        Self {
            simple_ms: 5_000,
            technical_ms: 7_000,
            research_ms: 10_000,
        }
    }
}

impl ModeDeadlines {
    /// Returns the configured deadline for `mode`.
    pub fn for_mode(&self, mode: Mode) -> u64 {
        match mode {
            Mode::Simple => self.simple_ms,
            Mode::Technical => self.technical_ms,
            Mode::Research => self.research_ms,
        }
    }
}

/// Sliding-window auto-demotion settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Number of most recent outcomes kept per provider.
    pub window_size: usize,
    /// Failure ratio above which a provider becomes degraded.
    pub warn_ratio: f64,
    /// Failure ratio above which a provider becomes unhealthy (demoted).
    pub demotion_ratio: f64,
    /// Consecutive successes needed to step down one severity level.
    pub recovery_successes: u32,
    /// Seconds after the last outcome when an unhealthy provider may be
    /// probed in its configured position again.
    pub probe_after_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            warn_ratio: 0.2,
            demotion_ratio: 0.3,
            recovery_successes: 3,
            probe_after_secs: 30,
        }
    }
}

/// Re-ranking weights applied by the aggregator.
///
/// `score = (relevance_weight * relevance + priority_weight * lane_priority)
///          / (1 + position * position_decay)`, then multiplied by
/// `1 + cross_lane_boost * (lanes - 1)` once duplicates are merged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Weight of the lane-reported relevance.
    pub relevance_weight: f64,
    /// Weight of the lane priority.
    pub priority_weight: f64,
    /// Per-position decay factor within one lane's result list.
    pub position_decay: f64,
    /// Extra multiplier per additional lane returning the same document.
    pub cross_lane_boost: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            relevance_weight: 1.0,
            priority_weight: 0.5,
            position_decay: 0.1,
            cross_lane_boost: 0.2,
        }
    }
}

/// Static configuration of one lane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaneConfig {
    /// Lane name, e.g. `web_search`.
    pub name: String,
    /// Static share weight used by the deadline allocator.
    pub weight_ms: u64,
    /// Minimum viable budget for this lane.
    #[serde(default)]
    pub min_budget_ms: u64,
    /// Lane-priority weight used when re-ranking.
    #[serde(default = "default_priority")]
    pub priority: f64,
    /// Modes in which the lane runs. Empty means every mode.
    #[serde(default)]
    pub modes: Vec<Mode>,
    /// Keyed providers, in preference order.
    #[serde(default)]
    pub keyed: Vec<ProviderConfig>,
    /// Keyless fallback providers, in preference order.
    #[serde(default)]
    pub keyless: Vec<ProviderConfig>,
}

fn default_priority() -> f64 {
    1.0
}

impl LaneConfig {
    /// Returns `true` if the lane runs for `mode`.
    pub fn is_active_for(&self, mode: Mode) -> bool {
        self.modes.is_empty() || self.modes.contains(&mode)
    }

    /// Build the immutable lane spec: keyed providers first, then keyless.
    pub fn to_spec(&self) -> LaneSpec {
        let keyed = self
            .keyed
            .iter()
            .map(|p| p.to_spec(&self.name, ProviderKind::Keyed));
        let keyless = self
            .keyless
            .iter()
            .map(|p| p.to_spec(&self.name, ProviderKind::Keyless));
        LaneSpec {
            name: self.name.clone(),
            weight_ms: self.weight_ms,
            min_budget_ms: self.min_budget_ms,
            priority: self.priority,
            modes: self.modes.clone(),
            providers: keyed.chain(keyless).collect(),
        }
    }
}

/// Static configuration of one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider id, unique within its lane.
    pub id: String,
    /// Provider-specific timeout. Further capped by the ceiling and lane budget.
    #[serde(default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,
    /// How to reach the provider.
    pub endpoint: EndpointDescriptor,
}

fn default_provider_timeout_ms() -> u64 {
    800
}

impl ProviderConfig {
    fn to_spec(&self, lane: &str, kind: ProviderKind) -> ProviderSpec {
        ProviderSpec {
            id: self.id.clone(),
            lane: lane.to_owned(),
            kind,
            timeout_ms: self.timeout_ms,
            endpoint: self.endpoint.clone(),
        }
    }
}

/// How a provider is reached. Selects the concrete implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EndpointDescriptor {
    /// Brave Search web API (keyed).
    BraveApi {
        /// API base URL.
        #[serde(default = "default_brave_url")]
        base_url: String,
        /// Environment variable holding the subscription token.
        api_key_env: String,
    },
    /// DuckDuckGo HTML-only endpoint (keyless scraping).
    DuckDuckGoHtml {
        /// Endpoint URL.
        #[serde(default = "default_duckduckgo_url")]
        base_url: String,
    },
    /// Generic JSON-over-HTTP search endpoint.
    JsonApi(JsonApiEndpoint),
}

fn default_brave_url() -> String {
    "https://api.search.brave.com/res/v1/web/search".to_owned()
}

fn default_duckduckgo_url() -> String {
    "https://html.duckduckgo.com/html/".to_owned()
}

/// Field mapping for a generic JSON search endpoint.
///
/// The query is sent as a `GET` parameter; results are read from the array
/// at `results_pointer` (an RFC 6901 JSON pointer) and each field is looked
/// up by name on the array items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonApiEndpoint {
    /// Endpoint URL.
    pub url: String,
    /// Query-string parameter carrying the query text.
    #[serde(default = "default_query_param")]
    pub query_param: String,
    /// Query-string parameter carrying the result limit, if supported.
    #[serde(default)]
    pub limit_param: Option<String>,
    /// Fixed extra query-string parameters.
    #[serde(default)]
    pub extra_params: BTreeMap<String, String>,
    /// Environment variable holding the API key, if keyed.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Where the API key goes.
    #[serde(default)]
    pub api_key_placement: ApiKeyPlacement,
    /// JSON pointer to the results array.
    #[serde(default = "default_results_pointer")]
    pub results_pointer: String,
    /// Field holding the document text.
    #[serde(default = "default_content_field")]
    pub content_field: String,
    /// Field holding the title.
    #[serde(default = "default_title_field")]
    pub title_field: String,
    /// Field holding the URL, if any.
    #[serde(default)]
    pub url_field: Option<String>,
    /// Field holding a stable id, if any.
    #[serde(default)]
    pub id_field: Option<String>,
    /// Field holding a provider relevance score, if any.
    #[serde(default)]
    pub score_field: Option<String>,
}

fn default_query_param() -> String {
    "q".to_owned()
}

fn default_results_pointer() -> String {
    "/results".to_owned()
}

fn default_content_field() -> String {
    "content".to_owned()
}

fn default_title_field() -> String {
    "title".to_owned()
}

/// Placement of an API key on a JSON endpoint request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "in", content = "name", rename_all = "snake_case")]
pub enum ApiKeyPlacement {
    /// `Authorization: Bearer <key>`.
    #[default]
    Bearer,
    /// A named request header.
    Header(String),
    /// A named query-string parameter.
    Query(String),
}

impl RetrievalConfig {
    /// Validates this configuration, returning an error if any field is invalid.
    pub fn validate(&self) -> Result<(), RetrievalError> {
        if self.lanes.is_empty() {
            return Err(RetrievalError::Config(
                "at least one lane must be configured".into(),
            ));
        }
        self.validate_settings()?;
        self.validate_lanes()
    }

    /// Validates everything except the lane list.
    pub fn validate_settings(&self) -> Result<(), RetrievalError> {
        if self.provider_timeout_ceiling_ms == 0 {
            return Err(RetrievalError::Config(
                "provider_timeout_ceiling_ms must be greater than 0".into(),
            ));
        }
        for mode in Mode::all() {
            if self.deadlines.for_mode(*mode) == 0 {
                return Err(RetrievalError::Config(format!(
                    "deadline for mode {mode} must be greater than 0"
                )));
            }
        }
        if self.max_documents == 0 {
            return Err(RetrievalError::Config(
                "max_documents must be greater than 0".into(),
            ));
        }
        if self.max_results_per_provider == 0 {
            return Err(RetrievalError::Config(
                "max_results_per_provider must be greater than 0".into(),
            ));
        }
        self.health.validate()
    }

    fn validate_lanes(&self) -> Result<(), RetrievalError> {
        let mut lane_names = HashSet::new();
        for lane in &self.lanes {
            if lane.name.trim().is_empty() {
                return Err(RetrievalError::Config("lane name must not be empty".into()));
            }
            if !lane_names.insert(lane.name.as_str()) {
                return Err(RetrievalError::Config(format!(
                    "duplicate lane name: {}",
                    lane.name
                )));
            }
            if lane.weight_ms == 0 {
                return Err(RetrievalError::Config(format!(
                    "lane {} weight_ms must be greater than 0",
                    lane.name
                )));
            }
            if lane.keyed.is_empty() && lane.keyless.is_empty() {
                return Err(RetrievalError::Config(format!(
                    "lane {} has no providers",
                    lane.name
                )));
            }
            let mut ids = HashSet::new();
            for provider in lane.keyed.iter().chain(&lane.keyless) {
                if !ids.insert(provider.id.as_str()) {
                    return Err(RetrievalError::Config(format!(
                        "duplicate provider id {} in lane {}",
                        provider.id, lane.name
                    )));
                }
                if provider.timeout_ms == 0 {
                    return Err(RetrievalError::Config(format!(
                        "provider {}/{} timeout_ms must be greater than 0",
                        lane.name, provider.id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Resolve the global deadline for a query: explicit override, else the
    /// mode default.
    pub fn resolve_deadline(&self, query: &Query) -> Result<Duration, RetrievalError> {
        let ms = query
            .deadline_ms
            .unwrap_or_else(|| self.deadlines.for_mode(query.mode));
        if ms == 0 {
            return Err(RetrievalError::InvalidQuery(
                "deadline_ms must be greater than 0".into(),
            ));
        }
        Ok(Duration::from_millis(ms))
    }

    /// Per-provider timeout ceiling as a [`Duration`].
    pub fn provider_timeout_ceiling(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ceiling_ms)
    }
}

impl HealthConfig {
    /// Validates window size and threshold ordering.
    pub fn validate(&self) -> Result<(), RetrievalError> {
        if self.window_size == 0 {
            return Err(RetrievalError::Config(
                "health.window_size must be greater than 0".into(),
            ));
        }
        if self.recovery_successes == 0 {
            return Err(RetrievalError::Config(
                "health.recovery_successes must be greater than 0".into(),
            ));
        }
        let in_range = |r: f64| (0.0..=1.0).contains(&r);
        if !in_range(self.warn_ratio) || !in_range(self.demotion_ratio) {
            return Err(RetrievalError::Config(
                "health ratios must be within [0.0, 1.0]".into(),
            ));
        }
        if self.warn_ratio > self.demotion_ratio {
            return Err(RetrievalError::Config(
                "health.warn_ratio must be <= health.demotion_ratio".into(),
            ));
        }
        Ok(())
    }
}

fn json_lane_provider(id: &str, endpoint: JsonApiEndpoint) -> ProviderConfig {
    ProviderConfig {
        id: id.to_owned(),
        timeout_ms: default_provider_timeout_ms(),
        endpoint: EndpointDescriptor::JsonApi(endpoint),
    }
}

fn json_endpoint(url: &str, results_pointer: &str) -> JsonApiEndpoint {
    JsonApiEndpoint {
        url: url.to_owned(),
        query_param: default_query_param(),
        limit_param: None,
        extra_params: BTreeMap::new(),
        api_key_env: None,
        api_key_placement: ApiKeyPlacement::Bearer,
        results_pointer: results_pointer.to_owned(),
        content_field: default_content_field(),
        title_field: default_title_field(),
        url_field: None,
        id_field: None,
        score_field: None,
    }
}

/// The built-in lane set: web search, knowledge graph, news for every mode;
/// vector similarity for technical/research; market data for research.
fn default_lanes() -> Vec<LaneConfig> {
    let wikipedia = JsonApiEndpoint {
        limit_param: Some("limit".into()),
        content_field: "excerpt".into(),
        id_field: Some("key".into()),
        ..json_endpoint("https://en.wikipedia.org/w/rest.php/v1/search/page", "/pages")
    };
    let newsapi = JsonApiEndpoint {
        limit_param: Some("pageSize".into()),
        api_key_env: Some("NEWSAPI_KEY".into()),
        api_key_placement: ApiKeyPlacement::Header("X-Api-Key".into()),
        content_field: "description".into(),
        url_field: Some("url".into()),
        ..json_endpoint("https://newsapi.org/v2/everything", "/articles")
    };
    let hacker_news = JsonApiEndpoint {
        query_param: "query".into(),
        limit_param: Some("hitsPerPage".into()),
        content_field: "story_text".into(),
        url_field: Some("url".into()),
        id_field: Some("objectID".into()),
        ..json_endpoint("https://hn.algolia.com/api/v1/search", "/hits")
    };
    let vector = JsonApiEndpoint {
        limit_param: Some("k".into()),
        api_key_env: Some("FANOUT_VECTOR_API_KEY".into()),
        url_field: Some("url".into()),
        id_field: Some("id".into()),
        score_field: Some("score".into()),
        ..json_endpoint("http://127.0.0.1:8088/search", "/results")
    };
    let mut alpha_params = BTreeMap::new();
    alpha_params.insert("function".to_owned(), "SYMBOL_SEARCH".to_owned());
    let alpha_vantage = JsonApiEndpoint {
        query_param: "keywords".into(),
        extra_params: alpha_params,
        api_key_env: Some("ALPHAVANTAGE_KEY".into()),
        api_key_placement: ApiKeyPlacement::Query("apikey".into()),
        content_field: "2. name".into(),
        title_field: "1. symbol".into(),
        id_field: Some("1. symbol".into()),
        score_field: Some("9. matchScore".into()),
        ..json_endpoint("https://www.alphavantage.co/query", "/bestMatches")
    };

    vec![
        LaneConfig {
            name: "web_search".into(),
            weight_ms: 2_000,
            min_budget_ms: 400,
            priority: 1.0,
            modes: Vec::new(),
            keyed: vec![ProviderConfig {
                id: "brave".into(),
                timeout_ms: default_provider_timeout_ms(),
                endpoint: EndpointDescriptor::BraveApi {
                    base_url: default_brave_url(),
                    api_key_env: "BRAVE_API_KEY".into(),
                },
            }],
            keyless: vec![ProviderConfig {
                id: "duckduckgo".into(),
                timeout_ms: default_provider_timeout_ms(),
                endpoint: EndpointDescriptor::DuckDuckGoHtml {
                    base_url: default_duckduckgo_url(),
                },
            }],
        },
        LaneConfig {
            name: "knowledge_graph".into(),
            weight_ms: 1_000,
            min_budget_ms: 300,
            priority: 0.9,
            modes: Vec::new(),
            keyed: Vec::new(),
            keyless: vec![json_lane_provider("wikipedia", wikipedia)],
        },
        LaneConfig {
            name: "news".into(),
            weight_ms: 1_000,
            min_budget_ms: 300,
            priority: 0.8,
            modes: Vec::new(),
            keyed: vec![json_lane_provider("newsapi", newsapi)],
            keyless: vec![json_lane_provider("hacker_news", hacker_news)],
        },
        LaneConfig {
            name: "vector".into(),
            weight_ms: 1_500,
            min_budget_ms: 300,
            priority: 1.0,
            modes: vec![Mode::Technical, Mode::Research],
            keyed: vec![json_lane_provider("vector_store", vector)],
            keyless: Vec::new(),
        },
        LaneConfig {
            name: "market_data".into(),
            weight_ms: 500,
            min_budget_ms: 200,
            priority: 0.6,
            modes: vec![Mode::Research],
            keyed: vec![json_lane_provider("alpha_vantage", alpha_vantage)],
            keyless: Vec::new(),
        },
    ]
}
