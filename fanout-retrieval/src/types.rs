//! Core request, document, and result types shared across lanes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Query mode. Selects the global deadline and which lanes are active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Short factual lookups.
    #[default]
    Simple,
    /// Technical questions that justify a longer wait.
    Technical,
    /// Broad research queries; the longest deadline.
    Research,
}

impl Mode {
    /// Returns the lowercase wire name of this mode.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Technical => "technical",
            Self::Research => "research",
        }
    }

    /// Returns all mode variants.
    pub fn all() -> &'static [Mode] {
        &[Self::Simple, Self::Technical, Self::Research]
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A user query as received from the intake collaborator.
///
/// Immutable once orchestration starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// The query text.
    pub text: String,
    /// Query mode.
    #[serde(default)]
    pub mode: Mode,
    /// Explicit global deadline, overriding the mode default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u64>,
}

impl Query {
    /// Build a query with the mode's default deadline.
    pub fn new(text: impl Into<String>, mode: Mode) -> Self {
        Self {
            text: text.into(),
            mode,
            deadline_ms: None,
        }
    }

    /// Override the global deadline for this query.
    pub fn with_deadline_ms(mut self, deadline_ms: u64) -> Self {
        self.deadline_ms = Some(deadline_ms);
        self
    }
}

/// Whether a provider needs credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Requires an API key; tried first.
    Keyed,
    /// Free/public; used as fallback.
    Keyless,
}

impl ProviderKind {
    /// Returns the lowercase wire name of this kind.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Keyed => "keyed",
            Self::Keyless => "keyless",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identity of a provider: the `(lane, id)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProviderKey {
    /// Lane the provider belongs to.
    pub lane: String,
    /// Provider id, unique within its lane.
    pub id: String,
}

impl ProviderKey {
    /// Build a key from its parts.
    pub fn new(lane: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            lane: lane.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ProviderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.lane, self.id)
    }
}

/// A single document returned by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Provider-assigned identifier, if any. Used for dedup when no URL exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Short title or headline.
    #[serde(default)]
    pub title: String,
    /// Main text content or snippet.
    pub content: String,
    /// Source URL, if the document has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Lane-reported relevance in `[0.0, 1.0]`.
    pub relevance: f64,
    /// Id of the provider that produced the document.
    pub source_provider: String,
    /// Kind of the provider that produced the document.
    pub source_kind: ProviderKind,
    /// Lane the document came from.
    pub lane: String,
}

/// Terminal status of one lane dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaneStatus {
    /// A provider answered with documents.
    Ok,
    /// Every provider was tried and none produced documents.
    Empty,
    /// The lane budget (or the global deadline) ran out first.
    TimedOut,
}

impl LaneStatus {
    /// Returns the snake_case wire name of this status.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Empty => "empty",
            Self::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for LaneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of a single provider call within a lane dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Answered with at least one document.
    Success,
    /// Answered, but with nothing usable.
    NoResults,
    /// Returned an error.
    Failed,
    /// Did not answer within the effective timeout.
    TimedOut,
}

/// Record of one provider call made during a lane dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderAttempt {
    /// Provider id.
    pub provider: String,
    /// Provider kind.
    pub kind: ProviderKind,
    /// Effective timeout the call was given.
    pub timeout_ms: u64,
    /// Wall time spent waiting on the call.
    pub elapsed_ms: u64,
    /// What happened.
    pub outcome: AttemptOutcome,
}

/// Result of dispatching one lane. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneResult {
    /// Lane name.
    pub lane: String,
    /// Documents from the provider that answered.
    pub documents: Vec<Document>,
    /// Total time the lane spent dispatching.
    pub latency_ms: u64,
    /// Provider whose answer was used, if any.
    pub provider_used: Option<String>,
    /// Kind of the provider whose answer was used, if any.
    pub source_kind: Option<ProviderKind>,
    /// `true` if the answering provider was not the head of the chain.
    pub fallback_used: bool,
    /// Terminal status.
    pub status: LaneStatus,
    /// Every provider call made, in order.
    pub attempts: Vec<ProviderAttempt>,
}

impl LaneResult {
    /// A lane that produced nothing before its time ran out.
    pub fn timed_out(lane: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            lane: lane.into(),
            documents: Vec::new(),
            latency_ms,
            provider_used: None,
            source_kind: None,
            fallback_used: false,
            status: LaneStatus::TimedOut,
            attempts: Vec::new(),
        }
    }
}

/// A deduplicated, ranked document with provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedDocument {
    /// Main text content.
    pub content: String,
    /// Title or headline.
    pub title: String,
    /// Source URL, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Provider of the winning (highest-confidence) entry.
    pub source_provider: String,
    /// Kind of the winning entry's provider.
    pub source_kind: ProviderKind,
    /// Final aggregated score (higher is better).
    pub relevance_score: f64,
    /// Every lane that returned this document.
    pub lanes: Vec<String>,
    /// Every provider that returned this document.
    pub providers: Vec<String>,
    /// `true` if the winning entry came from a fallback provider.
    pub fallback_used: bool,
}

/// Per-lane summary carried in the aggregated response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneMetric {
    /// Terminal lane status.
    pub status: LaneStatus,
    /// Time the lane spent dispatching.
    pub latency_ms: u64,
    /// Whether a fallback provider answered.
    pub fallback_used: bool,
    /// Provider whose answer was used, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_used: Option<String>,
    /// Number of documents the lane contributed before dedup.
    pub document_count: usize,
}

impl From<&LaneResult> for LaneMetric {
    fn from(result: &LaneResult) -> Self {
        Self {
            status: result.status,
            latency_ms: result.latency_ms,
            fallback_used: result.fallback_used,
            provider_used: result.provider_used.clone(),
            document_count: result.documents.len(),
        }
    }
}

/// The merged answer handed to the synthesis collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResponse {
    /// Deduplicated, re-ranked documents.
    pub documents: Vec<RankedDocument>,
    /// Per-lane metrics keyed by lane name.
    pub lane_metrics: BTreeMap<String, LaneMetric>,
    /// Request trace id.
    pub trace_id: String,
    /// `true` if any expected lane did not reach `ok`.
    pub degraded: bool,
}
