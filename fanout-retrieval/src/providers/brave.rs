//! Brave Search API provider: keyed web search over an independent index.
//!
//! Calls the JSON web-search endpoint with an `X-Subscription-Token`
//! header. Brave does not report per-result scores, so relevance is derived
//! from result position.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::RetrievalError;
use crate::provider::{Provider, ProviderRequest, ProviderSpec};
use crate::types::Document;

use super::http;
use super::positional_relevance;

/// Brave Search API client.
pub struct BraveApiProvider {
    spec: ProviderSpec,
    client: reqwest::Client,
    base_url: String,
    api_key_env: String,
}

impl BraveApiProvider {
    /// Build a Brave provider for `spec`.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Config`] if the HTTP client cannot be built.
    pub fn new(
        spec: ProviderSpec,
        base_url: &str,
        api_key_env: &str,
        user_agent: Option<&str>,
    ) -> Result<Self, RetrievalError> {
        Ok(Self {
            spec,
            client: http::build_client(user_agent)?,
            base_url: base_url.to_owned(),
            api_key_env: api_key_env.to_owned(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Debug, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    title: String,
    url: String,
    #[serde(default)]
    description: String,
}

#[async_trait]
impl Provider for BraveApiProvider {
    fn spec(&self) -> &ProviderSpec {
        &self.spec
    }

    async fn fetch(&self, request: &ProviderRequest) -> Result<Vec<Document>, RetrievalError> {
        let token = http::resolve_api_key(&self.api_key_env)?;
        tracing::trace!(query = %request.text, "Brave search");

        let count = request.max_results.to_string();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("q", request.text.as_str()), ("count", count.as_str())])
            .header("Accept", "application/json")
            .header("X-Subscription-Token", token)
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| http::classify("brave", e))?
            .error_for_status()
            .map_err(|e| RetrievalError::Http(format!("brave HTTP error: {e}")))?;

        let body: BraveResponse = response
            .json()
            .await
            .map_err(|e| http::classify("brave", e))?;

        Ok(to_documents(&self.spec, body, request.max_results))
    }
}

fn to_documents(spec: &ProviderSpec, body: BraveResponse, max_results: usize) -> Vec<Document> {
    let results = body.web.map(|w| w.results).unwrap_or_default();
    let documents: Vec<Document> = results
        .into_iter()
        .filter(|r| !r.title.trim().is_empty() && !r.url.is_empty())
        .take(max_results)
        .enumerate()
        .map(|(position, r)| Document {
            id: None,
            content: if r.description.trim().is_empty() {
                r.title.clone()
            } else {
                r.description.trim().to_owned()
            },
            title: r.title.trim().to_owned(),
            url: Some(r.url),
            relevance: positional_relevance(position),
            source_provider: spec.id.clone(),
            source_kind: spec.kind,
            lane: spec.lane.clone(),
        })
        .collect();
    tracing::debug!(count = documents.len(), "Brave results parsed");
    documents
}
