//! Generic JSON-over-HTTP provider.
//!
//! Serves the vector, knowledge-graph, news and market lanes: each backend
//! differs only in URL, credential placement and field names, all of which
//! come from a [`JsonApiEndpoint`] descriptor.

use async_trait::async_trait;
use serde_json::Value;

use crate::config::{ApiKeyPlacement, JsonApiEndpoint};
use crate::error::RetrievalError;
use crate::provider::{Provider, ProviderRequest, ProviderSpec};
use crate::types::Document;

use super::http;
use super::positional_relevance;

/// A provider driven entirely by a [`JsonApiEndpoint`] field mapping.
pub struct JsonApiProvider {
    spec: ProviderSpec,
    client: reqwest::Client,
    endpoint: JsonApiEndpoint,
}

impl JsonApiProvider {
    /// Build a JSON provider for `spec`.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Config`] if the HTTP client cannot be built
    /// or the results pointer is malformed.
    pub fn new(
        spec: ProviderSpec,
        endpoint: JsonApiEndpoint,
        user_agent: Option<&str>,
    ) -> Result<Self, RetrievalError> {
        if !endpoint.results_pointer.is_empty() && !endpoint.results_pointer.starts_with('/') {
            return Err(RetrievalError::Config(format!(
                "provider {}: results_pointer must be empty or start with '/'",
                spec.key()
            )));
        }
        Ok(Self {
            spec,
            client: http::build_client(user_agent)?,
            endpoint,
        })
    }
}

#[async_trait]
impl Provider for JsonApiProvider {
    fn spec(&self) -> &ProviderSpec {
        &self.spec
    }

    async fn fetch(&self, request: &ProviderRequest) -> Result<Vec<Document>, RetrievalError> {
        let endpoint = &self.endpoint;
        tracing::trace!(provider = %self.spec.key(), query = %request.text, "JSON API search");

        let mut params: Vec<(String, String)> = endpoint
            .extra_params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        params.push((endpoint.query_param.clone(), request.text.clone()));
        if let Some(limit) = &endpoint.limit_param {
            params.push((limit.clone(), request.max_results.to_string()));
        }

        let mut builder = self.client.get(&endpoint.url);
        if let Some(env_name) = &endpoint.api_key_env {
            let key = http::resolve_api_key(env_name)?;
            builder = match &endpoint.api_key_placement {
                ApiKeyPlacement::Bearer => builder.bearer_auth(key),
                ApiKeyPlacement::Header(name) => builder.header(name.as_str(), key),
                ApiKeyPlacement::Query(name) => {
                    params.push((name.clone(), key));
                    builder
                }
            };
        }

        let provider = self.spec.id.as_str();
        let response = builder
            .query(&params)
            .header("Accept", "application/json")
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| http::classify(provider, e))?
            .error_for_status()
            .map_err(|e| RetrievalError::Http(format!("{provider} HTTP error: {e}")))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| http::classify(provider, e))?;

        parse_json_results(&self.spec, endpoint, &body, request.max_results)
    }
}

/// Map a JSON response body to documents using the endpoint field mapping.
///
/// Items lacking both content and title are skipped. Content falls back to
/// the title when the content field is missing or blank.
pub(crate) fn parse_json_results(
    spec: &ProviderSpec,
    endpoint: &JsonApiEndpoint,
    body: &Value,
    max_results: usize,
) -> Result<Vec<Document>, RetrievalError> {
    let items = body
        .pointer(&endpoint.results_pointer)
        .and_then(Value::as_array)
        .ok_or_else(|| {
            RetrievalError::Parse(format!(
                "{}: no array at {}",
                spec.id, endpoint.results_pointer
            ))
        })?;

    let mut documents = Vec::new();
    for item in items {
        let title = field_text(item, &endpoint.title_field).unwrap_or_default();
        let content = field_text(item, &endpoint.content_field)
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| title.clone());
        if content.is_empty() {
            continue;
        }

        let position = documents.len();
        let relevance = endpoint
            .score_field
            .as_deref()
            .and_then(|f| field_number(item, f))
            .map(|s| s.clamp(0.0, 1.0))
            .unwrap_or_else(|| positional_relevance(position));

        documents.push(Document {
            id: endpoint
                .id_field
                .as_deref()
                .and_then(|f| field_text(item, f)),
            title,
            content,
            url: endpoint
                .url_field
                .as_deref()
                .and_then(|f| field_text(item, f))
                .filter(|u| !u.is_empty()),
            relevance,
            source_provider: spec.id.clone(),
            source_kind: spec.kind,
            lane: spec.lane.clone(),
        });

        if documents.len() >= max_results {
            break;
        }
    }

    tracing::debug!(provider = %spec.key(), count = documents.len(), "JSON results parsed");
    Ok(documents)
}

fn field_text(item: &Value, field: &str) -> Option<String> {
    match item.get(field)? {
        Value::String(s) => Some(s.trim().to_owned()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn field_number(item: &Value, field: &str) -> Option<f64> {
    match item.get(field)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
