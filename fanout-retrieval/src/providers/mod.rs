//! Concrete provider implementations.
//!
//! Each module provides a struct implementing [`crate::provider::Provider`].
//! [`build_provider`] selects the implementation from a spec's
//! [`EndpointDescriptor`].

pub mod brave;
pub mod duckduckgo;
pub mod http;
pub mod json_api;

use std::sync::Arc;

pub use brave::BraveApiProvider;
pub use duckduckgo::DuckDuckGoProvider;
pub use json_api::JsonApiProvider;

use crate::config::EndpointDescriptor;
use crate::error::RetrievalError;
use crate::provider::{Provider, ProviderSpec};

/// Relevance for providers that report only an ordering.
///
/// `1.0 / (1.0 + position * 0.1)`: 1.0 at the top, about 0.5 at position 9.
pub fn positional_relevance(position: usize) -> f64 {
    1.0 / (1.0 + position as f64 * 0.1)
}

/// Instantiate the provider described by `spec.endpoint`.
///
/// # Errors
///
/// Returns [`RetrievalError::Config`] if the provider cannot be constructed.
pub fn build_provider(
    spec: &ProviderSpec,
    user_agent: Option<&str>,
) -> Result<Arc<dyn Provider>, RetrievalError> {
    let provider: Arc<dyn Provider> = match &spec.endpoint {
        EndpointDescriptor::BraveApi {
            base_url,
            api_key_env,
        } => Arc::new(BraveApiProvider::new(
            spec.clone(),
            base_url,
            api_key_env,
            user_agent,
        )?),
        EndpointDescriptor::DuckDuckGoHtml { base_url } => Arc::new(DuckDuckGoProvider::new(
            spec.clone(),
            base_url,
            user_agent,
        )?),
        EndpointDescriptor::JsonApi(endpoint) => Arc::new(JsonApiProvider::new(
            spec.clone(),
            endpoint.clone(),
            user_agent,
        )?),
    };
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrievalConfig;

    #[test]
    fn positional_relevance_decays() {
        assert!((positional_relevance(0) - 1.0).abs() < f64::EPSILON);
        assert!(positional_relevance(1) < positional_relevance(0));
        let nine = positional_relevance(9);
        assert!(nine > 0.52 && nine < 0.53);
    }

    #[test]
    fn builds_every_default_provider() {
        let config = RetrievalConfig::default();
        for lane in &config.lanes {
            for spec in lane.to_spec().providers {
                let provider = build_provider(&spec, None).expect("build provider");
                assert_eq!(provider.spec().key(), spec.key());
            }
        }
    }
}
