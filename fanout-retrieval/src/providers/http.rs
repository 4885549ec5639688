//! Shared HTTP plumbing for providers and readiness probes.
//!
//! Provides a configured [`reqwest::Client`] with rotating browser-like
//! User-Agent strings for keyless scraping, and credential lookup for keyed
//! providers. Timeouts are set per request, never on the client, because
//! each call gets its own effective budget.

use rand::seq::SliceRandom;

use crate::error::RetrievalError;

/// Realistic browser User-Agent strings, one picked per client.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:133.0) Gecko/20100101 Firefox/133.0",
];

/// Build a [`reqwest::Client`] for provider calls.
///
/// # Errors
///
/// Returns [`RetrievalError::Config`] if the client cannot be constructed.
pub fn build_client(user_agent: Option<&str>) -> Result<reqwest::Client, RetrievalError> {
    let ua = match user_agent {
        Some(custom) => custom.to_owned(),
        None => random_user_agent().to_owned(),
    };

    reqwest::Client::builder()
        .user_agent(ua)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| RetrievalError::Config(format!("failed to build HTTP client: {e}")))
}

/// Select a random User-Agent string from the rotation list.
pub fn random_user_agent() -> &'static str {
    let mut rng = rand::thread_rng();
    USER_AGENTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Read a provider credential from the environment.
///
/// The variable name may appear in errors; the value never does.
///
/// # Errors
///
/// Returns [`RetrievalError::Config`] if the variable is unset or blank.
pub fn resolve_api_key(env_name: &str) -> Result<String, RetrievalError> {
    match std::env::var(env_name) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_owned()),
        _ => Err(RetrievalError::Config(format!(
            "credential {env_name} is not set"
        ))),
    }
}

/// Map a transport error to the retrieval taxonomy.
pub(crate) fn classify(provider: &str, err: reqwest::Error) -> RetrievalError {
    if err.is_timeout() {
        RetrievalError::ProviderTimeout(format!("{provider}: {err}"))
    } else if err.is_decode() {
        RetrievalError::Parse(format!("{provider}: {err}"))
    } else {
        RetrievalError::Http(format!("{provider}: {err}"))
    }
}
