//! In-memory TTL cache of aggregated responses.
//!
//! Keyed by `(normalised query text, mode, global deadline)`. Only
//! non-degraded responses are stored so a recovering lane is re-queried on
//! the next request. Each orchestrator owns its own cache.

use std::time::Duration;

use moka::future::Cache;

use crate::types::{AggregatedResponse, Mode};

/// Maximum number of cached responses.
const MAX_CACHE_ENTRIES: u64 = 256;

/// Composite cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    text: String,
    mode: Mode,
    deadline_ms: u64,
}

impl CacheKey {
    /// Build a key. Text is trimmed, lowercased and whitespace-collapsed.
    pub fn new(text: &str, mode: Mode, deadline: Duration) -> Self {
        Self {
            text: text
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase(),
            mode,
            deadline_ms: deadline.as_millis() as u64,
        }
    }
}

/// Response cache backed by [`moka`].
#[derive(Clone)]
pub struct ResponseCache {
    inner: Cache<CacheKey, AggregatedResponse>,
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("entries", &self.inner.entry_count())
            .finish()
    }
}

impl ResponseCache {
    /// Create a cache with `ttl`. Returns `None` when `ttl` is zero.
    pub fn new(ttl: Duration) -> Option<Self> {
        if ttl.is_zero() {
            return None;
        }
        Some(Self {
            inner: Cache::builder()
                .max_capacity(MAX_CACHE_ENTRIES)
                .time_to_live(ttl)
                .build(),
        })
    }

    /// Cached response for `key`, if any.
    pub async fn get(&self, key: &CacheKey) -> Option<AggregatedResponse> {
        self.inner.get(key).await
    }

    /// Store `response` unless it is degraded. Returns whether it was stored.
    pub async fn insert(&self, key: CacheKey, response: &AggregatedResponse) -> bool {
        if response.degraded {
            return false;
        }
        self.inner.insert(key, response.clone()).await;
        true
    }
}
