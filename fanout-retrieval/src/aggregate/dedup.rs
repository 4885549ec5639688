//! Cross-lane deduplication.
//!
//! Documents are identified by normalised URL when they carry one, else by
//! their stable provider id, else by a hash of their whitespace-collapsed,
//! lowercased content. Within each
//! identity the highest-scored entry wins and every contributing lane and
//! provider is recorded.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::types::Document;

use super::scoring::ScoredDocument;
use super::url_normalize::normalize_url;

/// One document identity after merging.
#[derive(Debug, Clone)]
pub struct DeduplicatedDocument {
    /// Stable identity key, used as the final tie-breaker.
    pub key: String,
    /// The highest-scored entry for this identity.
    pub best: ScoredDocument,
    /// Every lane that returned this identity, first-seen order.
    pub lanes: Vec<String>,
    /// Every provider that returned this identity, first-seen order.
    pub providers: Vec<String>,
}

/// Identity key of a document.
pub fn identity_key(document: &Document) -> String {
    if let Some(url) = document.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        return format!("url:{}", normalize_url(url));
    }
    match document.id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => format!("id:{id}"),
        _ => {
            let collapsed = document
                .content
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase();
            let mut hasher = DefaultHasher::new();
            collapsed.hash(&mut hasher);
            format!("content:{:016x}", hasher.finish())
        }
    }
}

/// Merge documents that share an identity.
///
/// Output is in first-seen order of each identity. On equal scores the
/// earlier entry is kept.
pub fn deduplicate(documents: Vec<ScoredDocument>) -> Vec<DeduplicatedDocument> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<DeduplicatedDocument> = Vec::new();

    for scored in documents {
        let key = identity_key(&scored.document);
        match index.get(&key) {
            Some(&slot) => {
                let entry = &mut merged[slot];
                push_unique(&mut entry.lanes, &scored.document.lane);
                push_unique(&mut entry.providers, &scored.document.source_provider);
                if scored.score > entry.best.score {
                    entry.best = scored;
                }
            }
            None => {
                index.insert(key.clone(), merged.len());
                merged.push(DeduplicatedDocument {
                    key,
                    lanes: vec![scored.document.lane.clone()],
                    providers: vec![scored.document.source_provider.clone()],
                    best: scored,
                });
            }
        }
    }
    merged
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProviderKind;

    fn scored(url: Option<&str>, content: &str, lane: &str, provider: &str, score: f64) -> ScoredDocument {
        ScoredDocument {
            document: Document {
                id: None,
                title: format!("{provider} title"),
                content: content.into(),
                url: url.map(str::to_owned),
                relevance: 0.5,
                source_provider: provider.into(),
                source_kind: ProviderKind::Keyed,
                lane: lane.into(),
            },
            score,
            fallback_used: false,
        }
    }

    #[test]
    fn unique_documents_pass_through_in_order() {
        let out = deduplicate(vec![
            scored(Some("https://a.com"), "a", "web_search", "brave", 1.0),
            scored(Some("https://b.com"), "b", "news", "newsapi", 0.8),
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].best.document.content, "a");
    }

    #[test]
    fn cross_lane_duplicates_merge_with_provenance() {
        let out = deduplicate(vec![
            scored(Some("https://www.example.com/p/"), "x", "web_search", "brave", 0.9),
            scored(Some("https://example.com/p"), "x", "news", "hacker_news", 1.3),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].best.document.source_provider, "hacker_news");
        assert_eq!(out[0].lanes, vec!["web_search", "news"]);
        assert_eq!(out[0].providers, vec!["brave", "hacker_news"]);
    }

    #[test]
    fn shared_id_merges_urlless_documents_across_lanes() {
        let mut vector = scored(None, "Ownership moves values.", "vector", "qdrant", 0.7);
        vector.document.id = Some("doc-7".into());
        let mut kg = scored(None, "Rust ownership rules", "knowledge_graph", "wikipedia", 0.9);
        kg.document.id = Some("doc-7".into());
        let other = scored(None, "Ownership moves values.", "news", "newsapi", 0.5);

        let out = deduplicate(vec![vector, kg, other]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].key, "id:doc-7");
        assert_eq!(out[0].lanes, vec!["vector", "knowledge_graph"]);
        assert_eq!(out[0].best.document.source_provider, "wikipedia");
        assert!(out[1].key.starts_with("content:"));
    }

    #[test]
    fn url_takes_precedence_over_id() {
        let mut doc = scored(Some("https://a.com/x"), "a", "web_search", "brave", 1.0);
        doc.document.id = Some("doc-7".into());
        assert_eq!(identity_key(&doc.document), "url:https://a.com/x");
    }

    #[test]
    fn equal_scores_keep_first_entry() {
        let out = deduplicate(vec![
            scored(Some("https://a.com"), "a", "web_search", "brave", 1.0),
            scored(Some("https://a.com"), "a", "news", "newsapi", 1.0),
        ]);
        assert_eq!(out[0].best.document.source_provider, "brave");
    }

    #[test]
    fn urlless_documents_merge_on_content() {
        let out = deduplicate(vec![
            scored(None, "Rust  ownership\nrules", "vector", "vector_store", 0.7),
            scored(None, "rust ownership rules", "knowledge_graph", "wikipedia", 0.6),
            scored(None, "borrow checker", "vector", "vector_store", 0.5),
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].lanes.len(), 2);
    }

    #[test]
    fn blank_url_falls_back_to_content() {
        let doc = scored(Some("  "), "text", "vector", "v", 1.0).document;
        assert!(identity_key(&doc).starts_with("content:"));
    }

    #[test]
    fn same_provider_listed_once() {
        let out = deduplicate(vec![
            scored(Some("https://a.com"), "a", "web_search", "brave", 1.0),
            scored(Some("https://a.com/"), "a", "web_search", "brave", 0.5),
        ]);
        assert_eq!(out[0].providers, vec!["brave"]);
        assert_eq!(out[0].lanes, vec!["web_search"]);
    }
}
