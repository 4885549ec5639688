//! Re-ranking of lane documents.
//!
//! ```text
//! score  = (relevance_weight * relevance + priority_weight * lane_priority)
//!          / (1.0 + position * position_decay)
//! final  = score * (1.0 + cross_lane_boost * (lanes - 1))
//! ```
//!
//! `position` is the document's index within its own lane's answer.

use crate::config::RankingConfig;
use crate::types::{Document, LaneResult};

/// A lane document with its pre-dedup score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    /// The document as returned by the lane.
    pub document: Document,
    /// Score before the cross-lane boost.
    pub score: f64,
    /// Whether the lane's answer came from a fallback provider.
    pub fallback_used: bool,
}

/// Score of one document at `position` in a lane with `lane_priority`.
///
/// Non-finite relevance counts as zero; relevance is clamped to `[0, 1]`.
pub fn calculate_score(
    relevance: f64,
    lane_priority: f64,
    position: usize,
    ranking: &RankingConfig,
) -> f64 {
    let relevance = if relevance.is_finite() {
        relevance.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let base = ranking.relevance_weight * relevance + ranking.priority_weight * lane_priority;
    base / (1.0 + position as f64 * ranking.position_decay)
}

/// Score every document of one lane result, in lane order.
pub fn score_lane(
    result: &LaneResult,
    lane_priority: f64,
    ranking: &RankingConfig,
) -> Vec<ScoredDocument> {
    result
        .documents
        .iter()
        .enumerate()
        .map(|(position, document)| ScoredDocument {
            score: calculate_score(document.relevance, lane_priority, position, ranking),
            document: document.clone(),
            fallback_used: result.fallback_used,
        })
        .collect()
}

/// Boost a score for a document returned by `lane_count` lanes.
pub fn cross_lane_boost(score: f64, lane_count: usize, ranking: &RankingConfig) -> f64 {
    let extra = lane_count.saturating_sub(1) as f64;
    score * (1.0 + ranking.cross_lane_boost * extra)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LaneStatus, ProviderKind};

    fn ranking() -> RankingConfig {
        RankingConfig::default()
    }

    fn doc(relevance: f64) -> Document {
        Document {
            id: None,
            title: "t".into(),
            content: "c".into(),
            url: None,
            relevance,
            source_provider: "brave".into(),
            source_kind: ProviderKind::Keyed,
            lane: "web_search".into(),
        }
    }

    #[test]
    fn top_position_uses_weighted_sum() {
        let score = calculate_score(0.8, 1.0, 0, &ranking());
        assert!((score - (0.8 + 0.5)).abs() < 1e-12);
    }

    #[test]
    fn position_decays_score() {
        let scores: Vec<f64> = (0..10).map(|p| calculate_score(1.0, 1.0, p, &ranking())).collect();
        for pair in scores.windows(2) {
            assert!(pair[1] < pair[0]);
        }
        assert!((scores[9] - 1.5 / 1.9).abs() < 1e-12);
    }

    #[test]
    fn lane_priority_breaks_relevance_ties() {
        let high = calculate_score(0.7, 1.0, 0, &ranking());
        let low = calculate_score(0.7, 0.6, 0, &ranking());
        assert!(high > low);
    }

    #[test]
    fn relevance_is_clamped_and_nan_ignored() {
        let r = ranking();
        assert_eq!(calculate_score(5.0, 0.0, 0, &r), calculate_score(1.0, 0.0, 0, &r));
        assert_eq!(calculate_score(f64::NAN, 1.0, 0, &r), calculate_score(0.0, 1.0, 0, &r));
    }

    #[test]
    fn boost_scales_with_extra_lanes() {
        let r = ranking();
        assert!((cross_lane_boost(1.0, 1, &r) - 1.0).abs() < 1e-12);
        assert!((cross_lane_boost(1.0, 3, &r) - 1.4).abs() < 1e-12);
        assert!((cross_lane_boost(1.0, 0, &r) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn score_lane_keeps_order_and_fallback_flag() {
        let result = LaneResult {
            lane: "web_search".into(),
            documents: vec![doc(0.9), doc(0.9)],
            latency_ms: 10,
            provider_used: Some("duckduckgo".into()),
            source_kind: Some(ProviderKind::Keyless),
            fallback_used: true,
            status: LaneStatus::Ok,
            attempts: vec![],
        };
        let scored = score_lane(&result, 1.0, &ranking());
        assert_eq!(scored.len(), 2);
        assert!(scored[0].score > scored[1].score);
        assert!(scored.iter().all(|s| s.fallback_used));
    }
}
