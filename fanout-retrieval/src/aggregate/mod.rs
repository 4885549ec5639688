//! Result aggregation: merge lane results into one ranked response.
//!
//! Documents from every lane that answered are scored, deduplicated across
//! lanes with full provenance, boosted when several lanes agree, sorted and
//! truncated. Lanes that did not answer contribute only metrics and mark
//! the response as degraded.

pub mod dedup;
pub mod scoring;
pub mod url_normalize;

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::config::RankingConfig;
use crate::types::{AggregatedResponse, LaneMetric, LaneResult, LaneStatus, RankedDocument};

use self::dedup::deduplicate;
use self::scoring::{cross_lane_boost, score_lane};

/// Merges lane results into an [`AggregatedResponse`].
#[derive(Debug, Clone)]
pub struct Aggregator {
    ranking: RankingConfig,
    max_documents: usize,
}

impl Aggregator {
    /// Create an aggregator that keeps at most `max_documents`.
    pub fn new(ranking: RankingConfig, max_documents: usize) -> Self {
        Self {
            ranking,
            max_documents,
        }
    }

    /// Aggregate `results`.
    ///
    /// `expected` maps every lane that should have answered to its ranking
    /// priority. The response is degraded if any of them is missing from
    /// `results` or did not finish `ok`. The output is independent of the
    /// order of `results`.
    pub fn aggregate(
        &self,
        results: Vec<LaneResult>,
        expected: &BTreeMap<String, f64>,
        trace_id: impl Into<String>,
    ) -> AggregatedResponse {
        let by_lane: BTreeMap<String, LaneResult> = results
            .into_iter()
            .map(|r| (r.lane.clone(), r))
            .collect();

        let scored = by_lane
            .values()
            .filter(|r| r.status == LaneStatus::Ok)
            .flat_map(|r| {
                let priority = expected.get(&r.lane).copied().unwrap_or(1.0);
                score_lane(r, priority, &self.ranking)
            })
            .collect();

        let mut ranked: Vec<(String, RankedDocument)> = deduplicate(scored)
            .into_iter()
            .map(|merged| {
                let score = cross_lane_boost(merged.best.score, merged.lanes.len(), &self.ranking);
                let document = merged.best.document;
                (
                    merged.key,
                    RankedDocument {
                        content: document.content,
                        title: document.title,
                        url: document.url,
                        source_provider: document.source_provider,
                        source_kind: document.source_kind,
                        relevance_score: score,
                        lanes: merged.lanes,
                        providers: merged.providers,
                        fallback_used: merged.best.fallback_used,
                    },
                )
            })
            .collect();

        ranked.sort_by(|(ka, a), (kb, b)| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| ka.cmp(kb))
        });
        ranked.truncate(self.max_documents);

        let degraded = expected.keys().any(|lane| {
            by_lane
                .get(lane)
                .is_none_or(|r| r.status != LaneStatus::Ok)
        });
        let lane_metrics = by_lane
            .iter()
            .map(|(lane, r)| (lane.clone(), LaneMetric::from(r)))
            .collect();

        AggregatedResponse {
            documents: ranked.into_iter().map(|(_, doc)| doc).collect(),
            lane_metrics,
            trace_id: trace_id.into(),
            degraded,
        }
    }
}
