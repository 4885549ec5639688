//! Deadline allocation: split a global deadline into per-lane budgets.
//!
//! Shares are static-weighted and re-normalised over the lanes active for
//! the query, so disabling a lane hands its share to the others. Lanes
//! whose weighted share would fall below their minimum viable budget are
//! raised to it; a lane with no minimum counts its weighted share as one.
//! If the deadline cannot cover every minimum, all lanes shrink
//! proportionally to their minimums instead of any one starving.
//!
//! The sum of lane budgets never exceeds the global deadline (shares are
//! rounded down).

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use crate::provider::LaneSpec;

/// Budgets for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    /// The global deadline the budgets were carved from.
    pub global: Duration,
    /// Budget per active lane.
    pub lane_budgets: BTreeMap<String, Duration>,
    /// Cap on any single provider call, independent of lane budgets.
    pub provider_timeout_ceiling: Duration,
}

impl Allocation {
    /// Budget for `lane`; zero if the lane is not part of this allocation.
    pub fn budget(&self, lane: &str) -> Duration {
        self.lane_budgets
            .get(lane)
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    /// Sum of every lane budget.
    pub fn total(&self) -> Duration {
        self.lane_budgets.values().sum()
    }
}

/// Splits global deadlines into lane budgets.
#[derive(Debug, Clone, Copy)]
pub struct DeadlineAllocator {
    provider_timeout_ceiling: Duration,
}

impl DeadlineAllocator {
    /// Create an allocator with a fixed per-provider timeout ceiling.
    pub fn new(provider_timeout_ceiling: Duration) -> Self {
        Self {
            provider_timeout_ceiling,
        }
    }

    /// Allocate `global` across `lanes`.
    pub fn allocate(&self, global: Duration, lanes: &[&LaneSpec]) -> Allocation {
        let budgets = split_budget(global.as_millis(), lanes);
        let lane_budgets = lanes
            .iter()
            .zip(budgets)
            .map(|(lane, ms)| (lane.name.clone(), Duration::from_millis(ms as u64)))
            .collect();

        let allocation = Allocation {
            global,
            lane_budgets,
            provider_timeout_ceiling: self.provider_timeout_ceiling,
        };
        tracing::debug!(
            global_ms = global.as_millis() as u64,
            allocated_ms = allocation.total().as_millis() as u64,
            lanes = allocation.lane_budgets.len(),
            "deadline allocated"
        );
        allocation
    }
}

/// Per-lane budgets in milliseconds, in the order of `lanes`.
fn split_budget(global_ms: u128, lanes: &[&LaneSpec]) -> Vec<u128> {
    let mut budgets = vec![0u128; lanes.len()];
    if lanes.is_empty() || global_ms == 0 {
        return budgets;
    }

    // A lane without a minimum claims its weighted share of the deadline,
    // so it shrinks alongside the others instead of dropping to zero.
    let weight_sum: u128 = lanes.iter().map(|l| u128::from(l.weight_ms)).sum();
    let mins: Vec<u128> = lanes
        .iter()
        .map(|lane| match lane.min_budget_ms {
            0 if weight_sum > 0 => global_ms * u128::from(lane.weight_ms) / weight_sum,
            min => u128::from(min),
        })
        .collect();

    let min_sum: u128 = mins.iter().sum();
    if global_ms < min_sum {
        for (budget, min) in budgets.iter_mut().zip(&mins) {
            *budget = global_ms * min / min_sum;
        }
        return budgets;
    }

    // Water-fill: pin lanes whose share falls below their minimum, then
    // re-split what is left among the rest by weight.
    let mut pinned: HashSet<usize> = HashSet::new();
    loop {
        let pinned_total: u128 = pinned.iter().map(|&i| mins[i]).sum();
        let remaining = global_ms - pinned_total;
        let free: Vec<usize> = (0..lanes.len()).filter(|i| !pinned.contains(i)).collect();
        let free_weight: u128 = free.iter().map(|&i| u128::from(lanes[i].weight_ms)).sum();

        let mut newly_pinned = false;
        for &i in &free {
            let share = if free_weight == 0 {
                0
            } else {
                remaining * u128::from(lanes[i].weight_ms) / free_weight
            };
            if share < mins[i] {
                pinned.insert(i);
                newly_pinned = true;
            } else {
                budgets[i] = share;
            }
        }

        if !newly_pinned || free.is_empty() {
            break;
        }
    }
    for &i in &pinned {
        budgets[i] = mins[i];
    }
    budgets
}
