//! # Heuristics
//!
//! A heuristic maps a temporal state to a cost estimate, or to
//! [`DEAD_END`](crate::primitives::DEAD_END) when it proves the goal
//! unreachable, and may flag preferred operators on several channels.
//!
//! Implementations only provide [`Heuristic::compute_heuristic`]; the shared
//! bookkeeping (clearing preferred operators, counting computations,
//! remembering the last value) lives in [`HeuristicCore`] and the provided
//! trait methods.

mod cyclic_cg;
mod local_problem;
mod no_heuristic;

pub use cyclic_cg::{CyclicCgHeuristic, CyclicCgMode};
pub use no_heuristic::NoHeuristic;

use crate::primitives::DEAD_END;
use crate::state::TimeStampedState;
use crate::task::Task;
use crate::types::{OpenListMode, OperatorId};

// =============================================================================
// PREFERRED OPERATORS
// =============================================================================

/// Preferred operators, one list per [`OpenListMode`] channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreferredOperators {
    channels: [Vec<OperatorId>; OpenListMode::CHANNELS],
}

impl PreferredOperators {
    /// Flag `op` on the channel of `mode`; duplicates are ignored.
    pub fn insert(&mut self, op: OperatorId, mode: OpenListMode) {
        let Some(channel) = mode.channel() else {
            return;
        };
        let ops = &mut self.channels[channel];
        if !ops.contains(&op) {
            ops.push(op);
        }
    }

    /// Operators flagged on the channel of `mode`.
    #[must_use]
    pub fn get(&self, mode: OpenListMode) -> &[OperatorId] {
        mode.channel().map_or(&[], |channel| &self.channels[channel])
    }

    pub fn clear(&mut self) {
        for ops in &mut self.channels {
            ops.clear();
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.iter().all(Vec::is_empty)
    }
}

// =============================================================================
// SHARED STATE
// =============================================================================

/// Bookkeeping every heuristic carries.
#[derive(Debug, Clone, Default)]
pub struct HeuristicCore {
    pub preferred: PreferredOperators,
    value: Option<f64>,
    /// Longest wait for a running operator seen during the last computation.
    pub waiting_time: f64,
    computations: u64,
    pub cache_hits: u64,
}

// =============================================================================
// HEURISTIC TRAIT
// =============================================================================

/// Uniform evaluate / dead-end / preferred-operator contract.
pub trait Heuristic {
    /// Short name for statistics.
    fn name(&self) -> &'static str;

    fn core(&self) -> &HeuristicCore;

    fn core_mut(&mut self) -> &mut HeuristicCore;

    /// Estimate for `state`, or `DEAD_END`. May flag preferred operators
    /// through [`HeuristicCore::preferred`].
    fn compute_heuristic(&mut self, task: &Task, state: &TimeStampedState) -> f64;

    /// Whether a `DEAD_END` verdict is exact.
    fn dead_ends_are_reliable(&self) -> bool {
        true
    }

    /// Evaluate `state` and remember the result.
    fn evaluate(&mut self, task: &Task, state: &TimeStampedState) -> f64 {
        self.core_mut().preferred.clear();
        let h = self.compute_heuristic(task, state);
        let core = self.core_mut();
        core.computations += 1;
        core.value = Some(h);
        if h == DEAD_END {
            core.preferred.clear();
        }
        h
    }

    /// Last evaluation said dead end.
    fn is_dead_end(&self) -> bool {
        self.core().value == Some(DEAD_END)
    }

    /// Last evaluated value; 0 before the first evaluation.
    fn value(&self) -> f64 {
        let value = self.core().value.unwrap_or(0.0);
        debug_assert!(value != DEAD_END, "value of a dead end requested");
        value
    }

    /// Preferred operators of the last evaluation on the channel of `mode`.
    fn preferred_operators(&self, mode: OpenListMode) -> &[OperatorId] {
        self.core().preferred.get(mode)
    }

    fn num_computations(&self) -> u64 {
        self.core().computations
    }

    fn num_cache_hits(&self) -> u64 {
        self.core().cache_hits
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels_deduplicate() {
        let mut pref = PreferredOperators::default();
        pref.insert(OperatorId(3), OpenListMode::Regular);
        pref.insert(OperatorId(3), OpenListMode::Regular);
        pref.insert(OperatorId(1), OpenListMode::Cheapest);
        assert_eq!(pref.get(OpenListMode::Regular), &[OperatorId(3)]);
        assert_eq!(pref.get(OpenListMode::Cheapest), &[OperatorId(1)]);
        assert!(pref.get(OpenListMode::Ordered).is_empty());
        pref.clear();
        assert!(pref.is_empty());
    }

    #[test]
    fn all_mode_has_no_channel() {
        let mut pref = PreferredOperators::default();
        pref.insert(OperatorId(0), OpenListMode::All);
        assert!(pref.is_empty());
        assert!(pref.get(OpenListMode::All).is_empty());
    }
}
