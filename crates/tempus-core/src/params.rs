//! # Planner Parameters
//!
//! Every knob of the heuristics and the search engine in one serde-friendly
//! struct. Missing fields take their defaults, so a configuration file only
//! needs to name what it changes.

use crate::types::{OpenListMode, TempusError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the `g` part of an open-list priority is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GValues {
    /// Timestamp of the state, minus internal epsilon padding.
    #[default]
    Timestamp,
    /// Sum of the durations of the operators on the path.
    Cost,
    /// Timestamp plus the longest full duration of a running operator.
    Makespan,
    /// `w * makespan + (1 - w) * cost`.
    Weighted,
}

/// How the next open list is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueManagementMode {
    /// The non-empty list with the smallest priority counter.
    #[default]
    Priority,
    /// Cycle through the lists.
    RoundRobin,
}

impl FromStr for GValues {
    type Err = TempusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "timestamp" => Ok(Self::Timestamp),
            "cost" => Ok(Self::Cost),
            "makespan" => Ok(Self::Makespan),
            "weighted" => Ok(Self::Weighted),
            other => Err(TempusError::InvalidConfig(format!(
                "unknown g-values mode '{}' (expected timestamp, cost, makespan or weighted)",
                other
            ))),
        }
    }
}

impl FromStr for QueueManagementMode {
    type Err = TempusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "priority" => Ok(Self::Priority),
            "round-robin" => Ok(Self::RoundRobin),
            other => Err(TempusError::InvalidConfig(format!(
                "unknown queue mode '{}' (expected priority or round-robin)",
                other
            ))),
        }
    }
}

/// A preferred-operator mode restricted to the first `count` goals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoalLimitedMode {
    pub enabled: bool,
    pub count: usize,
}

impl Default for GoalLimitedMode {
    fn default() -> Self {
        Self {
            enabled: false,
            count: 1000,
        }
    }
}

impl GoalLimitedMode {
    /// Enabled with the given goal count.
    #[must_use]
    pub const fn with_count(count: usize) -> Self {
        Self {
            enabled: true,
            count,
        }
    }
}

/// Configuration of one planner run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerParameters {
    pub anytime_search: bool,
    /// Seconds to keep improving after the first plan (0 = no limit).
    pub timeout_if_plan_found: u64,
    /// Seconds to search for a first plan (0 = no limit).
    pub timeout_while_no_plan_found: u64,

    pub greedy: bool,
    pub lazy_evaluation: bool,
    pub verbose: bool,
    pub insert_let_time_pass_only_when_running_operators_not_empty: bool,

    pub cyclic_cg_heuristic: bool,
    pub cyclic_cg_preferred_operators: bool,
    pub makespan_heuristic: bool,
    pub makespan_heuristic_preferred_operators: bool,
    pub no_heuristic: bool,

    pub cg_heuristic_zero_cost_waiting_transitions: bool,
    pub cg_heuristic_fire_waiting_transitions_only_if_local_problems_matches_state: bool,
    pub use_caching_in_heuristic: bool,

    pub g_values: GValues,
    pub g_weight: f64,
    pub queue_management_mode: QueueManagementMode,

    pub use_known_by_logical_state_only: bool,
    pub use_subgoals_to_break_makespan_ties: bool,
    pub epsilonize_internally: bool,

    pub pref_ops_ordered_mode: GoalLimitedMode,
    pub pref_ops_cheapest_mode: GoalLimitedMode,
    pub pref_ops_most_expensive_mode: GoalLimitedMode,
    pub pref_ops_rand_mode: GoalLimitedMode,
    pub pref_ops_concurrent_mode: bool,

    pub reset_after_solution_was_found: bool,
    pub reward_only_pref_op_queue: bool,

    /// Plan file name; `-` writes to stdout.
    pub plan_name: String,
}

impl Default for PlannerParameters {
    fn default() -> Self {
        Self {
            anytime_search: false,
            timeout_if_plan_found: 0,
            timeout_while_no_plan_found: 0,
            greedy: false,
            lazy_evaluation: true,
            verbose: true,
            insert_let_time_pass_only_when_running_operators_not_empty: false,
            cyclic_cg_heuristic: false,
            cyclic_cg_preferred_operators: false,
            makespan_heuristic: false,
            makespan_heuristic_preferred_operators: false,
            no_heuristic: false,
            cg_heuristic_zero_cost_waiting_transitions: true,
            cg_heuristic_fire_waiting_transitions_only_if_local_problems_matches_state: false,
            use_caching_in_heuristic: true,
            g_values: GValues::Timestamp,
            g_weight: 0.5,
            queue_management_mode: QueueManagementMode::Priority,
            use_known_by_logical_state_only: false,
            use_subgoals_to_break_makespan_ties: false,
            epsilonize_internally: false,
            pref_ops_ordered_mode: GoalLimitedMode::default(),
            pref_ops_cheapest_mode: GoalLimitedMode::default(),
            pref_ops_most_expensive_mode: GoalLimitedMode::default(),
            pref_ops_rand_mode: GoalLimitedMode::default(),
            pref_ops_concurrent_mode: false,
            reset_after_solution_was_found: false,
            reward_only_pref_op_queue: false,
            plan_name: "sas_plan".to_string(),
        }
    }
}

impl PlannerParameters {
    /// Check the cross-field rules.
    pub fn validate(&self) -> Result<(), TempusError> {
        if !self.cyclic_cg_heuristic && !self.makespan_heuristic && !self.no_heuristic {
            return Err(TempusError::InvalidConfig(
                "at least one heuristic must be selected (e.g. --cea)".to_string(),
            ));
        }
        if self.g_values == GValues::Weighted && !(self.g_weight > 0.0 && self.g_weight < 1.0) {
            return Err(TempusError::InvalidConfig(format!(
                "g_weight must lie in (0, 1), got {}",
                self.g_weight
            )));
        }
        if self.plan_name.is_empty() {
            return Err(TempusError::InvalidConfig(
                "plan_name must not be empty".to_string(),
            ));
        }
        if self.use_known_by_logical_state_only {
            tracing::warn!("known-by-logical-state filter is experimental and may lose completeness");
        }
        Ok(())
    }

    /// Preferred-operator modes that split goals by their cost.
    #[must_use]
    pub const fn needs_costs_of_goals(&self) -> bool {
        self.pref_ops_ordered_mode.enabled
            || self.pref_ops_cheapest_mode.enabled
            || self.pref_ops_most_expensive_mode.enabled
            || self.pref_ops_rand_mode.enabled
    }

    /// Open-list modes fed by preferred operators, in registration order.
    #[must_use]
    pub fn specific_open_list_modes(&self) -> Vec<OpenListMode> {
        let mut modes = Vec::new();
        if self.pref_ops_ordered_mode.enabled {
            modes.push(OpenListMode::Ordered);
        }
        if self.pref_ops_cheapest_mode.enabled {
            modes.push(OpenListMode::Cheapest);
        }
        if self.pref_ops_most_expensive_mode.enabled {
            modes.push(OpenListMode::MostExpensive);
        }
        if self.pref_ops_rand_mode.enabled {
            modes.push(OpenListMode::Rand);
        }
        if self.pref_ops_concurrent_mode {
            modes.push(OpenListMode::Concurrent);
        }
        modes
    }
}

impl fmt::Display for PlannerParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let on = |b: bool| if b { "enabled" } else { "disabled" };
        let timeout = |t: u64| {
            if t == 0 {
                "none".to_string()
            } else {
                format!("{}s", t)
            }
        };
        writeln!(f, "Anytime search: {}", on(self.anytime_search))?;
        writeln!(
            f,
            "Timeouts: {} with plan, {} without",
            timeout(self.timeout_if_plan_found),
            timeout(self.timeout_while_no_plan_found)
        )?;
        writeln!(
            f,
            "Greedy: {}, lazy evaluation: {}",
            on(self.greedy),
            on(self.lazy_evaluation)
        )?;
        writeln!(
            f,
            "Cyclic CG heuristic: {} (preferred operators {})",
            on(self.cyclic_cg_heuristic),
            on(self.cyclic_cg_preferred_operators)
        )?;
        writeln!(
            f,
            "Makespan heuristic: {} (preferred operators {})",
            on(self.makespan_heuristic),
            on(self.makespan_heuristic_preferred_operators)
        )?;
        writeln!(f, "Blind heuristic: {}", on(self.no_heuristic))?;
        writeln!(f, "Heuristic cache: {}", on(self.use_caching_in_heuristic))?;
        writeln!(f, "G values: {:?} (weight {})", self.g_values, self.g_weight)?;
        writeln!(f, "Queue management: {:?}", self.queue_management_mode)?;
        write!(f, "Plan file: {}", self.plan_name)
    }
}

// =============================================================================
// TESTS
// =============================================================================
