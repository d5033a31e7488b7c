//! # Cyclic Causal-Graph Heuristic
//!
//! Estimates the cost of reaching the goal by solving the local problems of
//! [`super::local_problem`] and derives preferred operators from the
//! `reached_by` links of the solution.
//!
//! The raw cost can be reported as is or combined with a makespan estimate:
//! the operators on the cheapest paths, together with the running ones, are
//! ordered by mutual exclusion and enablement and scheduled in a simple
//! temporal network.
//!
//! Results are cached by the logical content of the state (the same notion
//! the closed list uses), so states reached again at a later time reuse the
//! value, the per-goal preferred operators and the goal costs.

use super::local_problem::{GOAL_NODE, LocalProblems, TimedOp};
use super::{Heuristic, HeuristicCore};
use crate::closed_list::{logical_hash, logically_equal};
use crate::params::PlannerParameters;
use crate::primitives::{
    DEAD_END, EPSILON, PREFERRED_SAMPLE_SEED, RUNNING_OPERATORS_OFFSET, WEIGHTED_COST_FACTOR,
    double_equals,
};
use crate::state::TimeStampedState;
use crate::stn::SimpleTemporalNetwork;
use crate::task::Task;
use crate::types::{OpenListMode, OperatorId, VariableType};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet};

/// What the heuristic reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclicCgMode {
    /// Sum of the transition costs.
    Cost,
    /// Makespan of the relaxed schedule including running operators.
    RemainingMakespan,
    /// Makespan of the relaxed schedule after the longest running operator.
    SuffixMakespan,
    /// Suffix makespan plus a fraction of cost and waiting time.
    Weighted,
    /// Cost plus the time to wait for running operators.
    Cea,
}

impl CyclicCgMode {
    const fn needs_makespan(self) -> bool {
        matches!(
            self,
            Self::RemainingMakespan | Self::SuffixMakespan | Self::Weighted
        )
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    state: TimeStampedState,
    value: f64,
    waiting_time: f64,
    makespan: f64,
    preferred_by_goal: Vec<BTreeSet<OperatorId>>,
    costs_of_goals: Vec<Option<f64>>,
}

/// Goal-selecting preferred-operator modes and their goal limits.
#[derive(Debug, Clone, Copy, Default)]
struct PreferredModes {
    ordered: Option<usize>,
    cheapest: Option<usize>,
    most_expensive: Option<usize>,
    rand: Option<usize>,
    concurrent: bool,
    costs_needed: bool,
}

/// Causal-graph heuristic over cyclic dependencies between variables.
#[derive(Debug, Clone)]
pub struct CyclicCgHeuristic {
    core: HeuristicCore,
    mode: CyclicCgMode,
    problems: LocalProblems,
    var_types: Vec<VariableType>,
    caching: bool,
    cache: BTreeMap<u64, Vec<CacheEntry>>,
    modes: PreferredModes,
    epsilonize: bool,
    rng: StdRng,
    preferred_by_goal: Vec<BTreeSet<OperatorId>>,
    costs_of_goals: Vec<Option<f64>>,
}

impl CyclicCgHeuristic {
    /// Heuristic for `task` reporting `mode`, configured by `params`.
    #[must_use]
    pub fn new(task: &Task, mode: CyclicCgMode, params: &PlannerParameters) -> Self {
        let limit = |m: crate::params::GoalLimitedMode| m.enabled.then_some(m.count);
        Self {
            core: HeuristicCore::default(),
            mode,
            problems: LocalProblems::new(
                task,
                params.cg_heuristic_zero_cost_waiting_transitions,
                params.cg_heuristic_fire_waiting_transitions_only_if_local_problems_matches_state,
            ),
            var_types: task.variables.iter().map(|v| v.var_type).collect(),
            caching: params.use_caching_in_heuristic,
            cache: BTreeMap::new(),
            modes: PreferredModes {
                ordered: limit(params.pref_ops_ordered_mode),
                cheapest: limit(params.pref_ops_cheapest_mode),
                most_expensive: limit(params.pref_ops_most_expensive_mode),
                rand: limit(params.pref_ops_rand_mode),
                concurrent: params.pref_ops_concurrent_mode,
                costs_needed: params.needs_costs_of_goals(),
            },
            epsilonize: params.epsilonize_internally,
            rng: StdRng::seed_from_u64(PREFERRED_SAMPLE_SEED),
            preferred_by_goal: Vec::new(),
            costs_of_goals: Vec::new(),
        }
    }

    #[must_use]
    pub const fn mode(&self) -> CyclicCgMode {
        self.mode
    }

    fn cached(&self, state: &TimeStampedState) -> Option<&CacheEntry> {
        let key = logical_hash(&self.var_types, state);
        self.cache
            .get(&key)?
            .iter()
            .find(|entry| logically_equal(&self.var_types, &entry.state, state))
    }

    fn store(&mut self, state: &TimeStampedState, value: f64, makespan: f64) {
        let key = logical_hash(&self.var_types, state);
        self.cache.entry(key).or_default().push(CacheEntry {
            state: state.clone(),
            value,
            waiting_time: self.core.waiting_time,
            makespan,
            preferred_by_goal: self.preferred_by_goal.clone(),
            costs_of_goals: self.costs_of_goals.clone(),
        });
    }

    // =========================================================================
    // PREFERRED OPERATORS
    // =========================================================================

    fn compute_preferred(&mut self, task: &Task, state: &TimeStampedState, cost: f64) {
        self.preferred_by_goal = vec![BTreeSet::new(); task.goal.len()];
        self.costs_of_goals.clear();
        if cost == DEAD_END || cost == 0.0 {
            return;
        }
        if self.modes.costs_needed {
            self.costs_of_goals = self.problems.costs_of_goals(task, state);
        }
        self.problems.mark_helpful(
            GOAL_NODE,
            state,
            0,
            &mut self.preferred_by_goal,
            &mut BTreeSet::new(),
        );
        self.set_preferred_channels(task, state);
    }

    fn add_goal(&mut self, goal: usize, mode: OpenListMode) {
        if let Some(ops) = self.preferred_by_goal.get(goal) {
            for &op in ops {
                self.core.preferred.insert(op, mode);
            }
        }
    }

    /// Fill the preferred-operator channels from the per-goal sets.
    fn set_preferred_channels(&mut self, task: &Task, state: &TimeStampedState) {
        if let Some(limit) = self.modes.ordered {
            let open: Vec<usize> = self
                .costs_of_goals
                .iter()
                .enumerate()
                .filter(|(_, cost)| cost.is_some())
                .map(|(goal, _)| goal)
                .take(limit)
                .collect();
            for goal in open {
                self.add_goal(goal, OpenListMode::Ordered);
            }
        }
        if let Some(limit) = self.modes.cheapest {
            self.add_goals_by_cost(limit, OpenListMode::Cheapest, |a, b| a < b);
        }
        if let Some(limit) = self.modes.most_expensive {
            self.add_goals_by_cost(limit, OpenListMode::MostExpensive, |a, b| a > b);
        }
        if let Some(limit) = self.modes.rand {
            let mut open: Vec<usize> = self
                .costs_of_goals
                .iter()
                .enumerate()
                .filter(|(_, cost)| cost.is_some())
                .map(|(goal, _)| goal)
                .collect();
            for _ in 0..limit {
                if open.is_empty() {
                    break;
                }
                let pick = self.rng.gen_range(0..open.len());
                let goal = open.swap_remove(pick);
                self.add_goal(goal, OpenListMode::Rand);
            }
        }
        if self.modes.concurrent {
            let mut chosen: Vec<OperatorId> = Vec::new();
            for op in self.preferred_by_goal.iter().flatten().copied() {
                if chosen.contains(&op) {
                    continue;
                }
                let operator = task.operator(op);
                let mutex = chosen.iter().any(|&other| {
                    let other = task.operator(other);
                    operator.is_disabled_by(other) || other.is_disabled_by(operator)
                });
                if !mutex && operator.is_applicable(op, task, state, self.epsilonize, None) {
                    chosen.push(op);
                }
            }
            for op in chosen {
                self.core.preferred.insert(op, OpenListMode::Concurrent);
            }
        }
        let all: Vec<OperatorId> = self.preferred_by_goal.iter().flatten().copied().collect();
        for op in all {
            self.core.preferred.insert(op, OpenListMode::Regular);
        }
    }

    /// Add the goals of `limit` rounds of picking the best remaining cost.
    fn add_goals_by_cost(&mut self, limit: usize, mode: OpenListMode, better: fn(f64, f64) -> bool) {
        let mut costs = self.costs_of_goals.clone();
        for _ in 0..limit {
            let mut best: Option<(usize, f64)> = None;
            for (goal, cost) in costs.iter().enumerate() {
                if let Some(cost) = *cost
                    && best.is_none_or(|(_, best_cost)| better(cost, best_cost))
                {
                    best = Some((goal, cost));
                }
            }
            let Some((goal, _)) = best else {
                break;
            };
            costs[goal] = None;
            self.add_goal(goal, mode);
        }
    }

    // =========================================================================
    // MAKESPAN
    // =========================================================================

    /// Tightest makespan of the running operators plus the operators on the
    /// cheapest paths, ordered by interference.
    fn scheduled_makespan(&mut self, task: &Task, state: &TimeStampedState) -> f64 {
        let mut needed: Vec<TimedOp> = state
            .operators
            .iter()
            .enumerate()
            .map(|(index, running)| TimedOp {
                op: running.op,
                duration: running.time_increment,
                index,
            })
            .collect();
        let running = needed.len();
        let mut constraints = BTreeSet::new();
        self.problems.causal_constraints(
            task,
            GOAL_NODE,
            state,
            &mut constraints,
            &mut needed,
            &mut BTreeSet::new(),
        );

        for i in 0..running {
            for j in running..needed.len() {
                let (a, b) = (task.operator(needed[i].op), task.operator(needed[j].op));
                if a.is_disabled_by(b) || a.enables(b) {
                    constraints.insert((i, j));
                }
            }
        }

        let n = needed.len();
        let mut stn = SimpleTemporalNetwork::new(2 * n);
        for (i, timed) in needed.iter().enumerate() {
            stn.set_unbounded_interval_from_origin(i, 0.0);
            stn.set_singleton_interval(i, i + n, timed.duration);
        }
        for &(before, after) in &constraints {
            stn.set_unbounded_interval(n + before, after, EPSILON);
        }
        stn.solve();
        if !stn.is_consistent() {
            tracing::debug!(operators = n, "relaxed schedule is inconsistent");
        }
        stn.tightest_makespan()
    }

    /// Combine the raw cost with the makespan and waiting time per mode.
    fn report(&self, cost: f64, makespan: f64, state: &TimeStampedState) -> f64 {
        let running = !state.operators.is_empty();
        let longest_running = state.max_remaining_time();
        let waiting = self.core.waiting_time;
        let value = match self.mode {
            CyclicCgMode::Cost => cost,
            CyclicCgMode::RemainingMakespan => makespan,
            CyclicCgMode::SuffixMakespan => {
                let suffix = makespan - longest_running;
                if running && double_equals(suffix, 0.0) {
                    RUNNING_OPERATORS_OFFSET
                } else {
                    suffix
                }
            }
            CyclicCgMode::Weighted => {
                let cost = if waiting - EPSILON > 0.0 { cost + waiting } else { cost };
                makespan - longest_running + WEIGHTED_COST_FACTOR * cost
            }
            CyclicCgMode::Cea => {
                let mut value = cost;
                if running && value == 0.0 {
                    value += RUNNING_OPERATORS_OFFSET;
                }
                if waiting - EPSILON > 0.0 {
                    value += waiting;
                }
                value
            }
        };
        // Zero is reserved for settled goal states.
        if value < EPSILON {
            RUNNING_OPERATORS_OFFSET
        } else {
            value
        }
    }
}

impl Heuristic for CyclicCgHeuristic {
    fn name(&self) -> &'static str {
        match self.mode {
            CyclicCgMode::Cea => "cyclic-cg",
            CyclicCgMode::Cost => "cyclic-cg-cost",
            _ => "makespan",
        }
    }

    fn core(&self) -> &HeuristicCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut HeuristicCore {
        &mut self.core
    }

    fn dead_ends_are_reliable(&self) -> bool {
        false
    }

    fn compute_heuristic(&mut self, task: &Task, state: &TimeStampedState) -> f64 {
        if state.satisfies_goal(&task.goal) && state.operators.is_empty() {
            return 0.0;
        }

        let (cost, makespan) = if let Some(entry) = self.caching.then(|| self.cached(state)).flatten() {
            let entry = entry.clone();
            self.core.cache_hits += 1;
            self.core.waiting_time = entry.waiting_time;
            if entry.value != DEAD_END && entry.value != 0.0 {
                self.preferred_by_goal = entry.preferred_by_goal;
                self.costs_of_goals = entry.costs_of_goals;
                self.set_preferred_channels(task, state);
            }
            (entry.value, entry.makespan)
        } else {
            let cost = self.problems.compute_costs(task, state);
            self.compute_preferred(task, state, cost);
            let makespan = if self.mode.needs_makespan() && cost != DEAD_END {
                self.scheduled_makespan(task, state)
            } else {
                0.0
            };
            self.core.waiting_time = self.problems.waiting_time;
            if self.caching {
                self.store(state, cost, makespan);
            }
            (cost, makespan)
        };

        if cost == DEAD_END {
            return DEAD_END;
        }
        self.report(cost, makespan, state)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::GoalLimitedMode;
    use crate::task::tests::MOVE_TASK;

    fn move_task() -> Task {
        Task::parse(MOVE_TASK).expect("parse")
    }

    fn heuristic(task: &Task, mode: CyclicCgMode) -> CyclicCgHeuristic {
        CyclicCgHeuristic::new(task, mode, &PlannerParameters::default())
    }

    #[test]
    fn zero_only_on_settled_goal() {
        let task = move_task();
        let mut h = heuristic(&task, CyclicCgMode::Cea);
        assert_eq!(h.evaluate(&task, &task.initial_state), 1.0);

        let started = task.initial_state.apply(&task, OperatorId(0), false);
        let running = h.evaluate(&task, &started);
        assert!(running > 0.0);

        // Goal value already reached while the operator is still running.
        let mut near = started.clone();
        near.values[0] = 1.0;
        assert!(near.satisfies_goal(&task.goal));
        assert_eq!(h.evaluate(&task, &near), RUNNING_OPERATORS_OFFSET);

        let done = started.let_time_pass(&task, false, true, false);
        assert_eq!(h.evaluate(&task, &done), 0.0);
    }

    #[test]
    fn preferred_operator_is_move() {
        let task = move_task();
        let mut h = heuristic(&task, CyclicCgMode::Cea);
        h.evaluate(&task, &task.initial_state);
        assert_eq!(h.preferred_operators(OpenListMode::Regular), &[OperatorId(0)]);
        assert!(h.preferred_operators(OpenListMode::Concurrent).is_empty());
    }

    #[test]
    fn cache_hit_restores_preferred_operators() {
        let task = move_task();
        let mut h = heuristic(&task, CyclicCgMode::Cea);
        h.evaluate(&task, &task.initial_state);
        let mut later = task.initial_state.clone();
        later.timestamp = 3.0;
        assert_eq!(h.evaluate(&task, &later), 1.0);
        assert_eq!(h.num_cache_hits(), 1);
        assert_eq!(h.preferred_operators(OpenListMode::Regular), &[OperatorId(0)]);
    }

    #[test]
    fn makespan_of_single_move() {
        let task = move_task();
        let mut h = heuristic(&task, CyclicCgMode::RemainingMakespan);
        assert_eq!(h.evaluate(&task, &task.initial_state), 1.0);
    }

    #[test]
    fn goal_modes_fill_their_channels() {
        let task = move_task();
        let params = PlannerParameters {
            pref_ops_cheapest_mode: GoalLimitedMode::with_count(1),
            pref_ops_rand_mode: GoalLimitedMode::with_count(3),
            pref_ops_concurrent_mode: true,
            ..PlannerParameters::default()
        };
        let mut h = CyclicCgHeuristic::new(&task, CyclicCgMode::Cea, &params);
        h.evaluate(&task, &task.initial_state);
        assert_eq!(h.preferred_operators(OpenListMode::Cheapest), &[OperatorId(0)]);
        assert_eq!(h.preferred_operators(OpenListMode::Rand), &[OperatorId(0)]);
        assert_eq!(h.preferred_operators(OpenListMode::Concurrent), &[OperatorId(0)]);
        assert!(h.preferred_operators(OpenListMode::Ordered).is_empty());
    }

    #[test]
    fn unreachable_goal_is_a_dead_end() {
        let task = Task::parse(&MOVE_TASK.replacen("0 1\nend_goal", "0 2\nend_goal", 1))
            .expect("parse");
        let mut h = heuristic(&task, CyclicCgMode::Cea);
        assert_eq!(h.evaluate(&task, &task.initial_state), DEAD_END);
        assert!(h.is_dead_end());
        assert!(!h.dead_ends_are_reliable());
    }
}
