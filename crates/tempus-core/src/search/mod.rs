//! # Best-First Search
//!
//! Forward search over time-stamped states with several open lists sharing
//! one closed list.
//!
//! Every registered heuristic feeds an `All` open list with every applicable
//! operator and, when it provides preferred operators, one open list per
//! preferred-operator channel. Each call to [`BestFirstSearchEngine::step`]
//! closes the current state, evaluates it with every heuristic and pushes
//! its successors: one entry per operator plus a let-time-pass entry. The
//! next entry comes from the open list with the smallest priority counter,
//! or from the next list in round-robin mode. Lists that yield progress get
//! their counter lowered, so they are picked more often.
//!
//! Entries store the closed parent plus the step(s) to apply; successors are
//! only materialized when they are fetched (lazy evaluation), unless eager
//! evaluation is requested.

mod statistics;

pub use statistics::{RunningStat, SearchStatistics};

use crate::closed_list::{ClosedList, StateHandle};
use crate::heuristic::{CyclicCgHeuristic, CyclicCgMode, Heuristic, NoHeuristic};
use crate::params::{GValues, PlannerParameters, QueueManagementMode};
use crate::plan::{self, Plan, PlanTrace};
use crate::primitives::{
    EPS_TIME, EPSILON, PROGRESS_REWARD, REALLY_BIG, RESTART_BOOST, STAGNATION_STEPS,
    STATISTICS_INTERVAL_SECS, double_equals,
};
use crate::state::{TimeStampedState, TimedSymbolicStates};
use crate::task::Task;
use crate::types::{OpenListMode, OperatorId, Step, TempusError};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use std::fmt;
use std::time::Instant;

// =============================================================================
// STATUS
// =============================================================================

/// Outcome of a search step or a whole search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchStatus {
    InProgress,
    /// A goal state was reached.
    Solved,
    /// The frontier ran empty after at least one solution.
    SolvedComplete,
    /// Time ran out after a solution was found.
    SolvedTimeout,
    /// The frontier ran empty without a solution.
    Failed,
    /// Time ran out before a solution was found.
    FailedTimeout,
}

impl SearchStatus {
    /// Process exit code of a finished search.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Solved | Self::SolvedComplete => 0,
            Self::Failed => 1,
            Self::SolvedTimeout | Self::FailedTimeout => 137,
            Self::InProgress => 2,
        }
    }
}

impl fmt::Display for SearchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InProgress => "in progress",
            Self::Solved => "solved",
            Self::SolvedComplete => "solved (state space exhausted)",
            Self::SolvedTimeout => "solved (timeout)",
            Self::Failed => "failed",
            Self::FailedTimeout => "failed (timeout)",
        };
        f.write_str(name)
    }
}

/// A plan and the states it passes through.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub plan: Plan,
    pub trace: PlanTrace,
}

impl Solution {
    #[must_use]
    pub fn makespan(&self) -> f64 {
        plan::makespan(&self.plan)
    }
}

// =============================================================================
// OPEN LISTS
// =============================================================================

/// A closed parent plus the step(s) still to apply to it.
#[derive(Debug, Clone)]
struct OpenListEntry {
    priority: f64,
    sequence: u64,
    parent: StateHandle,
    steps: Vec<Step>,
}

impl PartialEq for OpenListEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenListEntry {}

impl PartialOrd for OpenListEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenListEntry {
    // Reversed: the smallest priority, then the oldest entry, pops first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .total_cmp(&self.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

#[derive(Debug)]
struct OpenList {
    heuristic: usize,
    mode: OpenListMode,
    /// Selection counter: lowered by rewards, raised by every pop.
    priority: i64,
    best_value: Option<f64>,
    open: BinaryHeap<OpenListEntry>,
}

impl OpenList {
    fn new(heuristic: usize, mode: OpenListMode) -> Self {
        Self {
            heuristic,
            mode,
            priority: 0,
            best_value: None,
            open: BinaryHeap::new(),
        }
    }
}

/// Size and counter of one open list, for reports.
#[derive(Debug, Clone, Serialize)]
pub struct OpenListReport {
    pub mode: String,
    pub heuristic: &'static str,
    pub size: usize,
    pub priority: i64,
    pub best_value: Option<f64>,
}

/// Counters of one heuristic, for reports.
#[derive(Debug, Clone, Serialize)]
pub struct HeuristicReport {
    pub name: &'static str,
    pub computations: u64,
    pub cache_hits: u64,
}

/// Snapshot of the engine for the final summary.
#[derive(Debug, Clone, Serialize)]
pub struct SearchReport {
    pub expanded: u64,
    pub closed: usize,
    pub statistics: SearchStatistics,
    pub heuristics: Vec<HeuristicReport>,
    pub open_lists: Vec<OpenListReport>,
    pub best_makespan: Option<f64>,
}

// =============================================================================
// ENGINE
// =============================================================================

/// Multi-queue best-first search over one task.
pub struct BestFirstSearchEngine<'a> {
    task: &'a Task,
    params: PlannerParameters,
    heuristics: Vec<Box<dyn Heuristic + 'a>>,
    open_lists: Vec<OpenList>,
    closed: ClosedList,
    /// Best time seen per symbolic state, for the known-by-logical filter.
    logical_states: BTreeMap<Vec<u64>, f64>,

    current_state: TimeStampedState,
    current_predecessor: Option<StateHandle>,
    current_steps: Vec<Step>,

    mode: QueueManagementMode,
    active_queue: usize,
    queue_started_last_with: usize,
    sequence: u64,
    search_steps: u64,
    last_progress_at: u64,
    expanded: u64,

    best_makespan: f64,
    best_sum_of_subgoals: f64,
    solution: Option<Solution>,
    solved: bool,
    solved_at_least_once: bool,

    statistics: SearchStatistics,
    started: Instant,
    last_statistics: Instant,
}

impl<'a> BestFirstSearchEngine<'a> {
    /// Engine with the heuristics selected in `params`.
    ///
    /// Registration order: makespan heuristic, cyclic causal-graph heuristic
    /// (with the goal-selecting preferred-operator lists), blind heuristic.
    pub fn new(task: &'a Task, params: &PlannerParameters) -> Result<Self, TempusError> {
        params.validate()?;
        let mut engine = Self::empty(task, params);

        if params.makespan_heuristic || params.makespan_heuristic_preferred_operators {
            engine.add_heuristic(
                Box::new(CyclicCgHeuristic::new(task, CyclicCgMode::RemainingMakespan, params)),
                params.makespan_heuristic,
                params.makespan_heuristic_preferred_operators,
                &[],
            );
        }
        if params.cyclic_cg_heuristic || params.cyclic_cg_preferred_operators {
            let specific = if params.cyclic_cg_preferred_operators {
                params.specific_open_list_modes()
            } else {
                Vec::new()
            };
            engine.add_heuristic(
                Box::new(CyclicCgHeuristic::new(task, CyclicCgMode::Cea, params)),
                params.cyclic_cg_heuristic,
                params.cyclic_cg_preferred_operators,
                &specific,
            );
        }
        if params.no_heuristic {
            engine.add_heuristic(Box::new(NoHeuristic::new()), true, false, &[]);
        }

        if engine.open_lists.is_empty() {
            return Err(TempusError::InvalidConfig(
                "the selected heuristics provide no open list".to_string(),
            ));
        }
        if params.reset_after_solution_was_found {
            tracing::info!(open_list = engine.queue_started_last_with, "boosting open list");
            engine.open_lists[engine.queue_started_last_with].priority -= RESTART_BOOST;
        }
        Ok(engine)
    }

    /// Engine without heuristics; register them with
    /// [`add_heuristic`](Self::add_heuristic).
    #[must_use]
    pub fn empty(task: &'a Task, params: &PlannerParameters) -> Self {
        let now = Instant::now();
        Self {
            task,
            params: params.clone(),
            heuristics: Vec::new(),
            open_lists: Vec::new(),
            closed: ClosedList::new(task),
            logical_states: BTreeMap::new(),
            current_state: task.initial_state.clone(),
            current_predecessor: None,
            current_steps: Vec::new(),
            mode: params.queue_management_mode,
            active_queue: 0,
            queue_started_last_with: 0,
            sequence: 0,
            search_steps: 0,
            last_progress_at: 0,
            expanded: 0,
            best_makespan: REALLY_BIG,
            best_sum_of_subgoals: REALLY_BIG,
            solution: None,
            solved: false,
            solved_at_least_once: false,
            statistics: SearchStatistics::default(),
            started: now,
            last_statistics: now,
        }
    }

    /// Register a heuristic and its open lists.
    ///
    /// Lists are added in the order of `specific` modes, then `Regular` when
    /// `use_preferred`, then `All` when `use_estimates`.
    pub fn add_heuristic(
        &mut self,
        heuristic: Box<dyn Heuristic + 'a>,
        use_estimates: bool,
        use_preferred: bool,
        specific: &[OpenListMode],
    ) {
        debug_assert!(use_estimates || use_preferred);
        let index = self.heuristics.len();
        self.heuristics.push(heuristic);
        for &mode in specific {
            self.open_lists.push(OpenList::new(index, mode));
        }
        if use_preferred {
            self.open_lists.push(OpenList::new(index, OpenListMode::Regular));
        }
        if use_estimates {
            self.open_lists.push(OpenList::new(index, OpenListMode::All));
        }
    }

    /// Prepare a (resumed) search run.
    pub fn initialize(&mut self) {
        self.active_queue = 0;
        self.last_progress_at = 0;
        self.search_steps = 0;
        tracing::debug!(open_lists = ?self.open_list_sizes(), "search initialized");
    }

    /// Step until the search leaves `InProgress`.
    pub fn search(&mut self) -> SearchStatus {
        let mut status = SearchStatus::InProgress;
        while status == SearchStatus::InProgress {
            status = self.step();
        }
        if matches!(status, SearchStatus::Failed | SearchStatus::FailedTimeout) {
            self.solved = false;
        }
        status
    }

    /// Continue after a solution: move past the goal state unless a restart
    /// will pick the search up anyway.
    pub fn resume(&mut self) -> SearchStatus {
        if self.params.reset_after_solution_was_found && self.mode == QueueManagementMode::Priority
        {
            SearchStatus::InProgress
        } else {
            self.fetch_next_state()
        }
    }

    // =========================================================================
    // STEP
    // =========================================================================

    /// Process the current state and fetch the next one.
    pub fn step(&mut self) -> SearchStatus {
        self.search_steps += 1;
        if self.params.reset_after_solution_was_found
            && self.mode == QueueManagementMode::Priority
            && self.search_steps - self.last_progress_at >= STAGNATION_STEPS
        {
            tracing::info!(
                last_progress = self.last_progress_at,
                steps = self.search_steps,
                "no progress, restarting"
            );
            self.reset();
        }

        let makespan = self.current_state.max_remaining_time() + self.current_state.timestamp;
        let better = if self.params.use_subgoals_to_break_makespan_ties {
            makespan <= self.best_makespan
        } else {
            makespan < self.best_makespan
        };
        let mut discard = !better || self.closed.contains(&self.current_state);

        // Zero-duration operators cannot be handled.
        if let Some(pred) = self.current_predecessor {
            let pred_state = self.closed.get(pred);
            if self.current_steps.iter().any(|step| {
                step.operator()
                    .is_some_and(|op| self.task.operator(op).duration(pred_state) <= 0.0)
            }) {
                discard = true;
            }
        }

        if !discard {
            let parent = self.close_current();
            self.evaluate_current();
            if !self.is_dead_end() {
                if self.check_progress() {
                    self.report_progress();
                    self.reward_progress();
                }
                if self.check_goal() {
                    return SearchStatus::Solved;
                }
                self.generate_successors(parent);
            }
        } else if self.current_steps == [Step::LetTimePass]
            && self.current_state.operators.is_empty()
            && makespan < self.best_makespan
        {
            // Letting time pass may settle a state equal to a closed one
            // that was never checked as a goal.
            self.evaluate_current();
            if !self.is_dead_end() && self.check_goal() {
                return SearchStatus::Solved;
            }
        }

        if self.params.verbose
            && self.last_statistics.elapsed().as_secs() >= STATISTICS_INTERVAL_SECS
        {
            self.dump_statistics();
            self.last_statistics = Instant::now();
        }

        let elapsed = self.started.elapsed().as_secs();
        if self.solved {
            if self.params.timeout_if_plan_found > 0 && elapsed > self.params.timeout_if_plan_found
            {
                if self.params.verbose {
                    self.dump_statistics();
                }
                return SearchStatus::SolvedTimeout;
            }
        } else if self.params.timeout_while_no_plan_found > 0
            && elapsed > self.params.timeout_while_no_plan_found
        {
            if self.params.verbose {
                self.dump_statistics();
            }
            return SearchStatus::FailedTimeout;
        }

        self.fetch_next_state()
    }

    /// Insert the current state into the closed list, once per applied
    /// operator. Operators after the first are applied here, skipping those
    /// no longer applicable.
    fn close_current(&mut self) -> StateHandle {
        let steps = self.current_steps.clone();
        let Some((first, rest)) = steps.split_first() else {
            self.expanded += 1;
            return self
                .closed
                .insert(self.current_state.clone(), self.current_predecessor, None);
        };

        self.expanded += 1;
        let mut handle =
            self.closed
                .insert(self.current_state.clone(), self.current_predecessor, Some(*first));
        for step in rest {
            debug_assert!(self.open_lists[self.active_queue].mode == OpenListMode::Concurrent);
            let Some(op) = step.operator() else {
                continue;
            };
            let eps = self.params.epsilonize_internally;
            if !self
                .task
                .operator(op)
                .is_applicable(op, self.task, &self.current_state, eps, None)
            {
                continue;
            }
            self.current_state = self.current_state.apply(self.task, op, eps);
            self.expanded += 1;
            handle = self
                .closed
                .insert(self.current_state.clone(), Some(handle), Some(*step));
        }
        handle
    }

    fn evaluate_current(&mut self) {
        for heuristic in &mut self.heuristics {
            heuristic.evaluate(self.task, &self.current_state);
        }
    }

    /// Dead if a reliable heuristic says so, or all of them agree.
    fn is_dead_end(&self) -> bool {
        let mut dead = 0;
        for heuristic in &self.heuristics {
            if heuristic.is_dead_end() {
                if heuristic.dead_ends_are_reliable() {
                    return true;
                }
                dead += 1;
            }
        }
        dead == self.heuristics.len()
    }

    /// The heuristic of the first open list reports zero only on settled
    /// goal states.
    fn check_goal(&mut self) -> bool {
        let heuristic = &self.heuristics[self.open_lists[0].heuristic];
        if heuristic.is_dead_end() || heuristic.value() != 0.0 {
            return false;
        }
        if !self.current_state.operators.is_empty() {
            return false;
        }
        if !self.current_state.satisfies_goal(&self.task.goal) {
            tracing::debug!(
                timestamp = self.current_state.timestamp,
                "zero heuristic on a non-goal state"
            );
            return false;
        }

        let (plan, trace) = self.closed.trace_path(self.task, &self.current_state);
        self.solution = Some(Solution { plan, trace });
        self.solved = true;
        self.solved_at_least_once = true;
        true
    }

    // =========================================================================
    // PROGRESS
    // =========================================================================

    fn check_progress(&mut self) -> bool {
        if self.params.reward_only_pref_op_queue {
            let mut progress = false;
            for heuristic in &self.heuristics {
                if heuristic.is_dead_end() {
                    continue;
                }
                let h = heuristic.value();
                let best = &mut self.open_lists[0].best_value;
                if best.is_none_or(|best| h < best) {
                    *best = Some(h);
                    progress = true;
                }
            }
            progress
        } else {
            let list = &self.open_lists[self.active_queue];
            let heuristic = &self.heuristics[list.heuristic];
            if heuristic.is_dead_end() {
                return false;
            }
            let h = heuristic.value();
            let best = &mut self.open_lists[self.active_queue].best_value;
            if best.is_none_or(|best| h < best) {
                *best = Some(h);
                true
            } else {
                false
            }
        }
    }

    fn report_progress(&self) {
        let best: Vec<String> = self
            .open_lists
            .iter()
            .map(|list| list.best_value.map_or_else(|| "-".to_string(), |h| h.to_string()))
            .collect();
        tracing::info!(
            best = best.join("/"),
            expanded = self.closed.len(),
            "best heuristic values of queues"
        );
    }

    fn reward_progress(&mut self) {
        if self.params.reward_only_pref_op_queue {
            for list in &mut self.open_lists {
                if list.mode == OpenListMode::Regular {
                    list.priority -= PROGRESS_REWARD;
                }
            }
        } else {
            self.open_lists[self.active_queue].priority -= PROGRESS_REWARD;
            self.last_progress_at = self.search_steps;
        }
    }

    /// Restart from the initial state, giving the next open list a head
    /// start or, once every list had one, switching to round robin.
    pub fn reset(&mut self) {
        self.closed.clear();
        self.search_steps = 0;
        self.last_progress_at = 0;
        for list in &mut self.open_lists {
            list.priority = 0;
            list.best_value = None;
            list.open.clear();
        }
        self.current_state = self.task.initial_state.clone();
        self.current_predecessor = None;
        self.current_steps.clear();

        self.queue_started_last_with = (self.queue_started_last_with + 1) % self.open_lists.len();
        if self.queue_started_last_with == 0 {
            tracing::info!("switching to round robin");
            self.mode = QueueManagementMode::RoundRobin;
        } else {
            tracing::info!(open_list = self.queue_started_last_with, "boosting open list");
            self.open_lists[self.queue_started_last_with].priority -= RESTART_BOOST;
        }
    }

    // =========================================================================
    // SUCCESSORS
    // =========================================================================

    /// Rejects a successor whose every progressed symbolic state was seen
    /// no later; records the improvements.
    fn known_by_logical_state(&mut self, states: &TimedSymbolicStates) -> bool {
        if !self.params.use_known_by_logical_state_only {
            return false;
        }
        let mut known = true;
        for (values, time) in states {
            let key: Vec<u64> = values.iter().map(|v| (v + 0.0).to_bits()).collect();
            match self.logical_states.get_mut(&key) {
                Some(best) if *time + EPSILON >= *best => {}
                Some(best) => {
                    *best = *time;
                    known = false;
                }
                None => {
                    self.logical_states.insert(key, *time);
                    known = false;
                }
            }
        }
        known
    }

    /// Preferred operators of all non-dead heuristics per channel,
    /// restricted to `applicable`.
    fn preferred_by_channel(&self, applicable: &[OperatorId]) -> [Vec<OperatorId>; OpenListMode::CHANNELS] {
        let mut channels: [Vec<OperatorId>; OpenListMode::CHANNELS] = Default::default();
        for list in &self.open_lists {
            let Some(channel) = list.mode.channel() else {
                continue;
            };
            let heuristic = &self.heuristics[list.heuristic];
            if heuristic.is_dead_end() {
                continue;
            }
            for &op in heuristic.preferred_operators(list.mode) {
                if applicable.contains(&op) && !channels[channel].contains(&op) {
                    channels[channel].push(op);
                }
            }
        }
        channels
    }

    fn push(&mut self, list: usize, parent: StateHandle, steps: Vec<Step>, priority: f64) {
        self.sequence += 1;
        self.open_lists[list].open.push(OpenListEntry {
            priority,
            sequence: self.sequence,
            parent,
            steps,
        });
        self.statistics.count_child(list);
    }

    fn priority(&self, g: f64, h: f64) -> f64 {
        if self.params.greedy { h } else { g + h }
    }

    fn generate_successors(&mut self, parent: StateHandle) {
        let task = self.task;
        let eps = self.params.epsilonize_internally;
        let parent_state = self.closed.get(parent).clone();
        let mut all_ops = task.successor_generator.applicable_ops(&parent_state);
        let preferred = self.preferred_by_channel(&all_ops);
        all_ops.retain(|op| !preferred.iter().any(|channel| channel.contains(op)));

        let parent_g = self.g_value(&parent_state, parent, None);
        let longest_running = parent_state.max_remaining_time();

        for list in 0..self.open_lists.len() {
            let (heuristic, mode) = (self.open_lists[list].heuristic, self.open_lists[list].mode);
            if self.params.lazy_evaluation && self.heuristics[heuristic].is_dead_end() {
                continue;
            }
            let mut priority = if self.params.lazy_evaluation {
                self.priority(parent_g, self.heuristics[heuristic].value())
            } else {
                -1.0
            };
            let ops = match mode.channel() {
                Some(channel) => preferred[channel].clone(),
                None => all_ops.clone(),
            };

            let mut concurrent: Vec<Step> = Vec::new();
            let mut concurrent_state = parent_state.clone();
            for op in ops {
                let operator = task.operator(op);
                let makespan = longest_running.max(operator.duration(&parent_state))
                    + parent_state.timestamp;
                let better = makespan < self.best_makespan
                    || (self.params.use_subgoals_to_break_makespan_ties
                        && double_equals(makespan, self.best_makespan));
                if !better {
                    continue;
                }
                let mut symbolic = TimedSymbolicStates::new();
                let collect = self
                    .params
                    .use_known_by_logical_state_only
                    .then_some(&mut symbolic);
                if !operator.is_applicable(op, task, &parent_state, eps, collect)
                    || self.known_by_logical_state(&symbolic)
                {
                    continue;
                }

                if mode == OpenListMode::Concurrent {
                    if !self.params.lazy_evaluation {
                        concurrent_state = concurrent_state.apply(task, op, eps);
                        let g = self.g_value(&concurrent_state, parent, Some(op));
                        let h = self.heuristics[heuristic].evaluate(task, &concurrent_state);
                        if self.heuristics[heuristic].is_dead_end() {
                            continue;
                        }
                        priority = self.priority(g, h);
                    }
                    concurrent.push(Step::Apply(op));
                } else {
                    if !self.params.lazy_evaluation {
                        let child = parent_state.apply(task, op, eps);
                        let g = self.g_value(&child, parent, Some(op));
                        let h = self.heuristics[heuristic].evaluate(task, &child);
                        if self.heuristics[heuristic].is_dead_end() {
                            continue;
                        }
                        priority = self.priority(g, h);
                    }
                    self.push(list, parent, vec![Step::Apply(op)], priority);
                }
            }
            if !concurrent.is_empty() {
                self.push(list, parent, concurrent, priority);
            }

            if !self.params.insert_let_time_pass_only_when_running_operators_not_empty
                || !parent_state.operators.is_empty()
            {
                if !self.params.lazy_evaluation {
                    let child = parent_state.let_time_pass(task, false, true, eps);
                    let g = self.g_value(&child, parent, None);
                    let h = self.heuristics[heuristic].evaluate(task, &child);
                    if self.heuristics[heuristic].is_dead_end() {
                        continue;
                    }
                    priority = self.priority(g, h);
                }
                self.push(list, parent, vec![Step::LetTimePass], priority);
            }
        }
        self.statistics.finish_expansion();
    }

    // =========================================================================
    // G VALUES
    // =========================================================================

    /// `g` of `state`, a closed state or a child of the closed `parent`
    /// reached by `op`.
    fn g_value(&self, state: &TimeStampedState, parent: StateHandle, op: Option<OperatorId>) -> f64 {
        match self.params.g_values {
            GValues::Timestamp => {
                let g = state.timestamp - EPS_TIME * f64::from(state.eps_insertions);
                debug_assert!(g >= -EPSILON);
                g
            }
            GValues::Cost => self.path_cost(parent, op),
            GValues::Makespan => self.running_makespan(state),
            GValues::Weighted => {
                let w = self.params.g_weight;
                w * self.running_makespan(state) + (1.0 - w) * self.path_cost(parent, op)
            }
        }
    }

    fn path_cost(&self, parent: StateHandle, op: Option<OperatorId>) -> f64 {
        let parent_state = self.closed.get(parent);
        let step = op.map_or(0.0, |op| self.task.operator(op).duration(parent_state));
        self.closed.cost_of_path(self.task, parent_state) + step
    }

    /// Timestamp plus the longest full duration of a running operator.
    fn running_makespan(&self, state: &TimeStampedState) -> f64 {
        let longest = state
            .operators
            .iter()
            .map(|running| self.task.operator(running.op).duration(state))
            .fold(0.0, f64::max);
        state.timestamp + longest
    }

    // =========================================================================
    // FRONTIER
    // =========================================================================

    fn select_open_list(&mut self) -> Option<usize> {
        match self.mode {
            QueueManagementMode::Priority => {
                let mut best: Option<(usize, i64)> = None;
                for (index, list) in self.open_lists.iter().enumerate() {
                    if !list.open.is_empty() && best.is_none_or(|(_, p)| list.priority < p) {
                        best = Some((index, list.priority));
                    }
                }
                let (index, _) = best?;
                self.active_queue = index;
                Some(index)
            }
            QueueManagementMode::RoundRobin => {
                for _ in 0..self.open_lists.len() {
                    self.active_queue = (self.active_queue + 1) % self.open_lists.len();
                    if !self.open_lists[self.active_queue].open.is_empty() {
                        return Some(self.active_queue);
                    }
                }
                None
            }
        }
    }

    /// Pop the next entry and materialize its first step.
    pub fn fetch_next_state(&mut self) -> SearchStatus {
        let Some(index) = self.select_open_list() else {
            if self.solved_at_least_once {
                tracing::info!("completely explored state space, best plan found");
                return SearchStatus::SolvedComplete;
            }
            if self.params.verbose {
                self.dump_statistics();
            }
            tracing::info!("completely explored state space, no solution");
            return SearchStatus::Failed;
        };
        let list = &mut self.open_lists[index];
        let Some(entry) = list.open.pop() else {
            return SearchStatus::Failed;
        };
        list.priority += 1;

        let eps = self.params.epsilonize_internally;
        let parent = self.closed.get(entry.parent);
        self.current_state = match entry.steps.first().and_then(|step| step.operator()) {
            Some(op) => parent.apply(self.task, op, eps),
            None if entry.steps.is_empty() => parent.clone(),
            None => parent.let_time_pass(self.task, false, true, eps),
        };
        self.current_predecessor = Some(entry.parent);
        self.current_steps = entry.steps;
        SearchStatus::InProgress
    }

    // =========================================================================
    // SOLUTIONS
    // =========================================================================

    /// Accept the last solution if it beats the best makespan so far (or
    /// ties it with a smaller sum of subgoal durations under subgoal
    /// tie-breaking). The accepted makespan becomes the pruning bound.
    pub fn improve_bound(&mut self) -> Option<&Solution> {
        let solution = self.solution.as_ref()?;
        let makespan = solution.makespan();
        if self.params.use_subgoals_to_break_makespan_ties {
            if makespan > self.best_makespan && !double_equals(makespan, self.best_makespan) {
                return None;
            }
            let subgoals = plan::sum_of_subgoals(&solution.plan);
            if double_equals(makespan, self.best_makespan) {
                if subgoals >= self.best_sum_of_subgoals {
                    return None;
                }
                tracing::info!(sum_of_subgoals = subgoals, "equal makespan, faster subgoals");
            }
            self.best_sum_of_subgoals = subgoals;
        } else if makespan >= self.best_makespan {
            return None;
        }
        self.best_makespan = makespan;
        self.solution.as_ref()
    }

    #[must_use]
    pub fn found_solution(&self) -> bool {
        self.solved
    }

    #[must_use]
    pub fn found_at_least_one_solution(&self) -> bool {
        self.solved_at_least_once
    }

    /// The last solution found.
    #[must_use]
    pub fn solution(&self) -> Option<&Solution> {
        self.solution.as_ref()
    }

    /// Best accepted makespan, `None` before the first accepted plan.
    #[must_use]
    pub fn best_makespan(&self) -> Option<f64> {
        (self.best_makespan < REALLY_BIG).then_some(self.best_makespan)
    }

    #[must_use]
    pub const fn mode(&self) -> QueueManagementMode {
        self.mode
    }

    #[must_use]
    pub const fn expanded(&self) -> u64 {
        self.expanded
    }

    #[must_use]
    pub fn closed_len(&self) -> usize {
        self.closed.len()
    }

    #[must_use]
    pub fn open_list_modes(&self) -> Vec<OpenListMode> {
        self.open_lists.iter().map(|list| list.mode).collect()
    }

    fn open_list_sizes(&self) -> Vec<(usize, i64)> {
        self.open_lists
            .iter()
            .map(|list| (list.open.len(), list.priority))
            .collect()
    }

    // =========================================================================
    // STATISTICS
    // =========================================================================

    fn dump_statistics(&mut self) {
        tracing::info!(
            seconds = self.started.elapsed().as_secs(),
            open_lists = ?self.open_list_sizes(),
            "search statistics"
        );
        self.statistics.dump(self.expanded);
        for heuristic in &self.heuristics {
            tracing::info!(
                heuristic = heuristic.name(),
                computations = heuristic.num_computations(),
                cache_hits = heuristic.num_cache_hits(),
                "heuristic statistics"
            );
        }
    }

    /// Counters for the final summary.
    #[must_use]
    pub fn report(&self) -> SearchReport {
        SearchReport {
            expanded: self.expanded,
            closed: self.closed.len(),
            statistics: self.statistics.clone(),
            heuristics: self
                .heuristics
                .iter()
                .map(|heuristic| HeuristicReport {
                    name: heuristic.name(),
                    computations: heuristic.num_computations(),
                    cache_hits: heuristic.num_cache_hits(),
                })
                .collect(),
            open_lists: self
                .open_lists
                .iter()
                .map(|list| OpenListReport {
                    mode: list.mode.to_string(),
                    heuristic: self.heuristics[list.heuristic].name(),
                    size: list.open.len(),
                    priority: list.priority,
                    best_value: list.best_value,
                })
                .collect(),
            best_makespan: self.best_makespan(),
        }
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

    fn cea() -> PlannerParameters {
        PlannerParameters {
            cyclic_cg_heuristic: true,
            cyclic_cg_preferred_operators: true,
            verbose: false,
            ..PlannerParameters::default()
        }
    }

    #[test]
    fn open_lists_follow_registration_order() {
        let task = move_task();
        let params = PlannerParameters {
            makespan_heuristic: true,
            no_heuristic: true,
            pref_ops_cheapest_mode: GoalLimitedMode::with_count(1),
            pref_ops_concurrent_mode: true,
            ..cea()
        };
        let engine = BestFirstSearchEngine::new(&task, &params).expect("engine");
        assert_eq!(
            engine.open_list_modes(),
            vec![
                OpenListMode::All,
                OpenListMode::Cheapest,
                OpenListMode::Concurrent,
                OpenListMode::Regular,
                OpenListMode::All,
                OpenListMode::All,
            ]
        );
    }

    #[test]
    fn rejects_parameters_without_heuristic() {
        let task = move_task();
        let result = BestFirstSearchEngine::new(&task, &PlannerParameters::default());
        assert!(matches!(result, Err(TempusError::InvalidConfig(_))));
    }

    #[test]
    fn solves_move_task() {
        let task = move_task();
        let mut engine = BestFirstSearchEngine::new(&task, &cea()).expect("engine");
        engine.initialize();
        assert_eq!(engine.search(), SearchStatus::Solved);

        let solution = engine.improve_bound().expect("first plan is accepted").clone();
        assert_eq!(solution.plan.len(), 1);
        assert_eq!(solution.plan[0].op, OperatorId(0));
        assert_eq!(solution.plan[0].start_time, 0.0);
        assert_eq!(solution.plan[0].duration, 1.0);
        assert_eq!(solution.makespan(), 1.0);
        assert_eq!(engine.best_makespan(), Some(1.0));
        assert!(engine.improve_bound().is_none());
    }

    #[test]
    fn anytime_search_exhausts_after_first_plan() {
        let task = move_task();
        let params = PlannerParameters {
            anytime_search: true,
            ..cea()
        };
        let mut engine = BestFirstSearchEngine::new(&task, &params).expect("engine");
        engine.initialize();
        assert_eq!(engine.search(), SearchStatus::Solved);
        assert!(engine.improve_bound().is_some());

        engine.resume();
        engine.initialize();
        assert_eq!(engine.search(), SearchStatus::SolvedComplete);
        assert!(engine.found_at_least_one_solution());
    }

    #[test]
    fn blind_search_solves_with_eager_evaluation() {
        let task = move_task();
        let params = PlannerParameters {
            no_heuristic: true,
            lazy_evaluation: false,
            g_values: GValues::Cost,
            verbose: false,
            ..PlannerParameters::default()
        };
        let mut engine = BestFirstSearchEngine::new(&task, &params).expect("engine");
        engine.initialize();
        assert_eq!(engine.search(), SearchStatus::Solved);
        assert!(engine.report().statistics.generated > 0);
    }

    #[test]
    fn unreachable_goal_fails() {
        let task = Task::parse(&MOVE_TASK.replacen("0 1\nend_goal", "0 2\nend_goal", 1))
            .expect("parse");
        let mut engine = BestFirstSearchEngine::new(&task, &cea()).expect("engine");
        engine.initialize();
        assert_eq!(engine.search(), SearchStatus::Failed);
        assert!(!engine.found_solution());
        assert!(engine.solution().is_none());
    }

    #[test]
    fn rewarding_preferred_queue_keeps_stagnation_counter() {
        let task = move_task();
        let params = PlannerParameters {
            reward_only_pref_op_queue: true,
            ..cea()
        };
        let mut engine = BestFirstSearchEngine::new(&task, &params).expect("engine");
        engine.initialize();
        assert_eq!(engine.search(), SearchStatus::Solved);
        assert_eq!(engine.open_lists[1].mode, OpenListMode::Regular);
        assert!(engine.open_lists[1].priority < 0);
        assert_eq!(engine.last_progress_at, 0);

        let mut engine = BestFirstSearchEngine::new(&task, &cea()).expect("engine");
        engine.initialize();
        assert_eq!(engine.search(), SearchStatus::Solved);
        assert!(engine.last_progress_at > 0);
    }

    #[test]
    fn concurrent_batch_closes_every_applied_operator() {
        let task = Task::parse(include_str!("../../tests/fixtures/pair.sas")).expect("parse");
        let params = PlannerParameters {
            pref_ops_concurrent_mode: true,
            ..cea()
        };
        let mut engine = BestFirstSearchEngine::new(&task, &params).expect("engine");
        engine.initialize();
        assert_eq!(engine.step(), SearchStatus::InProgress);
        assert_eq!(engine.closed_len(), 1);

        let root = engine.current_predecessor.expect("root is closed");
        let (a, b) = (OperatorId(0), OperatorId(1));
        engine.current_state = engine.closed.get(root).apply(&task, a, false);
        engine.current_steps = vec![Step::Apply(a), Step::Apply(b)];
        engine.active_queue = engine
            .open_lists
            .iter()
            .position(|list| list.mode == OpenListMode::Concurrent)
            .expect("concurrent list");
        engine.step();

        assert_eq!(engine.closed_len(), 3);
        assert_eq!(engine.expanded(), 3);
        let both = task.initial_state.apply(&task, a, false).apply(&task, b, false);
        assert_eq!(both.operators.len(), 2);
        assert!(engine.closed.contains(&both));
    }

    #[test]
    fn reset_rotates_boost_then_round_robin() {
        let task = move_task();
        let mut engine = BestFirstSearchEngine::new(&task, &cea()).expect("engine");
        assert_eq!(engine.open_lists.len(), 2);
        engine.reset();
        assert_eq!(engine.open_lists[1].priority, -RESTART_BOOST);
        assert_eq!(engine.mode(), QueueManagementMode::Priority);
        engine.reset();
        assert_eq!(engine.mode(), QueueManagementMode::RoundRobin);
        assert_eq!(engine.closed_len(), 0);
    }

    #[test]
    fn open_list_entries_pop_lowest_priority_first() {
        let mut heap = BinaryHeap::new();
        for (sequence, priority) in [(1, 3.0), (2, 1.0), (3, 1.0)] {
            heap.push(OpenListEntry {
                priority,
                sequence,
                parent: 0,
                steps: Vec::new(),
            });
        }
        let order: Vec<u64> = std::iter::from_fn(|| heap.pop().map(|e| e.sequence)).collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn exit_codes() {
        assert_eq!(SearchStatus::Solved.exit_code(), 0);
        assert_eq!(SearchStatus::SolvedComplete.exit_code(), 0);
        assert_eq!(SearchStatus::Failed.exit_code(), 1);
        assert_eq!(SearchStatus::FailedTimeout.exit_code(), 137);
    }
}
