//! # Temporal State
//!
//! Time-stamped snapshots of a plan prefix.
//!
//! A [`TimeStampedState`] holds the current variable values plus everything
//! that is still owed by running operators: scheduled end effects, over-all
//! and at-end conditions, and the operators themselves, each with the time
//! remaining until it is due. Successors are produced either by starting an
//! operator ([`TimeStampedState::apply`]) or by advancing the clock
//! ([`TimeStampedState::let_time_pass`]); a state is never changed after a
//! successor was derived from it.

use crate::axioms::AxiomEvaluator;
use crate::primitives::{EPS_TIME, EPSILON, REALLY_BIG, double_equals};
use crate::task::{Effect, PrePost, Prevail, Task, all_hold};
use crate::types::{AssignmentOp, OperatorId};
use std::cmp::Ordering;

/// Values of the logical and primitive numeric variables at a time point.
pub type TimedSymbolicState = (Vec<f64>, f64);

/// Symbolic states passed while progressing a state to quiescence.
pub type TimedSymbolicStates = Vec<TimedSymbolicState>;

// =============================================================================
// SCHEDULED ENTRIES
// =============================================================================

/// An at-end effect waiting for its operator to finish.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledEffect {
    pub time_increment: f64,
    pub effect: PrePost,
}

impl ScheduledEffect {
    /// Schedule `effect` to happen after `time_increment`.
    #[must_use]
    pub fn new(time_increment: f64, effect: &PrePost) -> Self {
        let mut effect = effect.clone();
        sort_prevails(&mut effect.cond_start);
        sort_prevails(&mut effect.cond_overall);
        sort_prevails(&mut effect.cond_end);
        Self {
            time_increment,
            effect,
        }
    }

    /// Fields in canonical comparison order, with `-1` for absent parts.
    fn fields(&self) -> (f64, i64, f64, AssignmentOp) {
        match self.effect.effect {
            Effect::Set { pre, post } => (pre.unwrap_or(-1.0), -1, post, AssignmentOp::Assign),
            Effect::Update { op, operand } => (-1.0, operand as i64, -1.0, op),
        }
    }

    /// Total order used to keep the effect list canonical.
    #[must_use]
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        let (pre, var_post, post, fop) = self.fields();
        let (o_pre, o_var_post, o_post, o_fop) = other.fields();
        let (a, b) = (&self.effect, &other.effect);
        self.time_increment
            .total_cmp(&other.time_increment)
            .then(a.var.cmp(&b.var))
            .then(pre.total_cmp(&o_pre))
            .then(var_post.cmp(&o_var_post))
            .then(post.total_cmp(&o_post))
            .then(fop.cmp(&o_fop))
            .then(a.cond_start.len().cmp(&b.cond_start.len()))
            .then(a.cond_overall.len().cmp(&b.cond_overall.len()))
            .then(a.cond_end.len().cmp(&b.cond_end.len()))
            .then_with(|| cmp_prevails(&a.cond_start, &b.cond_start))
            .then_with(|| cmp_prevails(&a.cond_overall, &b.cond_overall))
            .then_with(|| cmp_prevails(&a.cond_end, &b.cond_end))
    }
}

/// A condition owed by a running operator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledCondition {
    pub time_increment: f64,
    pub cond: Prevail,
}

impl ScheduledCondition {
    fn canonical_cmp(&self, other: &Self) -> Ordering {
        self.time_increment
            .total_cmp(&other.time_increment)
            .then(self.cond.var.cmp(&other.cond.var))
            .then(self.cond.prev.total_cmp(&other.cond.prev))
    }
}

/// An operator that has started but not finished.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledOperator {
    pub op: OperatorId,
    pub time_increment: f64,
}

fn cmp_prevails(a: &[Prevail], b: &[Prevail]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        let ord = x.var.cmp(&y.var).then(x.prev.total_cmp(&y.prev));
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

fn sort_prevails(conds: &mut [Prevail]) {
    conds.sort_by(|x, y| x.var.cmp(&y.var).then(x.prev.total_cmp(&y.prev)));
}

/// Subtract `min(t, sep)` from every entry and drop those for which
/// `expired` holds afterwards.
fn age_conditions(conds: &mut Vec<ScheduledCondition>, sep: f64, expired: impl Fn(f64) -> bool) {
    for cond in conds.iter_mut() {
        cond.time_increment -= cond.time_increment.min(sep);
    }
    conds.retain(|cond| !expired(cond.time_increment));
}

// =============================================================================
// TIME-STAMPED STATE
// =============================================================================

/// A snapshot of the world during plan execution.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeStampedState {
    pub values: Vec<f64>,
    pub scheduled_effects: Vec<ScheduledEffect>,
    pub conds_over_all: Vec<ScheduledCondition>,
    pub conds_at_end: Vec<ScheduledCondition>,
    pub operators: Vec<ScheduledOperator>,
    pub timestamp: f64,
    /// Number of internal epsilon steps inserted on the way to this state.
    pub eps_insertions: u32,
}

impl TimeStampedState {
    /// The initial state: raw values with derived variables evaluated.
    #[must_use]
    pub fn initial(mut values: Vec<f64>, axioms: &AxiomEvaluator) -> Self {
        axioms.evaluate(&mut values);
        Self {
            values,
            scheduled_effects: Vec::new(),
            conds_over_all: Vec::new(),
            conds_at_end: Vec::new(),
            operators: Vec::new(),
            timestamp: 0.0,
            eps_insertions: 0,
        }
    }

    /// Value of a variable.
    #[must_use]
    pub fn value(&self, var: usize) -> f64 {
        self.values[var]
    }

    /// True if every condition holds now.
    #[must_use]
    pub fn satisfies(&self, conds: &[Prevail]) -> bool {
        all_hold(conds, &self.values)
    }

    /// True if every goal pair holds.
    #[must_use]
    pub fn satisfies_goal(&self, goal: &[(usize, f64)]) -> bool {
        goal.iter()
            .all(|&(var, value)| double_equals(self.values[var], value))
    }

    /// Largest remaining time among running operators (0 if none).
    #[must_use]
    pub fn max_remaining_time(&self) -> f64 {
        self.operators
            .iter()
            .map(|op| op.time_increment)
            .fold(0.0, f64::max)
    }

    fn sort(&mut self) {
        self.scheduled_effects.sort_by(ScheduledEffect::canonical_cmp);
        self.conds_over_all.sort_by(ScheduledCondition::canonical_cmp);
        self.conds_at_end.sort_by(ScheduledCondition::canonical_cmp);
    }

    /// Start operator `id` now.
    ///
    /// The caller checks applicability first. With `epsilonize`, the clock
    /// advances by one internal epsilon step and effects due within it fire.
    #[must_use]
    pub fn apply(&self, task: &Task, id: OperatorId, epsilonize: bool) -> Self {
        let op = task.operator(id);
        let mut succ = self.clone();
        let sep = if epsilonize { EPS_TIME } else { 0.0 };
        if epsilonize {
            succ.eps_insertions += 1;
        }
        succ.timestamp = self.timestamp + sep;
        let duration = op.duration(self);

        for eff in &op.pre_post_end {
            if eff.does_fire(&self.values) {
                succ.scheduled_effects.push(ScheduledEffect::new(duration, eff));
            }
        }

        let mut pending = std::mem::take(&mut succ.scheduled_effects);
        pending.retain_mut(|eff| {
            let due = eff.time_increment + EPSILON < sep;
            if due {
                if succ.satisfies(&eff.effect.cond_end) {
                    eff.effect.apply_to(&mut succ.values);
                }
            } else {
                eff.time_increment -= sep;
            }
            !due
        });
        succ.scheduled_effects = pending;

        for eff in &op.pre_post_start {
            debug_assert!(eff.cond_end.is_empty());
            if eff.does_fire(&self.values) {
                eff.apply_to(&mut succ.values);
            }
        }

        task.axioms.evaluate(&mut succ.values);

        succ.conds_over_all.extend(op.prevail_overall.iter().map(|cond| ScheduledCondition {
            time_increment: duration,
            cond: *cond,
        }));
        age_conditions(&mut succ.conds_over_all, sep, |t| double_equals(t, 0.0));

        succ.conds_at_end.extend(op.prevail_end.iter().map(|cond| ScheduledCondition {
            time_increment: duration,
            cond: *cond,
        }));
        age_conditions(&mut succ.conds_at_end, sep, |t| t < 0.0);

        succ.operators.push(ScheduledOperator {
            op: id,
            time_increment: duration,
        });
        for running in &mut succ.operators {
            running.time_increment -= running.time_increment.min(sep);
        }
        succ.operators
            .retain(|running| !(double_equals(running.time_increment, 0.0) || running.time_increment <= 0.0));

        succ.sort();
        succ
    }

    /// Absolute time of the next operator end, or the current time if
    /// nothing is running.
    #[must_use]
    pub fn next_happening(&self) -> f64 {
        let next = self
            .operators
            .iter()
            .map(|op| op.time_increment)
            .filter(|t| *t > 0.0)
            .fold(REALLY_BIG, f64::min);
        let next = if double_equals(next, REALLY_BIG) { 0.0 } else { next };
        next + self.timestamp
    }

    /// Number of consecutive epsilon steps at which further operators end
    /// right after `offset`.
    #[must_use]
    pub fn eps_time_steps(&self, offset: f64) -> u32 {
        let mut steps = 0u32;
        while self.operators.iter().any(|op| {
            double_equals(
                op.time_increment - offset,
                f64::from(steps) * EPS_TIME + EPS_TIME,
            )
        }) {
            steps += 1;
        }
        steps
    }

    /// Advance the clock.
    ///
    /// Without `to_intermediate` the state moves to the next happening,
    /// fires the effects due then and drops expired entries. With it, the
    /// state moves half-way to the next happening and nothing fires; this
    /// probes over-all conditions between two happenings. `skip_eps_steps`
    /// additionally jumps over the epsilon steps of operators ending just
    /// after the happening (only with `epsilonize`).
    #[must_use]
    pub fn let_time_pass(
        &self,
        task: &Task,
        to_intermediate: bool,
        skip_eps_steps: bool,
        epsilonize: bool,
    ) -> Self {
        let mut succ = self.clone();
        let nh = self.next_happening();
        succ.timestamp = if double_equals(nh, self.timestamp) || !to_intermediate {
            nh
        } else {
            self.timestamp + 0.5 * (nh - self.timestamp)
        };
        let mut time_diff = succ.timestamp - self.timestamp;

        if skip_eps_steps && epsilonize && !to_intermediate {
            let extra = f64::from(self.eps_time_steps(nh - self.timestamp) + 1) * EPS_TIME;
            time_diff += extra;
            succ.timestamp += extra;
        }

        if !to_intermediate {
            for eff in &self.scheduled_effects {
                if eff.time_increment < time_diff + EPSILON && succ.satisfies(&eff.effect.cond_end) {
                    eff.effect.apply_to(&mut succ.values);
                }
            }
            task.axioms.evaluate(&mut succ.values);
        }

        for eff in &mut succ.scheduled_effects {
            eff.time_increment -= time_diff;
        }
        for cond in succ.conds_over_all.iter_mut().chain(succ.conds_at_end.iter_mut()) {
            cond.time_increment -= time_diff;
        }
        for running in &mut succ.operators {
            running.time_increment -= time_diff;
        }

        if !to_intermediate {
            let values = succ.values.clone();
            succ.scheduled_effects.retain(|eff| {
                eff.time_increment >= EPSILON && all_hold(&eff.effect.cond_overall, &values)
            });
            succ.conds_over_all.retain(|cond| cond.time_increment >= EPSILON);
            succ.conds_at_end.retain(|cond| cond.time_increment >= EPSILON);
            succ.operators
                .retain(|running| !(running.time_increment < EPSILON || running.time_increment <= 0.0));
        }

        succ.sort();
        succ
    }

    /// Every condition due now holds.
    #[must_use]
    pub fn is_consistent_now(&self) -> bool {
        self.conds_over_all.iter().all(|c| c.cond.holds(&self.values))
            && self
                .conds_at_end
                .iter()
                .filter(|c| double_equals(c.time_increment, 0.0))
                .all(|c| c.cond.holds(&self.values))
    }

    /// Progress the state through all future happenings (and the midpoints
    /// between them) and check consistency at each point.
    pub fn is_consistent_when_progressed(
        &self,
        task: &Task,
        epsilonize: bool,
        mut collect: Option<&mut TimedSymbolicStates>,
    ) -> bool {
        let mut last_time = -1.0;
        let mut current_time = self.timestamp;
        let mut progression = self.clone();
        let mut to_intermediate = true;

        while !double_equals(current_time, last_time) {
            if !progression.is_consistent_now() {
                return false;
            }
            progression = progression.let_time_pass(task, to_intermediate, false, epsilonize);
            to_intermediate = !to_intermediate;
            last_time = current_time;
            current_time = progression.timestamp;

            if !to_intermediate && let Some(states) = collect.as_deref_mut() {
                states.push((progression.symbolic_values(task), progression.timestamp));
            }
        }
        true
    }

    /// Values of the logical and primitive numeric variables.
    #[must_use]
    pub fn symbolic_values(&self, task: &Task) -> Vec<f64> {
        self.values
            .iter()
            .enumerate()
            .filter(|(var, _)| task.var_type(*var).is_state_relevant())
            .map(|(_, value)| *value)
            .collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::tests::MOVE_TASK;

    fn move_task() -> Task {
        Task::parse(MOVE_TASK).expect("parse")
    }

    #[test]
    fn apply_schedules_end_effect() {
        let task = move_task();
        let init = &task.initial_state;
        let started = init.apply(&task, OperatorId(0), false);
        assert_eq!(started.values[0], 0.0);
        assert_eq!(started.scheduled_effects.len(), 1);
        assert_eq!(started.operators.len(), 1);
        assert_eq!(started.max_remaining_time(), 1.0);
        assert_eq!(started.next_happening(), 1.0);
        // Parent unchanged.
        assert!(init.operators.is_empty());
    }

    #[test]
    fn let_time_pass_fires_due_effects() {
        let task = move_task();
        let started = task.initial_state.apply(&task, OperatorId(0), false);
        let half = started.let_time_pass(&task, true, false, false);
        assert_eq!(half.timestamp, 0.5);
        assert_eq!(half.values[0], 0.0);
        assert_eq!(half.operators.len(), 1);

        let done = started.let_time_pass(&task, false, false, false);
        assert_eq!(done.timestamp, 1.0);
        assert_eq!(done.values[0], 1.0);
        assert!(done.operators.is_empty());
        assert!(done.scheduled_effects.is_empty());
        assert!(done.satisfies_goal(&task.goal));
    }

    #[test]
    fn idle_state_does_not_move() {
        let task = move_task();
        let idle = task.initial_state.let_time_pass(&task, false, false, false);
        assert_eq!(idle.timestamp, 0.0);
        assert_eq!(idle, task.initial_state);
    }

    #[test]
    fn epsilonized_apply_advances_clock() {
        let task = move_task();
        let started = task.initial_state.apply(&task, OperatorId(0), true);
        assert!(double_equals(started.timestamp, EPS_TIME));
        assert_eq!(started.eps_insertions, 1);
        assert!(double_equals(started.operators[0].time_increment, 1.0 - EPS_TIME));
    }

    #[test]
    fn over_all_condition_violation_is_detected() {
        let task = move_task();
        let mut state = task.initial_state.clone();
        state.conds_over_all.push(ScheduledCondition {
            time_increment: 2.0,
            cond: Prevail::new(0, 1.0),
        });
        assert!(!state.is_consistent_now());
        assert!(!state.is_consistent_when_progressed(&task, false, None));
    }

    #[test]
    fn progression_collects_symbolic_states() {
        let task = move_task();
        let started = task.initial_state.apply(&task, OperatorId(0), false);
        let mut seen = TimedSymbolicStates::new();
        assert!(started.is_consistent_when_progressed(&task, false, Some(&mut seen)));
        assert!(seen.iter().any(|(values, t)| values[0] == 1.0 && *t == 1.0));
    }

    #[test]
    fn effects_sort_by_time_then_variable() {
        let late = ScheduledEffect::new(2.0, &PrePost::set(0, None, 1.0));
        let early = ScheduledEffect::new(1.0, &PrePost::set(1, None, 1.0));
        let early_low_var = ScheduledEffect::new(1.0, &PrePost::set(0, None, 1.0));
        let mut effects = vec![late.clone(), early.clone(), early_low_var.clone()];
        effects.sort_by(ScheduledEffect::canonical_cmp);
        assert_eq!(effects, vec![early_low_var, early, late]);
    }
}
