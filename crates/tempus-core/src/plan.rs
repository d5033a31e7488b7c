//! # Plans
//!
//! Timed operator sequences extracted from the closed list, and their
//! textual form.
//!
//! Each plan line reads `start: (name) [duration]` with eight decimals.

use crate::primitives::double_equals;
use crate::state::TimeStampedState;
use crate::task::Task;
use crate::types::OperatorId;
use serde::Serialize;
use std::fmt::Write as _;

/// One started operator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlanStep {
    pub start_time: f64,
    pub duration: f64,
    pub op: OperatorId,
}

impl PlanStep {
    /// Time the operator ends.
    #[must_use]
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }
}

/// Plan steps in start order.
pub type Plan = Vec<PlanStep>;

/// States visited by a plan, from the initial state to the goal.
pub type PlanTrace = Vec<TimeStampedState>;

/// Latest end time of any step.
#[must_use]
pub fn makespan(plan: &[PlanStep]) -> f64 {
    plan.iter().map(PlanStep::end_time).fold(0.0, f64::max)
}

/// Sum of step durations.
#[must_use]
pub fn sum_of_subgoals(plan: &[PlanStep]) -> f64 {
    plan.iter().map(|step| step.duration).sum()
}

/// Sum over goals of the time from which each goal stays satisfied until the
/// end of the trace.
#[must_use]
pub fn sum_of_subgoal_times(task: &Task, trace: &[TimeStampedState]) -> f64 {
    task.goal
        .iter()
        .map(|&(var, value)| {
            let mut since = 0.0;
            for state in trace.iter().rev() {
                if double_equals(state.value(var), value) {
                    since = state.timestamp;
                } else {
                    break;
                }
            }
            since
        })
        .sum()
}

/// Render a plan, one step per line.
#[must_use]
pub fn format_plan(task: &Task, plan: &[PlanStep]) -> String {
    let mut out = String::new();
    for step in plan {
        let _ = writeln!(
            out,
            "{:.8}: ({}) [{:.8}]",
            step.start_time,
            task.operator(step.op).name,
            step.duration
        );
    }
    out
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::tests::MOVE_TASK;

    fn step(start_time: f64, duration: f64) -> PlanStep {
        PlanStep {
            start_time,
            duration,
            op: OperatorId(0),
        }
    }

    #[test]
    fn makespan_is_latest_end() {
        let plan = vec![step(0.0, 3.0), step(1.0, 1.0)];
        assert_eq!(makespan(&plan), 3.0);
        assert_eq!(sum_of_subgoals(&plan), 4.0);
        assert_eq!(makespan(&[]), 0.0);
    }

    #[test]
    fn format_uses_eight_decimals() {
        let task = Task::parse(MOVE_TASK).expect("parse");
        let text = format_plan(&task, &[step(0.0, 1.0)]);
        assert_eq!(text, "0.00000000: (Move) [1.00000000]\n");
    }

    #[test]
    fn subgoal_time_counts_from_last_change() {
        let task = Task::parse(MOVE_TASK).expect("parse");
        let init = task.initial_state.clone();
        let mut reached = init.clone();
        reached.values[0] = 1.0;
        reached.timestamp = 2.0;
        let mut later = reached.clone();
        later.timestamp = 3.0;
        assert_eq!(sum_of_subgoal_times(&task, &[init, reached, later]), 2.0);
    }
}
