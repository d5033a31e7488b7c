//! Blind heuristic: zero on goal states without pending effects, otherwise
//! the timestamp plus one.

use super::{Heuristic, HeuristicCore};
use crate::state::TimeStampedState;
use crate::task::Task;

#[derive(Debug, Clone, Default)]
pub struct NoHeuristic {
    core: HeuristicCore,
}

impl NoHeuristic {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Heuristic for NoHeuristic {
    fn name(&self) -> &'static str {
        "blind"
    }

    fn core(&self) -> &HeuristicCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut HeuristicCore {
        &mut self.core
    }

    fn compute_heuristic(&mut self, task: &Task, state: &TimeStampedState) -> f64 {
        if state.satisfies_goal(&task.goal) && state.scheduled_effects.is_empty() {
            0.0
        } else {
            state.timestamp + 1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::tests::MOVE_TASK;
    use crate::types::OperatorId;

    #[test]
    fn zero_only_on_settled_goal() {
        let task = Task::parse(MOVE_TASK).expect("parse");
        let mut h = NoHeuristic::new();
        assert_eq!(h.evaluate(&task, &task.initial_state), 1.0);

        let started = task.initial_state.apply(&task, OperatorId(0), false);
        assert_eq!(h.evaluate(&task, &started), 1.0);

        let done = started.let_time_pass(&task, false, true, false);
        assert_eq!(h.evaluate(&task, &done), 0.0);
        assert!(!h.is_dead_end());
        assert_eq!(h.num_computations(), 3);
    }
}
