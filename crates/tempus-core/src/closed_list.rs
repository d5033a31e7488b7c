//! # Closed List
//!
//! Arena of expanded states with predecessor links.
//!
//! States are grouped by their logical content: the values of logical and
//! primitive numeric variables plus the pending effects and conditions,
//! ignoring the timestamp. Several entries may share a key; the earliest
//! one decides dominance and is followed when tracing a path back to the
//! initial state.
//!
//! Entries are addressed by [`StateHandle`], an index into the arena, so
//! predecessor links stay valid while the arena grows.

use crate::plan::{Plan, PlanStep, PlanTrace};
use crate::primitives::{EPSILON, REALLY_BIG, double_equals};
use crate::state::{ScheduledCondition, ScheduledEffect, TimeStampedState};
use crate::task::{Effect, Prevail, Task};
use crate::types::{Step, VariableType};
use std::collections::BTreeMap;
use std::hash::{DefaultHasher, Hash, Hasher};

/// Index of a state in the closed list.
pub type StateHandle = usize;

// =============================================================================
// LOGICAL EQUIVALENCE
// =============================================================================

/// Hash of the parts of a state that logical equivalence compares exactly.
///
/// Numeric values only take part in the tolerant comparison, so they are
/// left out here.
#[must_use]
pub fn logical_hash(var_types: &[VariableType], state: &TimeStampedState) -> u64 {
    let mut hasher = DefaultHasher::new();
    for (value, var_type) in state.values.iter().zip(var_types) {
        if *var_type == VariableType::Logical {
            (value.round() as i64).hash(&mut hasher);
        }
    }
    state.scheduled_effects.len().hash(&mut hasher);
    state.conds_over_all.len().hash(&mut hasher);
    state.conds_at_end.len().hash(&mut hasher);
    hasher.finish()
}

/// Same logical content, ignoring timestamps and running operators.
#[must_use]
pub fn logically_equal(
    var_types: &[VariableType],
    a: &TimeStampedState,
    b: &TimeStampedState,
) -> bool {
    debug_assert_eq!(a.values.len(), b.values.len());
    a.scheduled_effects.len() == b.scheduled_effects.len()
        && a.conds_over_all.len() == b.conds_over_all.len()
        && a.conds_at_end.len() == b.conds_at_end.len()
        && a.scheduled_effects
            .iter()
            .zip(&b.scheduled_effects)
            .all(|(x, y)| effects_equal(x, y))
        && a.conds_over_all
            .iter()
            .zip(&b.conds_over_all)
            .all(|(x, y)| conditions_equal(x, y))
        && a.conds_at_end
            .iter()
            .zip(&b.conds_at_end)
            .all(|(x, y)| conditions_equal(x, y))
        && a.values
            .iter()
            .zip(&b.values)
            .zip(var_types)
            .filter(|(_, var_type)| var_type.is_state_relevant())
            .all(|((x, y), _)| double_equals(*x, *y))
}

fn prevails_equal(a: &[Prevail], b: &[Prevail]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b)
            .all(|(x, y)| x.var == y.var && double_equals(x.prev, y.prev))
}

fn conditions_equal(a: &ScheduledCondition, b: &ScheduledCondition) -> bool {
    double_equals(a.time_increment, b.time_increment)
        && a.cond.var == b.cond.var
        && double_equals(a.cond.prev, b.cond.prev)
}

fn effects_equal(a: &ScheduledEffect, b: &ScheduledEffect) -> bool {
    let same_effect = match (a.effect.effect, b.effect.effect) {
        (Effect::Set { pre: pa, post: qa }, Effect::Set { pre: pb, post: qb }) => {
            double_equals(pa.unwrap_or(-1.0), pb.unwrap_or(-1.0)) && double_equals(qa, qb)
        }
        (
            Effect::Update {
                op: oa,
                operand: va,
            },
            Effect::Update {
                op: ob,
                operand: vb,
            },
        ) => oa == ob && va == vb,
        _ => false,
    };
    double_equals(a.time_increment, b.time_increment)
        && a.effect.var == b.effect.var
        && same_effect
        && prevails_equal(&a.effect.cond_start, &b.effect.cond_start)
        && prevails_equal(&a.effect.cond_overall, &b.effect.cond_overall)
        && prevails_equal(&a.effect.cond_end, &b.effect.cond_end)
}

// =============================================================================
// CLOSED LIST
// =============================================================================

#[derive(Debug, Clone)]
struct ClosedEntry {
    state: TimeStampedState,
    predecessor: Option<StateHandle>,
    step: Option<Step>,
}

/// Expanded states, keyed by logical content.
#[derive(Debug, Clone)]
pub struct ClosedList {
    var_types: Vec<VariableType>,
    entries: Vec<ClosedEntry>,
    buckets: BTreeMap<u64, Vec<StateHandle>>,
}

impl ClosedList {
    /// Create an empty closed list for `task`.
    #[must_use]
    pub fn new(task: &Task) -> Self {
        Self {
            var_types: task.variables.iter().map(|v| v.var_type).collect(),
            entries: Vec::new(),
            buckets: BTreeMap::new(),
        }
    }

    /// Store `state`, reached from `predecessor` by `step`.
    pub fn insert(
        &mut self,
        state: TimeStampedState,
        predecessor: Option<StateHandle>,
        step: Option<Step>,
    ) -> StateHandle {
        let handle = self.entries.len();
        let key = logical_hash(&self.var_types, &state);
        self.buckets.entry(key).or_default().push(handle);
        self.entries.push(ClosedEntry {
            state,
            predecessor,
            step,
        });
        handle
    }

    /// Forget every state.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.buckets.clear();
    }

    /// The stored state behind a handle.
    #[must_use]
    pub fn get(&self, handle: StateHandle) -> &TimeStampedState {
        &self.entries[handle].state
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn same_key<'a>(&'a self, state: &'a TimeStampedState) -> impl Iterator<Item = StateHandle> + 'a {
        let key = logical_hash(&self.var_types, state);
        self.buckets
            .get(&key)
            .into_iter()
            .flatten()
            .copied()
            .filter(move |&handle| {
                logically_equal(&self.var_types, &self.entries[handle].state, state)
            })
    }

    /// True if an equivalent state no later than `state` was closed.
    #[must_use]
    pub fn contains(&self, state: &TimeStampedState) -> bool {
        let diff = state.timestamp - self.min_timestamp_of_key(state);
        !(diff + EPSILON < 0.0)
    }

    /// Earliest timestamp among equivalent closed states.
    #[must_use]
    pub fn min_timestamp_of_key(&self, state: &TimeStampedState) -> f64 {
        self.same_key(state)
            .map(|handle| self.entries[handle].state.timestamp)
            .fold(REALLY_BIG, f64::min)
    }

    /// The earliest equivalent entry; ties go to the first inserted.
    fn best_entry(&self, state: &TimeStampedState) -> Option<StateHandle> {
        let mut best: Option<StateHandle> = None;
        for handle in self.same_key(state) {
            let replace = match best {
                None => true,
                Some(current) => {
                    self.entries[handle].state.timestamp + EPSILON
                        < self.entries[current].state.timestamp
                }
            };
            if replace {
                best = Some(handle);
            }
        }
        best
    }

    /// Walk predecessor links from `state` back to the initial state.
    ///
    /// Returns the plan and the visited states, both in forward order. When
    /// an earlier equivalent state was found on the way, the part of the
    /// path after it is shifted back by the time saved.
    #[must_use]
    pub fn trace_path(&self, task: &Task, state: &TimeStampedState) -> (Plan, PlanTrace) {
        let mut plan = Plan::new();
        let mut trace = vec![state.clone()];
        let mut current = state.clone();
        loop {
            let Some(best) = self.best_entry(&current) else {
                break;
            };
            let entry = &self.entries[best];
            let Some(pred) = entry.predecessor else {
                break;
            };
            let diff = current.timestamp - entry.state.timestamp;
            if diff > EPSILON && trace.len() > 1 {
                for step in &mut plan {
                    step.start_time -= diff;
                }
                for visited in &mut trace {
                    visited.timestamp -= diff;
                }
            }
            let pred_state = &self.entries[pred].state;
            if let Some(Step::Apply(op)) = entry.step {
                plan.push(PlanStep {
                    start_time: pred_state.timestamp,
                    duration: task.operator(op).duration(pred_state),
                    op,
                });
            }
            trace.push(pred_state.clone());
            current = pred_state.clone();
        }
        plan.reverse();
        trace.reverse();
        (plan, trace)
    }

    /// Sum of the durations of the operators on the best path to `state`.
    #[must_use]
    pub fn cost_of_path(&self, task: &Task, state: &TimeStampedState) -> f64 {
        let mut cost = 0.0;
        let mut current = state;
        while let Some(best) = self.best_entry(current) {
            let entry = &self.entries[best];
            let Some(pred) = entry.predecessor else {
                break;
            };
            let pred_state = &self.entries[pred].state;
            if let Some(Step::Apply(op)) = entry.step {
                cost += task.operator(op).duration(pred_state);
            }
            current = pred_state;
        }
        cost
    }
}

// =============================================================================
// TESTS
// =============================================================================
