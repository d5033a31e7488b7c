//! # Durative Operators
//!
//! Immutable operator definitions with staged conditions and effects.
//!
//! An operator carries prevail conditions for its start, its whole duration
//! and its end, plus effects at start and at end. Every effect can be
//! conditional on further start/overall/end conditions. Discrete effects set
//! a value (optionally requiring a previous one), numeric effects update a
//! variable from another variable's value.

use crate::parser::TokenReader;
use crate::primitives::{EPS_TIME, double_equals, optional_equals};
use crate::state::{TimeStampedState, TimedSymbolicStates};
use crate::task::{Task, Variable};
use crate::types::{AssignmentOp, BinaryOp, OperatorId, TempusError};

// =============================================================================
// CONDITIONS AND EFFECTS
// =============================================================================

/// A condition `var = prev`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prevail {
    pub var: usize,
    pub prev: f64,
}

impl Prevail {
    /// Create a new condition.
    #[must_use]
    pub const fn new(var: usize, prev: f64) -> Self {
        Self { var, prev }
    }

    /// True if the condition holds in the given values.
    #[must_use]
    pub fn holds(&self, values: &[f64]) -> bool {
        values
            .get(self.var)
            .is_some_and(|value| double_equals(*value, self.prev))
    }

    pub(crate) fn read(
        reader: &mut TokenReader<'_>,
        variable_count: usize,
    ) -> Result<Self, TempusError> {
        let var = reader.read_index(variable_count, "variable")?;
        let prev = reader.read_f64()?;
        Ok(Self { var, prev })
    }

    pub(crate) fn read_list(
        reader: &mut TokenReader<'_>,
        variable_count: usize,
    ) -> Result<Vec<Self>, TempusError> {
        let count = reader.read_usize()?;
        (0..count)
            .map(|_| Self::read(reader, variable_count))
            .collect()
    }
}

/// True if every condition holds.
#[must_use]
pub fn all_hold(conditions: &[Prevail], values: &[f64]) -> bool {
    conditions.iter().all(|cond| cond.holds(values))
}

/// What an effect writes into its variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Effect {
    /// Discrete assignment, optionally requiring `pre` beforehand.
    Set { pre: Option<f64>, post: f64 },
    /// Numeric update `var op= values[operand]`.
    Update { op: AssignmentOp, operand: usize },
}

impl Effect {
    /// Required previous value of a discrete effect.
    #[must_use]
    pub const fn pre(&self) -> Option<f64> {
        match self {
            Self::Set { pre, .. } => *pre,
            Self::Update { .. } => None,
        }
    }

    /// Written value of a discrete effect.
    #[must_use]
    pub const fn post(&self) -> Option<f64> {
        match self {
            Self::Set { post, .. } => Some(*post),
            Self::Update { .. } => None,
        }
    }
}

/// A (possibly conditional) effect on one variable.
#[derive(Debug, Clone, PartialEq)]
pub struct PrePost {
    pub var: usize,
    pub effect: Effect,
    pub cond_start: Vec<Prevail>,
    pub cond_overall: Vec<Prevail>,
    pub cond_end: Vec<Prevail>,
}

impl PrePost {
    /// Unconditional discrete effect.
    #[must_use]
    pub fn set(var: usize, pre: Option<f64>, post: f64) -> Self {
        Self {
            var,
            effect: Effect::Set { pre, post },
            cond_start: Vec::new(),
            cond_overall: Vec::new(),
            cond_end: Vec::new(),
        }
    }

    /// Unconditional numeric effect.
    #[must_use]
    pub fn update(var: usize, op: AssignmentOp, operand: usize) -> Self {
        Self {
            var,
            effect: Effect::Update { op, operand },
            cond_start: Vec::new(),
            cond_overall: Vec::new(),
            cond_end: Vec::new(),
        }
    }

    /// The effect's own precondition holds (or it has none).
    #[must_use]
    pub fn precondition_holds(&self, values: &[f64]) -> bool {
        match self.effect.pre() {
            Some(pre) => values
                .get(self.var)
                .is_some_and(|value| double_equals(*value, pre)),
            None => true,
        }
    }

    /// The at-start conditions of the effect hold.
    #[must_use]
    pub fn does_fire(&self, values: &[f64]) -> bool {
        all_hold(&self.cond_start, values)
    }

    /// Write the effect into `values`.
    pub fn apply_to(&self, values: &mut [f64]) {
        let new_value = match self.effect {
            Effect::Set { post, .. } => post,
            Effect::Update { op, operand } => {
                let (Some(current), Some(operand)) =
                    (values.get(self.var), values.get(operand))
                else {
                    return;
                };
                op.apply(*current, *operand)
            }
        };
        if let Some(slot) = values.get_mut(self.var) {
            *slot = new_value;
        }
    }

    fn read(
        reader: &mut TokenReader<'_>,
        variables: &[Variable],
    ) -> Result<Self, TempusError> {
        let n = variables.len();
        let cond_start = Prevail::read_list(reader, n)?;
        let cond_overall = Prevail::read_list(reader, n)?;
        let cond_end = Prevail::read_list(reader, n)?;
        let var = reader.read_index(n, "variable")?;
        let effect = if variables[var].var_type.is_functional() {
            let op = reader.parse::<AssignmentOp>()?;
            let operand = reader.read_index(n, "variable")?;
            Effect::Update { op, operand }
        } else {
            let pre = reader.read_f64()?;
            let post = reader.read_f64()?;
            Effect::Set {
                pre: if pre == -1.0 { None } else { Some(pre) },
                post,
            }
        };
        Ok(Self {
            var,
            effect,
            cond_start,
            cond_overall,
            cond_end,
        })
    }

    fn read_list(
        reader: &mut TokenReader<'_>,
        variables: &[Variable],
        into: &mut Vec<Self>,
    ) -> Result<(), TempusError> {
        let count = reader.read_usize()?;
        for _ in 0..count {
            into.push(Self::read(reader, variables)?);
        }
        Ok(())
    }
}

// =============================================================================
// OPERATOR
// =============================================================================

/// A grounded durative action.
#[derive(Debug, Clone, PartialEq)]
pub struct Operator {
    pub name: String,
    pub duration_var: usize,
    pub prevail_start: Vec<Prevail>,
    pub prevail_overall: Vec<Prevail>,
    pub prevail_end: Vec<Prevail>,
    pub pre_post_start: Vec<PrePost>,
    pub pre_post_end: Vec<PrePost>,
}

impl Operator {
    /// Operator without any condition or effect.
    #[must_use]
    pub fn new(name: impl Into<String>, duration_var: usize) -> Self {
        Self {
            name: name.into(),
            duration_var,
            prevail_start: Vec::new(),
            prevail_overall: Vec::new(),
            prevail_end: Vec::new(),
            pre_post_start: Vec::new(),
            pre_post_end: Vec::new(),
        }
    }

    /// Read one `begin_operator ... end_operator` block.
    pub fn read(
        reader: &mut TokenReader<'_>,
        variables: &[Variable],
    ) -> Result<Self, TempusError> {
        reader.expect_magic("begin_operator")?;
        let name = reader.rest_of_line()?.to_string();
        let comparator = reader.parse::<BinaryOp>()?;
        if comparator != BinaryOp::Eq {
            return Err(TempusError::InvalidTask(format!(
                "duration constraint of '{}' must be of the form (= ?duration term), got '{}'",
                name, comparator
            )));
        }
        let n = variables.len();
        let duration_var = reader.read_index(n, "duration variable")?;
        let prevail_start = Prevail::read_list(reader, n)?;
        let prevail_overall = Prevail::read_list(reader, n)?;
        let prevail_end = Prevail::read_list(reader, n)?;

        let mut pre_post_start = Vec::new();
        let mut pre_post_end = Vec::new();
        // Discrete lists, then numeric lists, merged per phase.
        PrePost::read_list(reader, variables, &mut pre_post_start)?;
        PrePost::read_list(reader, variables, &mut pre_post_end)?;
        PrePost::read_list(reader, variables, &mut pre_post_start)?;
        PrePost::read_list(reader, variables, &mut pre_post_end)?;
        reader.expect_magic("end_operator")?;

        Ok(Self {
            name,
            duration_var,
            prevail_start,
            prevail_overall,
            prevail_end,
            pre_post_start,
            pre_post_end,
        })
    }

    /// Duration of the operator if started in `state`.
    #[must_use]
    pub fn duration(&self, state: &TimeStampedState) -> f64 {
        state.value(self.duration_var)
    }

    /// Can the operator be started in `state`?
    ///
    /// Besides the start conditions this progresses the resulting state
    /// through all of its future happenings and rejects the operator if any
    /// intermediate point would be inconsistent. When `collect` is given, the
    /// symbolic states passed on the way are recorded.
    pub fn is_applicable(
        &self,
        id: OperatorId,
        task: &Task,
        state: &TimeStampedState,
        epsilonize: bool,
        collect: Option<&mut TimedSymbolicStates>,
    ) -> bool {
        if epsilonize
            && state
                .operators
                .iter()
                .any(|running| double_equals(running.time_increment, EPS_TIME))
        {
            return false;
        }
        if self.duration(state) < 0.0 {
            return false;
        }
        if !all_hold(&self.prevail_start, &state.values) {
            return false;
        }
        if !self
            .pre_post_start
            .iter()
            .all(|eff| eff.precondition_holds(&state.values))
        {
            return false;
        }
        // No two instances of the same ground operator may overlap.
        if state
            .operators
            .iter()
            .any(|running| task.operator(running.op).name == self.name)
        {
            return false;
        }
        let successor = state.apply(task, id, epsilonize);
        successor.is_consistent_when_progressed(task, epsilonize, collect)
    }

    /// True if `other` interferes with this operator: it destroys one of our
    /// conditions or preconditions, or writes a variable we write.
    #[must_use]
    pub fn is_disabled_by(&self, other: &Self) -> bool {
        if self.name == other.name {
            return false;
        }
        let other_effects = [&other.pre_post_start, &other.pre_post_end];
        let own_prevails = [&self.prevail_start, &self.prevail_overall, &self.prevail_end];
        let own_effects = [&self.pre_post_start, &self.pre_post_end];

        for conds in own_prevails {
            for effects in other_effects {
                if prevail_deleted(conds, effects) {
                    return true;
                }
            }
        }
        for effs in own_effects {
            for effects in other_effects {
                if precondition_deleted(effs, effects) {
                    return true;
                }
            }
        }
        own_effects.iter().any(|effs| {
            other_effects.iter().any(|effects| {
                effs.iter()
                    .any(|a| effects.iter().any(|b| a.var == b.var))
            })
        })
    }

    /// True if one of our effects achieves a condition or precondition of
    /// `other`.
    #[must_use]
    pub fn enables(&self, other: &Self) -> bool {
        if self.name == other.name {
            return false;
        }
        let own_effects = [&self.pre_post_start, &self.pre_post_end];
        let other_prevails = [
            &other.prevail_start,
            &other.prevail_overall,
            &other.prevail_end,
        ];
        let other_effects = [&other.pre_post_start, &other.pre_post_end];

        for effs in own_effects {
            for conds in other_prevails {
                let achieves = effs.iter().any(|eff| {
                    conds.iter().any(|cond| {
                        eff.var == cond.var && optional_equals(eff.effect.post(), Some(cond.prev))
                    })
                });
                if achieves {
                    return true;
                }
            }
            for effects in other_effects {
                let achieves = effs.iter().any(|eff| {
                    effects.iter().any(|other_eff| {
                        eff.var == other_eff.var
                            && optional_equals(eff.effect.post(), other_eff.effect.pre())
                    })
                });
                if achieves {
                    return true;
                }
            }
        }
        false
    }
}

fn prevail_deleted(conds: &[Prevail], effects: &[PrePost]) -> bool {
    conds.iter().any(|cond| {
        effects.iter().any(|eff| {
            cond.var == eff.var && !optional_equals(Some(cond.prev), eff.effect.post())
        })
    })
}

fn precondition_deleted(effs: &[PrePost], effects: &[PrePost]) -> bool {
    effs.iter().any(|own| {
        effects.iter().any(|eff| {
            own.var == eff.var && !optional_equals(own.effect.pre(), eff.effect.post())
        })
    })
}

// =============================================================================
// TESTS
// =============================================================================
