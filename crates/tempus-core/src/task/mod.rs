//! # Planning Task
//!
//! The immutable problem instance every component works on.
//!
//! A [`Task`] is built exactly once by [`Task::parse`] and afterwards only
//! shared by reference: variables, initial state, goal, operators, axioms,
//! the successor generator, the causal graph and one transition graph per
//! variable.

mod operator;

pub use operator::{Effect, Operator, PrePost, Prevail, all_hold};

use crate::axioms::{AxiomEvaluator, LogicAxiom, NumericAxiom};
use crate::causal_graph::CausalGraph;
use crate::dtg::TransitionGraph;
use crate::parser::TokenReader;
use crate::state::TimeStampedState;
use crate::successor_generator::SuccessorGenerator;
use crate::types::{OperatorId, TempusError, VariableType};
use serde::Serialize;

// =============================================================================
// VARIABLES
// =============================================================================

/// A state variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    /// Number of values of a discrete variable, `-1` for numeric ones.
    pub domain: i32,
    /// Stratification layer of derived variables.
    pub layer: Option<usize>,
    pub var_type: VariableType,
}

impl Variable {
    /// Create a new variable.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        domain: i32,
        layer: Option<usize>,
        var_type: VariableType,
    ) -> Self {
        Self {
            name: name.into(),
            domain,
            layer,
            var_type,
        }
    }

    /// Number of values, zero for numeric variables.
    #[must_use]
    pub fn domain_size(&self) -> usize {
        usize::try_from(self.domain).unwrap_or(0)
    }

    /// True if the variable is computed by axioms.
    #[must_use]
    pub const fn is_derived(&self) -> bool {
        self.layer.is_some()
    }
}

fn read_variables(reader: &mut TokenReader<'_>) -> Result<Vec<Variable>, TempusError> {
    reader.expect_magic("begin_variables")?;
    let count = reader.read_usize()?;
    let mut variables = Vec::with_capacity(count);
    for _ in 0..count {
        let name = reader.next_token()?.to_string();
        let domain = reader.read_i32()?;
        let layer = reader.read_i32()?;
        let layer = if layer == -1 {
            None
        } else {
            Some(usize::try_from(layer).map_err(|_| {
                TempusError::Parse(format!("invalid axiom layer {} of '{}'", layer, name))
            })?)
        };
        let var_type = if domain == -1 {
            VariableType::PrimitiveFunctional
        } else if domain >= 0 {
            VariableType::Logical
        } else {
            return Err(TempusError::Parse(format!(
                "invalid domain {} of variable '{}'",
                domain, name
            )));
        };
        variables.push(Variable::new(name, domain, layer, var_type));
    }
    reader.expect_magic("end_variables")?;
    Ok(variables)
}

// =============================================================================
// TASK
// =============================================================================

/// A complete, read-only planning task.
#[derive(Debug, Clone)]
pub struct Task {
    pub variables: Vec<Variable>,
    pub goal: Vec<(usize, f64)>,
    pub operators: Vec<Operator>,
    pub axioms: AxiomEvaluator,
    pub initial_state: TimeStampedState,
    pub successor_generator: SuccessorGenerator,
    pub causal_graph: CausalGraph,
    pub transition_graphs: Vec<TransitionGraph>,
    pub contains_universal_conditions: bool,
    /// Request for the polynomial-time method, which is not available.
    pub poly_time_method: bool,
}

impl Task {
    /// Read a task from its textual representation.
    pub fn parse(input: &str) -> Result<Self, TempusError> {
        let mut reader = TokenReader::new(input);
        let poly_time_method = reader.read_bool()?;
        if poly_time_method {
            tracing::info!("poly-time method is not supported, running the regular search");
        }

        let mut variables = read_variables(&mut reader)?;
        let n = variables.len();

        reader.expect_magic("begin_state")?;
        let mut values = Vec::with_capacity(n);
        for _ in 0..n {
            values.push(reader.read_f64()?);
        }
        reader.expect_magic("end_state")?;

        reader.expect_magic("begin_goal")?;
        let goal_count = reader.read_usize()?;
        let mut goal = Vec::with_capacity(goal_count);
        for _ in 0..goal_count {
            let var = reader.read_index(n, "goal variable")?;
            let value = reader.read_f64()?;
            goal.push((var, value));
        }
        reader.expect_magic("end_goal")?;

        let op_count = reader.read_usize()?;
        let mut operators = Vec::with_capacity(op_count);
        for _ in 0..op_count {
            operators.push(Operator::read(&mut reader, &variables)?);
        }

        let logic_count = reader.read_usize()?;
        let mut logic_axioms = Vec::with_capacity(logic_count);
        for _ in 0..logic_count {
            logic_axioms.push(LogicAxiom::read(&mut reader, n)?);
        }
        let numeric_count = reader.read_usize()?;
        let mut numeric_axioms = Vec::with_capacity(numeric_count);
        for _ in 0..numeric_count {
            let axiom = NumericAxiom::read(&mut reader, n)?;
            variables[axiom.affected].var_type = if axiom.op.is_comparison() {
                VariableType::Comparison
            } else {
                VariableType::SubtermFunctional
            };
            numeric_axioms.push(axiom);
        }

        let axioms = AxiomEvaluator::new(&variables, values.clone(), logic_axioms, numeric_axioms)?;
        let initial_state = TimeStampedState::initial(values, &axioms);

        reader.expect_magic("begin_SG")?;
        let successor_generator = SuccessorGenerator::read(&mut reader, &variables, op_count)?;
        reader.expect_magic("end_SG")?;

        let causal_graph = CausalGraph::read(&mut reader, &variables)?;
        let transition_graphs =
            TransitionGraph::read_all(&mut reader, &variables, &operators, &causal_graph)?;

        let contains_universal_conditions = if reader.is_exhausted() {
            false
        } else {
            reader.read_bool()?
        };

        tracing::debug!(
            variables = n,
            operators = operators.len(),
            goals = goal.len(),
            "task parsed"
        );

        Ok(Self {
            variables,
            goal,
            operators,
            axioms,
            initial_state,
            successor_generator,
            causal_graph,
            transition_graphs,
            contains_universal_conditions,
            poly_time_method,
        })
    }

    /// Look up an operator.
    #[must_use]
    pub fn operator(&self, id: OperatorId) -> &Operator {
        &self.operators[id.index()]
    }

    /// Type of a variable.
    #[must_use]
    pub fn var_type(&self, var: usize) -> VariableType {
        self.variables[var].var_type
    }

    /// Short description for reports.
    #[must_use]
    pub fn summary(&self) -> TaskSummary {
        let count = |t: VariableType| self.variables.iter().filter(|v| v.var_type == t).count();
        TaskSummary {
            variables: self.variables.len(),
            logical: count(VariableType::Logical),
            primitive_functional: count(VariableType::PrimitiveFunctional),
            subterm_functional: count(VariableType::SubtermFunctional),
            comparison: count(VariableType::Comparison),
            derived: self.variables.iter().filter(|v| v.is_derived()).count(),
            operators: self.operators.len(),
            logic_axioms: self.axioms.logic_axioms().len(),
            numeric_axioms: self.axioms.numeric_axioms().len(),
            goal: self
                .goal
                .iter()
                .map(|(var, value)| GoalEntry {
                    variable: self.variables[*var].name.clone(),
                    value: *value,
                })
                .collect(),
            contains_universal_conditions: self.contains_universal_conditions,
        }
    }
}

/// Counts and goal of a parsed task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSummary {
    pub variables: usize,
    pub logical: usize,
    pub primitive_functional: usize,
    pub subterm_functional: usize,
    pub comparison: usize,
    pub derived: usize,
    pub operators: usize,
    pub logic_axioms: usize,
    pub numeric_axioms: usize,
    pub goal: Vec<GoalEntry>,
    pub contains_universal_conditions: bool,
}

/// One goal condition by variable name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalEntry {
    pub variable: String,
    pub value: f64,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Two-valued `a`, duration `d = 1`, one operator `Move` turning `a`
    /// from 0 to 1 at its end.
    pub(crate) const MOVE_TASK: &str = "0
begin_variables
2
a 2 -1
d -1 -1
end_variables
begin_state
0 1
end_state
begin_goal
1
0 1
end_goal
1
begin_operator
Move
= 1
1 0 0
0
0
0
1
0 0 0 0 0 1
0
0
end_operator
0
0
begin_SG
switch 0
check 0
check 1 0
check 0
check 0
end_SG
begin_CG
0
1 0
end_CG
begin_DTG
1
1 0 e = 1 0
0
end_DTG
begin_DTG
0
end_DTG
0
";

    #[test]
    fn parse_move_task() {
        let task = Task::parse(MOVE_TASK).expect("parse");
        assert_eq!(task.variables.len(), 2);
        assert_eq!(task.var_type(0), VariableType::Logical);
        assert_eq!(task.var_type(1), VariableType::PrimitiveFunctional);
        assert_eq!(task.goal, vec![(0, 1.0)]);
        assert_eq!(task.operator(OperatorId(0)).name, "Move");
        assert_eq!(task.initial_state.values, vec![0.0, 1.0]);
        assert!(!task.poly_time_method);
        assert!(!task.contains_universal_conditions);
    }

    #[test]
    fn summary_counts_types() {
        let task = Task::parse(MOVE_TASK).expect("parse");
        let summary = task.summary();
        assert_eq!(summary.logical, 1);
        assert_eq!(summary.primitive_functional, 1);
        assert_eq!(summary.operators, 1);
        assert_eq!(summary.goal[0].variable, "a");
    }

    #[test]
    fn bad_magic_word_is_reported() {
        let broken = MOVE_TASK.replacen("begin_state", "begin_stat", 1);
        let err = Task::parse(&broken).expect_err("must fail");
        assert!(err.to_string().contains("'begin_state'"));
    }
}
