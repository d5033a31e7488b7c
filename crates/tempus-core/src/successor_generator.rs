//! # Successor Generator
//!
//! Decision tree enumerating the operators that may be applicable in a state.
//!
//! The tree switches on the integer value of one variable at a time and
//! collects the operators stored along the way. The result is a superset of
//! the applicable operators; the search still checks each candidate.

use crate::parser::TokenReader;
use crate::state::TimeStampedState;
use crate::task::Variable;
use crate::types::{OperatorId, TempusError};

/// A node of the decision tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuccessorGenerator {
    /// Branch on the value of `var`.
    Switch {
        var: usize,
        immediate: Box<SuccessorGenerator>,
        by_value: Vec<SuccessorGenerator>,
        default: Box<SuccessorGenerator>,
    },
    /// Operators applicable regardless of further values.
    Leaf(Vec<OperatorId>),
    Empty,
}

impl SuccessorGenerator {
    /// Read a generator in prefix notation.
    pub fn read(
        reader: &mut TokenReader<'_>,
        variables: &[Variable],
        operator_count: usize,
    ) -> Result<Self, TempusError> {
        match reader.next_token()? {
            "switch" => {
                let var = reader.read_index(variables.len(), "switch variable")?;
                let immediate = Self::read(reader, variables, operator_count)?;
                let by_value = (0..variables[var].domain_size())
                    .map(|_| Self::read(reader, variables, operator_count))
                    .collect::<Result<Vec<_>, _>>()?;
                let default = Self::read(reader, variables, operator_count)?;
                Ok(Self::Switch {
                    var,
                    immediate: Box::new(immediate),
                    by_value,
                    default: Box::new(default),
                })
            }
            "check" => {
                let count = reader.read_usize()?;
                if count == 0 {
                    return Ok(Self::Empty);
                }
                let ops = (0..count)
                    .map(|_| {
                        reader
                            .read_index(operator_count, "operator")
                            .map(OperatorId::new)
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::Leaf(ops))
            }
            other => Err(TempusError::Parse(format!(
                "expected 'switch' or 'check', read '{}'",
                other
            ))),
        }
    }

    /// Candidate operators for `state`, in tree order.
    #[must_use]
    pub fn applicable_ops(&self, state: &TimeStampedState) -> Vec<OperatorId> {
        let mut ops = Vec::new();
        self.collect(state, &mut ops);
        ops
    }

    fn collect(&self, state: &TimeStampedState, ops: &mut Vec<OperatorId>) {
        match self {
            Self::Switch {
                var,
                immediate,
                by_value,
                default,
            } => {
                immediate.collect(state, ops);
                let value = state.value(*var) as usize;
                if let Some(child) = by_value.get(value) {
                    child.collect(state, ops);
                }
                default.collect(state, ops);
            }
            Self::Leaf(leaf_ops) => ops.extend_from_slice(leaf_ops),
            Self::Empty => {}
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::tests::MOVE_TASK;
    use crate::task::Task;

    #[test]
    fn switch_selects_branch_by_value() {
        let task = Task::parse(MOVE_TASK).expect("parse");
        let init = &task.initial_state;
        assert_eq!(
            task.successor_generator.applicable_ops(init),
            vec![OperatorId(0)]
        );

        let mut done = init.clone();
        done.values[0] = 1.0;
        assert!(task.successor_generator.applicable_ops(&done).is_empty());
    }

    #[test]
    fn unknown_node_is_rejected() {
        let vars = vec![Variable::new("a", 2, None, crate::types::VariableType::Logical)];
        let mut reader = TokenReader::new("branch 0");
        assert!(SuccessorGenerator::read(&mut reader, &vars, 1).is_err());
    }
}
