//! # Causal Graph
//!
//! Variable dependency graph as arena-indexed adjacency lists.
//!
//! An arc `u -> v` means that changing `v` may depend on the value of `u`
//! (conditions, durations, numeric operands). Besides the directed arcs the
//! graph keeps the sorted, deduplicated undirected neighbourhood of every
//! variable.

use crate::parser::TokenReader;
use crate::task::Variable;
use crate::types::{TempusError, VariableType};
use std::collections::BTreeSet;

/// The causal graph of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CausalGraph {
    arcs: Vec<Vec<usize>>,
    edges: Vec<Vec<usize>>,
    var_types: Vec<VariableType>,
}

impl CausalGraph {
    /// Build a graph from per-variable successor lists.
    #[must_use]
    pub fn new(arcs: Vec<Vec<usize>>, var_types: Vec<VariableType>) -> Self {
        let mut edges = vec![Vec::new(); arcs.len()];
        for (from, successors) in arcs.iter().enumerate() {
            for &to in successors {
                edges[from].push(to);
                edges[to].push(from);
            }
        }
        for neighbours in &mut edges {
            neighbours.sort_unstable();
            neighbours.dedup();
        }
        Self {
            arcs,
            edges,
            var_types,
        }
    }

    /// Read a `begin_CG ... end_CG` block.
    pub fn read(reader: &mut TokenReader<'_>, variables: &[Variable]) -> Result<Self, TempusError> {
        reader.expect_magic("begin_CG")?;
        let n = variables.len();
        let mut arcs = Vec::with_capacity(n);
        for _ in 0..n {
            let count = reader.read_usize()?;
            let successors = (0..count)
                .map(|_| reader.read_index(n, "causal graph successor"))
                .collect::<Result<Vec<_>, _>>()?;
            arcs.push(successors);
        }
        reader.expect_magic("end_CG")?;
        Ok(Self::new(arcs, variables.iter().map(|v| v.var_type).collect()))
    }

    /// Variables depending on `var`.
    #[must_use]
    pub fn successors(&self, var: usize) -> &[usize] {
        &self.arcs[var]
    }

    /// Variables connected to `var` in either direction.
    #[must_use]
    pub fn neighbours(&self, var: usize) -> &[usize] {
        &self.edges[var]
    }

    /// Comparison variables reachable from numeric `var` through subterms.
    #[must_use]
    pub fn comparison_vars_for(&self, var: usize) -> Vec<usize> {
        let mut result = Vec::new();
        self.collect_comparisons(var, &mut result);
        result
    }

    fn collect_comparisons(&self, var: usize, result: &mut Vec<usize>) {
        for &succ in &self.arcs[var] {
            match self.var_types[succ] {
                VariableType::Comparison => result.push(succ),
                VariableType::SubtermFunctional => self.collect_comparisons(succ, result),
                _ => {}
            }
        }
    }

    /// `top` together with every numeric variable of the term it is
    /// computed from.
    #[must_use]
    pub fn functional_vars_in_unrolled_term(&self, top: usize) -> BTreeSet<usize> {
        let mut result = BTreeSet::new();
        self.unroll(top, &mut result);
        result
    }

    fn unroll(&self, top: usize, result: &mut BTreeSet<usize>) {
        if !result.insert(top) {
            return;
        }
        for &current in &self.edges[top] {
            if !self.arcs[current].contains(&top) {
                continue;
            }
            match self.var_types[current] {
                VariableType::PrimitiveFunctional => {
                    result.insert(current);
                }
                VariableType::SubtermFunctional => self.unroll(current, result),
                _ => {}
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// x, y primitive; s = x + y; c = s < y; l logical depending on c.
    fn numeric_graph() -> CausalGraph {
        CausalGraph::new(
            vec![vec![2], vec![2, 3], vec![3], vec![4], vec![]],
            vec![
                VariableType::PrimitiveFunctional,
                VariableType::PrimitiveFunctional,
                VariableType::SubtermFunctional,
                VariableType::Comparison,
                VariableType::Logical,
            ],
        )
    }

    #[test]
    fn edges_are_symmetric_and_deduplicated() {
        let cg = numeric_graph();
        assert_eq!(cg.successors(1), &[2, 3]);
        assert_eq!(cg.neighbours(2), &[0, 1, 3]);
        assert_eq!(cg.neighbours(3), &[1, 2, 4]);
    }

    #[test]
    fn comparisons_reached_through_subterms() {
        let cg = numeric_graph();
        assert_eq!(cg.comparison_vars_for(0), vec![3]);
        assert_eq!(cg.comparison_vars_for(1), vec![3, 3]);
    }

    #[test]
    fn unrolled_term_contains_all_operands() {
        let cg = numeric_graph();
        let vars: Vec<usize> = cg.functional_vars_in_unrolled_term(3).into_iter().collect();
        assert_eq!(vars, vec![0, 1, 2, 3]);
    }

    #[test]
    fn read_block() {
        let vars = vec![
            Variable::new("a", 2, None, VariableType::Logical),
            Variable::new("b", 2, None, VariableType::Logical),
        ];
        let mut reader = TokenReader::new("begin_CG 1 1 0 end_CG");
        let cg = CausalGraph::read(&mut reader, &vars).expect("graph");
        assert_eq!(cg.successors(0), &[1]);
        assert_eq!(cg.neighbours(1), &[0]);
    }
}
