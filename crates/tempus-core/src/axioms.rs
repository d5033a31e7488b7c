//! # Derived-Variable Evaluator
//!
//! Stratified evaluation of axioms after every change of primitive values.
//!
//! Three strata run in fixed order:
//! 1. arithmetic axioms (`+ - * /`), layer by layer;
//! 2. the single comparison layer, writing `0` for true and `1` for false;
//! 3. logical Horn rules with negation by failure, layer by layer.
//!
//! The logical stratum is a worklist propagation: every currently true
//! literal of a non-derived or comparison variable seeds the queue, rules
//! fire once all of their conditions were dequeued, and after a layer is
//! drained every derived variable of that layer still at its default value
//! is asserted as true-by-failure and propagated further.

use crate::parser::TokenReader;
use crate::primitives::double_equals;
use crate::task::{Prevail, Variable};
use crate::types::{BinaryOp, TempusError, VariableType};
use std::collections::VecDeque;

// =============================================================================
// AXIOMS
// =============================================================================

/// Horn rule `conditions -> affected := new_value`.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicAxiom {
    pub conditions: Vec<Prevail>,
    pub affected: usize,
    pub old_value: f64,
    pub new_value: f64,
}

impl LogicAxiom {
    /// Read one `begin_rule ... end_rule` block.
    pub fn read(reader: &mut TokenReader<'_>, variable_count: usize) -> Result<Self, TempusError> {
        reader.expect_magic("begin_rule")?;
        let conditions = Prevail::read_list(reader, variable_count)?;
        let affected = reader.read_index(variable_count, "affected variable")?;
        let old_value = reader.read_f64()?;
        let new_value = reader.read_f64()?;
        reader.expect_magic("end_rule")?;
        Ok(Self {
            conditions,
            affected,
            old_value,
            new_value,
        })
    }
}

/// Numeric rule `affected := lhs op rhs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumericAxiom {
    pub affected: usize,
    pub op: BinaryOp,
    pub lhs: usize,
    pub rhs: usize,
}

impl NumericAxiom {
    /// Read one `affected op lhs rhs` line.
    pub fn read(reader: &mut TokenReader<'_>, variable_count: usize) -> Result<Self, TempusError> {
        let affected = reader.read_index(variable_count, "affected variable")?;
        let op = reader.parse::<BinaryOp>()?;
        let lhs = reader.read_index(variable_count, "variable")?;
        let rhs = reader.read_index(variable_count, "variable")?;
        Ok(Self {
            affected,
            op,
            lhs,
            rhs,
        })
    }

    fn evaluate(&self, values: &mut [f64]) {
        let (l, r) = (values[self.lhs], values[self.rhs]);
        let truth = |holds: bool| if holds { 0.0 } else { 1.0 };
        values[self.affected] = match self.op {
            BinaryOp::Add => l + r,
            BinaryOp::Subtract => l - r,
            BinaryOp::Mult => l * r,
            BinaryOp::Divis => l / r,
            BinaryOp::Lt => truth(l < r),
            BinaryOp::Le => truth(l <= r),
            BinaryOp::Eq => truth(double_equals(l, r)),
            BinaryOp::Ge => truth(l >= r),
            BinaryOp::Gt => truth(l > r),
            BinaryOp::Ue => truth(!double_equals(l, r)),
        };
    }
}

// =============================================================================
// EVALUATOR
// =============================================================================

#[derive(Debug, Clone)]
struct Rule {
    condition_count: usize,
    effect_var: usize,
    effect_val: usize,
}

/// Compiled axiom strata of a task.
#[derive(Debug, Clone)]
pub struct AxiomEvaluator {
    logic_axioms: Vec<LogicAxiom>,
    numeric_axioms: Vec<NumericAxiom>,
    layers: Vec<Option<usize>>,
    var_types: Vec<VariableType>,
    defaults: Vec<f64>,
    last_arithmetic_layer: Option<usize>,
    comparison_layer: Option<usize>,
    logic_layers: Option<(usize, usize)>,
    /// Numeric axiom indices per layer.
    numeric_by_layer: Vec<Vec<usize>>,
    rules: Vec<Rule>,
    /// `condition_of[var][value]`: rules having `var = value` as condition.
    condition_of: Vec<Vec<Vec<usize>>>,
    /// Derived logical variables per layer, asserted by failure.
    nbf_by_layer: Vec<Vec<usize>>,
}

impl AxiomEvaluator {
    /// Compile the axioms of a task.
    ///
    /// `defaults` are the raw initial values; derived logical variables are
    /// reset to them before every evaluation.
    pub fn new(
        variables: &[Variable],
        defaults: Vec<f64>,
        logic_axioms: Vec<LogicAxiom>,
        numeric_axioms: Vec<NumericAxiom>,
    ) -> Result<Self, TempusError> {
        let mut last_arithmetic_layer: Option<usize> = None;
        let mut comparison_layer: Option<usize> = None;
        let mut first_logic: Option<usize> = None;
        let mut last_logic: Option<usize> = None;

        for var in variables {
            let Some(layer) = var.layer else { continue };
            match var.var_type {
                VariableType::Logical => {
                    first_logic = Some(first_logic.map_or(layer, |l| l.min(layer)));
                    last_logic = Some(last_logic.map_or(layer, |l| l.max(layer)));
                }
                VariableType::Comparison => {
                    if comparison_layer.is_some_and(|l| l != layer) {
                        return Err(TempusError::InvalidTask(format!(
                            "comparison variable '{}' outside the single comparison layer",
                            var.name
                        )));
                    }
                    comparison_layer = Some(layer);
                }
                VariableType::PrimitiveFunctional | VariableType::SubtermFunctional => {
                    last_arithmetic_layer =
                        Some(last_arithmetic_layer.map_or(layer, |l| l.max(layer)));
                }
            }
        }

        let before = |a: Option<usize>, b: Option<usize>| match (a, b) {
            (Some(a), Some(b)) => a < b,
            _ => true,
        };
        if !before(last_arithmetic_layer, comparison_layer)
            || !before(comparison_layer, first_logic)
            || !before(last_arithmetic_layer, first_logic)
        {
            return Err(TempusError::InvalidTask(
                "axiom layers violate arithmetic < comparison < logic stratification".to_string(),
            ));
        }

        let max_layer = variables.iter().filter_map(|v| v.layer).max();
        let layer_slots = max_layer.map_or(1, |l| l + 2);

        let layer_of = |affected: usize| -> Result<usize, TempusError> {
            variables
                .get(affected)
                .and_then(|v| v.layer)
                .ok_or_else(|| {
                    TempusError::InvalidTask(format!(
                        "axiom affects non-derived variable {}",
                        affected
                    ))
                })
        };

        let mut numeric_by_layer = vec![Vec::new(); layer_slots];
        for (index, axiom) in numeric_axioms.iter().enumerate() {
            numeric_by_layer[layer_of(axiom.affected)?].push(index);
        }
        let mut logic_by_layer: Vec<Vec<usize>> = vec![Vec::new(); layer_slots];
        for (index, axiom) in logic_axioms.iter().enumerate() {
            logic_by_layer[layer_of(axiom.affected)?].push(index);
        }

        let mut condition_of: Vec<Vec<Vec<usize>>> = variables
            .iter()
            .map(|v| vec![Vec::new(); v.domain_size()])
            .collect();
        let mut rules = Vec::new();
        let mut nbf_by_layer = vec![Vec::new(); layer_slots];
        let logic_layers = first_logic.zip(last_logic);

        if let Some((first, last)) = logic_layers {
            for layer_axioms in &logic_by_layer[first..=last] {
                for &index in layer_axioms {
                    let axiom = &logic_axioms[index];
                    let rule_index = rules.len();
                    rules.push(Rule {
                        condition_count: axiom.conditions.len(),
                        effect_var: axiom.affected,
                        effect_val: axiom.new_value as usize,
                    });
                    for cond in &axiom.conditions {
                        let slot = condition_of
                            .get_mut(cond.var)
                            .and_then(|values| values.get_mut(cond.prev as usize))
                            .ok_or_else(|| {
                                TempusError::InvalidTask(format!(
                                    "axiom condition {} = {} outside the variable's domain",
                                    cond.var, cond.prev
                                ))
                            })?;
                        slot.push(rule_index);
                    }
                }
            }
            for (var, variable) in variables.iter().enumerate() {
                if let Some(layer) = variable.layer
                    && layer >= first
                    && layer <= last
                {
                    nbf_by_layer[layer].push(var);
                }
            }
        }

        Ok(Self {
            logic_axioms,
            numeric_axioms,
            layers: variables.iter().map(|v| v.layer).collect(),
            var_types: variables.iter().map(|v| v.var_type).collect(),
            defaults,
            last_arithmetic_layer,
            comparison_layer,
            logic_layers,
            numeric_by_layer,
            rules,
            condition_of,
            nbf_by_layer,
        })
    }

    /// Logical axioms in input order.
    #[must_use]
    pub fn logic_axioms(&self) -> &[LogicAxiom] {
        &self.logic_axioms
    }

    /// Numeric axioms in input order.
    #[must_use]
    pub fn numeric_axioms(&self) -> &[NumericAxiom] {
        &self.numeric_axioms
    }

    /// Recompute every derived variable in `values`.
    pub fn evaluate(&self, values: &mut [f64]) {
        if let Some(last) = self.last_arithmetic_layer {
            for layer in &self.numeric_by_layer[..=last] {
                for &index in layer {
                    self.numeric_axioms[index].evaluate(values);
                }
            }
        }
        if let Some(layer) = self.comparison_layer {
            for &index in &self.numeric_by_layer[layer] {
                self.numeric_axioms[index].evaluate(values);
            }
        }
        self.evaluate_logic(values);
    }

    fn literal(&self, var: usize, value: f64) -> Option<(usize, usize)> {
        let value = value as usize;
        self.condition_of
            .get(var)
            .filter(|literals| value < literals.len())
            .map(|_| (var, value))
    }

    fn evaluate_logic(&self, values: &mut [f64]) {
        let mut queue: VecDeque<(usize, usize)> = VecDeque::new();

        for (var, layer) in self.layers.iter().enumerate() {
            match *layer {
                None => {
                    if matches!(
                        self.var_types[var],
                        VariableType::Logical | VariableType::Comparison
                    ) {
                        queue.extend(self.literal(var, values[var]));
                    }
                }
                Some(layer) if self.last_arithmetic_layer.is_some_and(|l| layer <= l) => {}
                Some(layer) if self.comparison_layer == Some(layer) => {
                    queue.extend(self.literal(var, values[var]));
                }
                Some(_) => values[var] = self.defaults[var],
            }
        }

        let mut unsatisfied: Vec<usize> = self.rules.iter().map(|r| r.condition_count).collect();
        for rule in self.rules.iter().filter(|r| r.condition_count == 0) {
            let target = rule.effect_val as f64;
            if !double_equals(values[rule.effect_var], target) {
                values[rule.effect_var] = target;
                queue.extend(self.literal(rule.effect_var, target));
            }
        }

        let Some((first, last)) = self.logic_layers else {
            return;
        };
        for layer in first..=last {
            while let Some((var, value)) = queue.pop_front() {
                for &rule_index in &self.condition_of[var][value] {
                    let Some(count) = unsatisfied.get_mut(rule_index) else {
                        continue;
                    };
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        let rule = &self.rules[rule_index];
                        let target = rule.effect_val as f64;
                        if !double_equals(values[rule.effect_var], target) {
                            values[rule.effect_var] = target;
                            queue.extend(self.literal(rule.effect_var, target));
                        }
                    }
                }
            }
            for &var in &self.nbf_by_layer[layer] {
                if double_equals(values[var], self.defaults[var]) {
                    queue.extend(self.literal(var, values[var]));
                }
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

    fn logical(name: &str, layer: Option<usize>) -> Variable {
        Variable::new(name, 2, layer, VariableType::Logical)
    }

    fn rule(conditions: &[(usize, f64)], affected: usize, new_value: f64) -> LogicAxiom {
        LogicAxiom {
            conditions: conditions.iter().map(|&(v, p)| Prevail::new(v, p)).collect(),
            affected,
            old_value: 1.0 - new_value,
            new_value,
        }
    }

    #[test]
    fn chain_settles_in_one_pass() {
        // a (primitive) -> b (layer 0) -> c (layer 1)
        let vars = vec![
            logical("a", None),
            logical("b", Some(0)),
            logical("c", Some(1)),
        ];
        let axioms = vec![rule(&[(0, 1.0)], 1, 1.0), rule(&[(1, 1.0)], 2, 1.0)];
        let eval = AxiomEvaluator::new(&vars, vec![1.0, 0.0, 0.0], axioms, Vec::new())
            .expect("evaluator");

        let mut values = vec![1.0, 0.0, 0.0];
        eval.evaluate(&mut values);
        assert_eq!(values, vec![1.0, 1.0, 1.0]);

        let settled = values.clone();
        eval.evaluate(&mut values);
        assert_eq!(values, settled);

        values[0] = 0.0;
        eval.evaluate(&mut values);
        assert_eq!(values, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn negation_by_failure_after_zero_condition_rule() {
        // layer 0: b := 1 unconditionally; c stays at default 0 and
        // d (layer 1) fires on c = 0 by failure.
        let vars = vec![
            logical("a", None),
            logical("b", Some(0)),
            logical("c", Some(0)),
            logical("d", Some(1)),
        ];
        let axioms = vec![
            rule(&[], 1, 1.0),
            rule(&[(0, 1.0)], 2, 1.0),
            rule(&[(1, 1.0), (2, 0.0)], 3, 1.0),
        ];
        let eval = AxiomEvaluator::new(&vars, vec![0.0; 4], axioms, Vec::new()).expect("evaluator");
        let mut values = vec![0.0; 4];
        eval.evaluate(&mut values);
        assert_eq!(values, vec![0.0, 1.0, 0.0, 1.0]);

        let settled = values.clone();
        eval.evaluate(&mut values);
        assert_eq!(values, settled);
    }

    #[test]
    fn numeric_strata() {
        let vars = vec![
            Variable::new("x", -1, None, VariableType::PrimitiveFunctional),
            Variable::new("y", -1, None, VariableType::PrimitiveFunctional),
            Variable::new("sum", -1, Some(0), VariableType::SubtermFunctional),
            Variable::new("sum<5", 2, Some(1), VariableType::Comparison),
            logical("ok", Some(2)),
        ];
        let numeric = vec![
            NumericAxiom {
                affected: 2,
                op: BinaryOp::Add,
                lhs: 0,
                rhs: 1,
            },
            NumericAxiom {
                affected: 3,
                op: BinaryOp::Lt,
                lhs: 2,
                rhs: 1,
            },
        ];
        let logic = vec![rule(&[(3, 0.0)], 4, 1.0)];
        let eval =
            AxiomEvaluator::new(&vars, vec![0.0, 5.0, 0.0, 1.0, 0.0], logic, numeric).expect("evaluator");

        let mut values = vec![-1.0, 5.0, 0.0, 1.0, 0.0];
        eval.evaluate(&mut values);
        assert_eq!(values[2], 4.0);
        assert_eq!(values[3], 0.0);
        assert_eq!(values[4], 1.0);

        values[0] = 2.0;
        eval.evaluate(&mut values);
        assert_eq!(values[2], 7.0);
        assert_eq!(values[3], 1.0);
        assert_eq!(values[4], 0.0);
    }

    #[test]
    fn stratification_violation_is_rejected() {
        let vars = vec![
            Variable::new("x", -1, None, VariableType::PrimitiveFunctional),
            Variable::new("cmp", 2, Some(0), VariableType::Comparison),
            logical("l", Some(0)),
        ];
        let result = AxiomEvaluator::new(&vars, vec![0.0; 3], Vec::new(), Vec::new());
        assert!(matches!(result, Err(TempusError::InvalidTask(_))));
    }
}
