//! # Domain Transition Graphs
//!
//! One transition graph per variable, shaped by the variable's type.
//!
//! - Discrete variables: value nodes with operator- or axiom-induced
//!   transitions. Each transition label carries its prevail conditions as
//!   indices into a per-graph [`Context`] (the variable's causal-graph
//!   parents) plus "cyclic" side effects on context variables.
//! - Primitive numeric variables: the numeric updates operators make.
//! - Subterms: the arithmetic expression computing the variable.
//! - Comparisons: the relation for both truth values, a context holding
//!   every numeric variable of the unrolled term, and a copy of every numeric
//!   transition of those variables translated into that context.

use crate::causal_graph::CausalGraph;
use crate::parser::TokenReader;
use crate::primitives::double_equals;
use crate::task::{Effect, Operator, PrePost, Variable};
use crate::types::{
    AssignmentOp, BinaryOp, ConditionPhase, OperatorId, TempusError, TransitionPhase, VariableType,
};
use std::collections::BTreeMap;

// =============================================================================
// CONTEXT
// =============================================================================

/// Mapping between global variables and the local indices of one graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    globals: Vec<usize>,
    locals: BTreeMap<usize, usize>,
}

impl Context {
    /// Local index of `var`, adding it if needed.
    pub fn add(&mut self, var: usize) -> usize {
        if let Some(&local) = self.locals.get(&var) {
            return local;
        }
        let local = self.globals.len();
        self.globals.push(var);
        self.locals.insert(var, local);
        local
    }

    /// Local index of `var`, if present.
    #[must_use]
    pub fn local(&self, var: usize) -> Option<usize> {
        self.locals.get(&var).copied()
    }

    /// Global variable at a local index.
    #[must_use]
    pub fn global(&self, local: usize) -> usize {
        self.globals[local]
    }

    /// Global variables in local order.
    #[must_use]
    pub fn vars(&self) -> &[usize] {
        &self.globals
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.globals.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.globals.is_empty()
    }
}

// =============================================================================
// LABELS
// =============================================================================

/// A condition `var = value` addressed through a context.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalCondition {
    pub local_var: usize,
    pub var: usize,
    pub value: f64,
    pub phase: ConditionPhase,
}

/// Side effect of a transition on another context variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CyclicEffect {
    Assign {
        local_var: usize,
        value: f64,
    },
    Update {
        local_var: usize,
        op: AssignmentOp,
        operand: usize,
    },
}

/// One way of taking a discrete transition.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionLabel {
    /// Inducing operator; `None` for axiom transitions.
    pub op: Option<OperatorId>,
    pub phase: TransitionPhase,
    /// Global duration variable.
    pub duration_var: Option<usize>,
    pub preconditions: Vec<LocalCondition>,
    pub effects: Vec<CyclicEffect>,
}

/// All labels leading from one value to `target`.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueTransition {
    pub target: usize,
    pub labels: Vec<TransitionLabel>,
}

/// A numeric update induced by an operator.
///
/// Inside a primitive graph all variable fields are global; copies held by
/// a comparison graph use that graph's local indices.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericTransition {
    pub op: OperatorId,
    pub phase: TransitionPhase,
    pub fop: AssignmentOp,
    pub starting_var: usize,
    pub influencing_var: usize,
    pub duration_var: Option<usize>,
    pub preconditions: Vec<LocalCondition>,
}

// =============================================================================
// GRAPHS
// =============================================================================

/// Transition graph of a discrete variable.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscreteGraph {
    pub var: usize,
    pub is_axiom: bool,
    /// Outgoing transitions per value.
    pub nodes: Vec<Vec<ValueTransition>>,
    pub context: Context,
}

/// Transition graph of a primitive numeric variable.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericGraph {
    pub var: usize,
    pub transitions: Vec<NumericTransition>,
}

/// Expression of a subterm variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubtermGraph {
    pub var: usize,
    pub left: usize,
    pub op: BinaryOp,
    pub right: usize,
}

/// `left op right` over global variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relation {
    pub left: usize,
    pub op: BinaryOp,
    pub right: usize,
}

/// Transition graph of a comparison variable.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonGraph {
    pub var: usize,
    /// Relation that holds when the variable is `0` (true).
    pub holds: Relation,
    /// Relation that holds when the variable is `1` (false).
    pub fails: Relation,
    pub context: Context,
    pub transitions: Vec<NumericTransition>,
}

impl ComparisonGraph {
    /// Relation to make progress on when leaving value `start`.
    #[must_use]
    pub fn relation_towards_other_value(&self, start: usize) -> Relation {
        if start == 0 { self.fails } else { self.holds }
    }
}

/// Transition graph of any variable.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionGraph {
    Discrete(DiscreteGraph),
    Numeric(NumericGraph),
    Subterm(SubtermGraph),
    Comparison(ComparisonGraph),
}

impl TransitionGraph {
    /// Read one graph per variable, then build the comparison contexts.
    pub fn read_all(
        reader: &mut TokenReader<'_>,
        variables: &[Variable],
        operators: &[Operator],
        causal_graph: &CausalGraph,
    ) -> Result<Vec<Self>, TempusError> {
        let mut graphs = Vec::with_capacity(variables.len());
        for (var, variable) in variables.iter().enumerate() {
            let graph = match variable.var_type {
                VariableType::Logical => Self::Discrete(DiscreteGraph::read(
                    reader,
                    var,
                    variables,
                    operators,
                    causal_graph,
                )?),
                VariableType::PrimitiveFunctional => {
                    Self::Numeric(NumericGraph::read(reader, var, variables, operators.len())?)
                }
                VariableType::SubtermFunctional => {
                    Self::Subterm(SubtermGraph::read(reader, var, variables.len())?)
                }
                VariableType::Comparison => {
                    Self::Comparison(ComparisonGraph::read(reader, var, variables.len())?)
                }
            };
            graphs.push(graph);
        }

        for var in 0..graphs.len() {
            let Self::Comparison(comparison) = &graphs[var] else {
                continue;
            };
            let holds = comparison.holds;
            let mut context = Context::default();
            add_term_parents(&graphs, holds.left, &mut context);
            add_term_parents(&graphs, holds.right, &mut context);
            let mut transitions = Vec::new();
            collect_term_transitions(&graphs, holds.left, &mut context, &mut transitions);
            collect_term_transitions(&graphs, holds.right, &mut context, &mut transitions);
            if let Self::Comparison(comparison) = &mut graphs[var] {
                comparison.context = context;
                comparison.transitions = transitions;
            }
        }
        Ok(graphs)
    }

    /// The comparison graph, if this is one.
    #[must_use]
    pub fn as_comparison(&self) -> Option<&ComparisonGraph> {
        match self {
            Self::Comparison(graph) => Some(graph),
            _ => None,
        }
    }
}

fn add_term_parents(graphs: &[TransitionGraph], var: usize, context: &mut Context) {
    match graphs.get(var) {
        Some(TransitionGraph::Numeric(_)) => {
            context.add(var);
        }
        Some(TransitionGraph::Subterm(subterm)) => {
            context.add(var);
            add_term_parents(graphs, subterm.left, context);
            add_term_parents(graphs, subterm.right, context);
        }
        _ => {}
    }
}

fn collect_term_transitions(
    graphs: &[TransitionGraph],
    var: usize,
    context: &mut Context,
    into: &mut Vec<NumericTransition>,
) {
    match graphs.get(var) {
        Some(TransitionGraph::Numeric(numeric)) => {
            for trans in &numeric.transitions {
                let mut local = trans.clone();
                local.starting_var = context.add(trans.starting_var);
                local.influencing_var = context.add(trans.influencing_var);
                local.duration_var = trans.duration_var.map(|dur| context.add(dur));
                for cond in &mut local.preconditions {
                    cond.local_var = context.add(cond.var);
                }
                into.push(local);
            }
        }
        Some(TransitionGraph::Subterm(subterm)) => {
            collect_term_transitions(graphs, subterm.left, context, into);
            collect_term_transitions(graphs, subterm.right, context, into);
        }
        _ => {}
    }
}

fn read_duration(
    reader: &mut TokenReader<'_>,
    variable_count: usize,
) -> Result<Option<usize>, TempusError> {
    let comparator = reader.parse::<BinaryOp>()?;
    if comparator != BinaryOp::Eq {
        return Err(TempusError::InvalidTask(format!(
            "duration constraint must be of the form (= ?duration term), got '{}'",
            comparator
        )));
    }
    reader.read_optional_index(variable_count, "duration variable")
}

fn read_condition(
    reader: &mut TokenReader<'_>,
    variable_count: usize,
) -> Result<LocalCondition, TempusError> {
    let var = reader.read_index(variable_count, "condition variable")?;
    let value = reader.read_f64()?;
    let phase = reader.parse::<ConditionPhase>()?;
    Ok(LocalCondition {
        local_var: var,
        var,
        value,
        phase,
    })
}

/// Multiset inclusion of sorted sequences.
fn includes(haystack: &[(usize, i64)], needles: &[(usize, i64)]) -> bool {
    let mut rest = haystack.iter();
    needles
        .iter()
        .all(|needle| rest.by_ref().any(|candidate| candidate == needle))
}

impl DiscreteGraph {
    fn read(
        reader: &mut TokenReader<'_>,
        var: usize,
        variables: &[Variable],
        operators: &[Operator],
        causal_graph: &CausalGraph,
    ) -> Result<Self, TempusError> {
        let n = variables.len();
        let is_axiom = variables[var].is_derived();
        let size = variables[var].domain_size();
        let mut graph = Self {
            var,
            is_axiom,
            nodes: vec![Vec::new(); size],
            context: Context::default(),
        };

        reader.expect_magic("begin_DTG")?;
        for origin in 0..size {
            let count = reader.read_usize()?;
            for _ in 0..count {
                let target = reader.read_index(size, "target value")?;
                let op_index = reader.read_i32()?;
                let phase = reader.parse::<TransitionPhase>()?;
                let duration_var = if phase.has_duration() {
                    read_duration(reader, n)?
                } else {
                    None
                };
                if let Some(dur) = duration_var {
                    graph.context.add(dur);
                }

                let prevail_count = reader.read_usize()?;
                let mut preconditions = Vec::with_capacity(prevail_count);
                let mut precond_pairs = Vec::with_capacity(prevail_count);
                for _ in 0..prevail_count {
                    let mut cond = read_condition(reader, n)?;
                    precond_pairs.push((cond.var, cond.value as i64));
                    cond.local_var = graph.context.add(cond.var);
                    preconditions.push(cond);
                }

                let op = if is_axiom {
                    None
                } else {
                    let index = usize::try_from(op_index)
                        .ok()
                        .filter(|i| *i < operators.len())
                        .ok_or_else(|| {
                            TempusError::Parse(format!("operator index {} out of range", op_index))
                        })?;
                    Some(OperatorId::new(index))
                };

                let mut effects = Vec::new();
                if let Some(op) = op {
                    precond_pairs.sort_unstable();
                    for pre_post in compress_effects(&operators[op.index()]) {
                        if pre_post.var == var {
                            continue;
                        }
                        let already_contained = graph.context.local(pre_post.var).is_some();
                        let influences_comparison = !already_contained
                            && variables[pre_post.var].var_type == VariableType::PrimitiveFunctional
                            && graph.add_relevant_functional_vars(pre_post.var, causal_graph);
                        if already_contained || influences_comparison {
                            graph.extend_cyclic_effect(
                                &pre_post,
                                variables,
                                &precond_pairs,
                                &mut effects,
                            );
                        }
                    }
                }

                let label = TransitionLabel {
                    op,
                    phase,
                    duration_var,
                    preconditions,
                    effects,
                };
                let transitions = &mut graph.nodes[origin];
                match transitions.iter_mut().find(|t| t.target == target) {
                    Some(transition) => transition.labels.push(label),
                    None => transitions.push(ValueTransition {
                        target,
                        labels: vec![label],
                    }),
                }
            }
        }
        reader.expect_magic("end_DTG")?;
        Ok(graph)
    }

    /// Add the numeric variables of every comparison in the context that
    /// `var` feeds into; returns whether there was any.
    fn add_relevant_functional_vars(&mut self, var: usize, causal_graph: &CausalGraph) -> bool {
        let mut influences = false;
        for comparison in causal_graph.comparison_vars_for(var) {
            if self.context.local(comparison).is_some() {
                influences = true;
                for term_var in causal_graph.functional_vars_in_unrolled_term(comparison) {
                    self.context.add(term_var);
                }
            }
        }
        influences
    }

    fn extend_cyclic_effect(
        &mut self,
        pre_post: &PrePost,
        variables: &[Variable],
        precond_pairs: &[(usize, i64)],
        effects: &mut Vec<CyclicEffect>,
    ) {
        let mut trigger: Vec<(usize, i64)> = Vec::new();
        if let Some(pre) = pre_post.effect.pre() {
            trigger.push((pre_post.var, pre as i64));
        }
        trigger.extend(
            pre_post
                .cond_start
                .iter()
                .chain(&pre_post.cond_end)
                .map(|cond| (cond.var, cond.prev as i64)),
        );
        trigger.sort_unstable();
        if !includes(precond_pairs, &trigger) {
            return;
        }
        let Some(local_var) = self.context.local(pre_post.var) else {
            return;
        };
        match (variables[pre_post.var].var_type, pre_post.effect) {
            (VariableType::Logical, Effect::Set { pre, post }) => {
                if !double_equals(pre.unwrap_or(-1.0), post) {
                    effects.push(CyclicEffect::Assign {
                        local_var,
                        value: post,
                    });
                }
            }
            (VariableType::PrimitiveFunctional, Effect::Update { op, operand }) => {
                let operand = self.context.add(operand);
                effects.push(CyclicEffect::Update {
                    local_var,
                    op,
                    operand,
                });
            }
            _ => {}
        }
    }
}

/// Start effects of `op`, with the written value replaced by an end effect
/// on the same variable, followed by the remaining end effects.
fn compress_effects(op: &Operator) -> Vec<PrePost> {
    let mut result = op.pre_post_start.clone();
    for end in &op.pre_post_end {
        match result.iter_mut().find(|eff| eff.var == end.var) {
            Some(eff) => {
                eff.effect = match (eff.effect, end.effect) {
                    (Effect::Set { pre, .. }, Effect::Set { post, .. }) => Effect::Set { pre, post },
                    (Effect::Update { op, .. }, Effect::Update { operand, .. }) => {
                        Effect::Update { op, operand }
                    }
                    (_, other) => other,
                };
            }
            None => result.push(end.clone()),
        }
    }
    result
}

impl NumericGraph {
    fn read(
        reader: &mut TokenReader<'_>,
        var: usize,
        variables: &[Variable],
        operator_count: usize,
    ) -> Result<Self, TempusError> {
        let n = variables.len();
        reader.expect_magic("begin_DTG")?;
        let count = reader.read_usize()?;
        let mut transitions = Vec::with_capacity(count);
        for _ in 0..count {
            let op = OperatorId::new(reader.read_index(operator_count, "operator")?);
            let phase = reader.parse::<TransitionPhase>()?;
            let fop = reader.parse::<AssignmentOp>()?;
            let influencing_var = reader.read_index(n, "influencing variable")?;
            let duration_var = read_duration(reader, n)?;
            let cond_count = reader.read_usize()?;
            let preconditions = (0..cond_count)
                .map(|_| read_condition(reader, n))
                .collect::<Result<Vec<_>, _>>()?;
            transitions.push(NumericTransition {
                op,
                phase,
                fop,
                starting_var: var,
                influencing_var,
                duration_var,
                preconditions,
            });
        }
        reader.expect_magic("end_DTG")?;
        Ok(Self { var, transitions })
    }
}

impl SubtermGraph {
    fn read(
        reader: &mut TokenReader<'_>,
        var: usize,
        variable_count: usize,
    ) -> Result<Self, TempusError> {
        reader.expect_magic("begin_DTG")?;
        let left = reader.read_index(variable_count, "variable")?;
        let op = reader.parse::<BinaryOp>()?;
        let right = reader.read_index(variable_count, "variable")?;
        reader.expect_magic("end_DTG")?;
        Ok(Self {
            var,
            left,
            op,
            right,
        })
    }
}

fn read_relation(
    reader: &mut TokenReader<'_>,
    variable_count: usize,
) -> Result<Relation, TempusError> {
    let left = reader.read_index(variable_count, "variable")?;
    let op = reader.parse::<BinaryOp>()?;
    let right = reader.read_index(variable_count, "variable")?;
    Ok(Relation { left, op, right })
}

impl ComparisonGraph {
    fn read(
        reader: &mut TokenReader<'_>,
        var: usize,
        variable_count: usize,
    ) -> Result<Self, TempusError> {
        reader.expect_magic("begin_DTG")?;
        reader.expect_magic("1")?;
        let fails = read_relation(reader, variable_count)?;
        reader.expect_magic("0")?;
        let holds = read_relation(reader, variable_count)?;
        reader.expect_magic("end_DTG")?;
        Ok(Self {
            var,
            holds,
            fails,
            context: Context::default(),
            transitions: Vec::new(),
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
