//! # Local Problems
//!
//! Arena of the per-variable shortest-path problems solved by the cyclic
//! causal-graph heuristic.
//!
//! A local problem exists for every `(variable, start value)` pair that was
//! needed so far, plus one goal problem with two nodes whose single
//! transition requires every goal condition. Problems are built lazily and
//! kept across evaluations; each computation marks them uninitialized and
//! re-initializes those it touches.
//!
//! All problems are solved together with one priority queue ordered by
//! `node.cost + problem.base_priority`. Expanding a node fires its outgoing
//! transitions. A transition whose prevail conditions are not resolved yet
//! registers itself on the waiting list of the node that would resolve the
//! condition and is called back when that node is expanded.
//!
//! Nodes and transitions refer to each other through [`NodeRef`] and
//! [`TransRef`], plain indices into the arena.

use crate::dtg::{ComparisonGraph, Context, CyclicEffect, DiscreteGraph, LocalCondition, TransitionGraph};
use crate::primitives::{DEAD_END, EPS_TIME, EPSILON, QUITE_A_LOT, REALLY_BIG, REALLY_SMALL, double_equals};
use crate::state::TimeStampedState;
use crate::task::Task;
use crate::types::{AssignmentOp, BinaryOp, ConditionPhase, OperatorId, VariableType};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

/// The goal problem always sits at the front of the arena.
pub(super) const GOAL_PROBLEM: usize = 0;

/// Node reached once every goal condition is.
pub(super) const GOAL_NODE: NodeRef = NodeRef {
    problem: GOAL_PROBLEM,
    value: 1,
};

// =============================================================================
// REFERENCES
// =============================================================================

/// A node: one value of one local problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(super) struct NodeRef {
    pub problem: usize,
    pub value: usize,
}

/// An outgoing transition of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct TransRef {
    problem: usize,
    source: usize,
    index: usize,
}

impl TransRef {
    const fn source(self) -> NodeRef {
        NodeRef {
            problem: self.problem,
            value: self.source,
        }
    }
}

/// An operator placed in the relaxed schedule used for makespan estimates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct TimedOp {
    pub op: OperatorId,
    pub duration: f64,
    pub index: usize,
}

// =============================================================================
// PROBLEM STRUCTURE
// =============================================================================

/// `left op right` over local indices, for subterms and comparisons inside a
/// context.
#[derive(Debug, Clone, Copy)]
struct DerivedTerm {
    left: usize,
    op: BinaryOp,
    right: usize,
}

impl DerivedTerm {
    fn evaluate(self, values: &[f64]) -> f64 {
        let (l, r) = (values[self.left], values[self.right]);
        let truth = |holds: bool| if holds { 0.0 } else { 1.0 };
        match self.op {
            BinaryOp::Add => l + r,
            BinaryOp::Subtract => l - r,
            BinaryOp::Mult => l * r,
            BinaryOp::Divis => {
                if double_equals(r, 0.0) {
                    if l < 0.0 { REALLY_BIG } else { REALLY_SMALL }
                } else {
                    l / r
                }
            }
            BinaryOp::Lt => truth(l + EPSILON < r),
            BinaryOp::Le => truth(l + EPSILON < r || double_equals(l, r)),
            BinaryOp::Eq => truth(double_equals(l, r)),
            BinaryOp::Gt => truth(l > r + EPSILON),
            BinaryOp::Ge => truth(l > r + EPSILON || double_equals(l, r)),
            BinaryOp::Ue => truth(!double_equals(l, r)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct NumericUpdate {
    fop: AssignmentOp,
    starting: usize,
    influencing: usize,
}

/// What a transition does to the context of its target.
#[derive(Debug, Clone)]
enum TransitionAction {
    /// Assignments and updates of a discrete or goal transition.
    Effects(Vec<CyclicEffect>),
    /// Numeric update of a comparison transition.
    Update(NumericUpdate),
}

#[derive(Debug, Clone)]
struct LocalTransition {
    op: Option<OperatorId>,
    target: usize,
    duration_local: Option<usize>,
    preconditions: Vec<LocalCondition>,
    action: TransitionAction,

    target_cost: f64,
    unreached: usize,
    satisfied: Vec<bool>,
    subscriptions: Vec<(NodeRef, usize)>,
}

impl LocalTransition {
    fn new(
        target: usize,
        op: Option<OperatorId>,
        preconditions: Vec<LocalCondition>,
        action: TransitionAction,
    ) -> Self {
        let conditions = preconditions.len();
        Self {
            op,
            target,
            duration_local: None,
            preconditions,
            action,
            target_cost: 0.0,
            unreached: 0,
            satisfied: vec![false; conditions],
            subscriptions: Vec::new(),
        }
    }
}

/// Search state specific to the kind of node.
#[derive(Debug, Clone, Copy, PartialEq)]
enum NodeKind {
    /// Goal and discrete nodes.
    Discrete,
    /// A truth value of a comparison.
    Comparison {
        /// Relation an update must move towards; `None` past the two truth
        /// values.
        towards: Option<BinaryOp>,
        opened: bool,
        best: Option<TransRef>,
    },
}

impl NodeKind {
    const fn comparison(towards: Option<BinaryOp>) -> Self {
        Self::Comparison {
            towards,
            opened: false,
            best: None,
        }
    }
}

#[derive(Debug, Clone)]
struct LocalNode {
    children_state: Vec<f64>,
    reached_by: Option<TransRef>,
    pred: Option<TransRef>,
    cost: f64,
    expanded: bool,
    /// Time until a running operator delivers this value.
    wait_for: Option<f64>,
    waiting: Vec<(TransRef, usize)>,
    outgoing: Vec<LocalTransition>,
    kind: NodeKind,
}

impl LocalNode {
    fn new(context_len: usize, kind: NodeKind, outgoing: Vec<LocalTransition>) -> Self {
        Self {
            children_state: vec![0.0; context_len],
            reached_by: None,
            pred: None,
            cost: QUITE_A_LOT,
            expanded: false,
            wait_for: None,
            waiting: Vec::new(),
            outgoing,
            kind,
        }
    }

    fn reset(&mut self) {
        self.cost = QUITE_A_LOT;
        self.expanded = false;
        self.reached_by = None;
        self.pred = None;
        self.waiting.clear();
        self.wait_for = None;
        match &mut self.kind {
            NodeKind::Discrete => {}
            NodeKind::Comparison { opened, best, .. } => {
                *opened = false;
                *best = None;
            }
        }
        for trans in &mut self.outgoing {
            trans.target_cost = 0.0;
            trans.unreached = 0;
            trans.satisfied.fill(false);
            trans.subscriptions.clear();
        }
    }

    const fn is_opened(&self) -> bool {
        matches!(self.kind, NodeKind::Comparison { opened: true, .. })
    }

    const fn best(&self) -> Option<TransRef> {
        match self.kind {
            NodeKind::Comparison { best, .. } => best,
            NodeKind::Discrete => None,
        }
    }

    fn open(&mut self) {
        if let NodeKind::Comparison { opened, .. } = &mut self.kind {
            *opened = true;
        }
    }

    /// Remember `trans` as the cheapest comparison transition at this node.
    fn record_best(&mut self, trans: TransRef) {
        if let NodeKind::Comparison { best, .. } = &mut self.kind {
            *best = Some(trans);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProblemKind {
    Goal,
    Discrete { var: usize },
    Comparison { var: usize },
}

#[derive(Debug, Clone)]
struct LocalProblem {
    kind: ProblemKind,
    start: usize,
    context: Vec<usize>,
    /// `None` until initialized in the current computation.
    base_priority: Option<f64>,
    nodes: Vec<LocalNode>,
    /// Local subterms and comparisons computed from each local variable.
    depending: Vec<Vec<usize>>,
    derived: Vec<Option<DerivedTerm>>,
}

impl LocalProblem {
    fn goal(task: &Task) -> Self {
        let mut context = Context::default();
        let preconditions: Vec<LocalCondition> = task
            .goal
            .iter()
            .map(|&(var, value)| LocalCondition {
                local_var: context.add(var),
                var,
                value,
                phase: ConditionPhase::End,
            })
            .collect();
        let size = context.len();
        let reach_goal =
            LocalTransition::new(1, None, preconditions, TransitionAction::Effects(Vec::new()));
        let nodes = vec![
            LocalNode::new(size, NodeKind::Discrete, vec![reach_goal]),
            LocalNode::new(size, NodeKind::Discrete, Vec::new()),
        ];
        Self {
            kind: ProblemKind::Goal,
            start: 0,
            context: context.vars().to_vec(),
            base_priority: None,
            nodes,
            depending: vec![Vec::new(); size],
            derived: vec![None; size],
        }
    }

    fn discrete(task: &Task, graph: &DiscreteGraph, start: usize) -> Self {
        let context = &graph.context;
        let nodes = graph
            .nodes
            .iter()
            .map(|transitions| {
                let outgoing = transitions
                    .iter()
                    .flat_map(|value_trans| {
                        value_trans.labels.iter().map(move |label| {
                            let mut trans = LocalTransition::new(
                                value_trans.target,
                                label.op,
                                label.preconditions.clone(),
                                TransitionAction::Effects(label.effects.clone()),
                            );
                            trans.duration_local =
                                label.duration_var.and_then(|dur| context.local(dur));
                            trans
                        })
                    })
                    .collect();
                LocalNode::new(context.len(), NodeKind::Discrete, outgoing)
            })
            .collect();
        let (depending, derived) = dependencies(task, context);
        Self {
            kind: ProblemKind::Discrete { var: graph.var },
            start,
            context: context.vars().to_vec(),
            base_priority: None,
            nodes,
            depending,
            derived,
        }
    }

    /// Two truth values; only `start` has outgoing transitions, all leading
    /// to the other value. Start values past the two truth values get no
    /// transitions at all.
    fn comparison(task: &Task, graph: &ComparisonGraph, start: usize) -> Self {
        let context = &graph.context;
        let nodes = (0..=start.max(1))
            .map(|value| {
                let towards = (value <= 1).then(|| graph.relation_towards_other_value(value).op);
                let outgoing = if value == start && start <= 1 {
                    graph
                        .transitions
                        .iter()
                        .map(|numeric| {
                            let mut trans = LocalTransition::new(
                                1 - start,
                                Some(numeric.op),
                                numeric.preconditions.clone(),
                                TransitionAction::Update(NumericUpdate {
                                    fop: numeric.fop,
                                    starting: numeric.starting_var,
                                    influencing: numeric.influencing_var,
                                }),
                            );
                            trans.duration_local = numeric.duration_var;
                            trans
                        })
                        .collect()
                } else {
                    Vec::new()
                };
                LocalNode::new(context.len(), NodeKind::comparison(towards), outgoing)
            })
            .collect();
        let (depending, derived) = dependencies(task, context);
        Self {
            kind: ProblemKind::Comparison { var: graph.var },
            start,
            context: context.vars().to_vec(),
            base_priority: None,
            nodes,
            depending,
            derived,
        }
    }

    /// Apply a numeric update to `values` and recompute what depends on it.
    fn update_primitive(&self, fop: AssignmentOp, local: usize, operand: usize, values: &mut [f64]) {
        let current = values[local];
        let operand = values[operand];
        values[local] = if fop == AssignmentOp::ScaleDown && double_equals(operand, 0.0) {
            if current < 0.0 { REALLY_BIG } else { REALLY_SMALL }
        } else {
            fop.apply(current, operand)
        };
        self.update_dependents(local, values);
    }

    fn update_dependents(&self, local: usize, values: &mut [f64]) {
        for &dependent in &self.depending[local] {
            let Some(term) = self.derived[dependent] else {
                continue;
            };
            values[dependent] = term.evaluate(values);
            self.update_dependents(dependent, values);
        }
    }
}

/// Local dependency lists and expressions of the subterms and comparisons in
/// a context.
fn dependencies(task: &Task, context: &Context) -> (Vec<Vec<usize>>, Vec<Option<DerivedTerm>>) {
    let mut depending = vec![Vec::new(); context.len()];
    let mut derived = vec![None; context.len()];
    for (local, &var) in context.vars().iter().enumerate() {
        for &succ in task.causal_graph.successors(var) {
            let derived_type = matches!(
                task.var_type(succ),
                VariableType::Comparison | VariableType::SubtermFunctional
            );
            if derived_type && let Some(succ_local) = context.local(succ) {
                depending[local].push(succ_local);
            }
        }
        let relation = match &task.transition_graphs[var] {
            TransitionGraph::Subterm(subterm) => Some((subterm.left, subterm.op, subterm.right)),
            TransitionGraph::Comparison(comparison) => Some((
                comparison.holds.left,
                comparison.holds.op,
                comparison.holds.right,
            )),
            _ => None,
        };
        if let Some((left, op, right)) = relation
            && let (Some(left), Some(right)) = (context.local(left), context.local(right))
        {
            derived[local] = Some(DerivedTerm { left, op, right });
        }
    }
    (depending, derived)
}

fn makes_progress(op: BinaryOp, old: f64, new: f64) -> bool {
    match op {
        BinaryOp::Lt | BinaryOp::Le => new < old,
        BinaryOp::Gt | BinaryOp::Ge => new > old,
        BinaryOp::Eq => new.abs() < old.abs(),
        BinaryOp::Ue => !double_equals(new, 0.0),
        _ => false,
    }
}

// =============================================================================
// PRIORITY QUEUE
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct QueueEntry {
    priority: f64,
    sequence: u64,
    node: NodeRef,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    /// Reversed: the heap pops the cheapest entry, oldest first on ties.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .total_cmp(&self.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

// =============================================================================
// ARENA
// =============================================================================

/// Every local problem built so far, plus the shared queue.
#[derive(Debug, Clone)]
pub(super) struct LocalProblems {
    problems: Vec<LocalProblem>,
    index: BTreeMap<(usize, usize), usize>,
    queue: BinaryHeap<QueueEntry>,
    sequence: u64,
    /// Longest wait for a running operator seen in the current computation.
    pub waiting_time: f64,
    zero_cost_waiting: bool,
    waiting_only_if_matching: bool,
}

impl LocalProblems {
    pub(super) fn new(task: &Task, zero_cost_waiting: bool, waiting_only_if_matching: bool) -> Self {
        Self {
            problems: vec![LocalProblem::goal(task)],
            index: BTreeMap::new(),
            queue: BinaryHeap::new(),
            sequence: 0,
            waiting_time: REALLY_SMALL,
            zero_cost_waiting,
            waiting_only_if_matching,
        }
    }

    fn node(&self, node: NodeRef) -> &LocalNode {
        &self.problems[node.problem].nodes[node.value]
    }

    fn node_mut(&mut self, node: NodeRef) -> &mut LocalNode {
        &mut self.problems[node.problem].nodes[node.value]
    }

    fn trans(&self, trans: TransRef) -> &LocalTransition {
        &self.problems[trans.problem].nodes[trans.source].outgoing[trans.index]
    }

    fn trans_mut(&mut self, trans: TransRef) -> &mut LocalTransition {
        &mut self.problems[trans.problem].nodes[trans.source].outgoing[trans.index]
    }

    fn target_of(&self, trans: TransRef) -> NodeRef {
        NodeRef {
            problem: trans.problem,
            value: self.trans(trans).target,
        }
    }

    fn node_ref(&self, problem: usize, value: f64) -> Option<NodeRef> {
        if value < 0.0 {
            return None;
        }
        let value = value as usize;
        (value < self.problems[problem].nodes.len()).then_some(NodeRef { problem, value })
    }

    fn is_initialized(&self, problem: usize) -> bool {
        self.problems[problem].base_priority.is_some()
    }

    fn priority(&self, node: NodeRef) -> f64 {
        self.node(node).cost + self.problems[node.problem].base_priority.unwrap_or(0.0)
    }

    fn push(&mut self, node: NodeRef) {
        let priority = self.priority(node);
        self.sequence += 1;
        self.queue.push(QueueEntry {
            priority,
            sequence: self.sequence,
            node,
        });
    }

    /// Duration of a transition as seen from its source node, never negative.
    fn direct_cost(&self, trans: TransRef) -> f64 {
        self.trans(trans)
            .duration_local
            .map_or(0.0, |local| self.node(trans.source()).children_state[local])
            .max(0.0)
    }

    /// Is the transition's operator running in `state`? Records the wait.
    fn is_running(&mut self, op: Option<OperatorId>, state: &TimeStampedState) -> bool {
        let Some(op) = op else {
            return false;
        };
        match state.operators.iter().find(|running| running.op == op) {
            Some(running) => {
                self.waiting_time = self.waiting_time.max(running.time_increment - EPS_TIME);
                true
            }
            None => false,
        }
    }

    /// Existing problem for `var` starting at `value`.
    fn existing(&self, var: usize, value: f64) -> Option<usize> {
        if value < 0.0 {
            return None;
        }
        self.index.get(&(var, value as usize)).copied()
    }

    /// Problem for `var` starting at `value`, built on first use. `None` for
    /// variables without a discrete or comparison graph.
    fn problem_for(&mut self, task: &Task, var: usize, value: f64) -> Option<usize> {
        if let Some(problem) = self.existing(var, value) {
            return Some(problem);
        }
        if value < 0.0 {
            return None;
        }
        let start = value as usize;
        let problem = match task.transition_graphs.get(var)? {
            TransitionGraph::Discrete(graph) if start < graph.nodes.len() => {
                LocalProblem::discrete(task, graph, start)
            }
            TransitionGraph::Comparison(graph) => LocalProblem::comparison(task, graph, start),
            _ => return None,
        };
        let id = self.problems.len();
        self.problems.push(problem);
        self.index.insert((var, start), id);
        Some(id)
    }

    /// Node resolving `var = value` when the variable currently has
    /// `current`, initializing its problem on behalf of `requester`.
    fn condition_node(
        &mut self,
        task: &Task,
        cond: &LocalCondition,
        current: f64,
        requester: NodeRef,
        state: &TimeStampedState,
    ) -> Option<NodeRef> {
        let problem = self.problem_for(task, cond.var, current)?;
        if !self.is_initialized(problem) {
            let base = self.priority(requester);
            self.initialize(task, problem, base, state);
        }
        self.node_ref(problem, cond.value)
    }

    // =========================================================================
    // SOLVING
    // =========================================================================

    /// Cost of reaching the goal node from `state`, or `DEAD_END`.
    pub(super) fn compute_costs(&mut self, task: &Task, state: &TimeStampedState) -> f64 {
        self.queue.clear();
        self.waiting_time = REALLY_SMALL;
        for problem in &mut self.problems {
            problem.base_priority = None;
        }
        self.initialize(task, GOAL_PROBLEM, 0.0, state);
        while let Some(entry) = self.queue.pop() {
            if entry.node == GOAL_NODE {
                return self.node(GOAL_NODE).cost;
            }
            if !self.node(entry.node).expanded {
                self.on_expand(task, entry.node, state);
            }
        }
        DEAD_END
    }

    fn initialize(&mut self, task: &Task, problem: usize, base: f64, state: &TimeStampedState) {
        let local = &mut self.problems[problem];
        local.base_priority = Some(base);
        for node in &mut local.nodes {
            node.reset();
        }
        let start = NodeRef {
            problem,
            value: local.start,
        };
        let children: Vec<f64> = local.context.iter().map(|&var| state.value(var)).collect();
        let start_node = self.node_mut(start);
        start_node.cost = 0.0;
        start_node.children_state = children;
        self.push(start);

        let local = &self.problems[problem];
        let ProblemKind::Discrete { var } = local.kind else {
            return;
        };
        if self.waiting_only_if_matching && !double_equals(state.value(var), local.start as f64) {
            return;
        }
        let context = local.context.clone();

        for (k, scheduled) in state.scheduled_effects.iter().enumerate() {
            if scheduled.effect.var != var {
                continue;
            }
            let Some(post) = scheduled.effect.effect.post() else {
                continue;
            };
            let Some(target) = self.node_ref(problem, post) else {
                continue;
            };
            let children = context
                .iter()
                .map(|&ctx_var| {
                    state
                        .scheduled_effects
                        .iter()
                        .enumerate()
                        .find(|(j, other)| {
                            *j != k
                                && other.effect.var == ctx_var
                                && double_equals(other.time_increment, scheduled.time_increment)
                        })
                        .and_then(|(_, other)| other.effect.effect.post())
                        .unwrap_or_else(|| state.value(ctx_var))
                })
                .collect();
            let zero_cost = self.zero_cost_waiting;
            let node = self.node_mut(target);
            node.cost = if zero_cost { 0.0 } else { scheduled.time_increment };
            node.wait_for = Some(scheduled.time_increment);
            node.children_state = children;
            self.on_expand(task, target, state);
        }
    }

    fn on_expand(&mut self, task: &Task, node: NodeRef, state: &TimeStampedState) {
        match self.problems[node.problem].kind {
            ProblemKind::Comparison { .. } => self.expand_comparison_node(task, node, state),
            ProblemKind::Goal | ProblemKind::Discrete { .. } => {
                self.expand_discrete_node(task, node, state);
            }
        }
    }

    /// Call back every transition waiting for `node`, newest first.
    fn notify_waiting(&mut self, node: NodeRef) {
        let waiting = std::mem::take(&mut self.node_mut(node).waiting);
        let cost = self.node(node).cost;
        for (trans, cond) in waiting.into_iter().rev() {
            self.on_condition_reached(trans, cond, cost);
        }
    }

    fn on_condition_reached(&mut self, trans: TransRef, cond: usize, cost: f64) {
        match self.problems[trans.problem].kind {
            ProblemKind::Comparison { .. } => self.comparison_condition_reached(trans, cond, cost),
            ProblemKind::Goal | ProblemKind::Discrete { .. } => {
                let local = self.trans_mut(trans);
                local.unreached = local.unreached.saturating_sub(1);
                local.target_cost += cost;
                self.try_to_fire(trans);
            }
        }
    }

    // ----- discrete nodes -----------------------------------------------------

    fn expand_discrete_node(&mut self, task: &Task, node: NodeRef, state: &TimeStampedState) {
        if self.node(node).expanded {
            return;
        }
        self.node_mut(node).expanded = true;

        if let Some(reached_by) = self.node(node).reached_by {
            let parent = reached_by.source();
            let mut children = self.node(parent).children_state.clone();
            let problem = &self.problems[node.problem];
            let trans = self.trans(reached_by);
            for cond in &trans.preconditions {
                children[cond.local_var] = cond.value;
            }
            match &trans.action {
                TransitionAction::Effects(effects) => {
                    for effect in effects {
                        match *effect {
                            CyclicEffect::Assign { local_var, value } => {
                                children[local_var] = value;
                            }
                            CyclicEffect::Update {
                                local_var,
                                op,
                                operand,
                            } => problem.update_primitive(op, local_var, operand, &mut children),
                        }
                    }
                }
                TransitionAction::Update(update) => problem.update_primitive(
                    update.fop,
                    update.starting,
                    update.influencing,
                    &mut children,
                ),
            }
            let parent_reached_by = self.node(parent).reached_by;
            let expanded = self.node_mut(node);
            expanded.children_state = children;
            if parent_reached_by.is_some() {
                expanded.reached_by = parent_reached_by;
            }
        }

        self.notify_waiting(node);
        for index in 0..self.node(node).outgoing.len() {
            let trans = TransRef {
                problem: node.problem,
                source: node.value,
                index,
            };
            self.on_source_expanded(task, trans, state);
        }
    }

    fn on_source_expanded(&mut self, task: &Task, trans: TransRef, state: &TimeStampedState) {
        let source = trans.source();
        let target = self.target_of(trans);
        self.trans_mut(trans).unreached = 0;

        if self.is_running(self.trans(trans).op, state) {
            self.trans_mut(trans).target_cost = 0.0;
        } else {
            let base = self.node(source).cost + self.direct_cost(trans);
            self.trans_mut(trans).target_cost = base;
            if self.node(target).cost <= base {
                return;
            }
            let conditions = self.trans(trans).preconditions.clone();
            for (i, cond) in conditions.iter().enumerate() {
                let current = self.node(source).children_state[cond.local_var];
                if double_equals(current, cond.value) {
                    continue;
                }
                let Some(cond_node) = self.condition_node(task, cond, current, source, state) else {
                    self.trans_mut(trans).unreached += 1;
                    continue;
                };
                let resolving = self.node(cond_node);
                if let Some(wait) = resolving.wait_for {
                    self.waiting_time = self.waiting_time.max(wait - EPS_TIME);
                } else if resolving.expanded {
                    let cost = resolving.cost;
                    let local = self.trans_mut(trans);
                    local.target_cost += cost;
                    let total = local.target_cost;
                    if self.node(target).cost <= total {
                        return;
                    }
                } else {
                    self.trans_mut(trans).unreached += 1;
                    self.node_mut(cond_node).waiting.push((trans, i));
                }
            }
        }
        self.try_to_fire(trans);
    }

    fn try_to_fire(&mut self, trans: TransRef) {
        let local = self.trans(trans);
        let (unreached, cost) = (local.unreached, local.target_cost);
        let target = self.target_of(trans);
        if unreached == 0 && cost < self.node(target).cost {
            let node = self.node_mut(target);
            node.cost = cost;
            node.reached_by = Some(trans);
            node.pred = Some(trans);
            self.push(target);
        }
    }

    // ----- comparison nodes ---------------------------------------------------

    fn expand_comparison_node(&mut self, task: &Task, node: NodeRef, state: &TimeStampedState) {
        if self.node(node).is_opened() {
            if let Some(best) = self.node(node).best() {
                self.expand_comparison_transition(best);
            }
            return;
        }
        self.node_mut(node).open();

        let mut ready = Vec::new();
        for index in 0..self.node(node).outgoing.len() {
            let trans = TransRef {
                problem: node.problem,
                source: node.value,
                index,
            };
            if !self.transition_makes_progress(trans) {
                continue;
            }
            let satisfied = self.comparison_conditions_satisfied(task, trans, state);
            if satisfied || self.is_running(self.trans(trans).op, state) {
                ready.push(trans);
            }
        }
        if !ready.is_empty() {
            for &trans in &ready {
                self.fire_comparison(trans);
            }
            if let Some(best) = self.node(node).best() {
                let target = self.target_of(best);
                self.push(target);
            }
        }

        for index in 0..self.node(node).outgoing.len() {
            let trans = TransRef {
                problem: node.problem,
                source: node.value,
                index,
            };
            let subscriptions = std::mem::take(&mut self.trans_mut(trans).subscriptions);
            for &(waiting_on, cond) in &subscriptions {
                self.node_mut(waiting_on).waiting.push((trans, cond));
            }
            self.trans_mut(trans).subscriptions = subscriptions;
        }
    }

    /// Does applying the transition's update move the compared term towards
    /// the relation of its source node?
    fn transition_makes_progress(&self, trans: TransRef) -> bool {
        let problem = &self.problems[trans.problem];
        let source = &problem.nodes[trans.source];
        let local = &source.outgoing[trans.index];
        let (NodeKind::Comparison { towards: Some(op), .. }, TransitionAction::Update(update)) =
            (source.kind, &local.action)
        else {
            return false;
        };
        let Some(&old) = source.children_state.first() else {
            return false;
        };
        let mut updated = source.children_state.clone();
        problem.update_primitive(update.fop, update.starting, update.influencing, &mut updated);
        makes_progress(op, old, updated[0])
    }

    /// Resolve what can be resolved now; remember the rest for subscription.
    fn comparison_conditions_satisfied(
        &mut self,
        task: &Task,
        trans: TransRef,
        state: &TimeStampedState,
    ) -> bool {
        let source = trans.source();
        let conditions = self.trans(trans).preconditions.clone();
        let mut all = true;
        for (i, cond) in conditions.iter().enumerate() {
            let current = self.node(source).children_state[cond.local_var];
            if double_equals(current, cond.value) {
                self.trans_mut(trans).satisfied[i] = true;
                continue;
            }
            let Some(cond_node) = self.condition_node(task, cond, current, source, state) else {
                all = false;
                continue;
            };
            let resolving = self.node(cond_node);
            if let Some(wait) = resolving.wait_for {
                self.waiting_time = self.waiting_time.max(wait - EPS_TIME);
                self.trans_mut(trans).satisfied[i] = true;
            } else if resolving.expanded {
                let cost = resolving.cost;
                let local = self.trans_mut(trans);
                local.target_cost += cost;
                local.satisfied[i] = true;
            } else {
                self.trans_mut(trans).subscriptions.push((cond_node, i));
                all = false;
            }
        }
        all
    }

    fn fire_comparison(&mut self, trans: TransRef) {
        let direct = self.direct_cost(trans);
        let local = self.trans_mut(trans);
        local.target_cost += direct;
        let cost = local.target_cost;
        let target = self.target_of(trans);
        if cost < self.node(target).cost {
            let node = self.node_mut(target);
            node.cost = cost;
            node.record_best(trans);
            node.open();
            self.node_mut(trans.source()).record_best(trans);
        }
    }

    fn expand_comparison_transition(&mut self, trans: TransRef) {
        let target = self.target_of(trans);
        let node = self.node_mut(target);
        node.reached_by = Some(trans);
        node.pred = Some(trans);
        node.expanded = true;
        self.node_mut(trans.source()).expanded = true;
        self.notify_waiting(target);
    }

    fn comparison_condition_reached(&mut self, trans: TransRef, cond: usize, cost: f64) {
        let source = self.node(trans.source());
        if !source.is_opened() || source.expanded || self.trans(trans).satisfied[cond] {
            return;
        }
        let local = self.trans_mut(trans);
        local.target_cost += cost;
        local.satisfied[cond] = true;
        if !local.satisfied.iter().all(|&done| done) {
            return;
        }
        let direct = self.direct_cost(trans);
        let local = self.trans_mut(trans);
        local.target_cost += direct;
        let cost = local.target_cost;
        let target = self.target_of(trans);
        let node = self.node_mut(target);
        node.cost = cost;
        node.record_best(trans);
        node.open();
        self.node_mut(trans.source()).record_best(trans);
        self.push(target);
    }

    // =========================================================================
    // EXTRACTION
    // =========================================================================

    /// Cost of each goal condition in the last computation; `None` for goals
    /// that already hold.
    pub(super) fn costs_of_goals(&self, task: &Task, state: &TimeStampedState) -> Vec<Option<f64>> {
        task.goal
            .iter()
            .map(|&(var, value)| {
                let current = state.value(var);
                if current as i64 == value as i64 {
                    return None;
                }
                let cost = self
                    .existing(var, current)
                    .and_then(|problem| self.node_ref(problem, value))
                    .map_or(QUITE_A_LOT, |node| self.node(node).cost);
                Some(cost)
            })
            .collect()
    }

    /// Collect preferred operators per goal by walking `reached_by` links
    /// down from `node`.
    pub(super) fn mark_helpful(
        &mut self,
        node: NodeRef,
        state: &TimeStampedState,
        goal_index: usize,
        by_goal: &mut [BTreeSet<OperatorId>],
        visited: &mut BTreeSet<NodeRef>,
    ) {
        if !self.is_initialized(node.problem) || !visited.insert(node) {
            return;
        }
        let Some(reached_by) = self.node(node).reached_by else {
            return;
        };
        let duration = self
            .trans(reached_by)
            .duration_local
            .map_or(0.0, |local| self.node(reached_by.source()).children_state[local]);
        let trans = self.trans(reached_by);
        let (op, target_cost) = (trans.op, trans.target_cost);
        let conditions = trans.preconditions.clone();

        if double_equals(target_cost, duration) {
            let conditions_hold = conditions
                .iter()
                .all(|cond| double_equals(state.value(cond.var), cond.value));
            if let Some(op) = op
                && conditions_hold
                && !self.is_running(Some(op), state)
                && let Some(set) = by_goal.get_mut(goal_index)
            {
                set.insert(op);
            }
            return;
        }
        if self.is_running(op, state) {
            return;
        }
        for (i, cond) in conditions.iter().enumerate() {
            let current = state.value(cond.var);
            if current as i64 == cond.value as i64 {
                continue;
            }
            let Some(child) = self
                .existing(cond.var, current)
                .and_then(|problem| self.node_ref(problem, cond.value))
            else {
                continue;
            };
            let child_node = self.node(child);
            if child_node.cost < QUITE_A_LOT && child_node.wait_for.is_none() {
                let goal = if node == GOAL_NODE { i } else { goal_index };
                self.mark_helpful(child, state, goal, by_goal, visited);
            }
        }
    }

    /// Operators on the cheapest path to `goal` inside `problem`, with
    /// ordering constraints between them.
    ///
    /// Every operator gets an entry in `needed`; constraints `(a, b)` mean
    /// `needed[a]` ends before `needed[b]` starts. Returns the operators of
    /// this subtree in the order they were placed.
    pub(super) fn causal_constraints(
        &mut self,
        task: &Task,
        goal: NodeRef,
        state: &TimeStampedState,
        constraints: &mut BTreeSet<(usize, usize)>,
        needed: &mut Vec<TimedOp>,
        visiting: &mut BTreeSet<NodeRef>,
    ) -> Vec<TimedOp> {
        let mut returned: Vec<TimedOp> = Vec::new();
        if !visiting.insert(goal) {
            return returned;
        }
        let problem = goal.problem;
        let start = NodeRef {
            problem,
            value: self.problems[problem].start,
        };
        let mut path = Vec::new();
        let mut current = goal;
        while current != start && path.len() < self.problems[problem].nodes.len() {
            let Some(pred) = self.node(current).pred else {
                break;
            };
            if self.is_running(self.trans(pred).op, state) {
                break;
            }
            path.push(pred);
            current = pred.source();
        }

        for trans in path {
            let direct = self.direct_cost(trans);
            let op = self.trans(trans).op;
            let conditions = self.trans(trans).preconditions.clone();
            let main = op.map(|op| {
                let timed = TimedOp {
                    op,
                    duration: direct,
                    index: needed.len(),
                };
                needed.push(timed);
                for later in &returned {
                    if task.operator(op).is_disabled_by(task.operator(later.op)) {
                        constraints.insert((timed.index, later.index));
                    }
                }
                timed
            });

            let mut subplans: Vec<Vec<TimedOp>> = Vec::new();
            for cond in &conditions {
                let actual = self.node(trans.source()).children_state[cond.local_var];
                let mut new_ops = Vec::new();
                if !double_equals(actual, cond.value)
                    && let Some(sub) = self.existing(cond.var, actual)
                    && self.is_initialized(sub)
                    && let Some(sub_goal) = self.node_ref(sub, cond.value)
                {
                    new_ops = self.causal_constraints(task, sub_goal, state, constraints, needed, visiting);
                    if let Some(main) = main {
                        for new_op in &new_ops {
                            constraints.insert((new_op.index, main.index));
                            for later in &returned {
                                if task.operator(new_op.op).is_disabled_by(task.operator(later.op)) {
                                    constraints.insert((new_op.index, later.index));
                                }
                            }
                        }
                    }
                }
                subplans.push(new_ops);
            }

            if let Some(main) = main {
                returned.push(main);
            }
            for (k, first) in subplans.iter().enumerate() {
                for second in &subplans[k + 1..] {
                    for a in first {
                        for b in second {
                            if task.operator(a.op).is_disabled_by(task.operator(b.op)) {
                                constraints.insert((a.index, b.index));
                            }
                        }
                    }
                }
            }
            for subplan in subplans {
                returned.extend(subplan);
            }
        }
        visiting.remove(&goal);
        returned
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
    fn queue_pops_cheapest_then_oldest() {
        let node = |value| NodeRef { problem: 0, value };
        let mut heap = BinaryHeap::new();
        heap.push(QueueEntry { priority: 2.0, sequence: 1, node: node(0) });
        heap.push(QueueEntry { priority: 1.0, sequence: 2, node: node(1) });
        heap.push(QueueEntry { priority: 1.0, sequence: 3, node: node(2) });
        let order: Vec<usize> = std::iter::from_fn(|| heap.pop()).map(|e| e.node.value).collect();
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn derived_terms_use_tolerant_comparisons() {
        let values = [1.0, 1.0 + EPSILON / 2.0, 3.0];
        let term = |left, op, right| DerivedTerm { left, op, right };
        assert_eq!(term(0, BinaryOp::Lt, 1).evaluate(&values), 1.0);
        assert_eq!(term(0, BinaryOp::Le, 1).evaluate(&values), 0.0);
        assert_eq!(term(2, BinaryOp::Ge, 0).evaluate(&values), 0.0);
        assert_eq!(term(0, BinaryOp::Gt, 1).evaluate(&values), 1.0);
        assert_eq!(term(0, BinaryOp::Ue, 2).evaluate(&values), 0.0);
        assert_eq!(term(2, BinaryOp::Divis, 0).evaluate(&values), 3.0);
        assert_eq!(term(2, BinaryOp::Divis, 3).evaluate(&[0.0, 0.0, 3.0, 0.0]), REALLY_SMALL);
    }

    #[test]
    fn progress_towards_relation() {
        assert!(makes_progress(BinaryOp::Lt, 3.0, 2.0));
        assert!(!makes_progress(BinaryOp::Ge, 3.0, 2.0));
        assert!(makes_progress(BinaryOp::Eq, -3.0, 2.0));
        assert!(!makes_progress(BinaryOp::Ue, 1.0, 0.0));
        assert!(!makes_progress(BinaryOp::Add, 1.0, 2.0));
    }

    #[test]
    fn move_costs_its_duration() {
        let task = move_task();
        let mut problems = LocalProblems::new(&task, true, false);
        let h = problems.compute_costs(&task, &task.initial_state);
        assert_eq!(h, 1.0);
        assert_eq!(problems.index.len(), 1);

        let mut by_goal = vec![BTreeSet::new()];
        problems.mark_helpful(GOAL_NODE, &task.initial_state, 0, &mut by_goal, &mut BTreeSet::new());
        assert_eq!(by_goal[0].iter().copied().collect::<Vec<_>>(), vec![OperatorId(0)]);
        assert_eq!(problems.costs_of_goals(&task, &task.initial_state), vec![Some(1.0)]);
    }

    #[test]
    fn running_operator_is_free() {
        let task = move_task();
        let started = task.initial_state.apply(&task, OperatorId(0), false);
        let mut problems = LocalProblems::new(&task, true, false);
        let h = problems.compute_costs(&task, &started);
        assert_eq!(h, 0.0);
        assert!(problems.waiting_time > 0.9);
    }

    #[test]
    fn comparison_nodes_track_best_transition() {
        let task = Task::parse(include_str!("../../tests/fixtures/numeric.sas")).expect("parse");
        let mut problems = LocalProblems::new(&task, true, false);
        assert_eq!(problems.compute_costs(&task, &task.initial_state), 1.0);

        let id = problems.existing(3, 1.0).expect("comparison problem");
        let problem = &problems.problems[id];
        assert_eq!(problem.kind, ProblemKind::Comparison { var: 3 });
        assert!(matches!(
            problem.nodes[1].kind,
            NodeKind::Comparison { towards: Some(BinaryOp::Ge), opened: true, .. }
        ));
        assert!(matches!(
            problem.nodes[0].kind,
            NodeKind::Comparison { towards: Some(BinaryOp::Lt), .. }
        ));
        let best = problem.nodes[0].best().expect("reached by an update");
        assert!(matches!(problems.trans(best).action, TransitionAction::Update(_)));
        assert_eq!(problems.node(NodeRef { problem: id, value: 0 }).cost, 1.0);

        let mut node = problems.problems[id].nodes[1].clone();
        node.reset();
        assert!(!node.is_opened());
        assert!(node.best().is_none());
        assert_eq!(problems.compute_costs(&task, &task.initial_state), 1.0);
    }

    #[test]
    fn schedule_of_move_has_one_operator() {
        let task = move_task();
        let mut problems = LocalProblems::new(&task, true, false);
        problems.compute_costs(&task, &task.initial_state);
        let mut constraints = BTreeSet::new();
        let mut needed = Vec::new();
        let ops = problems.causal_constraints(
            &task,
            GOAL_NODE,
            &task.initial_state,
            &mut constraints,
            &mut needed,
            &mut BTreeSet::new(),
        );
        assert_eq!(ops.len(), 1);
        assert_eq!(needed.len(), 1);
        assert_eq!(needed[0].op, OperatorId(0));
        assert_eq!(needed[0].duration, 1.0);
        assert!(constraints.is_empty());
    }
}
