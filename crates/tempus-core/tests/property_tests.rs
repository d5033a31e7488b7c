//! # Property-Based Tests
//!
//! Timing and determinism invariants checked with proptest.

use proptest::collection::vec;
use proptest::prelude::*;
use tempus_core::axioms::LogicAxiom;
use tempus_core::task::{Prevail, Variable};
use tempus_core::{
    AxiomEvaluator, BestFirstSearchEngine, ClosedList, GValues, OperatorId, PlannerParameters,
    SearchStatus, SimpleTemporalNetwork, Task, VariableType,
};

const MOVE: &str = include_str!("fixtures/move.sas");
const CHAIN: &str = include_str!("fixtures/chain.sas");

/// The move fixture with duration `d`.
fn move_with_duration(d: u32) -> Task {
    let text = MOVE.replacen("begin_state\n0 1\n", &format!("begin_state\n0 {}\n", d), 1);
    Task::parse(&text).expect("parse")
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Starting an operator and letting time pass moves the clock by its
    /// duration, wherever the clock started.
    #[test]
    fn time_passing_is_translation_invariant(start in 0u32..1000, duration in 1u32..50) {
        let task = move_with_duration(duration);
        let mut state = task.initial_state.clone();
        state.timestamp = f64::from(start);

        let done = state
            .apply(&task, OperatorId(0), false)
            .let_time_pass(&task, false, false, false);

        prop_assert!((done.timestamp - f64::from(start + duration)).abs() < 1e-9);
        prop_assert_eq!(done.value(0), 1.0);
        prop_assert!(done.operators.is_empty());
    }

    /// Passing time in two steps, the first to an intermediate point,
    /// ends in the same state as one step.
    #[test]
    fn time_passing_commutes(duration in 1u32..50) {
        let task = move_with_duration(duration);
        let started = task.initial_state.apply(&task, OperatorId(0), false);

        let direct = started.let_time_pass(&task, false, false, false);
        let split = started
            .let_time_pass(&task, true, false, false)
            .let_time_pass(&task, false, false, false);

        prop_assert_eq!(&direct.values, &split.values);
        prop_assert!((direct.timestamp - split.timestamp).abs() < 1e-9);
        prop_assert_eq!(direct.operators.len(), split.operators.len());
    }

    /// Evaluating the axioms of a settled state changes nothing.
    #[test]
    fn axioms_reach_fixed_point(p in 0u32..2, q in 0u32..2) {
        let vars = vec![
            Variable::new("p", 2, None, VariableType::Logical),
            Variable::new("q", 2, None, VariableType::Logical),
            Variable::new("both", 2, Some(0), VariableType::Logical),
            Variable::new("either", 2, Some(0), VariableType::Logical),
            Variable::new("neither", 2, Some(1), VariableType::Logical),
        ];
        let rule = |conditions: Vec<Prevail>, affected: usize| LogicAxiom {
            conditions,
            affected,
            old_value: 0.0,
            new_value: 1.0,
        };
        let rules = vec![
            rule(vec![Prevail::new(0, 1.0), Prevail::new(1, 1.0)], 2),
            rule(vec![Prevail::new(0, 1.0)], 3),
            rule(vec![Prevail::new(1, 1.0)], 3),
            rule(vec![Prevail::new(3, 0.0)], 4),
        ];
        let evaluator = AxiomEvaluator::new(&vars, vec![0.0; 5], rules, Vec::new())
            .expect("evaluator");

        let mut values = vec![f64::from(p), f64::from(q), 0.0, 0.0, 0.0];
        evaluator.evaluate(&mut values);
        let settled = values.clone();
        evaluator.evaluate(&mut values);
        prop_assert_eq!(&values, &settled);

        prop_assert_eq!(values[2] == 1.0, p == 1 && q == 1);
        prop_assert_eq!(values[3] == 1.0, p == 1 || q == 1);
        prop_assert_eq!(values[4] == 1.0, p == 0 && q == 0);
    }

    /// A closed state dominates exactly the copies that are not earlier.
    #[test]
    fn closed_list_dominance(closed_at in 0u32..100, probe_at in 0u32..100) {
        let task = move_with_duration(1);
        let mut closed = ClosedList::new(&task);
        let mut stored = task.initial_state.clone();
        stored.timestamp = f64::from(closed_at);
        closed.insert(stored, None, None);

        let mut probe = task.initial_state.clone();
        probe.timestamp = f64::from(probe_at);
        prop_assert_eq!(closed.contains(&probe), probe_at >= closed_at);
    }

    /// A chain of back-to-back actions takes the sum of their durations.
    #[test]
    fn stn_sequence_adds_durations(durations in vec(1u32..20, 1..8)) {
        let n = durations.len();
        let mut stn = SimpleTemporalNetwork::new(2 * n);
        for i in 0..2 * n {
            stn.set_unbounded_interval_from_origin(i, 0.0);
        }
        for (i, &d) in durations.iter().enumerate() {
            stn.set_singleton_interval(2 * i, 2 * i + 1, f64::from(d));
            if i > 0 {
                stn.set_unbounded_interval(2 * i - 1, 2 * i, 0.0);
            }
        }
        stn.solve();

        let total: u32 = durations.iter().sum();
        prop_assert!(stn.is_consistent());
        prop_assert!((stn.tightest_makespan() - f64::from(total)).abs() < 1e-9);
    }

    /// Contradicting bounds are always detected.
    #[test]
    fn stn_detects_contradiction(lower in 1u32..100, gap in 1u32..100) {
        let mut stn = SimpleTemporalNetwork::new(2);
        stn.set_interval(0, 1, f64::from(lower + gap), f64::from(lower + gap + 1));
        stn.set_interval(0, 1, 0.0, f64::from(lower));
        stn.solve();
        prop_assert!(!stn.is_consistent());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Every search configuration solves the chain with the same makespan,
    /// and repeating a configuration repeats the search exactly.
    #[test]
    fn search_configurations_agree(
        lazy in any::<bool>(),
        greedy in any::<bool>(),
        g_values in prop_oneof![
            Just(GValues::Timestamp),
            Just(GValues::Cost),
            Just(GValues::Makespan),
            Just(GValues::Weighted),
        ],
    ) {
        let task = Task::parse(CHAIN).expect("parse");
        let params = PlannerParameters {
            cyclic_cg_heuristic: true,
            cyclic_cg_preferred_operators: true,
            lazy_evaluation: lazy,
            greedy,
            g_values,
            verbose: false,
            ..PlannerParameters::default()
        };
        let run = || {
            let mut engine = BestFirstSearchEngine::new(&task, &params).expect("engine");
            engine.initialize();
            let status = engine.search();
            (status, engine.expanded(), engine.solution().map(|s| s.makespan()))
        };

        let first = run();
        prop_assert_eq!(first.0, SearchStatus::Solved);
        let makespan = first.2.expect("plan");
        prop_assert!((makespan - 2.0).abs() < 0.1);
        prop_assert_eq!(first, run());
    }
}
