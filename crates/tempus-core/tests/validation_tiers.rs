//! # Validation Tier Tests (T0-T4)
//!
//! If ANY tier fails, the planner is INVALID.
//!
//! ## Tiers
//! - T0: Task Reading
//! - T1: Temporal State Transition
//! - T2: Derived Variables and Closed List
//! - T3: Heuristic Estimates
//! - T4: End-to-End Search

use tempus_core::{
    BestFirstSearchEngine, ClosedList, CyclicCgHeuristic, CyclicCgMode, GoalLimitedMode,
    Heuristic, NoHeuristic, OpenListMode, OperatorId, PlannerParameters, QueueManagementMode,
    SearchStatus, Step, Task, TempusError, VariableType, format_plan,
};

const MOVE: &str = include_str!("fixtures/move.sas");
const CHAIN: &str = include_str!("fixtures/chain.sas");
const NUMERIC: &str = include_str!("fixtures/numeric.sas");
const PAIR: &str = include_str!("fixtures/pair.sas");

fn parse(text: &str) -> Task {
    Task::parse(text).expect("fixture parses")
}

fn cea() -> PlannerParameters {
    PlannerParameters {
        cyclic_cg_heuristic: true,
        cyclic_cg_preferred_operators: true,
        verbose: false,
        ..PlannerParameters::default()
    }
}

// =============================================================================
// TIER T0: TASK READING
// =============================================================================

mod t0_task_reading {
    use super::*;

    /// T0.1: Both fixtures parse and report their shape.
    #[test]
    fn fixtures_parse() {
        let task = parse(CHAIN);
        let summary = task.summary();
        assert_eq!(summary.variables, 3);
        assert_eq!(summary.logical, 2);
        assert_eq!(summary.primitive_functional, 1);
        assert_eq!(summary.operators, 2);
        assert_eq!(summary.goal.len(), 2);
        assert_eq!(summary.goal[0].variable, "a");
        assert!(!summary.contains_universal_conditions);

        let task = parse(MOVE);
        assert_eq!(task.operator(OperatorId(0)).name, "Move");
        assert_eq!(task.initial_state.values, vec![0.0, 1.0]);
    }

    /// T0.2: A truncated task is rejected, not half-read.
    #[test]
    fn truncated_task_rejected() {
        let cut = &CHAIN[..CHAIN.find("begin_SG").expect("marker")];
        assert!(Task::parse(cut).is_err());
    }

    /// T0.3: A misspelled section marker is a parse error.
    #[test]
    fn wrong_marker_rejected() {
        let broken = MOVE.replacen("end_goal", "end_gaol", 1);
        assert!(matches!(Task::parse(&broken), Err(TempusError::Parse(_))));
    }

    /// T0.4: Durations must be equality constraints.
    #[test]
    fn non_equality_duration_rejected() {
        let broken = MOVE.replacen("Move\n= 1", "Move\n< 1", 1);
        assert!(Task::parse(&broken).is_err());
    }

    /// T0.5: Parsing is deterministic.
    #[test]
    fn parsing_deterministic() {
        assert_eq!(parse(CHAIN).summary(), parse(CHAIN).summary());
    }

    /// T0.6: A numeric axiom turns its variable into a comparison whose
    /// initial truth value is computed, not read.
    #[test]
    fn numeric_fixture_types_comparison() {
        let task = parse(NUMERIC);
        assert_eq!(task.var_type(0), VariableType::PrimitiveFunctional);
        assert_eq!(task.var_type(3), VariableType::Comparison);
        assert_eq!(task.summary().numeric_axioms, 1);
        let graph = task.transition_graphs[3].as_comparison().expect("comparison graph");
        assert_eq!(graph.transitions.len(), 1);
        assert_eq!(task.initial_state.value(3), 1.0);
    }
}

// =============================================================================
// TIER T1: TEMPORAL STATE TRANSITION
// =============================================================================

mod t1_state_transition {
    use super::*;

    /// T1.1: Starting an operator schedules its end effect without firing it.
    #[test]
    fn start_schedules_end_effect() {
        let task = parse(MOVE);
        let started = task.initial_state.apply(&task, OperatorId(0), false);

        assert_eq!(started.timestamp, 0.0);
        assert_eq!(started.value(0), 0.0);
        assert_eq!(started.operators.len(), 1);
        assert_eq!(started.scheduled_effects.len(), 1);
        assert_eq!(started.max_remaining_time(), 1.0);
    }

    /// T1.2: Letting time pass fires due effects and retires the operator.
    #[test]
    fn time_passing_fires_effects() {
        let task = parse(MOVE);
        let started = task.initial_state.apply(&task, OperatorId(0), false);
        let done = started.let_time_pass(&task, false, false, false);

        assert_eq!(done.timestamp, 1.0);
        assert_eq!(done.value(0), 1.0);
        assert!(done.operators.is_empty());
        assert!(done.scheduled_effects.is_empty());
        assert!(done.satisfies_goal(&task.goal));
    }

    /// T1.3: Moving to an intermediate point fires nothing.
    #[test]
    fn intermediate_point_fires_nothing() {
        let task = parse(MOVE);
        let started = task.initial_state.apply(&task, OperatorId(0), false);
        let halfway = started.let_time_pass(&task, true, false, false);

        assert_eq!(halfway.timestamp, 0.5);
        assert_eq!(halfway.value(0), 0.0);
        assert_eq!(halfway.operators.len(), 1);
    }

    /// T1.4: The successor generator only offers operators whose start
    /// condition matches the state.
    #[test]
    fn applicable_operators_follow_state() {
        let task = parse(CHAIN);
        let initial = task.successor_generator.applicable_ops(&task.initial_state);
        assert_eq!(initial, vec![OperatorId(0)]);

        let a_done = task
            .initial_state
            .apply(&task, OperatorId(0), false)
            .let_time_pass(&task, false, false, false);
        assert_eq!(
            task.successor_generator.applicable_ops(&a_done),
            vec![OperatorId(1)]
        );
    }

    /// T1.5: Applicability looks at the state the operator starts in.
    #[test]
    fn start_condition_checked() {
        let task = parse(CHAIN);
        let state = &task.initial_state;
        assert!(task.operator(OperatorId(0)).is_applicable(OperatorId(0), &task, state, false, None));
        assert!(!task.operator(OperatorId(1)).is_applicable(OperatorId(1), &task, state, false, None));
    }
}

// =============================================================================
// TIER T2: DERIVED VARIABLES AND CLOSED LIST
// =============================================================================

mod t2_axioms_and_closed_list {
    use super::*;
    use tempus_core::AxiomEvaluator;
    use tempus_core::VariableType;
    use tempus_core::axioms::LogicAxiom;
    use tempus_core::task::{Prevail, Variable};

    /// T2.1: Layered rules settle in one evaluation.
    #[test]
    fn layered_rules_settle() {
        let vars = vec![
            Variable::new("p", 2, None, VariableType::Logical),
            Variable::new("q", 2, Some(0), VariableType::Logical),
            Variable::new("r", 2, Some(1), VariableType::Logical),
        ];
        let rules = vec![
            LogicAxiom {
                conditions: vec![Prevail::new(0, 1.0)],
                affected: 1,
                old_value: 0.0,
                new_value: 1.0,
            },
            LogicAxiom {
                conditions: vec![Prevail::new(1, 1.0)],
                affected: 2,
                old_value: 0.0,
                new_value: 1.0,
            },
        ];
        let evaluator =
            AxiomEvaluator::new(&vars, vec![0.0; 3], rules, Vec::new()).expect("evaluator");

        let mut values = vec![1.0, 0.0, 0.0];
        evaluator.evaluate(&mut values);
        assert_eq!(values, vec![1.0, 1.0, 1.0]);

        // Derived values are recomputed from the defaults, not kept.
        values[0] = 0.0;
        evaluator.evaluate(&mut values);
        assert_eq!(values, vec![0.0, 0.0, 0.0]);
    }

    /// T2.2: A later copy of a closed state is known, an earlier one is not.
    #[test]
    fn closed_list_timestamp_dominance() {
        let task = parse(MOVE);
        let mut closed = ClosedList::new(&task);
        let mut late = task.initial_state.clone();
        late.timestamp = 2.0;
        closed.insert(late, None, None);

        let mut later = task.initial_state.clone();
        later.timestamp = 3.0;
        assert!(closed.contains(&later));
        assert!(!closed.contains(&task.initial_state));
        assert_eq!(closed.min_timestamp_of_key(&later), 2.0);
    }

    /// T2.3: Tracing a closed path yields the timed plan.
    #[test]
    fn trace_path_recovers_plan() {
        let task = parse(MOVE);
        let mut closed = ClosedList::new(&task);
        let root = closed.insert(task.initial_state.clone(), None, None);
        let started = task.initial_state.apply(&task, OperatorId(0), false);
        let mid = closed.insert(started.clone(), Some(root), Some(Step::Apply(OperatorId(0))));
        let done = started.let_time_pass(&task, false, false, false);
        closed.insert(done.clone(), Some(mid), Some(Step::LetTimePass));

        let (plan, trace) = closed.trace_path(&task, &done);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].op, OperatorId(0));
        assert_eq!(plan[0].start_time, 0.0);
        assert_eq!(trace.last().map(|s| s.timestamp), Some(1.0));
        assert_eq!(closed.len(), 3);
    }
}

// =============================================================================
// TIER T3: HEURISTIC ESTIMATES
// =============================================================================

mod t3_heuristics {
    use super::*;

    /// T3.1: The causal-graph estimate shrinks along the plan and is zero
    /// exactly on the settled goal.
    #[test]
    fn estimate_shrinks_along_plan() {
        let task = parse(CHAIN);
        let mut h = CyclicCgHeuristic::new(&task, CyclicCgMode::Cea, &cea());

        let initial = h.evaluate(&task, &task.initial_state);
        let a_done = task
            .initial_state
            .apply(&task, OperatorId(0), false)
            .let_time_pass(&task, false, false, false);
        let middle = h.evaluate(&task, &a_done);
        let goal = a_done
            .apply(&task, OperatorId(1), false)
            .let_time_pass(&task, false, false, false);
        let last = h.evaluate(&task, &goal);

        assert!(initial > middle, "{} > {}", initial, middle);
        assert!(middle > 0.0);
        assert_eq!(last, 0.0);
    }

    /// T3.2: The first step of the chain is preferred.
    #[test]
    fn first_step_preferred() {
        let task = parse(CHAIN);
        let mut h = CyclicCgHeuristic::new(&task, CyclicCgMode::Cea, &cea());
        h.evaluate(&task, &task.initial_state);
        assert_eq!(
            h.preferred_operators(tempus_core::OpenListMode::Regular),
            &[OperatorId(0)]
        );
    }

    /// T3.4: A comparison goal is estimated through the numeric updates that
    /// move its term towards the relation.
    #[test]
    fn comparison_goal_estimated() {
        let task = parse(NUMERIC);
        let mut h = CyclicCgHeuristic::new(&task, CyclicCgMode::Cea, &cea());
        assert_eq!(h.evaluate(&task, &task.initial_state), 1.0);
        assert_eq!(h.preferred_operators(OpenListMode::Regular), &[OperatorId(0)]);

        let inc = |state: &tempus_core::TimeStampedState| {
            state
                .apply(&task, OperatorId(0), false)
                .let_time_pass(&task, false, false, false)
        };
        let twice = inc(&inc(&task.initial_state));
        assert_eq!(twice.value(0), 2.0);
        assert_eq!(twice.value(3), 0.0);
        assert_eq!(h.evaluate(&task, &twice), 0.0);
    }

    /// T3.3: The blind heuristic distinguishes only goal states.
    #[test]
    fn blind_heuristic_goal_test() {
        let task = parse(MOVE);
        let mut h = NoHeuristic::new();
        assert!(h.evaluate(&task, &task.initial_state) > 0.0);
        let done = task
            .initial_state
            .apply(&task, OperatorId(0), false)
            .let_time_pass(&task, false, false, false);
        assert_eq!(h.evaluate(&task, &done), 0.0);
    }
}

// =============================================================================
// TIER T4: END-TO-END SEARCH
// =============================================================================

mod t4_search {
    use super::*;

    fn solve(task: &Task, params: &PlannerParameters) -> (SearchStatus, Option<f64>) {
        let mut engine = BestFirstSearchEngine::new(task, params).expect("engine");
        engine.initialize();
        let status = engine.search();
        let makespan = engine.improve_bound().map(|s| s.makespan());
        (status, makespan)
    }

    /// T4.1: The chain is solved by starting the second move when the
    /// first one ends.
    #[test]
    fn chain_solved_in_sequence() {
        let task = parse(CHAIN);
        let mut engine = BestFirstSearchEngine::new(&task, &cea()).expect("engine");
        engine.initialize();
        assert_eq!(engine.search(), SearchStatus::Solved);

        let solution = engine.improve_bound().expect("plan").clone();
        let ops: Vec<OperatorId> = solution.plan.iter().map(|s| s.op).collect();
        assert_eq!(ops, vec![OperatorId(0), OperatorId(1)]);
        assert!((solution.plan[1].start_time - 1.0).abs() < 0.1);
        assert!((solution.makespan() - 2.0).abs() < 0.1);

        let text = format_plan(&task, &solution.plan);
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("(MoveA)"));
        assert!(text.contains("(MoveB)"));
    }

    /// T4.2: Every heuristic configuration finds the same makespan.
    #[test]
    fn configurations_agree() {
        let task = parse(CHAIN);
        let configs = [
            cea(),
            PlannerParameters {
                no_heuristic: true,
                verbose: false,
                ..PlannerParameters::default()
            },
            PlannerParameters {
                makespan_heuristic: true,
                lazy_evaluation: false,
                ..cea()
            },
            PlannerParameters {
                greedy: true,
                ..cea()
            },
        ];
        for params in &configs {
            let (status, makespan) = solve(&task, params);
            assert_eq!(status, SearchStatus::Solved);
            let makespan = makespan.expect("plan");
            assert!((makespan - 2.0).abs() < 0.1, "makespan {}", makespan);
        }
    }

    /// T4.3: An unreachable goal exhausts the space and fails.
    #[test]
    fn unreachable_goal_fails() {
        let task = parse(&MOVE.replacen("0 1\nend_goal", "0 2\nend_goal", 1));
        let (status, makespan) = solve(
            &task,
            &PlannerParameters {
                no_heuristic: true,
                verbose: false,
                ..PlannerParameters::default()
            },
        );
        assert_eq!(status, SearchStatus::Failed);
        assert!(makespan.is_none());
        assert_eq!(status.exit_code(), 1);
    }

    /// T4.4: Two runs of the same search expand the same states.
    #[test]
    fn search_deterministic() {
        let task = parse(CHAIN);
        let run = || {
            let mut engine = BestFirstSearchEngine::new(&task, &cea()).expect("engine");
            engine.initialize();
            engine.search();
            (engine.expanded(), engine.closed_len(), engine.solution().cloned())
        };
        assert_eq!(run(), run());
    }

    /// T4.5: Incrementing twice satisfies the numeric goal.
    #[test]
    fn numeric_goal_solved() {
        let task = parse(NUMERIC);
        let mut engine = BestFirstSearchEngine::new(&task, &cea()).expect("engine");
        engine.initialize();
        assert_eq!(engine.search(), SearchStatus::Solved);

        let solution = engine.improve_bound().expect("plan").clone();
        assert_eq!(solution.plan.len(), 2);
        assert!(solution.plan.iter().all(|step| step.op == OperatorId(0)));
        assert!(solution.makespan() <= 2.0 + 0.1);
        assert!(format_plan(&task, &solution.plan).contains("(Inc)"));
    }

    /// T4.6: The optional search features keep the chain solvable at its
    /// optimal makespan.
    #[test]
    fn search_features_solve_chain() {
        let task = parse(CHAIN);
        let configs = [
            PlannerParameters {
                pref_ops_concurrent_mode: true,
                ..cea()
            },
            PlannerParameters {
                pref_ops_concurrent_mode: true,
                lazy_evaluation: false,
                ..cea()
            },
            PlannerParameters {
                pref_ops_ordered_mode: GoalLimitedMode::with_count(1),
                pref_ops_cheapest_mode: GoalLimitedMode::with_count(1),
                pref_ops_most_expensive_mode: GoalLimitedMode::with_count(1),
                pref_ops_rand_mode: GoalLimitedMode::with_count(1),
                pref_ops_concurrent_mode: true,
                ..cea()
            },
            PlannerParameters {
                use_known_by_logical_state_only: true,
                use_subgoals_to_break_makespan_ties: true,
                epsilonize_internally: true,
                ..cea()
            },
            PlannerParameters {
                reset_after_solution_was_found: true,
                reward_only_pref_op_queue: true,
                ..cea()
            },
            PlannerParameters {
                queue_management_mode: QueueManagementMode::RoundRobin,
                ..cea()
            },
        ];
        for (index, params) in configs.iter().enumerate() {
            let (status, makespan) = solve(&task, params);
            assert_eq!(status, SearchStatus::Solved, "configuration {}", index);
            let makespan = makespan.expect("plan");
            assert!((makespan - 2.0).abs() < 0.1, "configuration {}: makespan {}", index, makespan);
        }
    }

    /// T4.7: Independent preferred operators are started together.
    #[test]
    fn concurrent_operators_start_together() {
        let task = parse(PAIR);
        let params = PlannerParameters {
            pref_ops_concurrent_mode: true,
            ..cea()
        };
        let mut engine = BestFirstSearchEngine::new(&task, &params).expect("engine");
        engine.initialize();
        assert_eq!(engine.search(), SearchStatus::Solved);

        let solution = engine.improve_bound().expect("plan").clone();
        assert_eq!(solution.plan.len(), 2);
        assert!(solution.plan.iter().all(|step| step.start_time.abs() < 0.1));
        assert!((solution.makespan() - 2.0).abs() < 0.1);
    }
}
