//! # tempus-core
//!
//! The deterministic temporal planner behind `tempus`.
//!
//! Given a preprocessed task (state variables, durative operators, derived
//! variables and a goal), the engine searches forward through time-stamped
//! states for a timed plan reaching the goal.
//!
//! ## Layout
//!
//! - `task` and `parser`: the read-only task model and its line-oriented reader
//! - `state` and `axioms`: temporal state transition and derived variables
//! - `successor_generator`, `causal_graph`, `dtg`: structures supplied with the task
//! - `closed_list`: expanded states with timestamp dominance
//! - `heuristic` and `stn`: blind and cyclic causal-graph heuristics
//! - `search`: the multi-open-list best-first search engine
//!
//! ## Architectural Constraints
//!
//! - Single-threaded; one engine owns its frontier, closed list and caches
//! - Deterministic: ordered maps only, randomness seeded
//! - No async, no network, no filesystem access; the app layer does I/O

// =============================================================================
// MODULES
// =============================================================================

pub mod axioms;
pub mod causal_graph;
pub mod closed_list;
pub mod dtg;
pub mod heuristic;
pub mod params;
pub mod parser;
pub mod plan;
pub mod primitives;
pub mod search;
pub mod state;
pub mod stn;
pub mod successor_generator;
pub mod task;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types
// =============================================================================

pub use types::{
    AssignmentOp, BinaryOp, ConditionPhase, OpenListMode, OperatorId, Step, TempusError,
    TransitionPhase, VariableType,
};

// =============================================================================
// RE-EXPORTS: Task and State
// =============================================================================

pub use axioms::AxiomEvaluator;
pub use closed_list::{ClosedList, StateHandle};
pub use state::TimeStampedState;
pub use task::{Task, TaskSummary};

// =============================================================================
// RE-EXPORTS: Planning
// =============================================================================

pub use heuristic::{CyclicCgHeuristic, CyclicCgMode, Heuristic, NoHeuristic};
pub use params::{GValues, GoalLimitedMode, PlannerParameters, QueueManagementMode};
pub use plan::{Plan, PlanStep, PlanTrace, format_plan};
pub use search::{BestFirstSearchEngine, SearchReport, SearchStatus, Solution};
pub use stn::SimpleTemporalNetwork;
