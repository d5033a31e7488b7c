//! # Tempus CLI Module
//!
//! ## Available Commands
//!
//! - `search` - Search for a plan and write it
//! - `inspect` - Summarize a task without searching

mod commands;

use crate::config;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tempus_core::{GValues, GoalLimitedMode, PlannerParameters, QueueManagementMode, TempusError};

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Tempus - temporal and numeric planner
///
/// Reads a preprocessed planning task and searches forward through
/// time-stamped states for a timed plan.
#[derive(Parser, Debug)]
#[command(name = "tempus")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Planner configuration file (TOML); flags override it
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search for a plan
    Search {
        /// Task file; stdin when omitted or `-`
        input: Option<PathBuf>,

        #[command(flatten)]
        args: SearchArgs,
    },

    /// Print a summary of the task
    Inspect {
        /// Task file; stdin when omitted or `-`
        input: Option<PathBuf>,
    },
}

/// Planner flags. Each one overrides the configuration file only when given.
#[derive(Args, Debug, Default, Clone)]
pub struct SearchArgs {
    /// Keep searching for better plans after the first one
    #[arg(long)]
    pub anytime: bool,

    /// Seconds to keep searching once a plan was found
    #[arg(long, value_name = "SECS")]
    pub timeout_if_plan_found: Option<u64>,

    /// Seconds to search for a first plan
    #[arg(long, value_name = "SECS")]
    pub timeout_while_no_plan: Option<u64>,

    /// Order open lists by heuristic value only
    #[arg(long)]
    pub greedy: bool,

    /// Evaluate successors when they are generated
    #[arg(long)]
    pub eager: bool,

    /// No periodic statistics
    #[arg(short, long)]
    pub quiet: bool,

    /// Only offer let-time-pass while operators are running
    #[arg(long)]
    pub let_time_pass_only_when_running: bool,

    /// Cyclic causal-graph heuristic estimates
    #[arg(long)]
    pub cea: bool,

    /// Cyclic causal-graph preferred operators
    #[arg(long)]
    pub cea_preferred: bool,

    /// Makespan heuristic estimates
    #[arg(long)]
    pub makespan: bool,

    /// Makespan heuristic preferred operators
    #[arg(long)]
    pub makespan_preferred: bool,

    /// Blind heuristic
    #[arg(long)]
    pub blind: bool,

    /// Charge waiting for running operators in the heuristic
    #[arg(long)]
    pub costly_waiting: bool,

    /// Fire waiting transitions only if the local problem matches the state
    #[arg(long)]
    pub waiting_only_if_matching: bool,

    /// Disable the heuristic cache
    #[arg(long)]
    pub no_heuristic_cache: bool,

    /// g values: timestamp, cost, makespan or weighted
    #[arg(long, value_name = "MODE")]
    pub g_values: Option<GValues>,

    /// Makespan weight of weighted g values, in (0, 1)
    #[arg(long, value_name = "W")]
    pub g_weight: Option<f64>,

    /// Open-list selection: priority or round-robin
    #[arg(long, value_name = "MODE")]
    pub queue_mode: Option<QueueManagementMode>,

    /// Reject successors whose symbolic states were all seen earlier
    #[arg(long)]
    pub known_by_logical_state: bool,

    /// Keep equal-makespan states and prefer faster subgoals
    #[arg(long)]
    pub subgoal_ties: bool,

    /// Advance time by an epsilon with every started operator
    #[arg(long)]
    pub epsilonize: bool,

    /// Preferred operators of the first N open goals
    #[arg(long, value_name = "N")]
    pub pref_ordered: Option<usize>,

    /// Preferred operators of the N cheapest goals
    #[arg(long, value_name = "N")]
    pub pref_cheapest: Option<usize>,

    /// Preferred operators of the N most expensive goals
    #[arg(long, value_name = "N")]
    pub pref_most_expensive: Option<usize>,

    /// Preferred operators of N random goals
    #[arg(long, value_name = "N")]
    pub pref_rand: Option<usize>,

    /// Mutually compatible preferred operators started together
    #[arg(long)]
    pub pref_concurrent: bool,

    /// Restart from the initial state when progress stalls
    #[arg(long)]
    pub reset_on_stagnation: bool,

    /// Reward only the preferred-operator open lists
    #[arg(long)]
    pub reward_only_preferred: bool,

    /// Plan file name; `-` prints the plan
    #[arg(long, value_name = "FILE")]
    pub plan: Option<String>,
}

impl SearchArgs {
    /// Override `params` with every flag that was given.
    pub fn apply(&self, params: &mut PlannerParameters) {
        let set = |field: &mut bool, flag: bool, value: bool| {
            if flag {
                *field = value;
            }
        };
        set(&mut params.anytime_search, self.anytime, true);
        set(&mut params.greedy, self.greedy, true);
        set(&mut params.lazy_evaluation, self.eager, false);
        set(&mut params.verbose, self.quiet, false);
        set(
            &mut params.insert_let_time_pass_only_when_running_operators_not_empty,
            self.let_time_pass_only_when_running,
            true,
        );
        set(&mut params.cyclic_cg_heuristic, self.cea, true);
        set(&mut params.cyclic_cg_preferred_operators, self.cea_preferred, true);
        set(&mut params.makespan_heuristic, self.makespan, true);
        set(
            &mut params.makespan_heuristic_preferred_operators,
            self.makespan_preferred,
            true,
        );
        set(&mut params.no_heuristic, self.blind, true);
        set(
            &mut params.cg_heuristic_zero_cost_waiting_transitions,
            self.costly_waiting,
            false,
        );
        set(
            &mut params.cg_heuristic_fire_waiting_transitions_only_if_local_problems_matches_state,
            self.waiting_only_if_matching,
            true,
        );
        set(&mut params.use_caching_in_heuristic, self.no_heuristic_cache, false);
        set(
            &mut params.use_known_by_logical_state_only,
            self.known_by_logical_state,
            true,
        );
        set(
            &mut params.use_subgoals_to_break_makespan_ties,
            self.subgoal_ties,
            true,
        );
        set(&mut params.epsilonize_internally, self.epsilonize, true);
        set(&mut params.pref_ops_concurrent_mode, self.pref_concurrent, true);
        set(
            &mut params.reset_after_solution_was_found,
            self.reset_on_stagnation,
            true,
        );
        set(
            &mut params.reward_only_pref_op_queue,
            self.reward_only_preferred,
            true,
        );

        if let Some(secs) = self.timeout_if_plan_found {
            params.timeout_if_plan_found = secs;
        }
        if let Some(secs) = self.timeout_while_no_plan {
            params.timeout_while_no_plan_found = secs;
        }
        if let Some(mode) = self.g_values {
            params.g_values = mode;
        }
        if let Some(weight) = self.g_weight {
            params.g_weight = weight;
        }
        if let Some(mode) = self.queue_mode {
            params.queue_management_mode = mode;
        }
        let goals = [
            (self.pref_ordered, &mut params.pref_ops_ordered_mode),
            (self.pref_cheapest, &mut params.pref_ops_cheapest_mode),
            (self.pref_most_expensive, &mut params.pref_ops_most_expensive_mode),
            (self.pref_rand, &mut params.pref_ops_rand_mode),
        ];
        for (count, mode) in goals {
            if let Some(count) = count {
                *mode = GoalLimitedMode::with_count(count);
            }
        }
        if let Some(plan) = &self.plan {
            params.plan_name.clone_from(plan);
        }
    }
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments; returns the process exit code.
pub fn execute(cli: Cli) -> Result<i32, TempusError> {
    match cli.command {
        Commands::Search { input, args } => {
            let mut params = config::load_parameters(cli.config.as_deref())?;
            args.apply(&mut params);
            params.validate()?;
            cmd_search(input.as_deref(), &params, cli.json)
        }
        Commands::Inspect { input } => cmd_inspect(input.as_deref(), cli.json),
    }
}
