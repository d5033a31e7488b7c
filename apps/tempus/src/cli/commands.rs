//! # CLI Command Implementations

use serde::Serialize;
use std::io::Read;
use std::path::Path;
use tempus_core::plan::{self, sum_of_subgoal_times};
use tempus_core::{
    BestFirstSearchEngine, PlannerParameters, SearchReport, SearchStatus, Solution, Task,
    TempusError, format_plan,
};

// =============================================================================
// INPUT
// =============================================================================

/// Read the task text from `input`, or from stdin for `None` and `-`.
pub fn read_input(input: Option<&Path>) -> Result<String, TempusError> {
    match input {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path).map_err(|e| {
            TempusError::IoError(format!("Cannot read task file '{}': {}", path.display(), e))
        }),
        _ => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .map_err(|e| TempusError::IoError(format!("Cannot read stdin: {}", e)))?;
            Ok(text)
        }
    }
}

// =============================================================================
// PLAN OUTPUT
// =============================================================================

/// File the `number`th plan is written to; `None` means stdout.
#[must_use]
pub fn plan_file_name(plan_name: &str, anytime: bool, number: usize) -> Option<String> {
    if plan_name == "-" {
        None
    } else if anytime {
        Some(format!("{}.{}", plan_name, number))
    } else {
        Some(plan_name.to_string())
    }
}

/// One plan written during the search.
#[derive(Debug, Clone, Serialize)]
pub struct WrittenPlan {
    pub file: Option<String>,
    pub makespan: f64,
    pub steps: Vec<PlanLine>,
}

/// One plan step with its operator name.
#[derive(Debug, Clone, Serialize)]
pub struct PlanLine {
    pub start: f64,
    pub name: String,
    pub duration: f64,
}

/// Write an accepted plan. A file that cannot be written is reported and
/// the search goes on.
pub fn save_plan(
    task: &Task,
    params: &PlannerParameters,
    solution: &Solution,
    number: usize,
) -> WrittenPlan {
    let text = format_plan(task, &solution.plan);
    let makespan = solution.makespan();
    tracing::info!(
        steps = solution.plan.len(),
        makespan,
        sum_of_subgoals = plan::sum_of_subgoals(&solution.plan),
        subgoal_times = sum_of_subgoal_times(task, &solution.trace),
        "found new plan"
    );

    let file = plan_file_name(&params.plan_name, params.anytime_search, number);
    match &file {
        None => print!("{}", text),
        Some(name) => {
            if let Err(e) = std::fs::write(name, &text) {
                tracing::error!("Could not write plan file {}: {}", name, e);
            }
        }
    }

    WrittenPlan {
        file,
        makespan,
        steps: solution
            .plan
            .iter()
            .map(|step| PlanLine {
                start: step.start_time,
                name: task.operator(step.op).name.clone(),
                duration: step.duration,
            })
            .collect(),
    }
}

// =============================================================================
// SEARCH COMMAND
// =============================================================================

/// Result of a (possibly anytime) search run.
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub status: SearchStatus,
    pub plans: Vec<WrittenPlan>,
    pub report: SearchReport,
}

/// Drive `engine` until it stops, saving every plan that improves the
/// best makespan. In anytime mode the search resumes after each plan.
pub fn run_search(
    task: &Task,
    params: &PlannerParameters,
    engine: &mut BestFirstSearchEngine<'_>,
) -> SearchOutcome {
    let mut plans = Vec::new();
    let status = loop {
        engine.initialize();
        let status = engine.search();
        if !engine.found_solution() {
            break status;
        }
        tracing::info!("new solution has been found");
        if status == SearchStatus::Solved
            && let Some(solution) = engine.improve_bound()
        {
            plans.push(save_plan(task, params, solution, plans.len() + 1));
        }
        if !(params.anytime_search && status == SearchStatus::Solved) {
            break status;
        }
        let resumed = engine.resume();
        if resumed != SearchStatus::InProgress {
            break resumed;
        }
    };

    SearchOutcome {
        status,
        plans,
        report: engine.report(),
    }
}

/// Search for a plan.
pub fn cmd_search(
    input: Option<&Path>,
    params: &PlannerParameters,
    json_mode: bool,
) -> Result<i32, TempusError> {
    let task = Task::parse(&read_input(input)?)?;
    if params.verbose {
        for line in params.to_string().lines() {
            tracing::info!("{}", line);
        }
    }
    if task.contains_universal_conditions {
        tracing::info!("task contains universal conditions");
    }

    let mut engine = BestFirstSearchEngine::new(&task, params)?;
    let started = std::time::Instant::now();
    let outcome = run_search(&task, params, &mut engine);
    let seconds = started.elapsed().as_secs_f64();

    if json_mode {
        let json = serde_json::to_string_pretty(&outcome)
            .map_err(|e| TempusError::IoError(format!("Cannot serialize outcome: {}", e)))?;
        println!("{}", json);
    } else {
        println!("Search status: {}", outcome.status);
        println!("Search time: {:.2} seconds", seconds);
        println!("Expanded states: {}", outcome.report.expanded);
        println!("Generated states: {}", outcome.report.statistics.generated);
        for heuristic in &outcome.report.heuristics {
            println!(
                "Heuristic {}: {} computations, {} cache hits",
                heuristic.name, heuristic.computations, heuristic.cache_hits
            );
        }
        match outcome.plans.last() {
            Some(best) => {
                println!("Plans found: {}", outcome.plans.len());
                println!("Best makespan: {}", best.makespan);
                if let Some(file) = &best.file {
                    println!("Best plan: {}", file);
                }
            }
            None => println!("No plan found"),
        }
    }

    Ok(outcome.status.exit_code())
}

// =============================================================================
// INSPECT COMMAND
// =============================================================================

/// Print a summary of the task.
pub fn cmd_inspect(input: Option<&Path>, json_mode: bool) -> Result<i32, TempusError> {
    let task = Task::parse(&read_input(input)?)?;
    let summary = task.summary();

    if json_mode {
        let json = serde_json::to_string_pretty(&summary)
            .map_err(|e| TempusError::IoError(format!("Cannot serialize summary: {}", e)))?;
        println!("{}", json);
    } else {
        println!("Variables: {}", summary.variables);
        println!("  Logical:              {}", summary.logical);
        println!("  Primitive functional: {}", summary.primitive_functional);
        println!("  Subterm functional:   {}", summary.subterm_functional);
        println!("  Comparison:           {}", summary.comparison);
        println!("  Derived:              {}", summary.derived);
        println!("Operators: {}", summary.operators);
        println!(
            "Axioms: {} logical, {} numeric",
            summary.logic_axioms, summary.numeric_axioms
        );
        println!(
            "Universal conditions: {}",
            if summary.contains_universal_conditions { "yes" } else { "no" }
        );
        println!("Goal:");
        for entry in &summary.goal {
            println!("  {} = {}", entry.variable, entry.value);
        }
    }
    Ok(0)
}
