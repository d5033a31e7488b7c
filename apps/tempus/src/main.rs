//! # Tempus - Temporal Planner
//!
//! The `tempus` binary.
//!
//! ## Usage
//!
//! ```bash
//! # Search with the causal-graph heuristic and its preferred operators
//! tempus search output.sas --cea --cea-preferred --plan sas_plan
//!
//! # Anytime search, plans written to sas_plan.1, sas_plan.2, ...
//! tempus search output.sas --cea --cea-preferred --anytime --timeout-if-plan-found 60
//!
//! # Task summary as JSON
//! tempus --json inspect output.sas
//! ```
//!
//! ## Exit Codes
//!
//! | code | meaning |
//! |------|---------|
//! | 0    | plan found |
//! | 1    | search space exhausted without a plan |
//! | 2    | invalid parameters or unreadable input |
//! | 137  | timeout |

use clap::Parser;
use tempus::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // TEMPUS_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("TEMPUS_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tempus=info,tempus_core=info".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    match cli::execute(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            tracing::error!("Error: {}", e);
            std::process::exit(2);
        }
    }
}
