//! # Planner Configuration
//!
//! Loads [`PlannerParameters`] from an optional TOML file. Fields missing
//! from the file keep their defaults; CLI flags are applied afterwards.
//!
//! ```toml
//! cyclic_cg_heuristic = true
//! cyclic_cg_preferred_operators = true
//! g_values = "weighted"
//! g_weight = 0.3
//!
//! [pref_ops_cheapest_mode]
//! enabled = true
//! count = 2
//! ```

use std::path::Path;
use tempus_core::{PlannerParameters, TempusError};

/// Parameters from `path`, or the defaults when no file is given.
pub fn load_parameters(path: Option<&Path>) -> Result<PlannerParameters, TempusError> {
    let Some(path) = path else {
        return Ok(PlannerParameters::default());
    };
    let text = std::fs::read_to_string(path).map_err(|e| {
        TempusError::IoError(format!(
            "Cannot read config file '{}': {}",
            path.display(),
            e
        ))
    })?;
    let params = parse_parameters(&text)?;
    tracing::debug!(path = %path.display(), "loaded planner configuration");
    Ok(params)
}

/// Parameters from TOML text.
pub fn parse_parameters(text: &str) -> Result<PlannerParameters, TempusError> {
    toml::from_str(text).map_err(|e| TempusError::InvalidConfig(format!("config file: {}", e)))
}
