//! # tempus
//!
//! Command-line front end of the Tempus planner: argument parsing,
//! configuration files, the anytime search driver and plan output.

pub mod cli;
pub mod config;
