//! CLI command implementations

pub mod adapters;
pub mod config;
pub mod dry_run;
