//! Config command - inspect and validate stepwise.toml

use crate::context::CliContext;
use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::{Path, PathBuf};
use stepwise_config::{load_config, to_toml_string};

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate a configuration file (defaults to the active one)
    Check {
        /// Path to the file to check
        path: Option<PathBuf>,
    },
    /// Print the effective configuration as TOML
    Show,
}

pub fn run(ctx: &CliContext, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Check { path } => check(path.as_deref().unwrap_or(&ctx.config_path)),
        ConfigAction::Show => show(ctx),
    }
}

/// Strict load of `path`: missing, unparsable or invalid files fail
pub fn check(path: &Path) -> Result<()> {
    load_config(path).with_context(|| format!("Invalid configuration: {}", path.display()))?;
    println!("Configuration OK: {}", path.display());
    Ok(())
}

fn show(ctx: &CliContext) -> Result<()> {
    let rendered = to_toml_string(&ctx.config).context("Failed to render configuration")?;
    println!(
        "# {} ({})",
        ctx.config_path.display(),
        ctx.config_source
    );
    print!("{}", rendered);
    Ok(())
}
