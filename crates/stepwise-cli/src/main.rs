//! `stepwise` - diagnostics for the Stepwise debugging service
//!
//! Logs follow the `[logging]` config section (stderr unless a file is
//! set); stdout carries only command output.

mod commands;
mod context;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::config::ConfigAction;
use commands::dry_run::DryRunArgs;
use context::CliContext;
use output::OutputFormat;
use std::path::PathBuf;
use stepwise_config::LoggingConfig;
use stepwise_logging::{LogConfig, WorkerGuard};

#[derive(Parser, Debug)]
#[command(name = "stepwise", version, about = "Drive native debuggers through one interface")]
struct Cli {
    /// Configuration file (default: ./stepwise.toml)
    #[arg(long, global = true, env = "STEPWISE_CONFIG")]
    config: Option<PathBuf>,

    /// Debug-level logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List debug adapters and whether they are usable
    Adapters {
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },
    /// Print the backend command for a target without spawning it
    DryRun {
        #[command(flatten)]
        args: DryRunArgs,
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },
    /// Inspect or validate configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // `config check PATH` must work even when the active config is broken
    if let Command::Config {
        action: ConfigAction::Check { path: Some(path) },
    } = &cli.command
    {
        init_stderr_logging(cli.debug);
        return commands::config::check(path);
    }

    let ctx = match CliContext::load(cli.config) {
        Ok(ctx) => ctx,
        Err(e) => {
            init_stderr_logging(cli.debug);
            return Err(e.into());
        }
    };
    let _guard = init_logging(&ctx.config.logging, cli.debug);
    tracing::debug!(path = %ctx.config_path.display(), source = ctx.config_source, "Config loaded");

    match cli.command {
        Command::Adapters { format } => commands::adapters::run(&ctx, format).await,
        Command::DryRun { args, format } => commands::dry_run::run(&ctx, args, format).await,
        Command::Config { action } => commands::config::run(&ctx, action),
    }
}

/// Logging from the `[logging]` section; the guard flushes the log file.
fn init_logging(settings: &LoggingConfig, debug: bool) -> Option<WorkerGuard> {
    match stepwise_logging::init_from_settings(settings, debug) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Configured logging unavailable, using stderr: {}", e);
            init_stderr_logging(debug);
            None
        }
    }
}

fn init_stderr_logging(debug: bool) {
    if let Err(e) = stepwise_logging::init(LogConfig::cli(debug)) {
        eprintln!("Logging disabled: {}", e);
    }
}
