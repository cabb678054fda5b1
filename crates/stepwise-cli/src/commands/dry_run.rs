//! Dry-run command - show the backend command a session would spawn

use crate::context::CliContext;
use crate::output::{Formatter, OutputFormat};
use anyhow::{bail, Context, Result};
use clap::Args;
use std::path::PathBuf;
use stepwise_core::StartOutcome;
use stepwise_session::{SessionManager, StartRequest};
use tracing::debug;

#[derive(Args, Debug)]
pub struct DryRunArgs {
    /// Language of the target (python, go, rust, javascript)
    #[arg(long, short)]
    pub language: String,

    /// Program, script or package to debug
    #[arg(long, short)]
    pub target: PathBuf,

    /// Debug adapter executable, instead of searching PATH
    #[arg(long)]
    pub executable: Option<PathBuf>,

    /// Arguments passed to the target
    #[arg(last = true)]
    pub args: Vec<String>,
}

pub async fn run(ctx: &CliContext, args: DryRunArgs, format: OutputFormat) -> Result<()> {
    let manager = SessionManager::new(&ctx.config);
    let created = manager.create_session(&args.language, None, args.executable);
    let Some(session) = created.data else {
        bail!(created
            .error
            .unwrap_or_else(|| format!("Cannot create session for '{}'", args.language)));
    };

    let request = StartRequest::new(args.target).with_args(args.args).dry_run();
    let result = manager
        .start_debugging(&session.id, request)
        .await
        .context("Dry run failed")?;
    manager.close_session(&session.id).await;

    if let Some(error) = result.error {
        bail!(error);
    }
    match result.data {
        Some(StartOutcome::DryRun {
            command_line,
            transport,
        }) => {
            Formatter::new(format).print_dry_run(&command_line, &transport);
            Ok(())
        }
        other => {
            debug!(?other, "Unexpected start outcome");
            bail!("Dry run produced no command")
        }
    }
}
