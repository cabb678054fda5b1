//! Adapters command - report which debug backends can run here

use crate::context::CliContext;
use crate::output::{Formatter, OutputFormat};
use anyhow::Result;
use stepwise_session::SessionManager;

pub async fn run(ctx: &CliContext, format: OutputFormat) -> Result<()> {
    let manager = SessionManager::new(&ctx.config);
    let adapters = manager.registry().list_available_adapters().await;
    Formatter::new(format).print_adapters(&adapters);
    Ok(())
}
