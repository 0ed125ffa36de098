//! `update-agent taint [LEVEL]`: mark an update level as bad.

use anyhow::Result;
use clap::Args;
use update_common::UpdateLevel;

use crate::app::{AppContext, CredentialArgs};

#[derive(Args)]
pub struct TaintArgs {
    /// Level to taint (defaults to the current level)
    pub level: Option<UpdateLevel>,

    #[command(flatten)]
    pub credentials: CredentialArgs,
}

/// # Errors
///
/// Returns an error if credentials are missing or the catalog call fails.
pub async fn run(app: &AppContext, args: &TaintArgs) -> Result<()> {
    let orchestrator = app.authenticated(&args.credentials)?;
    orchestrator.taint_level(args.level).await?;
    match args.level {
        Some(level) => app.output.success(&format!("Tainted UL{level}")),
        None => app.output.success("Tainted the current update level"),
    }
    Ok(())
}
