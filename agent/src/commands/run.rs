//! `update-agent run`: the long-running poll loop.

use anyhow::Result;
use clap::Args;
use tracing::{debug, info};

use crate::app::{AppContext, CredentialArgs, Orchestrator};
use crate::commands::report_outcome;

#[derive(Args)]
pub struct RunArgs {
    /// Run a single poll cycle and exit
    #[arg(long)]
    pub once: bool,

    #[command(flatten)]
    pub credentials: CredentialArgs,
}

/// Poll the catalog and apply what it returns until interrupted.
///
/// A failing cycle is reported and the loop carries on.
///
/// # Errors
///
/// Returns an error if credentials are missing or snapshotting cannot be
/// initialised.
pub async fn run(app: &AppContext, args: &RunArgs) -> Result<()> {
    let orchestrator = app.authenticated(&args.credentials)?;
    orchestrator.prepare().await?;

    let interval = app.config.poll_interval();
    info!(config = %app.config_path.display(), ?interval, "update agent started");

    loop {
        if let Err(e) = poll_once(app, &orchestrator).await {
            app.output.error(&format!("{e:#}"));
        }
        if args.once {
            return Ok(());
        }
        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                return Ok(());
            }
        }
    }
}

async fn poll_once(app: &AppContext, orchestrator: &Orchestrator) -> Result<()> {
    let manifest = orchestrator.query().await?;
    let current = orchestrator.current_level().await;
    if manifest.level() == current {
        debug!(level = current, "already at the offered update level");
        return Ok(());
    }
    let outcome = orchestrator.apply_updates(Some(manifest), false).await?;
    report_outcome(&app.output, &outcome);
    Ok(())
}
