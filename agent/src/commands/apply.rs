//! `update-agent apply <FILE>`: apply a manifest read from disk.
//!
//! Credentials are optional here; without them a failed health check cannot
//! reach the catalog and the cycle ends in permanent failure.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use update_common::UpdateManifest;

use crate::app::{AppContext, CredentialArgs};
use crate::commands::report_outcome;

#[derive(Args)]
pub struct ApplyArgs {
    /// Manifest JSON file
    pub file: PathBuf,

    /// Apply even if another cycle is marked in progress
    #[arg(long)]
    pub force: bool,

    #[command(flatten)]
    pub credentials: CredentialArgs,
}

/// Read, parse and apply the manifest in `args.file`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or the first apply
/// pass fails.
pub async fn run(app: &AppContext, args: &ApplyArgs) -> Result<()> {
    let content = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("cannot read {}", args.file.display()))?;
    let manifest: UpdateManifest = serde_json::from_str(&content)
        .with_context(|| format!("cannot parse {}", args.file.display()))?;

    let orchestrator = match (&args.credentials.uuid, &args.credentials.token) {
        (Some(_), Some(_)) => app.authenticated(&args.credentials)?,
        _ => app.orchestrator()?,
    };
    orchestrator.prepare().await?;

    app.output
        .header(&format!("Applying UL{} from {}", manifest.level(), args.file.display()));
    let outcome = orchestrator.apply_updates(Some(manifest), args.force).await?;
    report_outcome(&app.output, &outcome);
    Ok(())
}
