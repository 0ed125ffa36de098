//! `update-agent check`: ask the catalog for the next manifest and print it.

use anyhow::{Context, Result};

use crate::app::{AppContext, CredentialArgs};

/// Query the catalog once and print the manifest as pretty JSON.
///
/// # Errors
///
/// Returns an error if credentials are missing or the catalog call fails.
pub async fn run(app: &AppContext, credentials: &CredentialArgs) -> Result<()> {
    let orchestrator = app.authenticated(credentials)?;
    let manifest = orchestrator.query().await?;
    let json = serde_json::to_string_pretty(&manifest).context("serializing manifest")?;
    println!("{json}");
    Ok(())
}
