//! `update-agent level`: print the persisted update level.

use crate::app::AppContext;

/// Print the current update level to stdout.
///
/// # Errors
///
/// Returns an error if the orchestrator cannot be built.
pub async fn run(app: &AppContext) -> anyhow::Result<()> {
    let orchestrator = app.orchestrator()?;
    let level = orchestrator.current_level().await;
    println!("{level}");
    Ok(())
}
