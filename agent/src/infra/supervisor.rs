//! `ProcessSupervisor` backed by `supervisorctl`.

use anyhow::Result;
use tracing::info;

use crate::application::ports::{CommandRunner, ProcessSupervisor};
use crate::infra::command_runner::ensure_success;

const SUPERVISORCTL: &str = "supervisorctl";

/// Restarts programs managed by supervisord.
pub struct Supervisorctl<R> {
    runner: R,
}

impl<R: CommandRunner> Supervisorctl<R> {
    #[must_use]
    pub fn new(runner: R) -> Self {
        Self { runner }
    }
}

impl<R: CommandRunner> ProcessSupervisor for Supervisorctl<R> {
    async fn restart(&self, process_name: &str) -> Result<()> {
        info!(process = %process_name, "restarting via supervisorctl");
        let output = self.runner.run(SUPERVISORCTL, &["restart", process_name]).await?;
        ensure_success(SUPERVISORCTL, &output)
    }
}
