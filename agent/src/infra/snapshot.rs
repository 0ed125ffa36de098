//! `SnapshotManager` that delegates to operator-configured hook commands.
//!
//! Snapshot hook: `<snapshot_command> <data-dir> <label>`.
//! Restore hook: `<restore_command> <data-dir> <level>`.
//! When a hook is not configured the operation is logged and skipped.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Result;
use tracing::{info, warn};
use update_common::UpdateLevel;

use crate::application::ports::{CommandRunner, SnapshotManager};
use crate::domain::SnapshotSettings;
use crate::infra::command_runner::ensure_success;

pub struct HookSnapshotter<R> {
    runner: R,
    settings: SnapshotSettings,
    data_dir: Mutex<Option<PathBuf>>,
}

impl<R: CommandRunner> HookSnapshotter<R> {
    #[must_use]
    pub fn new(runner: R, settings: SnapshotSettings) -> Self {
        Self {
            runner,
            settings,
            data_dir: Mutex::new(None),
        }
    }

    fn data_dir(&self) -> Result<PathBuf> {
        self.data_dir
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
            .ok_or_else(|| anyhow::anyhow!("snapshot manager used before init"))
    }

    async fn run_hook(&self, command: &str, argument: &str) -> Result<()> {
        let data_dir = self.data_dir()?;
        let data_dir = data_dir.to_string_lossy().into_owned();
        let output = self.runner.run(command, &[data_dir.as_str(), argument]).await?;
        ensure_success(command, &output)
    }
}

impl<R: CommandRunner> SnapshotManager for HookSnapshotter<R> {
    async fn init(&self, data_dir: &Path) -> Result<()> {
        *self
            .data_dir
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(data_dir.to_path_buf());
        if self.settings.snapshot_command.is_none() {
            warn!("no snapshot command configured, data snapshots are disabled");
        }
        Ok(())
    }

    async fn snapshot(&self, label: &str) -> Result<()> {
        let Some(command) = self.settings.snapshot_command.as_deref() else {
            info!(%label, "snapshot skipped (no snapshot command)");
            return Ok(());
        };
        info!(%label, "taking data snapshot");
        self.run_hook(command, label).await
    }

    async fn revert_to_level_before(&self, level: UpdateLevel) -> Result<()> {
        let Some(command) = self.settings.restore_command.as_deref() else {
            warn!(level, "restore skipped (no restore command), data left as is");
            return Ok(());
        };
        info!(level, "restoring data to the state before level");
        self.run_hook(command, &level.to_string()).await
    }
}
