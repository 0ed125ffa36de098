//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain` and `update_common`, never
//! from `crate::infra`, `crate::commands`, or `crate::output`.

use std::path::{Path, PathBuf};
use std::process::Output;

use anyhow::Result;
use update_common::{UpdateLevel, UpdateManifest};

use crate::domain::{AgentConfig, DownloadError, DownloadTask, Severity};

// ── Value Types ───────────────────────────────────────────────────────────────

/// Identity and token presented to the update catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Instance identifier (UUID) registered with the catalog.
    pub identity: String,
    /// Bearer token issued to that identity.
    pub token: String,
}

// ── Catalog Ports ─────────────────────────────────────────────────────────────

/// The remote update catalog.
#[allow(async_fn_in_trait)]
pub trait CatalogClient {
    /// Fetch the manifest applicable to an instance currently at `level`.
    async fn query(&self, credentials: &Credentials, level: UpdateLevel) -> Result<UpdateManifest>;
    /// Mark `level` as bad so later queries avoid it.
    async fn taint_level(&self, credentials: &Credentials, level: UpdateLevel) -> Result<()>;
}

/// Reports installed artifact versions so the catalog diffs against reality.
#[allow(async_fn_in_trait)]
pub trait VersionReporter {
    async fn report_versions(&self, credentials: &Credentials) -> Result<()>;
}

// ── Download Port ─────────────────────────────────────────────────────────────

/// Fetches one artifact to one local file.
#[allow(async_fn_in_trait)]
pub trait ArtifactDownloader {
    /// Download `task.url` into `task.dest_dir/task.filename`, verifying the
    /// checksum when one is given.
    ///
    /// # Errors
    ///
    /// `InvalidUrl` when the URL has no file name, `Network` once retries are
    /// exhausted, `ChecksumMismatch` when the digest differs.
    async fn download(
        &self,
        task: &DownloadTask,
        notifier: &impl NotificationSink,
    ) -> std::result::Result<PathBuf, DownloadError>;
}

// ── State and Storage Ports ───────────────────────────────────────────────────

/// Persisted update state: last applied manifest plus audit trail.
#[allow(async_fn_in_trait)]
pub trait UpdateStateStore {
    /// Load the last saved manifest, `None` if none was ever saved.
    async fn load(&self) -> Result<Option<UpdateManifest>>;
    /// Overwrite the saved manifest and append one audit entry.
    async fn save(&self, manifest: &UpdateManifest) -> Result<()>;
}

/// The supervised instance's on-disk layout.
#[allow(async_fn_in_trait)]
pub trait InstanceStorage {
    /// Directory the core artifact is written to.
    fn primary_dir(&self) -> PathBuf;
    /// Directory plugin archives are written to.
    fn plugins_dir(&self) -> PathBuf;
    /// Remove the named plugins from the plugin store.
    async fn remove_plugins(&self, artifact_ids: &[String]) -> Result<()>;
    /// Remove the "process is restarting" flag, if present.
    fn clear_restart_flag(&self) -> Result<()>;
}

/// Abstracts configuration persistence.
pub trait ConfigStore {
    /// Load configuration, falling back to defaults when no file exists.
    fn load(&self) -> Result<AgentConfig>;
    /// Path of the configuration file.
    fn path(&self) -> Result<PathBuf>;
}

// ── Supervised Process Ports ──────────────────────────────────────────────────

/// Point-in-time capture and restore of the instance's data.
#[allow(async_fn_in_trait)]
pub trait SnapshotManager {
    /// Prepare snapshotting for `data_dir`.
    async fn init(&self, data_dir: &Path) -> Result<()>;
    /// Capture the current data state under `label`.
    async fn snapshot(&self, label: &str) -> Result<()>;
    /// Restore the data state that preceded `level`.
    async fn revert_to_level_before(&self, level: UpdateLevel) -> Result<()>;
}

/// Restarts the supervised process.
#[allow(async_fn_in_trait)]
pub trait ProcessSupervisor {
    async fn restart(&self, process_name: &str) -> Result<()>;
}

/// Decides whether the restarted process is healthy.
#[allow(async_fn_in_trait)]
pub trait HealthChecker {
    /// `Ok(())` when healthy; the error describes why not.
    async fn check(&self) -> Result<()>;
}

// ── Notification Port ─────────────────────────────────────────────────────────

/// User-facing notifications. Sync and fire-and-forget: implementations
/// must never block the update workflow.
pub trait NotificationSink {
    fn publish(&self, message: &str, severity: Severity);

    fn info(&self, message: &str) {
        self.publish(message, Severity::Info);
    }

    fn warn(&self, message: &str) {
        self.publish(message, Severity::Warn);
    }

    fn error(&self, message: &str) {
        self.publish(message, Severity::Error);
    }
}

impl<T: NotificationSink + ?Sized> NotificationSink for &T {
    fn publish(&self, message: &str, severity: Severity) {
        (**self).publish(message, severity);
    }
}

// ── Command Runner Port ───────────────────────────────────────────────────────

/// Abstracts process execution so infrastructure can be swapped or mocked.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program and capture its output.
    ///
    /// Implementations should delegate to `run_with_timeout` using the
    /// instance's configured default timeout.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;
    /// Run a program with a custom timeout override.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exceeds `timeout`.
    /// On timeout, the child process must be killed (not left orphaned).
    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: std::time::Duration,
    ) -> Result<Output>;
}
