//! Update-cycle domain types: states, outcomes, and task planning.
//!
//! This module is intentionally free of I/O, async, and external layer imports.
//! All functions take data in and return data out.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use update_common::{UpdateLevel, UpdateManifest};

/// Message published when the automatic rollback could not restore a
/// healthy instance.
pub const PERMANENT_FAILURE_MESSAGE: &str = "We are terribly sorry, but the managed server failed to \
upgrade and even after the automated rollback we were unable to bring it back to life. \
Please report this issue to your update catalog operators. \
Do not shut down this instance: the failure has been reported and a corrective update will be \
pushed as soon as the problem is understood.";

/// Phase of the apply cycle. `Idle` is both initial and the state every
/// exit path returns to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApplyState {
    #[default]
    Idle,
    Applying,
    AwaitingDownloads,
    Snapshotting,
    Persisting,
    Restarting,
    HealthChecking,
    Committed,
    RollingBack,
    Tainting,
    ReQuerying,
    PermanentFailure,
}

impl fmt::Display for ApplyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Applying => "applying",
            Self::AwaitingDownloads => "awaiting-downloads",
            Self::Snapshotting => "snapshotting",
            Self::Persisting => "persisting",
            Self::Restarting => "restarting",
            Self::HealthChecking => "health-checking",
            Self::Committed => "committed",
            Self::RollingBack => "rolling-back",
            Self::Tainting => "tainting",
            Self::ReQuerying => "re-querying",
            Self::PermanentFailure => "permanent-failure",
        };
        f.write_str(s)
    }
}

/// Result of one `apply_updates` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Another cycle was active, or no manifest was given. Nothing changed.
    NotStarted,
    /// The manifest required no downloads or deletions; only the level moved.
    UpToDate { level: UpdateLevel },
    /// The instance restarted healthy at `level`.
    Committed { level: UpdateLevel },
    /// Rollback failed; the instance is left at `level`, possibly unhealthy.
    PermanentFailure { level: UpdateLevel },
}

impl ApplyOutcome {
    /// Whether the cycle actually ran (the boolean result of the original
    /// contract).
    #[must_use]
    pub fn started(&self) -> bool {
        !matches!(self, Self::NotStarted)
    }
}

/// Notification severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

/// One artifact to fetch during an apply cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub url: String,
    pub dest_dir: PathBuf,
    pub filename: String,
    /// Expected lowercase hex SHA-256, when the manifest carries one.
    pub checksum: Option<String>,
}

impl DownloadTask {
    #[must_use]
    pub fn dest_path(&self) -> PathBuf {
        self.dest_dir.join(&self.filename)
    }
}

/// Where planned artifacts land on disk.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactLayout<'a> {
    pub primary_dir: &'a Path,
    pub plugins_dir: &'a Path,
    pub core_filename: &'a str,
    pub plugin_extension: &'a str,
}

/// Everything an apply cycle has to do before restarting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdatePlan {
    pub downloads: Vec<DownloadTask>,
    /// Plugin artifact ids to remove from the plugin store.
    pub deletions: Vec<String>,
}

impl UpdatePlan {
    /// A plan with nothing to do is a level-only upgrade.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.downloads.is_empty() && self.deletions.is_empty()
    }
}

/// Build the task set for `manifest`.
///
/// A core entry without a URL and an empty deletion list contribute nothing.
#[must_use]
pub fn plan_tasks(manifest: &UpdateManifest, layout: ArtifactLayout<'_>) -> UpdatePlan {
    let mut downloads = Vec::with_capacity(manifest.plugins.updates.len() + 1);

    if let Some(url) = manifest.core_url() {
        downloads.push(DownloadTask {
            url: url.to_string(),
            dest_dir: layout.primary_dir.to_path_buf(),
            filename: layout.core_filename.to_string(),
            checksum: manifest.core_signature().map(str::to_string),
        });
    }

    downloads.extend(manifest.plugins.updates.iter().map(|p| DownloadTask {
        url: p.url.clone(),
        dest_dir: layout.plugins_dir.to_path_buf(),
        filename: format!("{}.{}", p.artifact_id, layout.plugin_extension),
        checksum: p.checksum.as_ref().map(|c| c.signature.clone()),
    }));

    UpdatePlan {
        downloads,
        deletions: manifest.plugins.deletes.clone(),
    }
}

/// Label recorded with the pre-restart snapshot.
#[must_use]
pub fn snapshot_label(from: UpdateLevel, to: UpdateLevel) -> String {
    format!("UL{from}->UL{to} Snapshot after downloads completed, before restart")
}

/// Render an elapsed time as `850ms` or `2.045s`.
#[must_use]
pub fn format_duration(elapsed: Duration) -> String {
    let ms = elapsed.as_millis();
    if ms < 1000 {
        return format!("{ms}ms");
    }
    format!("{}.{:03}s", ms / 1000, ms % 1000)
}
