//! Application service: the update orchestration state machine.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.
//! All I/O is routed through injected port traits.
//!
//! One apply cycle runs `apply → snapshot → restart → health-check` and
//! either commits or rolls back once. The rollback restores the previous
//! data snapshot, reports versions, taints the failed level, asks the
//! catalog where to go, and re-applies that manifest as a forced update.
//! A failure during that second pass ends the cycle in permanent failure:
//! the operator is told loudly, but no error escapes, so the agent keeps
//! running and can receive a corrective update later.
//!
//! The level the catalog hands back during rollback is computed from the
//! catalog's global taint state and may be older than the level this
//! instance was on before the failed update. That is accepted behaviour.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use update_common::{UpdateLevel, UpdateManifest};

use crate::application::ports::{
    ArtifactDownloader, CatalogClient, Credentials, HealthChecker, InstanceStorage,
    NotificationSink, ProcessSupervisor, SnapshotManager, UpdateStateStore, VersionReporter,
};
use crate::domain::update::PERMANENT_FAILURE_MESSAGE;
use crate::domain::{
    ApplyOutcome, ApplyState, ArtifactLayout, UpdateError, UpdatePlan, plan_tasks, snapshot_label,
};

// ── Public types ──────────────────────────────────────────────────────────────

/// Collaborators the orchestrator drives.
pub struct UpdatePorts<C, D, S, F, P, R, H, N> {
    /// Update catalog; also reports installed versions.
    pub catalog: C,
    pub downloader: D,
    /// Persisted manifest and audit log.
    pub store: S,
    /// Instance directories and plugin store.
    pub storage: F,
    pub snapshots: P,
    pub supervisor: R,
    pub health: H,
    pub notifier: N,
}

/// Names that shape an apply cycle.
#[derive(Debug, Clone)]
pub struct UpdateSettings {
    /// Process name passed to the supervisor.
    pub process_name: String,
    /// File name of the core artifact in the primary directory.
    pub core_filename: String,
    /// Plugin archive extension, without the dot.
    pub plugin_extension: String,
}

impl From<&crate::domain::AgentConfig> for UpdateSettings {
    fn from(config: &crate::domain::AgentConfig) -> Self {
        Self {
            process_name: config.process_name.clone(),
            core_filename: config.core_filename.clone(),
            plugin_extension: config.plugin_extension.clone(),
        }
    }
}

/// Drives apply cycles for one agent instance.
///
/// The in-progress marker lives here and is local to this process: it keeps
/// two cycles of the same orchestrator from overlapping and is not a
/// distributed lock.
pub struct UpdateOrchestrator<C, D, S, F, P, R, H, N> {
    ports: UpdatePorts<C, D, S, F, P, R, H, N>,
    settings: UpdateSettings,
    credentials: Mutex<Option<Credentials>>,
    cycle: Mutex<CycleState>,
}

#[derive(Debug, Default)]
struct CycleState {
    in_progress_since: Option<DateTime<Utc>>,
    state: ApplyState,
    /// Cycles currently running; forced calls may join an active one.
    active: usize,
}

/// Ends one apply cycle however it ends: removes the restart flag and, when
/// the last active cycle leaves, clears the marker and returns to `Idle`.
struct CycleGuard<'a, F: InstanceStorage> {
    cycle: &'a Mutex<CycleState>,
    storage: &'a F,
}

impl<F: InstanceStorage> Drop for CycleGuard<'_, F> {
    fn drop(&mut self) {
        if let Err(e) = self.storage.clear_restart_flag() {
            warn!(error = %format!("{e:#}"), "could not remove restart flag");
        }
        let mut cycle = self.cycle.lock().unwrap_or_else(PoisonError::into_inner);
        cycle.active = cycle.active.saturating_sub(1);
        if cycle.active == 0 {
            cycle.in_progress_since = None;
            cycle.state = ApplyState::Idle;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Initial,
    Rollback,
}

enum Step {
    UpToDate(UpdateLevel),
    Healthy(UpdateLevel),
    Unhealthy(UpdateError),
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

impl<C, D, S, F, P, R, H, N> UpdateOrchestrator<C, D, S, F, P, R, H, N>
where
    C: CatalogClient + VersionReporter,
    D: ArtifactDownloader,
    S: UpdateStateStore,
    F: InstanceStorage,
    P: SnapshotManager,
    R: ProcessSupervisor,
    H: HealthChecker,
    N: NotificationSink,
{
    #[must_use]
    pub fn new(ports: UpdatePorts<C, D, S, F, P, R, H, N>, settings: UpdateSettings) -> Self {
        Self {
            ports,
            settings,
            credentials: Mutex::new(None),
            cycle: Mutex::new(CycleState::default()),
        }
    }

    /// Collaborators, for inspection.
    #[must_use]
    pub fn ports(&self) -> &UpdatePorts<C, D, S, F, P, R, H, N> {
        &self.ports
    }

    /// Store the credentials used for catalog calls.
    pub fn authenticate(&self, identity: impl Into<String>, token: impl Into<String>) -> &Self {
        *self
            .credentials
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Credentials {
            identity: identity.into(),
            token: token.into(),
        });
        self
    }

    /// Current phase of the apply cycle.
    #[must_use]
    pub fn state(&self) -> ApplyState {
        self.lock_cycle().state
    }

    /// When the active apply cycle started, `None` when idle.
    #[must_use]
    pub fn in_progress_since(&self) -> Option<DateTime<Utc>> {
        self.lock_cycle().in_progress_since
    }

    /// Initialise snapshotting for the primary data directory.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the snapshot manager cannot be initialised.
    pub async fn prepare(&self) -> Result<(), UpdateError> {
        let data_dir = self.ports.storage.primary_dir();
        self.ports
            .snapshots
            .init(&data_dir)
            .await
            .map_err(|e| UpdateError::persistence("initialising snapshots", e))
    }

    /// Level of the last saved manifest; 0 when none is saved or it cannot
    /// be read.
    pub async fn current_level(&self) -> UpdateLevel {
        match self.ports.store.load().await {
            Ok(Some(manifest)) => {
                debug!(level = manifest.level(), "currently at update level");
                manifest.level()
            }
            Ok(None) => {
                warn!("No manifest level found, returning UL 0");
                0
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "unreadable manifest, returning UL 0");
                0
            }
        }
    }

    /// Persist `manifest` as the current state and append an audit entry.
    ///
    /// # Errors
    ///
    /// `Validation` when no manifest is given, `Persistence` when writing fails.
    pub async fn save(&self, manifest: Option<&UpdateManifest>) -> Result<(), UpdateError> {
        let Some(manifest) = manifest else {
            return Err(UpdateError::Validation(
                "Update Manifest is required!".to_string(),
            ));
        };
        info!(level = manifest.level(), "saving new manifest");
        self.ports
            .store
            .save(manifest)
            .await
            .map_err(|e| UpdateError::persistence("saving update manifest", e))
    }

    /// Ask the catalog for the manifest applicable to the current level.
    ///
    /// # Errors
    ///
    /// `Validation` before `authenticate`, `RemoteService` on catalog failure.
    pub async fn query(&self) -> Result<UpdateManifest, UpdateError> {
        let credentials = self.credentials()?;
        let level = self.current_level().await;
        self.ports
            .catalog
            .query(&credentials, level)
            .await
            .map_err(|e| UpdateError::remote("update-for-instance", e))
    }

    /// Report `level` (default: the current level) as bad to the catalog.
    ///
    /// # Errors
    ///
    /// `Validation` before `authenticate`, `RemoteService` on catalog failure.
    pub async fn taint_level(&self, level: Option<UpdateLevel>) -> Result<(), UpdateError> {
        let credentials = self.credentials()?;
        let level = match level {
            Some(level) => level,
            None => self.current_level().await,
        };
        warn!(level, "tainting update level");
        self.ports
            .catalog
            .taint_level(&credentials, level)
            .await
            .map_err(|e| {
                error!(level, error = %format!("{e:#}"), "tainting went wrong");
                UpdateError::remote("tainted-level", e)
            })
    }

    /// Apply `manifest`, rolling back once if the restarted process is
    /// unhealthy.
    ///
    /// Returns `NotStarted` without side effects when no manifest is given or
    /// another cycle is active (unless `forced`).
    ///
    /// # Errors
    ///
    /// Download, storage, snapshot and persistence failures of the first pass
    /// fail the cycle. Failures after rollback began are reported as
    /// `ApplyOutcome::PermanentFailure` instead.
    pub async fn apply_updates(
        &self,
        manifest: Option<UpdateManifest>,
        forced: bool,
    ) -> Result<ApplyOutcome, UpdateError> {
        let Some(manifest) = manifest else {
            warn!("apply_updates request ignored: no manifest supplied");
            return Ok(ApplyOutcome::NotStarted);
        };
        let Some(_guard) = self.begin_cycle(forced) else {
            warn!("apply_updates request ignored: update already in progress");
            return Ok(ApplyOutcome::NotStarted);
        };

        self.ports.notifier.info("Starting to apply updates");
        self.run_cycle(manifest).await
    }

    // ── Cycle internals ───────────────────────────────────────────────────

    fn begin_cycle(&self, forced: bool) -> Option<CycleGuard<'_, F>> {
        let mut cycle = self.lock_cycle();
        match (cycle.in_progress_since, forced) {
            (Some(_), false) => return None,
            (Some(_), true) => {
                warn!("Forced update joins the apply cycle already in progress");
            }
            (None, forced) => {
                if forced {
                    warn!("Forced update with no cycle in progress, marking a new one");
                }
                cycle.in_progress_since = Some(Utc::now());
            }
        }
        cycle.active += 1;
        cycle.state = ApplyState::Applying;
        Some(CycleGuard {
            cycle: &self.cycle,
            storage: &self.ports.storage,
        })
    }

    async fn run_cycle(&self, manifest: UpdateManifest) -> Result<ApplyOutcome, UpdateError> {
        let mut manifest = manifest;
        let mut attempt = Attempt::Initial;

        loop {
            if attempt == Attempt::Rollback {
                warn!(level = manifest.level(), "Forced update (expected during a rollback)");
            }
            let step = self.apply_once(&manifest).await;

            match (attempt, step) {
                (_, Ok(Step::UpToDate(level))) => {
                    self.transition(ApplyState::Committed);
                    return Ok(ApplyOutcome::UpToDate { level });
                }
                (_, Ok(Step::Healthy(level))) => {
                    self.transition(ApplyState::Committed);
                    return Ok(ApplyOutcome::Committed { level });
                }
                (Attempt::Initial, Ok(Step::Unhealthy(reason))) => {
                    self.ports.notifier.warn(&format!(
                        "{} detected as unhealthy. Rolling back to previous update level ({reason}).",
                        self.settings.process_name
                    ));
                    match self.roll_back().await {
                        Ok(next) => {
                            manifest = next;
                            attempt = Attempt::Rollback;
                        }
                        Err(e) => return Ok(self.permanent_failure(&e).await),
                    }
                }
                (Attempt::Initial, Err(e)) => {
                    error!(error = %e, "apply cycle failed");
                    self.ports.notifier.error(&format!("Update failed: {e}"));
                    return Err(e);
                }
                (Attempt::Rollback, Ok(Step::Unhealthy(e)) | Err(e)) => {
                    return Ok(self.permanent_failure(&e).await);
                }
            }
        }
    }

    async fn apply_once(&self, manifest: &UpdateManifest) -> Result<Step, UpdateError> {
        self.transition(ApplyState::Applying);
        manifest
            .validate()
            .map_err(|e| UpdateError::Validation(e.to_string()))?;

        let primary_dir = self.ports.storage.primary_dir();
        let plugins_dir = self.ports.storage.plugins_dir();
        let plan = plan_tasks(
            manifest,
            ArtifactLayout {
                primary_dir: &primary_dir,
                plugins_dir: &plugins_dir,
                core_filename: &self.settings.core_filename,
                plugin_extension: &self.settings.plugin_extension,
            },
        );
        let target = manifest.level();

        if plan.is_empty() {
            warn!(level = target, "No actionable tasks during upgrade process");
            self.transition(ApplyState::Persisting);
            self.save(Some(manifest)).await?;
            return Ok(Step::UpToDate(target));
        }

        info!(
            level = target,
            downloads = plan.downloads.len(),
            deletions = plan.deletions.len(),
            "triggering update"
        );
        self.transition(ApplyState::AwaitingDownloads);
        self.run_tasks(&plan).await?;

        self.ports
            .notifier
            .info("All downloads completed, snapshotting data before restart");
        self.transition(ApplyState::Snapshotting);
        let from = self.current_level().await;
        self.ports
            .snapshots
            .snapshot(&snapshot_label(from, target))
            .await
            .map_err(|e| UpdateError::persistence("taking pre-restart snapshot", e))?;

        self.transition(ApplyState::Persisting);
        self.save(Some(manifest)).await?;
        self.ports.notifier.info(&format!(
            "All downloads completed and snapshotting done, restarting {}",
            self.settings.process_name
        ));

        Ok(self.restart_and_check(target).await)
    }

    /// Run every download and the plugin deletion concurrently and wait for
    /// all of them; the first failure, if any, fails the cycle.
    async fn run_tasks(&self, plan: &UpdatePlan) -> Result<(), UpdateError> {
        let downloads = futures_util::future::join_all(plan.downloads.iter().map(|task| async move {
            info!(url = %task.url, file = %task.filename, "downloading");
            self.ports
                .downloader
                .download(task, &self.ports.notifier)
                .await
        }));
        let deletions = async {
            if plan.deletions.is_empty() {
                return Ok(());
            }
            self.ports
                .storage
                .remove_plugins(&plan.deletions)
                .await
                .map_err(|e| UpdateError::Storage { source: e.into() })
        };

        let (downloaded, deleted) = tokio::join!(downloads, deletions);
        for result in downloaded {
            result?;
        }
        deleted
    }

    async fn restart_and_check(&self, level: UpdateLevel) -> Step {
        let process = &self.settings.process_name;
        self.transition(ApplyState::Restarting);
        self.ports
            .notifier
            .info(&format!("{process} is being restarted, health checking!"));
        if let Err(e) = self.ports.supervisor.restart(process).await {
            return Step::Unhealthy(UpdateError::HealthCheck {
                level,
                reason: format!("restart failed: {e:#}"),
            });
        }

        self.transition(ApplyState::HealthChecking);
        match self.ports.health.check().await {
            Ok(()) => {
                info!(level, "health check after restart succeeded");
                Step::Healthy(level)
            }
            Err(e) => Step::Unhealthy(UpdateError::HealthCheck {
                level,
                reason: format!("{e:#}"),
            }),
        }
    }

    /// Restore, report, taint, re-query. Returns the manifest to re-apply.
    async fn roll_back(&self) -> Result<UpdateManifest, UpdateError> {
        self.transition(ApplyState::RollingBack);
        let level = self.current_level().await;
        self.ports
            .snapshots
            .revert_to_level_before(level)
            .await
            .map_err(|e| UpdateError::Rollback {
                level,
                reason: format!("restoring snapshot: {e:#}"),
            })?;

        // The catalog diffs against reported versions; report before querying.
        let credentials = self.credentials()?;
        self.ports
            .catalog
            .report_versions(&credentials)
            .await
            .map_err(|e| UpdateError::remote("report-versions", e))?;

        self.transition(ApplyState::Tainting);
        self.taint_level(None).await?;

        self.transition(ApplyState::ReQuerying);
        info!("querying a new update level to go to (may be a previous one)");
        let manifest = self.query().await?;
        info!(from = level, to = manifest.level(), "re-applying manifest received for rollback");
        Ok(manifest)
    }

    async fn permanent_failure(&self, cause: &UpdateError) -> ApplyOutcome {
        error!(error = %cause, "rollback failed, giving up on this apply cycle");
        self.transition(ApplyState::PermanentFailure);
        self.ports.notifier.error(PERMANENT_FAILURE_MESSAGE);
        ApplyOutcome::PermanentFailure {
            level: self.current_level().await,
        }
    }

    fn transition(&self, next: ApplyState) {
        let mut cycle = self.lock_cycle();
        debug!(from = %cycle.state, to = %next, "apply state transition");
        cycle.state = next;
    }

    fn credentials(&self) -> Result<Credentials, UpdateError> {
        self.credentials
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| {
                UpdateError::Validation("not authenticated: call authenticate() first".to_string())
            })
    }

    fn lock_cycle(&self) -> MutexGuard<'_, CycleState> {
        self.cycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
