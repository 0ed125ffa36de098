//! Domain types and validators for agent configuration.
//!
//! Pure functions only: no I/O, no async, no filesystem access.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;

// ── Config schema ────────────────────────────────────────────────────────────

/// Top-level configuration stored in `~/.update-agent/config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Home of the supervised instance; manifest and audit log live here.
    pub instance_home: PathBuf,
    /// Base URL of the update catalog.
    pub catalog_url: String,
    /// Process name known to the supervisor.
    pub process_name: String,
    /// URL polled after a restart to decide whether the process is healthy.
    pub health_url: String,
    /// Seconds between catalog polls in `run` mode.
    pub poll_interval_secs: u64,
    /// File name of the core artifact inside `instance_home`.
    pub core_filename: String,
    /// Extension used for plugin archives (`<artifactId>.<ext>`).
    pub plugin_extension: String,
    /// Flag file the supervised process writes while it boots.
    pub restart_flag: String,
    pub download: DownloadSettings,
    pub health: HealthSettings,
    pub snapshot: SnapshotSettings,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            instance_home: PathBuf::from("/var/lib/update-agent/home"),
            catalog_url: "http://127.0.0.1:3030".to_string(),
            process_name: "jenkins".to_string(),
            health_url: "http://127.0.0.1:8080/login".to_string(),
            poll_interval_secs: 300,
            core_filename: "jenkins.war".to_string(),
            plugin_extension: "hpi".to_string(),
            restart_flag: ".restarting".to_string(),
            download: DownloadSettings::default(),
            health: HealthSettings::default(),
            snapshot: SnapshotSettings::default(),
        }
    }
}

impl AgentConfig {
    /// Directory plugin archives are written to.
    #[must_use]
    pub fn plugins_dir(&self) -> PathBuf {
        self.instance_home.join("plugins")
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Retry budget for artifact downloads.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DownloadSettings {
    /// Retries after the first attempt.
    pub retries: usize,
    /// Delay before the first retry, in milliseconds.
    pub delay_ms: u64,
    /// Multiplier applied to the delay after each retry.
    pub factor: f32,
    /// Timeout of a single attempt, in seconds.
    pub timeout_secs: u64,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            retries: 10,
            delay_ms: 1000,
            factor: 1.2,
            timeout_secs: 120,
        }
    }
}

impl DownloadSettings {
    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Post-restart health polling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HealthSettings {
    pub attempts: u32,
    pub delay_secs: u64,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            attempts: 30,
            delay_secs: 2,
        }
    }
}

/// External snapshot hooks. Unset hooks make the matching step a no-op.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SnapshotSettings {
    /// Invoked as `<cmd> <data-dir> <label>`.
    pub snapshot_command: Option<String>,
    /// Invoked as `<cmd> <data-dir> <level>`.
    pub restore_command: Option<String>,
}

// ── Validators ───────────────────────────────────────────────────────────────

/// Validates a loaded configuration.
///
/// # Errors
///
/// Returns an error naming the first invalid setting.
pub fn validate_config(config: &AgentConfig) -> Result<()> {
    if config.catalog_url.trim().is_empty() {
        return Err(ConfigError::Missing("catalog_url").into());
    }
    if config.health_url.trim().is_empty() {
        return Err(ConfigError::Missing("health_url").into());
    }
    if config.process_name.trim().is_empty() {
        return Err(ConfigError::Missing("process_name").into());
    }
    if config.core_filename.trim().is_empty() || config.core_filename.contains('/') {
        return Err(ConfigError::InvalidValue {
            key: "core_filename",
            value: config.core_filename.clone(),
            hint: "Must be a plain file name, e.g. jenkins.war",
        }
        .into());
    }
    if config.plugin_extension.trim().is_empty() || config.plugin_extension.contains('.') {
        return Err(ConfigError::InvalidValue {
            key: "plugin_extension",
            value: config.plugin_extension.clone(),
            hint: "Must be an extension without a dot, e.g. hpi",
        }
        .into());
    }
    if config.download.factor.is_nan() || config.download.factor < 1.0 {
        return Err(ConfigError::InvalidValue {
            key: "download.factor",
            value: config.download.factor.to_string(),
            hint: "Backoff factor must be at least 1.0",
        }
        .into());
    }
    if config.health.attempts == 0 {
        return Err(ConfigError::InvalidValue {
            key: "health.attempts",
            value: "0".to_string(),
            hint: "At least one health probe is required",
        }
        .into());
    }
    Ok(())
}

// ── Unit tests ───────────────────────────────────────────────────────────────
