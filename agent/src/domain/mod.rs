//! Domain layer: pure business logic, types, and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod config;
pub mod error;
pub mod update;

pub use config::{AgentConfig, DownloadSettings, HealthSettings, SnapshotSettings, validate_config};
pub use error::{BoxError, ConfigError, DownloadError, UpdateError};
pub use update::{
    ApplyOutcome, ApplyState, ArtifactLayout, DownloadTask, Severity, UpdatePlan, format_duration,
    plan_tasks, snapshot_label,
};
