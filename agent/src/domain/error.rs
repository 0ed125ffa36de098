//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator.

use std::path::PathBuf;

use thiserror::Error;
use update_common::UpdateLevel;

/// Boxed source error carried by the wrapping variants below.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// ── Download errors ───────────────────────────────────────────────────────────

/// Failure of a single artifact download.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(
        "The URL must end with a non-empty path, e.g. https://example.org/artifact.war (received URL={url})"
    )]
    InvalidUrl { url: String },

    #[error("fetching {url} failed: {source}")]
    Network {
        url: String,
        /// Whether another attempt may succeed (connect/timeout/5xx).
        retryable: bool,
        #[source]
        source: BoxError,
    },

    #[error("Signature verification failed for {} ({actual} != {expected})", path.display())]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("writing {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    /// `true` for transient network failures the retry loop should repeat.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { retryable: true, .. })
    }
}

// ── Update orchestration errors ──────────────────────────────────────────────

/// Errors surfaced by the update orchestrator.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error("{context}: {source}")]
    Persistence {
        context: String,
        #[source]
        source: BoxError,
    },

    #[error("plugin store operation failed: {source}")]
    Storage {
        #[source]
        source: BoxError,
    },

    #[error("update catalog call '{operation}' failed: {source}")]
    RemoteService {
        operation: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("health check failed after moving to UL{level}: {reason}")]
    HealthCheck { level: UpdateLevel, reason: String },

    #[error("rollback from UL{level} failed: {reason}")]
    Rollback { level: UpdateLevel, reason: String },
}

impl UpdateError {
    pub(crate) fn persistence(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Persistence {
            context: context.into(),
            source: source.into(),
        }
    }

    pub(crate) fn remote(operation: &'static str, source: impl Into<BoxError>) -> Self {
        Self::RemoteService {
            operation,
            source: source.into(),
        }
    }
}

// ── Config errors ─────────────────────────────────────────────────────────────

/// Errors related to agent configuration validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing setting: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value}\n\n{hint}")]
    InvalidValue {
        key: &'static str,
        value: String,
        hint: &'static str,
    },
}
