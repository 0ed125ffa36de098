//! Infrastructure implementation of the `UpdateStateStore` port.
//!
//! `FileUpdateStore` keeps the last applied manifest in `updates.json` and an
//! append-only trail in `updates.auditlog`. All file I/O goes through
//! `tokio::task::spawn_blocking`. The manifest is written to a temp file and
//! renamed into place.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;
use update_common::{AuditEntry, UpdateManifest};

use crate::application::ports::UpdateStateStore;

const MANIFEST_FILE: &str = "updates.json";
const AUDIT_LOG_FILE: &str = "updates.auditlog";

/// Manifest and audit-log files under the instance home.
#[derive(Debug, Clone)]
pub struct FileUpdateStore {
    home: PathBuf,
}

impl FileUpdateStore {
    #[must_use]
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.home.join(MANIFEST_FILE)
    }

    #[must_use]
    pub fn audit_log_path(&self) -> PathBuf {
        self.home.join(AUDIT_LOG_FILE)
    }

    /// Synchronous load, run by `load` via `spawn_blocking`.
    fn load_sync(path: &Path) -> Result<Option<UpdateManifest>> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        let manifest = serde_json::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(manifest))
    }

    /// Synchronous save, run by `save` via `spawn_blocking`.
    fn save_sync(home: &Path, manifest: &UpdateManifest) -> Result<()> {
        std::fs::create_dir_all(home)
            .with_context(|| format!("creating directory {}", home.display()))?;

        let path = home.join(MANIFEST_FILE);
        let content = serde_json::to_string(manifest).context("serializing manifest")?;
        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, &content)
            .with_context(|| format!("writing temp file {}", temp_path.display()))?;
        std::fs::rename(&temp_path, &path)
            .with_context(|| format!("finalizing manifest {}", path.display()))?;

        debug!(level = manifest.level(), "storing update level for auditability");
        let audit_path = home.join(AUDIT_LOG_FILE);
        let mut line =
            serde_json::to_string(&AuditEntry::new(manifest)).context("serializing audit entry")?;
        line.push('\n');
        let mut log = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&audit_path)
            .with_context(|| format!("opening {}", audit_path.display()))?;
        log.write_all(line.as_bytes())
            .with_context(|| format!("appending to {}", audit_path.display()))?;
        Ok(())
    }
}

impl UpdateStateStore for FileUpdateStore {
    async fn load(&self) -> Result<Option<UpdateManifest>> {
        let path = self.manifest_path();
        tokio::task::spawn_blocking(move || Self::load_sync(&path))
            .await
            .context("manifest load task panicked")?
    }

    async fn save(&self, manifest: &UpdateManifest) -> Result<()> {
        let home = self.home.clone();
        let manifest = manifest.clone();
        tokio::task::spawn_blocking(move || Self::save_sync(&home, &manifest))
            .await
            .context("manifest save task panicked")?
    }
}
