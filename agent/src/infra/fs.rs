//! Filesystem infrastructure: implements `InstanceStorage` and digest helpers.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::application::ports::InstanceStorage;
use crate::domain::AgentConfig;

/// On-disk layout of the supervised instance.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    home: PathBuf,
    plugins: PathBuf,
    plugin_extension: String,
    restart_flag: PathBuf,
}

impl LocalStorage {
    #[must_use]
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            home: config.instance_home.clone(),
            plugins: config.plugins_dir(),
            plugin_extension: config.plugin_extension.clone(),
            restart_flag: config.instance_home.join(&config.restart_flag),
        }
    }

    fn remove_plugins_sync(plugins: &Path, extension: &str, ids: &[String]) -> Result<()> {
        for id in ids {
            let archive = plugins.join(format!("{id}.{extension}"));
            if archive.exists() {
                std::fs::remove_file(&archive)
                    .with_context(|| format!("removing plugin {}", archive.display()))?;
            }
            // Exploded plugin directory left behind by the server.
            let exploded = plugins.join(id);
            if exploded.is_dir() {
                std::fs::remove_dir_all(&exploded)
                    .with_context(|| format!("removing directory {}", exploded.display()))?;
            }
            info!(plugin = %id, "removed plugin");
        }
        Ok(())
    }
}

impl InstanceStorage for LocalStorage {
    fn primary_dir(&self) -> PathBuf {
        self.home.clone()
    }

    fn plugins_dir(&self) -> PathBuf {
        self.plugins.clone()
    }

    async fn remove_plugins(&self, artifact_ids: &[String]) -> Result<()> {
        let plugins = self.plugins.clone();
        let extension = self.plugin_extension.clone();
        let ids = artifact_ids.to_vec();
        tokio::task::spawn_blocking(move || Self::remove_plugins_sync(&plugins, &extension, &ids))
            .await
            .context("spawn_blocking for remove_plugins")?
    }

    fn clear_restart_flag(&self) -> Result<()> {
        match std::fs::remove_file(&self.restart_flag) {
            Ok(()) => {
                debug!(path = %self.restart_flag.display(), "removed restart flag");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("removing restart flag {}", self.restart_flag.display())),
        }
    }
}

/// Lowercase hex rendering of a digest.
#[must_use]
pub fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(char::from(HEX[(b >> 4) as usize]));
        out.push(char::from(HEX[(b & 0xf) as usize]));
    }
    out
}

/// Compute the SHA256 hex digest of a file.
///
/// Reads the file in 64 KB chunks to avoid loading large files into memory.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file =
        std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 65536];
    loop {
        let n = file.read(&mut buf).context("reading file")?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex_encode(&hasher.finalize()))
}
