//! HTTP client for the update catalog.
//!
//! Implements both `CatalogClient` and `VersionReporter` over JSON with bearer
//! token authentication.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};
use update_common::{InstalledVersions, TaintRequest, UpdateLevel, UpdateManifest, VersionReport, routes};

use crate::application::ports::{CatalogClient, Credentials, VersionReporter};
use crate::domain::AgentConfig;
use crate::infra::download::USER_AGENT;
use crate::infra::fs::sha256_file;

/// Production catalog client.
#[derive(Debug, Clone)]
pub struct HttpCatalogClient {
    client: reqwest::Client,
    base_url: String,
    core_path: PathBuf,
    plugins_dir: PathBuf,
    plugin_extension: String,
}

impl HttpCatalogClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &AgentConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.download.timeout())
            .build()
            .context("building catalog HTTP client")?;
        Ok(Self {
            client,
            base_url: config.catalog_url.trim_end_matches('/').to_string(),
            core_path: config.instance_home.join(&config.core_filename),
            plugins_dir: config.plugins_dir(),
            plugin_extension: config.plugin_extension.clone(),
        })
    }

    fn endpoint(&self, route: &str) -> String {
        format!("{}/{route}", self.base_url)
    }

    async fn post_json<T: serde::Serialize>(
        &self,
        route: &str,
        credentials: &Credentials,
        body: &T,
    ) -> Result<()> {
        let url = self.endpoint(route);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&credentials.token)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        ensure_success(&url, response).await?;
        Ok(())
    }
}

impl CatalogClient for HttpCatalogClient {
    async fn query(&self, credentials: &Credentials, level: UpdateLevel) -> Result<UpdateManifest> {
        let url = self.endpoint(&format!("{}/{}", routes::UPDATE, credentials.identity));
        debug!(%url, level, "querying catalog");
        let response = self
            .client
            .get(&url)
            .bearer_auth(&credentials.token)
            .query(&[("level", level)])
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let response = ensure_success(&url, response).await?;
        let manifest: UpdateManifest = response
            .json()
            .await
            .with_context(|| format!("decoding manifest from {url}"))?;
        info!(current = level, target = manifest.level(), "received update manifest");
        Ok(manifest)
    }

    async fn taint_level(&self, credentials: &Credentials, level: UpdateLevel) -> Result<()> {
        let body = TaintRequest {
            uuid: credentials.identity.clone(),
            level,
        };
        self.post_json(routes::TAINTED, credentials, &body).await?;
        info!(level, "tainted update level");
        Ok(())
    }
}

impl VersionReporter for HttpCatalogClient {
    async fn report_versions(&self, credentials: &Credentials) -> Result<()> {
        let core = self.core_path.clone();
        let plugins = self.plugins_dir.clone();
        let extension = self.plugin_extension.clone();
        let versions =
            tokio::task::spawn_blocking(move || installed_versions(&core, &plugins, &extension))
                .await
                .context("spawn_blocking for installed_versions")??;

        let body = VersionReport {
            uuid: credentials.identity.clone(),
            versions,
        };
        self.post_json(routes::VERSIONS, credentials, &body).await?;
        debug!("reported installed versions");
        Ok(())
    }
}

async fn ensure_success(url: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    anyhow::bail!("{url} returned HTTP {status}: {}", body.trim())
}

/// Digest every installed artifact: the core file and each `*.<extension>`
/// in the plugins directory. Missing files and directories are skipped.
///
/// # Errors
///
/// Returns an error if an existing artifact cannot be read.
pub fn installed_versions(core: &Path, plugins_dir: &Path, extension: &str) -> Result<InstalledVersions> {
    let core = if core.is_file() {
        Some(sha256_file(core)?)
    } else {
        None
    };

    let mut plugins = BTreeMap::new();
    if plugins_dir.is_dir() {
        let entries = std::fs::read_dir(plugins_dir)
            .with_context(|| format!("listing {}", plugins_dir.display()))?;
        for entry in entries {
            let path = entry.context("reading plugin entry")?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(extension) {
                continue;
            }
            if let Some(id) = path.file_stem().and_then(|s| s.to_str()) {
                plugins.insert(id.to_string(), sha256_file(&path)?);
            }
        }
    }

    Ok(InstalledVersions { core, plugins })
}
