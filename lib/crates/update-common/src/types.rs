use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Update level assigned by the catalog. Level 0 means "nothing applied yet".
pub type UpdateLevel = u64;

/// Checksum block attached to every downloadable artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Checksum {
    /// Lowercase hex SHA-256 of the artifact.
    pub signature: String,
}

/// The core server artifact (e.g. `jenkins.war`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CoreArtifact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<Checksum>,
}

/// A plugin to install or upgrade.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PluginUpdate {
    pub url: String,
    pub artifact_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<Checksum>,
}

/// Plugin changes carried by a manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PluginChanges {
    #[serde(default, deserialize_with = "null_as_default")]
    pub updates: Vec<PluginUpdate>,
    /// Artifact ids of plugins to remove.
    #[serde(default, deserialize_with = "null_as_default")]
    pub deletes: Vec<String>,
}

/// Manifest metadata. Unknown keys are kept so the persisted copy matches
/// what the catalog sent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ManifestMeta {
    #[serde(default)]
    pub level: UpdateLevel,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Catalog-issued description of the target state for an instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct UpdateManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core: Option<CoreArtifact>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub plugins: PluginChanges,
    #[serde(default, deserialize_with = "null_as_default")]
    pub meta: ManifestMeta,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Catalogs send `null` for empty sections; read it like an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Errors raised by structural manifest validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManifestError {
    #[error("plugin artifact id '{0}' is not a valid file name")]
    InvalidArtifactId(String),

    #[error("plugin '{0}' has an empty download URL")]
    MissingPluginUrl(String),
}

impl UpdateManifest {
    /// Level this manifest moves the instance to.
    #[must_use]
    pub fn level(&self) -> UpdateLevel {
        self.meta.level
    }

    /// Core download URL, if the manifest carries a core artifact with one.
    #[must_use]
    pub fn core_url(&self) -> Option<&str> {
        self.core
            .as_ref()
            .and_then(|c| c.url.as_deref())
            .filter(|u| !u.is_empty())
    }

    /// Expected core checksum, if any.
    #[must_use]
    pub fn core_signature(&self) -> Option<&str> {
        self.core
            .as_ref()
            .and_then(|c| c.checksum.as_ref())
            .map(|c| c.signature.as_str())
    }

    /// Check that artifact ids can be used as file names and every plugin
    /// update has a URL.
    pub fn validate(&self) -> Result<(), ManifestError> {
        let ids = self
            .plugins
            .updates
            .iter()
            .map(|p| p.artifact_id.as_str())
            .chain(self.plugins.deletes.iter().map(String::as_str));
        for id in ids {
            if !is_valid_artifact_id(id) {
                return Err(ManifestError::InvalidArtifactId(id.to_string()));
            }
        }
        if let Some(p) = self.plugins.updates.iter().find(|p| p.url.trim().is_empty()) {
            return Err(ManifestError::MissingPluginUrl(p.artifact_id.clone()));
        }
        Ok(())
    }
}

/// `true` when `id` is usable as a plugin file stem.
#[must_use]
pub fn is_valid_artifact_id(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// One line of `updates.auditlog`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub update_level: UpdateLevel,
    pub manifest: UpdateManifest,
}

impl AuditEntry {
    #[must_use]
    pub fn new(manifest: &UpdateManifest) -> Self {
        Self {
            timestamp: Utc::now(),
            update_level: manifest.level(),
            manifest: manifest.clone(),
        }
    }
}
