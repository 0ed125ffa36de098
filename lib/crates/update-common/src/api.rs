//! Request bodies exchanged with the update catalog.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::UpdateLevel;

/// Catalog routes, relative to the configured base URL.
pub mod routes {
    /// `GET update/{uuid}?level=N`
    pub const UPDATE: &str = "update";
    /// `POST update/tainted`
    pub const TAINTED: &str = "update/tainted";
    /// `POST versions`
    pub const VERSIONS: &str = "versions";
}

/// Body of `POST update/tainted`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaintRequest {
    pub uuid: String,
    pub level: UpdateLevel,
}

/// Installed artifact digests, keyed by artifact id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct InstalledVersions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core: Option<String>,
    #[serde(default)]
    pub plugins: BTreeMap<String, String>,
}

/// Body of `POST versions`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionReport {
    pub uuid: String,
    pub versions: InstalledVersions,
}
