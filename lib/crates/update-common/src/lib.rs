//! Types shared between the update agent and anything that speaks to the
//! update catalog: manifests, audit-log entries and catalog request bodies.

pub mod api;
pub mod types;

pub use api::{InstalledVersions, TaintRequest, VersionReport, routes};
pub use types::*;
