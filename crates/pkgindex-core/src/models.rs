//! Core data models shared by the stores and the search coordinator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};
use crate::version;

/// One package at one version, as handed to the index writer by ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageVersion {
    pub package_path: String,
    pub module_path: String,
    pub version: String,
    pub commit_time: DateTime<Utc>,
    pub name: String,
    #[serde(default)]
    pub synopsis: String,
    #[serde(default)]
    pub licenses: Vec<String>,
    #[serde(default)]
    pub redistributable: bool,
    #[serde(default)]
    pub has_go_mod: bool,
    /// Package paths imported by this version.
    #[serde(default)]
    pub imports: Vec<String>,
}

impl PackageVersion {
    /// Check the identity fields before anything touches a store.
    pub fn validate(&self) -> Result<()> {
        validate_path("package path", &self.package_path)?;
        validate_path("module path", &self.module_path)?;
        version::parse(&self.version)?;
        for import in &self.imports {
            validate_path("import path", import)?;
        }
        Ok(())
    }

    /// A package without any license is never redistributable.
    pub fn is_redistributable(&self) -> bool {
        self.redistributable && !self.licenses.is_empty()
    }
}

fn validate_path(what: &str, path: &str) -> Result<()> {
    if path.trim_matches('/').is_empty() {
        return Err(IndexError::invalid(format!("{what} is empty")));
    }
    if path.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(IndexError::invalid(format!("{what} {path:?} contains whitespace")));
    }
    Ok(())
}

/// The denormalized per-package row consumed by ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchDocument {
    pub package_path: String,
    pub module_path: String,
    pub version: String,
    pub commit_time: DateTime<Utc>,
    pub name: String,
    pub synopsis: String,
    pub license_types: Vec<String>,
    pub redistributable: bool,
    pub has_go_mod: bool,
    pub imported_by_count: u64,
    pub version_updated_at: DateTime<Utc>,
    /// `None` until the count first changes.
    pub imported_by_count_updated_at: Option<DateTime<Utc>>,
    /// Last upsert that touched this row, newer or same version.
    pub updated_at: DateTime<Utc>,
}

/// A document due for re-indexing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingDocument {
    pub package_path: String,
    pub module_path: String,
    pub version: String,
}

/// A ranked search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub package_path: String,
    pub module_path: String,
    pub version: String,
    pub name: String,
    pub synopsis: String,
    pub licenses: Vec<String>,
    pub commit_time: DateTime<Utc>,
    pub score: f64,
    /// Total matches as reported by the strategy that served the query.
    pub num_results: u64,
    /// True when `num_results` is a cardinality estimate.
    pub approximate: bool,
}

/// Package paths with an `internal` segment are importable only from their
/// own tree and are kept out of re-indexing.
pub fn is_internal_path(path: &str) -> bool {
    let trimmed = path.trim_matches('/');
    if trimmed == "internal" {
        return false;
    }
    trimmed.split('/').any(|seg| seg == "internal")
}
