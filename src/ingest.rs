//! Module manifest ingestion.
//!
//! A manifest describes one module version and its packages as JSON. The
//! ingest command reads a single manifest file or every `*.json` file under
//! a directory, expands each into [`PackageVersion`]s and upserts them.
//! Imported-by counts are not touched; run `pkgidx recompute` afterwards.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use pkgindex_core::{IndexStore, PackageVersion};

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// One module version as published.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleManifest {
    pub module_path: String,
    pub version: String,
    pub commit_time: DateTime<Utc>,
    #[serde(default)]
    pub has_go_mod: bool,
    #[serde(default)]
    pub packages: Vec<PackageManifest>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PackageManifest {
    pub path: String,
    pub name: String,
    #[serde(default)]
    pub synopsis: String,
    #[serde(default)]
    pub licenses: Vec<String>,
    #[serde(default = "default_redistributable")]
    pub redistributable: bool,
    #[serde(default)]
    pub imports: Vec<String>,
}

fn default_redistributable() -> bool {
    true
}

impl ModuleManifest {
    pub fn package_versions(&self) -> Vec<PackageVersion> {
        self.packages
            .iter()
            .map(|p| PackageVersion {
                package_path: p.path.clone(),
                module_path: self.module_path.clone(),
                version: self.version.clone(),
                commit_time: self.commit_time,
                name: p.name.clone(),
                synopsis: p.synopsis.clone(),
                licenses: p.licenses.clone(),
                redistributable: p.redistributable,
                has_go_mod: self.has_go_mod,
                imports: p.imports.clone(),
            })
            .collect()
    }
}

/// Manifest files at `path`: the file itself, or every `*.json` below the
/// directory in path order.
pub fn manifest_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        anyhow::bail!("Manifest path does not exist: {}", path.display());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", path.display()))?;
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|e| e.to_str()) == Some("json")
        {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

pub fn load_manifest(path: &Path) -> Result<ModuleManifest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse manifest: {}", path.display()))
}

/// Counts reported by [`ingest_path`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub manifests: usize,
    pub packages: usize,
}

/// Upsert every package of every manifest under `path` into `store`.
///
/// Stops at the first failing upsert; earlier upserts stay committed.
pub async fn ingest_path(store: &dyn IndexStore, path: &Path) -> Result<IngestStats> {
    let mut stats = IngestStats::default();
    for file in manifest_files(path)? {
        let manifest = load_manifest(&file)?;
        for pkg in manifest.package_versions() {
            store
                .upsert_document(&pkg)
                .await
                .with_context(|| format!("Failed to index {}@{}", pkg.package_path, pkg.version))?;
            stats.packages += 1;
        }
        tracing::info!(
            module = %manifest.module_path,
            version = %manifest.version,
            packages = manifest.packages.len(),
            "ingested manifest"
        );
        stats.manifests += 1;
    }
    Ok(stats)
}

pub async fn run_ingest(config: &Config, path: &Path) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());

    let stats = ingest_path(&store, path).await?;

    println!("ingest {}", path.display());
    println!("  manifests: {}", stats.manifests);
    println!("  upserted packages: {}", stats.packages);
    println!("ok");

    pool.close().await;
    Ok(())
}
