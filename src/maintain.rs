//! Index maintenance commands: `recompute`, `prune` and `pending`.
//!
//! All three are independently schedulable and idempotent. `recompute`
//! is the only place imported-by counts change.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use pkgindex_core::IndexStore;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

pub async fn run_recompute(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());

    let changed = store.recompute_imported_by_counts().await?;
    println!("recompute imported-by counts");
    println!("  documents changed: {}", changed);
    println!("ok");

    pool.close().await;
    Ok(())
}

pub async fn run_prune(config: &Config, module_path: &str, keep_version: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());

    let deleted = store
        .delete_older_versions(module_path, keep_version)
        .await
        .with_context(|| format!("Failed to prune {} below {}", module_path, keep_version))?;
    println!("prune {} (keep {})", module_path, keep_version);
    println!("  deleted documents: {}", deleted);
    println!("ok");

    pool.close().await;
    Ok(())
}

/// Parse `--before`; defaults to now.
pub fn parse_before(before: Option<&str>) -> Result<DateTime<Utc>> {
    match before {
        None => Ok(Utc::now()),
        Some(s) => Ok(DateTime::parse_from_rfc3339(s)
            .with_context(|| format!("Invalid --before timestamp (expected RFC 3339): {}", s))?
            .with_timezone(&Utc)),
    }
}

pub async fn run_pending(config: &Config, before: Option<&str>, limit: usize) -> Result<()> {
    let before = parse_before(before)?;
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());

    let pending = store.pending_documents(before, limit).await?;
    for doc in &pending {
        println!("{}\t{}\t{}", doc.package_path, doc.module_path, doc.version);
    }
    tracing::info!(count = pending.len(), before = %before, "listed pending documents");

    pool.close().await;
    Ok(())
}
