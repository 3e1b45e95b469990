//! `pkgidx show`: print one search document by package path.

use anyhow::Result;

use pkgindex_core::{IndexError, IndexStore, SearchDocument};

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// Fetch the document for `package_path`, or [`IndexError::NotFound`].
pub async fn get_document(store: &dyn IndexStore, package_path: &str) -> Result<SearchDocument> {
    let doc = store
        .get_document(package_path)
        .await?
        .ok_or_else(|| IndexError::NotFound(package_path.to_string()))?;
    Ok(doc)
}

pub async fn run_show(config: &Config, package_path: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let doc = get_document(&store, package_path).await;
    pool.close().await;
    let doc = doc?;

    println!("--- Search document ---");
    println!("package_path:       {}", doc.package_path);
    println!("module_path:        {}", doc.module_path);
    println!("version:            {}", doc.version);
    println!("name:               {}", doc.name);
    println!("synopsis:           {}", doc.synopsis);
    println!("licenses:           {}", doc.license_types.join(", "));
    println!("redistributable:    {}", doc.redistributable);
    println!("has_go_mod:         {}", doc.has_go_mod);
    println!("imported_by_count:  {}", doc.imported_by_count);
    println!("commit_time:        {}", format_ts_iso(doc.commit_time));
    println!("version_updated_at: {}", format_ts_iso(doc.version_updated_at));
    println!(
        "imported_by_count_updated_at: {}",
        doc.imported_by_count_updated_at
            .map(format_ts_iso)
            .unwrap_or_else(|| "never".to_string())
    );
    println!("updated_at:         {}", format_ts_iso(doc.updated_at));

    Ok(())
}

fn format_ts_iso(ts: chrono::DateTime<chrono::Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
