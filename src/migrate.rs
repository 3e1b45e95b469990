use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index on an open pool. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // One row per package path, latest indexed version only.
    // Timestamps are microseconds since the Unix epoch.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS search_documents (
            package_path TEXT PRIMARY KEY,
            module_path TEXT NOT NULL,
            version TEXT NOT NULL,
            sort_version TEXT NOT NULL,
            commit_time INTEGER NOT NULL,
            name TEXT NOT NULL,
            synopsis TEXT NOT NULL DEFAULT '',
            license_types TEXT NOT NULL DEFAULT '[]',
            redistributable INTEGER NOT NULL,
            has_go_mod INTEGER NOT NULL,
            imported_by_count INTEGER NOT NULL DEFAULT 0,
            version_updated_at INTEGER NOT NULL,
            imported_by_count_updated_at INTEGER,
            updated_at INTEGER NOT NULL,
            hll_register INTEGER NOT NULL,
            hll_leading_zeros INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Import edges of every upserted version, indexed or not.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS imports (
            from_path TEXT NOT NULL,
            from_version TEXT NOT NULL,
            to_path TEXT NOT NULL,
            PRIMARY KEY (from_path, from_version, to_path)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='search_documents_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE search_documents_fts USING fts5(
                package_path UNINDEXED,
                path_tokens,
                name,
                synopsis
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    // Create indexes
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_search_documents_module ON search_documents(module_path)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_search_documents_popularity \
         ON search_documents(imported_by_count DESC, package_path)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_search_documents_updated_at ON search_documents(updated_at)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_imports_to_path ON imports(to_path)")
        .execute(pool)
        .await?;

    Ok(())
}
