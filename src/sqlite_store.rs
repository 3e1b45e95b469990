//! SQLite-backed [`IndexStore`] implementation.
//!
//! Every writer operation runs in one transaction. Version precedence is
//! compared in SQL through the `sort_version` column, a string key whose
//! byte order matches semver precedence. Text matching goes through the
//! `search_documents_fts` FTS5 table; its `bm25` rank (negated, so higher
//! is better) is the text rank handed to scoring.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use pkgindex_core::error::{IndexError, Result};
use pkgindex_core::hll;
use pkgindex_core::models::{PackageVersion, PendingDocument, SearchDocument};
use pkgindex_core::store::{IndexStore, MatchRow, MatchScope, MatchSet, TextQuery};
use pkgindex_core::tokenize::path_tokens;
use pkgindex_core::version;

/// SQLite implementation of the [`IndexStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn total_documents(&self) -> Result<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM search_documents")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| IndexError::storage("count search documents", e))?;
        Ok(n as u64)
    }
}

fn from_micros(us: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(us)
        .ok_or_else(|| IndexError::storage("decode timestamp", format!("out of range: {us}")))
}

fn decode_licenses(json: &str) -> Result<Vec<String>> {
    serde_json::from_str(json).map_err(|e| IndexError::storage("decode license_types", e))
}

fn document_from_row(row: &SqliteRow) -> Result<SearchDocument> {
    let get_err = |e| IndexError::storage("decode search document", e);
    let licenses: String = row.try_get("license_types").map_err(get_err)?;
    let ibc_updated: Option<i64> = row
        .try_get("imported_by_count_updated_at")
        .map_err(get_err)?;
    Ok(SearchDocument {
        package_path: row.try_get("package_path").map_err(get_err)?,
        module_path: row.try_get("module_path").map_err(get_err)?,
        version: row.try_get("version").map_err(get_err)?,
        commit_time: from_micros(row.try_get("commit_time").map_err(get_err)?)?,
        name: row.try_get("name").map_err(get_err)?,
        synopsis: row.try_get("synopsis").map_err(get_err)?,
        license_types: decode_licenses(&licenses)?,
        redistributable: row.try_get("redistributable").map_err(get_err)?,
        has_go_mod: row.try_get("has_go_mod").map_err(get_err)?,
        imported_by_count: row.try_get::<i64, _>("imported_by_count").map_err(get_err)? as u64,
        version_updated_at: from_micros(row.try_get("version_updated_at").map_err(get_err)?)?,
        imported_by_count_updated_at: ibc_updated.map(from_micros).transpose()?,
        updated_at: from_micros(row.try_get("updated_at").map_err(get_err)?)?,
    })
}

fn match_from_row(row: &SqliteRow) -> Result<MatchRow> {
    let get_err = |e| IndexError::storage("decode match row", e);
    let licenses: String = row.try_get("license_types").map_err(get_err)?;
    Ok(MatchRow {
        package_path: row.try_get("package_path").map_err(get_err)?,
        module_path: row.try_get("module_path").map_err(get_err)?,
        version: row.try_get("version").map_err(get_err)?,
        name: row.try_get("name").map_err(get_err)?,
        synopsis: row.try_get("synopsis").map_err(get_err)?,
        licenses: decode_licenses(&licenses)?,
        commit_time: from_micros(row.try_get("commit_time").map_err(get_err)?)?,
        text_rank: row.try_get("text_rank").map_err(get_err)?,
        imported_by_count: row.try_get::<i64, _>("imported_by_count").map_err(get_err)? as u64,
        redistributable: row.try_get("redistributable").map_err(get_err)?,
        has_go_mod: row.try_get("has_go_mod").map_err(get_err)?,
    })
}

#[async_trait]
impl IndexStore for SqliteStore {
    async fn upsert_document(&self, pkg: &PackageVersion) -> Result<()> {
        pkg.validate()?;
        let sort_version = version::for_sorting(&pkg.version)?;
        let now = Utc::now().timestamp_micros();
        let (hll_register, hll_zeros) = hll::observation(&pkg.package_path);
        let licenses = serde_json::to_string(&pkg.licenses)
            .map_err(|e| IndexError::storage("encode license_types", e).logged())?;
        let context = format!("upsert {}@{}", pkg.package_path, pkg.version);
        let err = |e| IndexError::storage(context.clone(), e).logged();

        let mut tx = self.pool.begin().await.map_err(err)?;

        let written = sqlx::query(
            r#"
            INSERT INTO search_documents (package_path, module_path, version, sort_version,
                                          commit_time, name, synopsis, license_types,
                                          redistributable, has_go_mod, version_updated_at,
                                          updated_at, hll_register, hll_leading_zeros)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(package_path) DO UPDATE SET
                module_path = excluded.module_path,
                version = excluded.version,
                sort_version = excluded.sort_version,
                commit_time = excluded.commit_time,
                name = excluded.name,
                synopsis = excluded.synopsis,
                license_types = excluded.license_types,
                redistributable = excluded.redistributable,
                has_go_mod = excluded.has_go_mod,
                version_updated_at = excluded.version_updated_at,
                updated_at = excluded.updated_at
            WHERE excluded.sort_version > search_documents.sort_version
            "#,
        )
        .bind(&pkg.package_path)
        .bind(&pkg.module_path)
        .bind(&pkg.version)
        .bind(&sort_version)
        .bind(pkg.commit_time.timestamp_micros())
        .bind(&pkg.name)
        .bind(&pkg.synopsis)
        .bind(&licenses)
        .bind(pkg.is_redistributable())
        .bind(pkg.has_go_mod)
        .bind(now)
        .bind(now)
        .bind(hll_register as i64)
        .bind(hll_zeros as i64)
        .execute(&mut *tx)
        .await
        .map_err(err)?
        .rows_affected();

        if written > 0 {
            sqlx::query("DELETE FROM search_documents_fts WHERE package_path = ?")
                .bind(&pkg.package_path)
                .execute(&mut *tx)
                .await
                .map_err(err)?;
            sqlx::query(
                "INSERT INTO search_documents_fts (package_path, path_tokens, name, synopsis) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&pkg.package_path)
            .bind(path_tokens(&pkg.package_path).join(" "))
            .bind(&pkg.name)
            .bind(&pkg.synopsis)
            .execute(&mut *tx)
            .await
            .map_err(err)?;
            tracing::debug!(
                path = %pkg.package_path,
                version = %pkg.version,
                "search document written"
            );
        } else {
            let touched = sqlx::query(
                "UPDATE search_documents SET updated_at = ? WHERE package_path = ? AND sort_version = ?",
            )
            .bind(now)
            .bind(&pkg.package_path)
            .bind(&sort_version)
            .execute(&mut *tx)
            .await
            .map_err(err)?
            .rows_affected();
            if touched == 0 {
                tracing::debug!(
                    path = %pkg.package_path,
                    version = %pkg.version,
                    "ignoring older version"
                );
            }
        }

        sqlx::query("DELETE FROM imports WHERE from_path = ? AND from_version = ?")
            .bind(&pkg.package_path)
            .bind(&pkg.version)
            .execute(&mut *tx)
            .await
            .map_err(err)?;
        for to_path in &pkg.imports {
            sqlx::query(
                "INSERT OR IGNORE INTO imports (from_path, from_version, to_path) VALUES (?, ?, ?)",
            )
            .bind(&pkg.package_path)
            .bind(&pkg.version)
            .bind(to_path)
            .execute(&mut *tx)
            .await
            .map_err(err)?;
        }

        tx.commit().await.map_err(err)?;
        Ok(())
    }

    async fn recompute_imported_by_counts(&self) -> Result<u64> {
        let now = Utc::now().timestamp_micros();
        let changed = sqlx::query(
            r#"
            WITH counts AS (
                SELECT i.to_path AS package_path, COUNT(DISTINCT i.from_path) AS n
                FROM imports i
                JOIN search_documents src
                  ON src.package_path = i.from_path AND src.version = i.from_version
                WHERE i.from_path <> i.to_path
                GROUP BY i.to_path
            )
            UPDATE search_documents
            SET imported_by_count = COALESCE(
                    (SELECT n FROM counts WHERE counts.package_path = search_documents.package_path), 0),
                imported_by_count_updated_at = ?
            WHERE imported_by_count <> COALESCE(
                    (SELECT n FROM counts WHERE counts.package_path = search_documents.package_path), 0)
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| IndexError::storage("recompute imported-by counts", e).logged())?
        .rows_affected();

        tracing::info!(changed, "recomputed imported-by counts");
        Ok(changed)
    }

    async fn delete_older_versions(&self, module_path: &str, keep_version: &str) -> Result<u64> {
        let keep = version::for_sorting(keep_version)?;
        let context = format!("delete versions of {module_path} older than {keep_version}");
        let err = |e| IndexError::storage(context.clone(), e).logged();

        let mut tx = self.pool.begin().await.map_err(err)?;
        sqlx::query(
            r#"
            DELETE FROM search_documents_fts WHERE package_path IN (
                SELECT package_path FROM search_documents
                WHERE module_path = ? AND sort_version < ?
            )
            "#,
        )
        .bind(module_path)
        .bind(&keep)
        .execute(&mut *tx)
        .await
        .map_err(err)?;
        let deleted =
            sqlx::query("DELETE FROM search_documents WHERE module_path = ? AND sort_version < ?")
                .bind(module_path)
                .bind(&keep)
                .execute(&mut *tx)
                .await
                .map_err(err)?
                .rows_affected();
        tx.commit().await.map_err(err)?;

        tracing::info!(
            module = module_path,
            keep = keep_version,
            deleted,
            "deleted older versions"
        );
        Ok(deleted)
    }

    async fn pending_documents(
        &self,
        updated_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PendingDocument>> {
        let rows = sqlx::query(
            r#"
            SELECT package_path, module_path, version
            FROM search_documents
            WHERE updated_at < ?
              AND (instr('/' || package_path || '/', '/internal/') = 0 OR package_path = 'internal')
            ORDER BY package_path
            LIMIT ?
            "#,
        )
        .bind(updated_before.timestamp_micros())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| IndexError::storage("list pending documents", e).logged())?;

        rows.iter()
            .map(|row| {
                Ok(PendingDocument {
                    package_path: row.get("package_path"),
                    module_path: row.get("module_path"),
                    version: row.get("version"),
                })
            })
            .collect()
    }

    async fn get_document(&self, package_path: &str) -> Result<Option<SearchDocument>> {
        let row = sqlx::query("SELECT * FROM search_documents WHERE package_path = ?")
            .bind(package_path)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| IndexError::storage(format!("get {package_path}"), e))?;
        row.as_ref().map(document_from_row).transpose()
    }

    async fn document_count(&self) -> Result<u64> {
        self.total_documents().await
    }

    async fn match_documents(&self, query: &TextQuery, scope: MatchScope) -> Result<MatchSet> {
        let total = self.total_documents().await?;
        let (restriction, limit) = match scope {
            MatchScope::All => ("", None),
            MatchScope::MostImported(n) => (
                "WHERE d.package_path IN (
                    SELECT package_path FROM search_documents
                    ORDER BY imported_by_count DESC, package_path ASC
                    LIMIT ?
                )",
                Some(n),
            ),
        };
        let sql = format!(
            r#"
            SELECT d.package_path, d.module_path, d.version, d.name, d.synopsis,
                   d.license_types, d.commit_time, d.imported_by_count,
                   d.redistributable, d.has_go_mod, m.text_rank
            FROM (
                SELECT package_path, -bm25(search_documents_fts, 0.0, 3.0, 2.0, 1.0) AS text_rank
                FROM search_documents_fts
                WHERE search_documents_fts MATCH ?
            ) m
            JOIN search_documents d ON d.package_path = m.package_path
            {restriction}
            "#
        );

        let mut q = sqlx::query(&sql).bind(query.fts5_expression());
        if let Some(n) = limit {
            q = q.bind(n as i64);
        }
        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| IndexError::storage(format!("match {:?} ({scope:?})", query.terms()), e))?;

        let scanned = match scope {
            MatchScope::All => total,
            MatchScope::MostImported(n) => total.min(n as u64),
        };
        Ok(MatchSet {
            rows: rows.iter().map(match_from_row).collect::<Result<_>>()?,
            scanned,
            exhaustive: scanned == total,
        })
    }

    async fn match_sketch(&self, query: &TextQuery) -> Result<Vec<(u32, u32)>> {
        let rows = sqlx::query(
            r#"
            SELECT d.hll_register AS register, MAX(d.hll_leading_zeros) AS zeros
            FROM search_documents_fts
            JOIN search_documents d ON d.package_path = search_documents_fts.package_path
            WHERE search_documents_fts MATCH ?
            GROUP BY d.hll_register
            "#,
        )
        .bind(query.fts5_expression())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| IndexError::storage(format!("sketch {:?}", query.terms()), e))?;

        Ok(rows
            .iter()
            .map(|row| {
                (
                    row.get::<i64, _>("register") as u32,
                    row.get::<i64, _>("zeros") as u32,
                )
            })
            .collect())
    }
}
