//! Storage abstraction for the search index.
//!
//! The [`IndexStore`] trait covers both sides of the index: the writer
//! operations used by ingestion and maintenance, and the read queries the
//! search strategies issue. Implementations must make every writer
//! operation atomic on the rows it touches.
//!
//! Implementations must be `Send + Sync`; the coordinator shares one store
//! across concurrently running strategy tasks.

pub mod memory;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{IndexError, Result};
use crate::models::{PackageVersion, PendingDocument, SearchDocument};
use crate::tokenize;

/// A parsed search term: the lower-cased words every match must contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextQuery {
    terms: Vec<String>,
}

impl TextQuery {
    /// Parse a user search term.
    ///
    /// Returns `Ok(None)` for a blank term and `InvalidInput` for a term
    /// with nothing searchable in it (`"&&"`).
    pub fn parse(term: &str) -> Result<Option<TextQuery>> {
        if term.trim().is_empty() {
            return Ok(None);
        }
        let mut seen = HashSet::new();
        let terms: Vec<String> = tokenize::words(term)
            .filter(|w| seen.insert(w.clone()))
            .collect();
        if terms.is_empty() {
            return Err(IndexError::invalid(format!(
                "search term {term:?} has no searchable words"
            )));
        }
        Ok(Some(TextQuery { terms }))
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// FTS5 `MATCH` expression: every term quoted, implicitly AND-ed.
    pub fn fts5_expression(&self) -> String {
        self.terms
            .iter()
            .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

/// Which documents a strategy scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchScope {
    /// The whole index.
    All,
    /// Only the `n` documents with the highest imported-by count
    /// (ties broken by package path).
    MostImported(usize),
}

/// A matching document with the inputs ranking needs.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRow {
    pub package_path: String,
    pub module_path: String,
    pub version: String,
    pub name: String,
    pub synopsis: String,
    pub licenses: Vec<String>,
    pub commit_time: DateTime<Utc>,
    /// Text relevance; higher is better, never negative.
    pub text_rank: f64,
    pub imported_by_count: u64,
    pub redistributable: bool,
    pub has_go_mod: bool,
}

/// Result of one scan.
#[derive(Debug, Clone, Default)]
pub struct MatchSet {
    /// Matching rows, unordered.
    pub rows: Vec<MatchRow>,
    /// Documents inside the scanned scope (matching or not).
    pub scanned: u64,
    /// True when the scope covered the whole index.
    pub exhaustive: bool,
}

/// Abstract storage backend for the search index.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_document`](IndexStore::upsert_document) | Insert a package version; newer versions win |
/// | [`recompute_imported_by_counts`](IndexStore::recompute_imported_by_counts) | Batch refresh of imported-by counts |
/// | [`delete_older_versions`](IndexStore::delete_older_versions) | Drop a module's superseded documents |
/// | [`pending_documents`](IndexStore::pending_documents) | Documents due for re-indexing |
/// | [`get_document`](IndexStore::get_document) | One document by package path |
/// | [`match_documents`](IndexStore::match_documents) | Full-text scan for a strategy |
/// | [`match_sketch`](IndexStore::match_sketch) | HLL observations of all matches |
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Insert or update the document for `pkg.package_path`.
    ///
    /// A strictly newer version replaces the version-governed fields and
    /// advances `version_updated_at`; the same version only refreshes
    /// `updated_at`; an older version leaves the row alone. The version's
    /// import edges are recorded in every case.
    async fn upsert_document(&self, pkg: &PackageVersion) -> Result<()>;

    /// Recompute every document's imported-by count from the import edges
    /// of the importers' indexed versions. Returns the number of documents
    /// whose count changed.
    async fn recompute_imported_by_counts(&self) -> Result<u64>;

    /// Delete documents of `module_path` whose version is older than
    /// `keep_version`. Returns the number of deleted documents.
    async fn delete_older_versions(&self, module_path: &str, keep_version: &str) -> Result<u64>;

    /// Non-internal documents last upserted before `updated_before`, by path.
    async fn pending_documents(
        &self,
        updated_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PendingDocument>>;

    async fn get_document(&self, package_path: &str) -> Result<Option<SearchDocument>>;

    async fn document_count(&self) -> Result<u64>;

    /// Documents in `scope` matching every term of `query`.
    async fn match_documents(&self, query: &TextQuery, scope: MatchScope) -> Result<MatchSet>;

    /// `(hll_register, max hll_leading_zeros)` over all matching documents.
    async fn match_sketch(&self, query: &TextQuery) -> Result<Vec<(u32, u32)>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_blank() {
        assert_eq!(TextQuery::parse("   ").unwrap(), None);
        assert_eq!(TextQuery::parse("").unwrap(), None);
    }

    #[test]
    fn test_parse_no_words() {
        assert!(matches!(
            TextQuery::parse("& | !"),
            Err(IndexError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_parse_terms() {
        let q = TextQuery::parse("Go & CDK go").unwrap().unwrap();
        assert_eq!(q.terms(), ["go", "cdk"]);
        assert_eq!(q.fts5_expression(), "\"go\" AND \"cdk\"");
    }

    #[test]
    fn test_path_term_splits_into_words() {
        let q = TextQuery::parse("rsc.io/quote").unwrap().unwrap();
        assert_eq!(q.terms(), ["rsc", "io", "quote"]);
    }
}
