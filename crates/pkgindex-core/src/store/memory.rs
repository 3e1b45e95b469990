//! In-memory [`IndexStore`] implementation, used in tests.
//!
//! All state lives behind a single `std::sync::RwLock`, so every writer
//! operation is atomic with respect to readers. Text matching uses the same
//! path tokens and word splitting as the SQLite FTS index; the text rank is
//! a field-weighted share of matched terms in `[0, 1]`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{IndexError, Result};
use crate::hll;
use crate::models::{is_internal_path, PackageVersion, PendingDocument, SearchDocument};
use crate::tokenize::{path_tokens, words};
use crate::version;

use super::{IndexStore, MatchRow, MatchScope, MatchSet, TextQuery};

const PATH_WEIGHT: f64 = 3.0;
const NAME_WEIGHT: f64 = 2.0;
const SYNOPSIS_WEIGHT: f64 = 1.0;

struct StoredDoc {
    doc: SearchDocument,
    sort_key: String,
    path_words: HashSet<String>,
    name_words: HashSet<String>,
    synopsis_words: HashSet<String>,
}

impl StoredDoc {
    fn new(pkg: &PackageVersion, sort_key: String, now: DateTime<Utc>) -> Self {
        let mut stored = StoredDoc {
            doc: SearchDocument {
                package_path: pkg.package_path.clone(),
                module_path: String::new(),
                version: String::new(),
                commit_time: pkg.commit_time,
                name: String::new(),
                synopsis: String::new(),
                license_types: Vec::new(),
                redistributable: false,
                has_go_mod: false,
                imported_by_count: 0,
                version_updated_at: now,
                imported_by_count_updated_at: None,
                updated_at: now,
            },
            sort_key: String::new(),
            path_words: path_tokens(&pkg.package_path)
                .iter()
                .flat_map(|t| words(t).collect::<Vec<_>>())
                .collect(),
            name_words: HashSet::new(),
            synopsis_words: HashSet::new(),
        };
        stored.apply(pkg, sort_key, now);
        stored
    }

    /// Overwrite the version-governed fields.
    fn apply(&mut self, pkg: &PackageVersion, sort_key: String, now: DateTime<Utc>) {
        let d = &mut self.doc;
        d.module_path = pkg.module_path.clone();
        d.version = pkg.version.clone();
        d.commit_time = pkg.commit_time;
        d.name = pkg.name.clone();
        d.synopsis = pkg.synopsis.clone();
        d.license_types = pkg.licenses.clone();
        d.redistributable = pkg.is_redistributable();
        d.has_go_mod = pkg.has_go_mod;
        d.version_updated_at = now;
        d.updated_at = now;
        self.sort_key = sort_key;
        self.name_words = words(&pkg.name).collect();
        self.synopsis_words = words(&pkg.synopsis).collect();
    }

    fn matches(&self, query: &TextQuery) -> bool {
        query.terms().iter().all(|t| {
            self.path_words.contains(t)
                || self.name_words.contains(t)
                || self.synopsis_words.contains(t)
        })
    }

    fn text_rank(&self, query: &TextQuery) -> f64 {
        let terms = query.terms();
        if terms.is_empty() {
            return 0.0;
        }
        let hit = |set: &HashSet<String>, t: &String, w: f64| if set.contains(t) { w } else { 0.0 };
        let total: f64 = terms
            .iter()
            .map(|t| {
                hit(&self.path_words, t, PATH_WEIGHT)
                    + hit(&self.name_words, t, NAME_WEIGHT)
                    + hit(&self.synopsis_words, t, SYNOPSIS_WEIGHT)
            })
            .sum();
        total / (terms.len() as f64 * (PATH_WEIGHT + NAME_WEIGHT + SYNOPSIS_WEIGHT))
    }

    fn to_match_row(&self, query: &TextQuery) -> MatchRow {
        let d = &self.doc;
        MatchRow {
            package_path: d.package_path.clone(),
            module_path: d.module_path.clone(),
            version: d.version.clone(),
            name: d.name.clone(),
            synopsis: d.synopsis.clone(),
            licenses: d.license_types.clone(),
            commit_time: d.commit_time,
            text_rank: self.text_rank(query),
            imported_by_count: d.imported_by_count,
            redistributable: d.redistributable,
            has_go_mod: d.has_go_mod,
        }
    }
}

#[derive(Default)]
struct State {
    docs: BTreeMap<String, StoredDoc>,
    /// `(importer path, importer version)` → imported paths.
    imports: HashMap<(String, String), Vec<String>>,
}

/// In-memory index store.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| IndexError::storage("in-memory read", "lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| IndexError::storage("in-memory write", "lock poisoned"))
    }
}

#[async_trait]
impl IndexStore for InMemoryStore {
    async fn upsert_document(&self, pkg: &PackageVersion) -> Result<()> {
        pkg.validate()?;
        let sort_key = version::for_sorting(&pkg.version)?;
        let now = Utc::now();
        let mut state = self.write()?;

        let mut imports: Vec<String> = pkg.imports.clone();
        imports.sort();
        imports.dedup();
        state
            .imports
            .insert((pkg.package_path.clone(), pkg.version.clone()), imports);

        match state.docs.get_mut(&pkg.package_path) {
            None => {
                let stored = StoredDoc::new(pkg, sort_key, now);
                state.docs.insert(pkg.package_path.clone(), stored);
                tracing::debug!(
                    path = %pkg.package_path,
                    version = %pkg.version,
                    "inserted search document"
                );
            }
            Some(existing) if sort_key > existing.sort_key => {
                tracing::debug!(
                    path = %pkg.package_path,
                    from = %existing.doc.version,
                    to = %pkg.version,
                    "updated search document"
                );
                existing.apply(pkg, sort_key, now);
            }
            Some(existing) if sort_key == existing.sort_key => {
                existing.doc.updated_at = now;
            }
            Some(existing) => {
                tracing::debug!(
                    path = %pkg.package_path,
                    indexed = %existing.doc.version,
                    incoming = %pkg.version,
                    "ignoring older version"
                );
            }
        }
        Ok(())
    }

    async fn recompute_imported_by_counts(&self) -> Result<u64> {
        let now = Utc::now();
        let mut state = self.write()?;

        let mut importers: HashMap<String, HashSet<String>> = HashMap::new();
        for stored in state.docs.values() {
            let d = &stored.doc;
            let key = (d.package_path.clone(), d.version.clone());
            if let Some(imported) = state.imports.get(&key) {
                for to in imported {
                    if to != &d.package_path {
                        importers
                            .entry(to.clone())
                            .or_default()
                            .insert(d.package_path.clone());
                    }
                }
            }
        }

        let mut changed = 0u64;
        for (path, stored) in state.docs.iter_mut() {
            let count = importers.get(path).map_or(0, |s| s.len() as u64);
            if stored.doc.imported_by_count != count {
                stored.doc.imported_by_count = count;
                stored.doc.imported_by_count_updated_at = Some(now);
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn delete_older_versions(&self, module_path: &str, keep_version: &str) -> Result<u64> {
        let keep_key = version::for_sorting(keep_version)?;
        let mut state = self.write()?;
        let before = state.docs.len();
        state
            .docs
            .retain(|_, s| !(s.doc.module_path == module_path && s.sort_key < keep_key));
        Ok((before - state.docs.len()) as u64)
    }

    async fn pending_documents(
        &self,
        updated_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PendingDocument>> {
        let state = self.read()?;
        Ok(state
            .docs
            .values()
            .map(|s| &s.doc)
            .filter(|d| d.updated_at < updated_before && !is_internal_path(&d.package_path))
            .take(limit)
            .map(|d| PendingDocument {
                package_path: d.package_path.clone(),
                module_path: d.module_path.clone(),
                version: d.version.clone(),
            })
            .collect())
    }

    async fn get_document(&self, package_path: &str) -> Result<Option<SearchDocument>> {
        let state = self.read()?;
        Ok(state.docs.get(package_path).map(|s| s.doc.clone()))
    }

    async fn document_count(&self) -> Result<u64> {
        Ok(self.read()?.docs.len() as u64)
    }

    async fn match_documents(&self, query: &TextQuery, scope: MatchScope) -> Result<MatchSet> {
        let state = self.read()?;
        let total = state.docs.len();

        let scoped: Vec<&StoredDoc> = match scope {
            MatchScope::All => state.docs.values().collect(),
            MatchScope::MostImported(n) => {
                // BTreeMap iteration is path order, so a stable sort keeps
                // path as the tie-break.
                let mut all: Vec<&StoredDoc> = state.docs.values().collect();
                all.sort_by(|a, b| b.doc.imported_by_count.cmp(&a.doc.imported_by_count));
                all.truncate(n);
                all
            }
        };

        Ok(MatchSet {
            scanned: scoped.len() as u64,
            exhaustive: scoped.len() == total,
            rows: scoped
                .into_iter()
                .filter(|s| s.matches(query))
                .map(|s| s.to_match_row(query))
                .collect(),
        })
    }

    async fn match_sketch(&self, query: &TextQuery) -> Result<Vec<(u32, u32)>> {
        let state = self.read()?;
        let mut registers: BTreeMap<u32, u32> = BTreeMap::new();
        for s in state.docs.values().filter(|s| s.matches(query)) {
            let (register, zeros) = hll::observation(&s.doc.package_path);
            let slot = registers.entry(register).or_insert(zeros);
            *slot = (*slot).max(zeros);
        }
        Ok(registers.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    fn commit_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 1, 30, 0, 0, 0).unwrap()
    }

    fn pkg(path: &str, module: &str, version: &str) -> PackageVersion {
        PackageVersion {
            package_path: path.to_string(),
            module_path: module.to_string(),
            version: version.to_string(),
            commit_time: commit_time(),
            name: path.rsplit('/').next().unwrap_or(path).to_string(),
            synopsis: format!("syn-{version}"),
            licenses: vec!["MIT".to_string()],
            redistributable: true,
            has_go_mod: false,
            imports: vec![],
        }
    }

    fn importing(path: &str, version: &str, imports: &[&str]) -> PackageVersion {
        let mut p = pkg(path, path, version);
        p.imports = imports.iter().map(|s| s.to_string()).collect();
        p
    }

    async fn tick() {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    #[tokio::test]
    async fn test_upsert_older_then_newer() {
        let store = InMemoryStore::new();
        store
            .upsert_document(&pkg("m.com/A", "m.com", "v1.0.0"))
            .await
            .unwrap();
        let original = store.get_document("m.com/A").await.unwrap().unwrap();
        tick().await;

        let mut older = pkg("m.com/A", "m.com", "v0.5.0");
        older.has_go_mod = true;
        store.upsert_document(&older).await.unwrap();
        let after_older = store.get_document("m.com/A").await.unwrap().unwrap();
        assert_eq!(after_older, original);
        tick().await;

        let mut newer = pkg("m.com/A", "m.com", "v1.5.2");
        newer.has_go_mod = true;
        store.upsert_document(&newer).await.unwrap();
        let got = store.get_document("m.com/A").await.unwrap().unwrap();
        assert_eq!(got.version, "v1.5.2");
        assert_eq!(got.synopsis, "syn-v1.5.2");
        assert!(got.has_go_mod);
        assert!(got.version_updated_at > original.version_updated_at);
        assert_eq!(got.imported_by_count, original.imported_by_count);
        assert_eq!(got.imported_by_count_updated_at, None);
    }

    #[tokio::test]
    async fn test_upsert_same_version_touches_updated_at_only() {
        let store = InMemoryStore::new();
        store
            .upsert_document(&pkg("m.com/A", "m.com", "v1.0.0"))
            .await
            .unwrap();
        let first = store.get_document("m.com/A").await.unwrap().unwrap();
        tick().await;

        let mut same = pkg("m.com/A", "m.com", "v1.0.0");
        same.synopsis = "changed".to_string();
        store.upsert_document(&same).await.unwrap();
        let got = store.get_document("m.com/A").await.unwrap().unwrap();
        assert_eq!(got.synopsis, first.synopsis);
        assert_eq!(got.version_updated_at, first.version_updated_at);
        assert!(got.updated_at > first.updated_at);
    }

    #[tokio::test]
    async fn test_upsert_rejects_bad_version() {
        let store = InMemoryStore::new();
        let err = store
            .upsert_document(&pkg("m.com/A", "m.com", "latest"))
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::InvalidInput(_)));
        assert_eq!(store.document_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_no_license_stored_as_not_redistributable() {
        let store = InMemoryStore::new();
        let mut p = pkg("m.com/A", "m.com", "v1.0.0");
        p.licenses.clear();
        store.upsert_document(&p).await.unwrap();
        let got = store.get_document("m.com/A").await.unwrap().unwrap();
        assert!(!got.redistributable);
    }

    #[tokio::test]
    async fn test_imported_by_counts() {
        let store = InMemoryStore::new();
        store
            .upsert_document(&importing("A", "v1.0.0", &[]))
            .await
            .unwrap();
        assert_eq!(store.recompute_imported_by_counts().await.unwrap(), 0);

        store
            .upsert_document(&importing("B", "v1.0.0", &["A"]))
            .await
            .unwrap();
        assert_eq!(store.recompute_imported_by_counts().await.unwrap(), 1);
        let b_stamp = store.get_document("B").await.unwrap().unwrap().imported_by_count_updated_at;

        store
            .upsert_document(&importing("C", "v1.0.0", &["A"]))
            .await
            .unwrap();
        store.recompute_imported_by_counts().await.unwrap();

        let a = store.get_document("A").await.unwrap().unwrap();
        let b = store.get_document("B").await.unwrap().unwrap();
        let c = store.get_document("C").await.unwrap().unwrap();
        assert_eq!(a.imported_by_count, 2);
        assert!(a.imported_by_count_updated_at.is_some());
        assert_eq!(b.imported_by_count_updated_at, b_stamp);
        assert_eq!(c.imported_by_count, 0);
        assert_eq!(c.imported_by_count_updated_at, None);

        // An older version of A importing D does not count.
        store
            .upsert_document(&importing("D", "v1.0.0", &[]))
            .await
            .unwrap();
        store
            .upsert_document(&importing("A", "v0.9.0", &["D"]))
            .await
            .unwrap();
        store.recompute_imported_by_counts().await.unwrap();
        assert_eq!(store.get_document("A").await.unwrap().unwrap().imported_by_count, 2);
        assert_eq!(store.get_document("D").await.unwrap().unwrap().imported_by_count, 0);

        // A newer one does.
        store
            .upsert_document(&importing("A", "v1.1.0", &["D"]))
            .await
            .unwrap();
        store.recompute_imported_by_counts().await.unwrap();
        assert_eq!(store.get_document("A").await.unwrap().unwrap().imported_by_count, 2);
        assert_eq!(store.get_document("D").await.unwrap().unwrap().imported_by_count, 1);
    }

    #[tokio::test]
    async fn test_recompute_is_idempotent() {
        let store = InMemoryStore::new();
        store
            .upsert_document(&importing("A", "v1.0.0", &[]))
            .await
            .unwrap();
        store
            .upsert_document(&importing("B", "v1.0.0", &["A", "A", "B"]))
            .await
            .unwrap();
        assert_eq!(store.recompute_imported_by_counts().await.unwrap(), 1);
        assert_eq!(store.recompute_imported_by_counts().await.unwrap(), 0);
        assert_eq!(store.get_document("A").await.unwrap().unwrap().imported_by_count, 1);
        // Self-imports never count.
        assert_eq!(store.get_document("B").await.unwrap().unwrap().imported_by_count, 0);
    }

    #[tokio::test]
    async fn test_delete_older_versions() {
        let store = InMemoryStore::new();
        store
            .upsert_document(&pkg("deleteme.com/p2", "deleteme.com", "v1.1.0"))
            .await
            .unwrap();
        store
            .upsert_document(&pkg("deleteme.com/p3", "deleteme.com", "v0.0.9"))
            .await
            .unwrap();
        store
            .upsert_document(&pkg("deleteme.com/p6", "deleteme.com", "v1.2.3"))
            .await
            .unwrap();
        store
            .upsert_document(&pkg("other.org/p4", "other.org", "v1.1.2"))
            .await
            .unwrap();
        store
            .upsert_document(&pkg("deleteme.com.evil/p7", "deleteme.com.evil", "v0.1.0"))
            .await
            .unwrap();

        let deleted = store
            .delete_older_versions("deleteme.com", "v1.2.3")
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert!(store.get_document("deleteme.com/p2").await.unwrap().is_none());
        assert!(store.get_document("deleteme.com/p3").await.unwrap().is_none());
        assert!(store.get_document("deleteme.com/p6").await.unwrap().is_some());
        assert!(store.get_document("other.org/p4").await.unwrap().is_some());
        assert!(store.get_document("deleteme.com.evil/p7").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_pending_documents_skip_internal() {
        let store = InMemoryStore::new();
        for path in ["A", "A/notinternal", "A/internal", "A/internal/B"] {
            store
                .upsert_document(&pkg(path, "A", "v1.0.0"))
                .await
                .unwrap();
        }
        let got = store
            .pending_documents(Utc::now() + chrono::Duration::seconds(1), 10)
            .await
            .unwrap();
        let paths: Vec<&str> = got.iter().map(|p| p.package_path.as_str()).collect();
        assert_eq!(paths, ["A", "A/notinternal"]);

        let got = store
            .pending_documents(Utc::now() - chrono::Duration::hours(24), 10)
            .await
            .unwrap();
        assert!(got.is_empty());

        let got = store
            .pending_documents(Utc::now() + chrono::Duration::seconds(1), 1)
            .await
            .unwrap();
        assert_eq!(got.len(), 1);
    }

    #[tokio::test]
    async fn test_match_scopes() {
        let store = InMemoryStore::new();
        store
            .upsert_document(&importing("foo.com/popular", "v1.0.0", &[]))
            .await
            .unwrap();
        for i in 0..5 {
            let path = format!("bar.com/foo/importer{i}");
            store
                .upsert_document(&importing(&path, "v1.0.0", &["foo.com/popular"]))
                .await
                .unwrap();
        }
        store
            .upsert_document(&importing("baz.com/other", "v1.0.0", &[]))
            .await
            .unwrap();
        store.recompute_imported_by_counts().await.unwrap();
        let q = TextQuery::parse("foo").unwrap().unwrap();

        let all = store.match_documents(&q, MatchScope::All).await.unwrap();
        assert_eq!(all.rows.len(), 6);
        assert_eq!(all.scanned, 7);
        assert!(all.exhaustive);

        let top = store
            .match_documents(&q, MatchScope::MostImported(2))
            .await
            .unwrap();
        assert_eq!(top.scanned, 2);
        assert!(!top.exhaustive);
        let mut paths: Vec<&str> = top.rows.iter().map(|r| r.package_path.as_str()).collect();
        paths.sort();
        // The popular package, then the first path among the zero-count ties.
        assert_eq!(paths, ["bar.com/foo/importer0", "foo.com/popular"]);
    }

    #[tokio::test]
    async fn test_text_rank_weights_fields() {
        let store = InMemoryStore::new();
        let mut in_path = pkg("cloud.dev/widget", "cloud.dev", "v1.0.0");
        in_path.synopsis = "nothing here".to_string();
        let mut in_synopsis = pkg("other.dev/gizmo", "other.dev", "v1.0.0");
        in_synopsis.synopsis = "a widget factory".to_string();
        store.upsert_document(&in_path).await.unwrap();
        store.upsert_document(&in_synopsis).await.unwrap();

        let q = TextQuery::parse("widget").unwrap().unwrap();
        let set = store.match_documents(&q, MatchScope::All).await.unwrap();
        let rank = |p: &str| set.rows.iter().find(|r| r.package_path == p).unwrap().text_rank;
        assert!(rank("cloud.dev/widget") > rank("other.dev/gizmo"));
        assert!(rank("other.dev/gizmo") > 0.0);
    }

    #[tokio::test]
    async fn test_match_sketch_counts_matches() {
        let store = InMemoryStore::new();
        for i in 0..20 {
            store
                .upsert_document(&pkg(&format!("foo.com/p{i}"), "foo.com", "v1.0.0"))
                .await
                .unwrap();
        }
        store
            .upsert_document(&pkg("bar.com/x", "bar.com", "v1.0.0"))
            .await
            .unwrap();
        let q = TextQuery::parse("foo").unwrap().unwrap();
        let mut sketch = hll::Sketch::new();
        sketch.extend(store.match_sketch(&q).await.unwrap());
        let est = sketch.estimate();
        assert!((15..=25).contains(&est), "estimate {est}");
    }
}
