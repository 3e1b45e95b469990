//! `pkgidx search`: runs the hedged coordinator over the SQLite store and
//! prints the served page.

use anyhow::Result;
use std::sync::Arc;

use pkgindex_core::search::{HedgedSearcher, SearchPage};
use pkgindex_core::ResponseCounter;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

pub async fn run_search(
    config: &Config,
    term: &str,
    limit: Option<i64>,
    offset: Option<i64>,
    json: bool,
    metrics: bool,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = Arc::new(SqliteStore::new(pool.clone()));
    let counter = Arc::new(ResponseCounter::new()?);
    let searcher = HedgedSearcher::new(store, counter.clone(), config.search_params());

    let page = searcher
        .search_page(term, limit.unwrap_or(0), offset.unwrap_or(0))
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&page)?);
    } else {
        print_page(term, &page);
    }
    if metrics {
        eprint!("{}", counter.render()?);
    }

    pool.close().await;
    Ok(())
}

fn print_page(term: &str, page: &SearchPage) {
    if page.results.is_empty() {
        println!("No results for \"{}\".", term);
        return;
    }

    for (i, r) in page.results.iter().enumerate() {
        println!("{}. [{:.3}] {} {}", i + 1, r.score, r.package_path, r.version);
        if !r.synopsis.is_empty() {
            println!("    {}", r.synopsis);
        }
        let licenses = if r.licenses.is_empty() {
            "none".to_string()
        } else {
            r.licenses.join(", ")
        };
        println!(
            "    module: {}  licenses: {}  committed: {}",
            r.module_path,
            licenses,
            r.commit_time.format("%Y-%m-%d")
        );
        println!();
    }

    let served_by = page.strategy.map_or("none", |s| s.as_str());
    println!(
        "{}{} results (served by {})",
        if page.approximate { "~" } else { "" },
        page.num_results,
        served_by
    );
}
