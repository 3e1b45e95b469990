//! Hedged search across three query strategies.
//!
//! The core search algorithm operates entirely through the [`IndexStore`]
//! trait. The calling application builds the store, constructs
//! [`SearchParams`] from its configuration and supplies a metrics sink.
//!
//! # Protocol
//!
//! 1. `popular` and `deep` start immediately; `estimate` starts after
//!    [`SearchParams::estimate_delay`].
//! 2. Each strategy ranks its own rows and publishes one completion to a
//!    single-consumer channel. `popular` and `estimate` publish nothing
//!    when their restricted scan matched no document.
//! 3. The first completion is accepted. An uncounted `popular` page (its
//!    scan did not cover the whole index) waits for the next completion:
//!    `estimate` supplies an approximate total, `deep` replaces the page.
//! 4. Remaining tasks are aborted, and the serving strategy is recorded
//!    once in the [`SearchMetrics`] sink.
//!
//! An error from the first completion is returned as is; there is no
//! fallback to another strategy's result. Once popular has a page, a failing
//! follow-up completion is logged and popular serves its uncounted page.
//! The whole race is bounded by [`SearchParams::timeout`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::error::{IndexError, Result};
use crate::hll::Sketch;
use crate::metrics::{SearchMetrics, Strategy};
use crate::models::SearchResult;
use crate::score::ScoreWeights;
use crate::store::{IndexStore, MatchRow, MatchScope, TextQuery};

/// Search tuning parameters, decoupled from application config.
#[derive(Debug, Clone)]
pub struct SearchParams {
    /// Page size used when the caller passes `limit < 1`.
    pub page_size: usize,
    /// Number of most-imported documents the popular and estimate
    /// strategies scan.
    pub popular_limit: usize,
    /// Grace period before the estimate strategy starts.
    pub estimate_delay: Duration,
    /// Deadline for the whole race.
    pub timeout: Duration,
    pub weights: ScoreWeights,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            page_size: 10,
            popular_limit: 100,
            estimate_delay: Duration::from_millis(100),
            timeout: Duration::from_secs(5),
            weights: ScoreWeights::default(),
        }
    }
}

/// Hook run by every strategy task right before it publishes.
///
/// [`wait_turn`](ResponseGate::wait_turn) may hold a strategy back;
/// [`finished`](ResponseGate::finished) is called once the strategy has
/// published (or fallen through). Tests use this to pin the race order.
#[async_trait]
pub trait ResponseGate: Send + Sync {
    async fn wait_turn(&self, strategy: Strategy);
    fn finished(&self, strategy: Strategy);
}

/// Gate that never holds anything back.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenGate;

#[async_trait]
impl ResponseGate for OpenGate {
    async fn wait_turn(&self, _strategy: Strategy) {}
    fn finished(&self, _strategy: Strategy) {}
}

/// One served page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchPage {
    pub results: Vec<SearchResult>,
    /// Total matches reported by the serving strategy.
    pub num_results: u64,
    pub approximate: bool,
    /// `None` when no strategy ran (blank term).
    pub strategy: Option<Strategy>,
}

impl SearchPage {
    fn empty() -> Self {
        SearchPage {
            results: Vec::new(),
            num_results: 0,
            approximate: false,
            strategy: None,
        }
    }
}

#[derive(Debug, Clone)]
struct Scored {
    score: f64,
    row: MatchRow,
}

/// A strategy's ranked rows and its count.
#[derive(Debug)]
struct Completion {
    ranked: Vec<Scored>,
    total: u64,
    approximate: bool,
    /// False when `total` is only a lower bound.
    counted: bool,
}

impl Completion {
    fn rank(rows: Vec<MatchRow>, weights: &ScoreWeights) -> Vec<Scored> {
        let mut ranked: Vec<Scored> = rows
            .into_iter()
            .map(|row| Scored {
                score: weights.score(
                    row.text_rank,
                    row.imported_by_count,
                    row.redistributable,
                    row.has_go_mod,
                ),
                row,
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.row.package_path.cmp(&b.row.package_path))
        });
        ranked
    }

    fn into_page(self, strategy: Strategy, limit: usize, offset: usize) -> SearchPage {
        let (total, approximate) = (self.total, self.approximate);
        let results = self
            .ranked
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|s| SearchResult {
                package_path: s.row.package_path,
                module_path: s.row.module_path,
                version: s.row.version,
                name: s.row.name,
                synopsis: s.row.synopsis,
                licenses: s.row.licenses,
                commit_time: s.row.commit_time,
                score: s.score,
                num_results: total,
                approximate,
            })
            .collect();
        SearchPage {
            results,
            num_results: total,
            approximate,
            strategy: Some(strategy),
        }
    }
}

/// Run one strategy. `Ok(None)` means it fell through.
async fn run_strategy(
    strategy: Strategy,
    store: &dyn IndexStore,
    query: &TextQuery,
    popular_limit: usize,
    weights: &ScoreWeights,
) -> Result<Option<Completion>> {
    match strategy {
        Strategy::Deep => {
            let set = store.match_documents(query, MatchScope::All).await?;
            let total = set.rows.len() as u64;
            Ok(Some(Completion {
                ranked: Completion::rank(set.rows, weights),
                total,
                approximate: false,
                counted: true,
            }))
        }
        Strategy::Popular => {
            let set = store
                .match_documents(query, MatchScope::MostImported(popular_limit))
                .await?;
            if set.rows.is_empty() {
                return Ok(None);
            }
            let total = set.rows.len() as u64;
            Ok(Some(Completion {
                ranked: Completion::rank(set.rows, weights),
                total,
                approximate: !set.exhaustive,
                counted: set.exhaustive,
            }))
        }
        Strategy::Estimate => {
            let set = store
                .match_documents(query, MatchScope::MostImported(popular_limit))
                .await?;
            if set.rows.is_empty() {
                return Ok(None);
            }
            let mut sketch = Sketch::new();
            sketch.extend(store.match_sketch(query).await?);
            let total = sketch.estimate().max(set.rows.len() as u64);
            Ok(Some(Completion {
                ranked: Completion::rank(set.rows, weights),
                total,
                approximate: true,
                counted: true,
            }))
        }
    }
}

type Published = (Strategy, Result<Completion>);

/// Races the popular, deep and estimate strategies against each other.
pub struct HedgedSearcher {
    store: Arc<dyn IndexStore>,
    metrics: Arc<dyn SearchMetrics>,
    gate: Arc<dyn ResponseGate>,
    params: SearchParams,
}

impl HedgedSearcher {
    pub fn new(
        store: Arc<dyn IndexStore>,
        metrics: Arc<dyn SearchMetrics>,
        params: SearchParams,
    ) -> Self {
        Self {
            store,
            metrics,
            gate: Arc::new(OpenGate),
            params,
        }
    }

    pub fn with_gate(mut self, gate: Arc<dyn ResponseGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn params(&self) -> &SearchParams {
        &self.params
    }

    /// Ranked results for `term`. `limit < 1` uses the page size and
    /// `offset < 1` starts at the first result.
    pub async fn search(&self, term: &str, limit: i64, offset: i64) -> Result<Vec<SearchResult>> {
        Ok(self.search_page(term, limit, offset).await?.results)
    }

    /// Like [`search`](Self::search), also reporting the total and the
    /// serving strategy.
    pub async fn search_page(&self, term: &str, limit: i64, offset: i64) -> Result<SearchPage> {
        self.search_with_cancel(term, limit, offset, std::future::pending())
            .await
    }

    /// Run a search that stops with [`IndexError::Cancelled`] as soon as
    /// `cancel` resolves.
    pub async fn search_with_cancel<C>(
        &self,
        term: &str,
        limit: i64,
        offset: i64,
        cancel: C,
    ) -> Result<SearchPage>
    where
        C: Future<Output = ()> + Send,
    {
        let Some(query) = TextQuery::parse(term)? else {
            return Ok(SearchPage::empty());
        };
        let limit = if limit < 1 {
            self.params.page_size
        } else {
            limit as usize
        };
        let offset = offset.max(0) as usize;

        let started = Instant::now();
        let deadline = started + self.params.timeout;
        let outcome = tokio::select! {
            raced = tokio::time::timeout_at(deadline, self.race(Arc::new(query))) => {
                raced.unwrap_or_else(|_| {
                    tracing::warn!(
                        term,
                        timeout_ms = self.params.timeout.as_millis() as u64,
                        "search timed out"
                    );
                    Err(IndexError::Timeout(self.params.timeout))
                })
            }
            _ = cancel => {
                tracing::debug!(term, "search cancelled");
                return Err(IndexError::Cancelled);
            }
        };
        let (strategy, completion) = outcome.map_err(IndexError::logged)?;

        self.metrics.record_response(strategy);
        tracing::debug!(
            term,
            %strategy,
            total = completion.total,
            approximate = completion.approximate,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search served"
        );
        Ok(completion.into_page(strategy, limit, offset))
    }

    async fn race(&self, query: Arc<TextQuery>) -> Result<(Strategy, Completion)> {
        let (tx, mut rx) = mpsc::channel::<Published>(Strategy::ALL.len());
        let mut tasks = JoinSet::new();

        for strategy in Strategy::ALL {
            let tx = tx.clone();
            let store = Arc::clone(&self.store);
            let gate = Arc::clone(&self.gate);
            let query = Arc::clone(&query);
            let popular_limit = self.params.popular_limit;
            let weights = self.params.weights;
            let delay = match strategy {
                Strategy::Estimate => self.params.estimate_delay,
                _ => Duration::ZERO,
            };

            tasks.spawn(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let started = Instant::now();
                let outcome =
                    run_strategy(strategy, store.as_ref(), &query, popular_limit, &weights).await;
                tracing::debug!(
                    %strategy,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    ok = outcome.is_ok(),
                    "strategy completed"
                );

                gate.wait_turn(strategy).await;
                match outcome.transpose() {
                    Some(published) => {
                        // The receiver is gone once a winner is accepted.
                        let _ = tx.send((strategy, published)).await;
                    }
                    None => tracing::debug!(%strategy, "strategy fell through"),
                }
                gate.finished(strategy);
            });
        }
        drop(tx);

        let accepted = accept(&mut rx).await;
        tasks.abort_all();

        rx.close();
        while let Ok((strategy, outcome)) = rx.try_recv() {
            if let Err(e) = outcome {
                tracing::debug!(%strategy, error = %e, "discarding losing strategy error");
            }
        }
        accepted
    }
}

/// Single-consumer arbitration over published completions.
async fn accept(rx: &mut mpsc::Receiver<Published>) -> Result<(Strategy, Completion)> {
    let Some((strategy, first)) = rx.recv().await else {
        return Err(IndexError::storage(
            "search",
            "every strategy exited without a result",
        ));
    };
    let mut first = first?;
    if strategy != Strategy::Popular || first.counted {
        return Ok((strategy, first));
    }

    while let Some((next, outcome)) = rx.recv().await {
        match (next, outcome) {
            (Strategy::Popular, _) => {}
            (_, Err(e)) => {
                tracing::debug!(strategy = %next, error = %e, "follow-up strategy failed");
                break;
            }
            (Strategy::Estimate, Ok(estimate)) => {
                first.total = first.total.max(estimate.total);
                return Ok((Strategy::Popular, first));
            }
            (Strategy::Deep, Ok(deep)) => return Ok((Strategy::Deep, deep)),
        }
    }
    Ok((Strategy::Popular, first))
}
