//! Search strategies and the per-strategy response counter.

use std::fmt;

use prometheus::{IntCounterVec, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::Result;

/// The query strategies raced by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Ranks only the most imported packages.
    Popular,
    /// Ranks every matching package.
    Deep,
    /// Popular-restricted ranking with an HLL total.
    Estimate,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [Strategy::Popular, Strategy::Deep, Strategy::Estimate];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Popular => "popular",
            Strategy::Deep => "deep",
            Strategy::Estimate => "estimate",
        }
    }

}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sink for "which strategy served this request".
///
/// The coordinator calls [`record_response`](SearchMetrics::record_response)
/// exactly once per successful search, for the winning strategy only.
pub trait SearchMetrics: Send + Sync {
    fn record_response(&self, strategy: Strategy);
}

/// Prometheus counter `search_response_count{strategy=...}`.
///
/// Each counter owns its [`Registry`], so several searchers (or tests) can
/// coexist in one process. [`render`](ResponseCounter::render) produces the
/// text exposition format.
#[derive(Clone)]
pub struct ResponseCounter {
    registry: Registry,
    responses: IntCounterVec,
}

impl ResponseCounter {
    pub fn new() -> Result<Self> {
        let responses = IntCounterVec::new(
            Opts::new(
                "search_response_count",
                "Search requests served, by strategy",
            ),
            &["strategy"],
        )?;
        let registry = Registry::new();
        registry.register(Box::new(responses.clone()))?;
        Ok(Self {
            registry,
            responses,
        })
    }

    pub fn get(&self, strategy: Strategy) -> u64 {
        self.responses
            .with_label_values(&[strategy.as_str()])
            .get()
    }

    /// `(strategy, count)` for every strategy, in [`Strategy::ALL`] order.
    pub fn snapshot(&self) -> Vec<(Strategy, u64)> {
        Strategy::ALL.iter().map(|&s| (s, self.get(s))).collect()
    }

    pub fn total(&self) -> u64 {
        Strategy::ALL.iter().map(|&s| self.get(s)).sum()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Current values in the Prometheus text format.
    pub fn render(&self) -> Result<String> {
        Ok(TextEncoder::new().encode_to_string(&self.registry.gather())?)
    }
}

impl fmt::Debug for ResponseCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.snapshot().into_iter().map(|(s, n)| (s.as_str(), n)))
            .finish()
    }
}

impl SearchMetrics for ResponseCounter {
    fn record_response(&self, strategy: Strategy) {
        self.responses.with_label_values(&[strategy.as_str()]).inc();
        tracing::trace!(%strategy, "search response recorded");
    }
}
