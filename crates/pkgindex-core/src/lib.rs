//! # pkgindex Core
//!
//! Shared logic for pkgindex: search document models, the error taxonomy,
//! path tokenization, HyperLogLog primitives, version ordering, scoring,
//! the store abstraction, and the hedged search coordinator.
//!
//! This crate contains no sqlx or filesystem I/O. The SQLite-backed store,
//! configuration and CLI live in the `pkgindex` app crate.

pub mod error;
pub mod hll;
pub mod metrics;
pub mod models;
pub mod score;
pub mod search;
pub mod store;
pub mod tokenize;
pub mod version;

pub use error::{IndexError, Result};
pub use metrics::{ResponseCounter, SearchMetrics, Strategy};
pub use models::{PackageVersion, SearchDocument, SearchResult};
pub use score::ScoreWeights;
pub use search::{HedgedSearcher, ResponseGate, SearchPage, SearchParams};
pub use store::IndexStore;
