//! # pkgindex
//!
//! A package search index: one search document per package path holding the
//! latest indexed version, imported-by counts maintained as a batch job, and
//! a hedged search that races three query strategies.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌───────────────────┐
//! │ Manifests  │──▶│ Index writer │──▶│      SQLite       │
//! │  (JSON)    │   │  (upsert)    │   │ documents + FTS5  │
//! └────────────┘   └──────────────┘   └─────────┬─────────┘
//!                                               │
//!                          ┌────────────────────┤
//!                          ▼                    ▼
//!                   ┌─────────────┐     ┌──────────────┐
//!                   │ Maintenance │     │ Hedged search│
//!                   │ recompute,  │     │ popular/deep/│
//!                   │ prune       │     │ estimate     │
//!                   └─────────────┘     └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! pkgidx init                         # create database
//! pkgidx ingest ./manifests           # upsert module manifests
//! pkgidx recompute                    # refresh imported-by counts
//! pkgidx search "http router"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite implementation of the index store |
//! | [`ingest`] | Manifest ingestion |
//! | [`maintain`] | Recompute, prune and pending commands |
//! | [`search`] | Search command |
//! | [`get`] | Single document lookup |
//!
//! Tokenization, HLL primitives, scoring and the coordinator live in
//! [`pkgindex_core`].

pub mod config;
pub mod db;
pub mod get;
pub mod ingest;
pub mod maintain;
pub mod migrate;
pub mod search;
pub mod sqlite_store;

pub use pkgindex_core as core;
