//! # pkgindex CLI (`pkgidx`)
//!
//! The `pkgidx` binary maintains a package search index in SQLite and
//! serves hedged searches over it.
//!
//! ## Usage
//!
//! ```bash
//! pkgidx --config ./config/pkgidx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pkgidx init` | Create the SQLite database and run schema migrations |
//! | `pkgidx ingest <path>` | Upsert a module manifest or a directory of manifests |
//! | `pkgidx recompute` | Recompute imported-by counts |
//! | `pkgidx prune <module> <version>` | Delete a module's documents older than a version |
//! | `pkgidx pending` | List documents due for re-indexing |
//! | `pkgidx show <package>` | Print one search document |
//! | `pkgidx search "<term>"` | Search the index |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use pkgindex::{config, get, ingest, maintain, migrate, search};

/// pkgindex CLI: a package search index with popularity-aware ranking.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file.
#[derive(Parser)]
#[command(
    name = "pkgidx",
    about = "Package search index with hedged search",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/pkgidx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file, the search_documents and imports
    /// tables and the FTS5 index. Safe to run repeatedly.
    Init,

    /// Upsert module manifests.
    ///
    /// Accepts one JSON manifest or a directory searched recursively for
    /// `*.json` files. Older versions never overwrite newer ones.
    Ingest {
        /// Manifest file or directory.
        path: PathBuf,
    },

    /// Recompute imported-by counts from the indexed versions' imports.
    Recompute,

    /// Delete documents of a module whose version is older than the given one.
    Prune {
        /// Module path, e.g. `github.com/user/repo`.
        module: String,
        /// Version to keep (`vMAJOR.MINOR.PATCH`).
        keep_version: String,
    },

    /// List non-internal documents last updated before a timestamp.
    Pending {
        /// RFC 3339 timestamp; defaults to now.
        #[arg(long)]
        before: Option<String>,

        /// Maximum number of documents to list.
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },

    /// Print the search document for a package path.
    Show {
        /// Package path.
        package: String,
    },

    /// Search the index.
    Search {
        /// The search term.
        term: String,

        /// Page size (defaults to `search.page_size`).
        #[arg(long)]
        limit: Option<i64>,

        /// Number of results to skip.
        #[arg(long)]
        offset: Option<i64>,

        /// Print the page as JSON.
        #[arg(long)]
        json: bool,

        /// Write the response counters to stderr in Prometheus text format.
        #[arg(long)]
        metrics: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { path } => {
            ingest::run_ingest(&cfg, &path).await?;
        }
        Commands::Recompute => {
            maintain::run_recompute(&cfg).await?;
        }
        Commands::Prune {
            module,
            keep_version,
        } => {
            maintain::run_prune(&cfg, &module, &keep_version).await?;
        }
        Commands::Pending { before, limit } => {
            maintain::run_pending(&cfg, before.as_deref(), limit).await?;
        }
        Commands::Show { package } => {
            get::run_show(&cfg, &package).await?;
        }
        Commands::Search {
            term,
            limit,
            offset,
            json,
            metrics,
        } => {
            search::run_search(&cfg, &term, limit, offset, json, metrics).await?;
        }
    }

    Ok(())
}
