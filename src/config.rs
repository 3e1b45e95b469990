//! TOML configuration for the `pkgidx` binary.
//!
//! Only `[db] path` is required; every other field has a default.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pkgindex_core::{ScoreWeights, SearchParams};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub scoring: ScoreWeights,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_popular_limit")]
    pub popular_limit: usize,
    #[serde(default = "default_estimate_delay_ms")]
    pub estimate_delay_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            popular_limit: default_popular_limit(),
            estimate_delay_ms: default_estimate_delay_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_page_size() -> usize {
    10
}
fn default_popular_limit() -> usize {
    100
}
fn default_estimate_delay_ms() -> u64 {
    100
}
fn default_timeout_ms() -> u64 {
    5000
}

impl Config {
    /// Coordinator parameters built from `[search]` and `[scoring]`.
    pub fn search_params(&self) -> SearchParams {
        SearchParams {
            page_size: self.search.page_size,
            popular_limit: self.search.popular_limit,
            estimate_delay: Duration::from_millis(self.search.estimate_delay_ms),
            timeout: Duration::from_millis(self.search.timeout_ms),
            weights: self.scoring,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate search
    if config.search.page_size == 0 {
        anyhow::bail!("search.page_size must be > 0");
    }
    if config.search.popular_limit == 0 {
        anyhow::bail!("search.popular_limit must be > 0");
    }
    if config.search.timeout_ms == 0 {
        anyhow::bail!("search.timeout_ms must be > 0");
    }
    if config.search.estimate_delay_ms >= config.search.timeout_ms {
        anyhow::bail!(
            "search.estimate_delay_ms ({}) must be below search.timeout_ms ({})",
            config.search.estimate_delay_ms,
            config.search.timeout_ms
        );
    }

    // Validate scoring
    config
        .scoring
        .validate()
        .with_context(|| "Invalid [scoring] section")?;

    Ok(config)
}
