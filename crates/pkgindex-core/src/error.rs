//! Error types for the pkgindex core.
//!
//! Search callers match on these variants: `NotFound` is informational,
//! `Timeout` and `Cancelled` come from the coordinator, `Storage` wraps any
//! failure of the backing store together with the operation that failed.
//! Storage errors are not logged when built; see [`IndexError::logged`].

use std::time::Duration;

/// Errors produced by index maintenance and search.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// No document exists at the requested path.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed package path, version, search term or parameter.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The shared search deadline elapsed before any strategy completed.
    #[error("search timed out after {0:?}")]
    Timeout(Duration),

    /// The underlying store failed a read or write.
    #[error("storage failure during {context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The caller aborted the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// A metrics collector could not be registered or encoded.
    #[error("metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl IndexError {
    /// Wrap a backend error with the operation that failed.
    pub fn storage<E>(context: impl Into<String>, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        IndexError::Storage {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Log a storage failure at `error` and hand it back.
    ///
    /// Called where an error leaves the index for good: writer operations
    /// and the strategy a search accepted.
    pub fn logged(self) -> Self {
        if let IndexError::Storage { context, source } = &self {
            tracing::error!(%context, error = %source, "storage failure");
        }
        self
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        IndexError::InvalidInput(msg.into())
    }
}

/// Convenience alias for core results.
pub type Result<T> = std::result::Result<T, IndexError>;
