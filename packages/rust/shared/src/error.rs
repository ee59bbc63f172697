//! Error types for Gatherer.
//!
//! Library crates use [`HarvestError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! The taxonomy mirrors how failures propagate: `Fetch`, `Parse`, and
//! `MissingIdentifier` are per-record (logged, record dropped, harvest
//! continues); `Pagination` is fatal for one collection's traversal only;
//! `Config` and `Io` are raised at construction time and abort startup.

use std::path::PathBuf;

/// Top-level error type for all Gatherer operations.
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    /// Configuration loading or validation error. Fatal at construction.
    #[error("config error: {message}")]
    Config { message: String },

    /// Non-2xx status or transport failure on a record fetch stage.
    #[error("fetch error for {uri}: {message}")]
    Fetch { uri: String, message: String },

    /// Malformed response body (XML/JSON parse failure).
    #[error("parse error: {message}")]
    Parse { message: String },

    /// The assembler could not derive an identifier from a primary fragment.
    #[error("no identifier could be derived for record {identifier}")]
    MissingIdentifier { identifier: String },

    /// A page request failed while walking a collection's pagination.
    #[error("pagination error for collection {collection}: {message}")]
    Pagination { collection: String, message: String },

    /// Filesystem I/O error (identifier-list file, config file).
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, HarvestError>;

impl HarvestError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a fetch error tagged with the request URI.
    pub fn fetch(uri: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Fetch {
            uri: uri.into(),
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a pagination error tagged with the collection root.
    pub fn pagination(collection: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Pagination {
            collection: collection.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error drops a single record rather than a whole
    /// collection or the harvest itself.
    pub fn is_per_record(&self) -> bool {
        matches!(
            self,
            Self::Fetch { .. } | Self::Parse { .. } | Self::MissingIdentifier { .. }
        )
    }
}
