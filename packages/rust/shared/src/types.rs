//! Core domain types for Gatherer harvests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for harvest session identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Generate a new time-sortable session identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// RecordId
// ---------------------------------------------------------------------------

/// The provider's own identifier for one record, unique within a harvest
/// session. Opaque: depending on the provider it may be a bare token
/// (`"7441504"`) or a full URI extracted from a manifest document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// Stage roles and content formats
// ---------------------------------------------------------------------------

/// The role a fetched fragment plays inside a composite record, in stage
/// order. `Primary` is required; later roles are optional sections embedded
/// into the primary document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StageRole {
    Primary,
    Secondary,
    Tertiary,
    Quaternary,
}

impl StageRole {
    /// Role for the zero-based stage index.
    pub fn for_stage(index: usize) -> Self {
        match index {
            0 => Self::Primary,
            1 => Self::Secondary,
            2 => Self::Tertiary,
            _ => Self::Quaternary,
        }
    }
}

impl std::fmt::Display for StageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
            Self::Tertiary => "tertiary",
            Self::Quaternary => "quaternary",
        };
        write!(f, "{name}")
    }
}

/// Serialization format of a provider's documents. The composite record's
/// content type mirrors this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFormat {
    Xml,
    Json,
}

impl ContentFormat {
    /// MIME type for output records in this format.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Xml => "text/xml",
            Self::Json => "application/json",
        }
    }
}

// ---------------------------------------------------------------------------
// OriginalRecord
// ---------------------------------------------------------------------------

/// One assembled record, ready for the downstream ingestion pipeline.
/// Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalRecord {
    /// Globally unique minted identifier.
    pub id: String,
    /// The primary fragment's native serialization, with any optional
    /// fragments embedded as extension nodes.
    pub content: String,
    /// MIME type mirroring the source format.
    pub content_type: &'static str,
}

// ---------------------------------------------------------------------------
// HarvestReport
// ---------------------------------------------------------------------------

/// Summary of a completed (or in-progress) harvest run.
///
/// A run that hit per-record failures still completes normally; the report is
/// what distinguishes "finished with drops" from a crash.
#[derive(Debug, Clone)]
pub struct HarvestReport {
    /// Session identifier for this run.
    pub session: SessionId,
    /// Harvest name (provider-qualified).
    pub name: String,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished; `None` while still in progress.
    pub finished_at: Option<DateTime<Utc>>,
    /// Records successfully assembled and emitted.
    pub emitted: usize,
    /// Records dropped by per-record failures.
    pub dropped: usize,
    /// Per-record failures (identifier, cause).
    pub errors: Vec<(String, String)>,
}

impl HarvestReport {
    /// Start an empty report for the named harvest.
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            session: SessionId::new(),
            name: name.into(),
            started_at: Utc::now(),
            finished_at: None,
            emitted: 0,
            dropped: 0,
            errors: Vec::new(),
        }
    }

    /// Mark the run finished. Idempotent; the first call wins.
    pub fn finish(&mut self) {
        if self.finished_at.is_none() {
            self.finished_at = Some(Utc::now());
        }
    }

    /// Wall-clock duration of the run: final once [`finish`](Self::finish)
    /// has been called, running time until then.
    pub fn duration(&self) -> std::time::Duration {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - self.started_at).to_std().unwrap_or_default()
    }
}
