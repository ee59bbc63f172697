//! Static identifier-list source.
//!
//! Some providers cannot page through their full result set server-side
//! (offset caps in the search API), so the harvest is driven by a locally
//! supplied file of record identifiers instead: plain text, one identifier
//! per line. A trailing comma per line is tolerated because such lists tend
//! to arrive as spreadsheet exports that carry one.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use gatherer_shared::{HarvestError, RecordId, Result};

/// An in-memory identifier list read from a file or reader.
#[derive(Debug, Clone)]
pub struct IdList {
    ids: Vec<RecordId>,
}

impl IdList {
    /// Read an identifier list from a file. An unreadable file is a
    /// construction-time failure, before any fetching begins.
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| HarvestError::io(path, e))?;
        Self::from_reader(file).map_err(|e| match e {
            HarvestError::Io { source, .. } => HarvestError::io(path, source),
            other => other,
        })
    }

    /// Read an identifier list from any reader (tests, console usage).
    pub fn from_reader(reader: impl Read) -> Result<Self> {
        let mut ids = Vec::new();
        for line in BufReader::new(reader).lines() {
            let line = line.map_err(|e| HarvestError::io("<reader>", e))?;
            let id = line.trim().trim_end_matches(',');
            if !id.is_empty() {
                ids.push(RecordId::new(id));
            }
        }
        Ok(Self { ids })
    }

    /// Number of identifiers in the list. This stands in for a provider
    /// total when the provider cannot report a reliable one.
    pub fn count(&self) -> usize {
        self.ids.len()
    }

    /// The identifiers, in file order.
    pub fn ids(&self) -> &[RecordId] {
        &self.ids
    }

    /// Consume the list, yielding the identifiers in file order.
    pub fn into_ids(self) -> Vec<RecordId> {
        self.ids
    }
}
