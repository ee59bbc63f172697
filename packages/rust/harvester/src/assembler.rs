//! Composite assembly: merging fragments and minting record identifiers.
//!
//! The assembler keeps the primary fragment's root and embeds each optional
//! fragment as a wrapped child node in stage order, so repeated runs against
//! identical inputs produce byte-identical output. The record's local
//! identifier comes from a per-provider strategy; minting a globally unique
//! id from it is delegated to a [`Minter`], an external collaborator invoked
//! once per assembled record.

use std::sync::Arc;

use regex::Regex;
use sha2::{Digest, Sha256};

use gatherer_shared::{HarvestError, OriginalRecord, RecordId, Result, StageRole};

use crate::fragment::Fragment;
use crate::pipeline::CompositeRecord;

/// Wrapper node used for fragments whose stage declares no name of its own.
const DEFAULT_WRAPPER: &str = "extension";

// ---------------------------------------------------------------------------
// Identifier strategies
// ---------------------------------------------------------------------------

/// How a provider's local record identifier is derived, selected per
/// provider at harvester construction.
#[derive(Debug, Clone)]
pub enum IdentifierStrategy {
    /// The source identifier is already the local id.
    FromSource,
    /// Fixed field path in the primary fragment.
    FieldPath(String),
    /// First of several candidate fields in the primary fragment whose value
    /// matches a pattern.
    FirstMatching { fields: Vec<String>, pattern: Regex },
    /// First capture group of a pattern applied to the record's URI-shaped
    /// source identifier.
    UriPattern(Regex),
}

impl IdentifierStrategy {
    /// Derive the local identifier, or nothing if the strategy finds no
    /// usable value.
    pub fn derive(&self, source: &RecordId, primary: &Fragment) -> Option<String> {
        match self {
            Self::FromSource => Some(source.as_str().to_string()),
            Self::FieldPath(path) => primary.text_at(path),
            Self::FirstMatching { fields, pattern } => fields
                .iter()
                .flat_map(|f| primary.texts_at(f))
                .find(|v| pattern.is_match(v)),
            Self::UriPattern(pattern) => pattern
                .captures(source.as_str())
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Minting
// ---------------------------------------------------------------------------

/// Mints a globally unique identifier from a harvest-local one. Invoked once
/// per assembled record; the real minting service sits outside this core.
pub trait Minter: Send + Sync {
    fn mint(&self, harvest_name: &str, local_id: &str) -> String;
}

/// Default minter: a stable digest of the harvest name and local identifier
/// under a base URI.
#[derive(Debug, Clone)]
pub struct DigestMinter {
    base: String,
}

impl DigestMinter {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }
}

impl Minter for DigestMinter {
    fn mint(&self, harvest_name: &str, local_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(harvest_name.as_bytes());
        hasher.update(b"/");
        hasher.update(local_id.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        format!(
            "{}/{harvest_name}/{}",
            self.base.trim_end_matches('/'),
            &digest[..32]
        )
    }
}

// ---------------------------------------------------------------------------
// Assembler
// ---------------------------------------------------------------------------

/// Turns a [`CompositeRecord`] into an immutable [`OriginalRecord`].
pub struct Assembler {
    harvest_name: String,
    strategy: IdentifierStrategy,
    minter: Arc<dyn Minter>,
}

impl Assembler {
    pub fn new(
        harvest_name: impl Into<String>,
        strategy: IdentifierStrategy,
        minter: Arc<dyn Minter>,
    ) -> Self {
        Self {
            harvest_name: harvest_name.into(),
            strategy,
            minter,
        }
    }

    /// Merge the record's fragments and mint its identifier.
    ///
    /// Returns [`HarvestError::MissingIdentifier`] when the configured
    /// strategy derives nothing — a per-record failure the caller logs and
    /// skips, never one that aborts a batch.
    pub fn assemble(&self, record: CompositeRecord) -> Result<OriginalRecord> {
        let primary = record
            .primary()
            .ok_or_else(|| HarvestError::parse("record has no primary fragment"))?;

        let local_id = self
            .strategy
            .derive(&record.id, primary)
            .ok_or_else(|| HarvestError::MissingIdentifier {
                identifier: record.id.as_str().to_string(),
            })?;

        let mut merged = primary.clone();
        for staged in &record.fragments {
            if staged.role == StageRole::Primary {
                continue;
            }
            let wrapper = staged.wrapper.as_deref().unwrap_or(DEFAULT_WRAPPER);
            merged.attach(wrapper, &staged.fragment)?;
        }

        Ok(OriginalRecord {
            id: self.minter.mint(&self.harvest_name, &local_id),
            content: merged.serialize()?,
            content_type: merged.format().content_type(),
        })
    }
}
