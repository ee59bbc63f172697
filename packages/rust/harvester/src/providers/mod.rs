//! Provider profiles: the pluggable per-provider strategy bundle.
//!
//! A [`ProviderProfile`] is plain data — pagination spec, stage chain,
//! identifier strategy — selected when the harvester is constructed, never by
//! runtime type inspection. The built-in constructors cover the harvest
//! shapes seen in the wild: a three-stage archive download chain, a
//! next-link search API with candidate reference fields, a cursor-paged
//! catalog with a derived second stage, and a collection manifest whose
//! entries are themselves record URIs.

mod archive;
mod linked;
mod manifest;
mod paged;

pub use archive::archive_profile;
pub use linked::linked_search_profile;
pub use manifest::manifest_profile;
pub use paged::paged_catalog_profile;

use gatherer_shared::{ContentFormat, HarvestError, Result};

use crate::assembler::IdentifierStrategy;
use crate::pagination::PageSpec;
use crate::pipeline::{StagePlan, StageSource, UriTemplate};

/// Everything provider-specific the harvester needs, bundled at
/// construction time.
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    /// Provider name; becomes the default harvest name and qualifies minted
    /// identifiers.
    pub name: String,
    /// Serialization format of the provider's documents.
    pub format: ContentFormat,
    /// How result pages yield identifiers. `None` for providers driven by a
    /// static identifier list.
    pub page: Option<PageSpec>,
    /// The per-record fetch chain, primary stage first.
    pub stages: Vec<StagePlan>,
    /// How the local record identifier is derived.
    pub identifier: IdentifierStrategy,
    /// Batch width when the harvest options leave it unset.
    pub default_concurrency: usize,
}

impl ProviderProfile {
    /// Single-stage direct-fetch profile with no server-side pagination;
    /// pair it with a static identifier list.
    pub fn direct(
        name: impl Into<String>,
        format: ContentFormat,
        template: impl Into<String>,
        identifier: IdentifierStrategy,
    ) -> Self {
        Self {
            name: name.into(),
            format,
            page: None,
            stages: vec![StagePlan::primary(UriTemplate::new(template))],
            identifier,
            default_concurrency: 10,
        }
    }

    /// Sanity-check the profile shape before any fetching begins.
    pub fn validate(&self) -> Result<()> {
        let Some(first) = self.stages.first() else {
            return Err(HarvestError::config(format!(
                "provider '{}' defines no fetch stages",
                self.name
            )));
        };
        if !first.required {
            return Err(HarvestError::config(format!(
                "provider '{}': the primary stage must be required",
                self.name
            )));
        }
        if !matches!(first.source, StageSource::Template(_)) {
            return Err(HarvestError::config(format!(
                "provider '{}': the primary stage must build its URI from the identifier",
                self.name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::UriExtraction;
    use regex::Regex;

    #[test]
    fn builtin_profiles_validate() {
        archive_profile("http://example.org/download", 10)
            .validate()
            .unwrap();
        linked_search_profile(
            Regex::new(r"example\.org/item/").unwrap(),
            "item/control_number",
        )
        .validate()
        .unwrap();
        paged_catalog_profile("http://example.org/api").validate().unwrap();
        manifest_profile(Regex::new(r"/objects/(.*?)/").unwrap())
            .validate()
            .unwrap();
        ProviderProfile::direct(
            "bulk",
            ContentFormat::Json,
            "http://example.org/records/{id}",
            IdentifierStrategy::FromSource,
        )
        .validate()
        .unwrap();
    }

    #[test]
    fn profiles_without_stages_are_rejected() {
        let mut profile = archive_profile("http://example.org/download", 10);
        profile.stages.clear();
        assert!(profile.validate().is_err());
    }

    #[test]
    fn derived_primary_stage_is_rejected() {
        let mut profile = archive_profile("http://example.org/download", 10);
        profile.stages[0].source =
            StageSource::Derived(UriExtraction::FieldPath("uri".into()));
        assert!(profile.validate().is_err());
    }
}
