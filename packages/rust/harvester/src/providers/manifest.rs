//! Collection-manifest profile.
//!
//! Each root URI is a single unpaginated manifest document whose descriptive
//! sections reference the per-record metadata files by URL. The extracted
//! references serve directly as record identifiers, fetched through the bare
//! `{id}` template; the local identifier is a capture from the reference URI
//! itself.

use regex::Regex;

use gatherer_shared::ContentFormat;

use crate::assembler::IdentifierStrategy;
use crate::pagination::{IdRule, PageSpec, PaginationPolicy};
use crate::pipeline::{StagePlan, UriTemplate};

use super::ProviderProfile;

/// Build the profile. `id_pattern` captures the local identifier from each
/// record URI (first capture group).
pub fn manifest_profile(id_pattern: Regex) -> ProviderProfile {
    ProviderProfile {
        name: "manifest".into(),
        format: ContentFormat::Xml,
        page: Some(PageSpec {
            format: ContentFormat::Xml,
            entries_path: "dmdSec".into(),
            id_rule: IdRule::Field("mdRef/@href".into()),
            total_path: None,
            policy: PaginationPolicy::Single,
        }),
        stages: vec![StagePlan::primary(UriTemplate::new("{id}"))],
        identifier: IdentifierStrategy::UriPattern(id_pattern),
        default_concurrency: 10,
    }
}
