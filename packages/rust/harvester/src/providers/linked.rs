//! Next-link search profile.
//!
//! The search API embeds a full URL for the next page in each response.
//! Page entries carry their item reference under several candidate fields
//! (`aka`, `id`, `url`) of which only the one matching the item-page pattern
//! is usable; the identifier source takes the first hit. Records are single
//! JSON fetches of the item URI, and the local identifier is read from a
//! field of the item document.

use regex::Regex;

use gatherer_shared::ContentFormat;

use crate::assembler::IdentifierStrategy;
use crate::pagination::{IdRule, PageSpec, PaginationPolicy};
use crate::pipeline::{StagePlan, UriTemplate};

use super::ProviderProfile;

/// Build the profile. `item_pattern` selects usable item references among
/// the candidate fields; `id_field` is the path of the local identifier in
/// the fetched item document.
pub fn linked_search_profile(item_pattern: Regex, id_field: &str) -> ProviderProfile {
    ProviderProfile {
        name: "linked-search".into(),
        format: ContentFormat::Json,
        page: Some(PageSpec {
            format: ContentFormat::Json,
            entries_path: "results".into(),
            id_rule: IdRule::FirstMatching {
                fields: vec!["aka".into(), "id".into(), "url".into()],
                pattern: item_pattern,
            },
            total_path: Some("pagination/of".into()),
            policy: PaginationPolicy::NextLink {
                link_path: "pagination/next".into(),
            },
        }),
        // Identifiers are already item URIs.
        stages: vec![StagePlan::primary(UriTemplate::new("{id}?fo=json"))],
        identifier: IdentifierStrategy::FieldPath(id_field.into()),
        default_concurrency: 20,
    }
}
