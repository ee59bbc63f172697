//! Cursor-paged catalog profile.
//!
//! The catalog API pages with a cursor token over XML. Each page entry is a
//! capture carrying a uuid; the record itself is the capture descriptor,
//! and its full catalog record is fetched from a reference field inside the
//! descriptor and embedded as an extension node.

use gatherer_shared::ContentFormat;

use crate::assembler::IdentifierStrategy;
use crate::pagination::{IdRule, PageSpec, PaginationPolicy};
use crate::pipeline::{StagePlan, StageSource, UriExtraction, UriTemplate};

use super::ProviderProfile;

/// Build the profile. `api_base` is the catalog API root.
pub fn paged_catalog_profile(api_base: &str) -> ProviderProfile {
    let base = api_base.trim_end_matches('/');
    ProviderProfile {
        name: "paged-catalog".into(),
        format: ContentFormat::Xml,
        page: Some(PageSpec {
            format: ContentFormat::Xml,
            entries_path: "response/capture".into(),
            id_rule: IdRule::Field("uuid".into()),
            total_path: Some("response/numResults".into()),
            policy: PaginationPolicy::Cursor {
                param: "page_token".into(),
                token_path: "request/next_token".into(),
            },
        }),
        stages: vec![
            StagePlan::primary(UriTemplate::new(format!("{base}/items/{{id}}.xml"))),
            StagePlan::optional(
                StageSource::Derived(UriExtraction::FieldPath("apiUri".into())),
                "extension",
            ),
        ],
        identifier: IdentifierStrategy::FieldPath("uuid".into()),
        default_concurrency: 10,
    }
}
