//! Archive download-chain profile.
//!
//! The search API pages with offset/limit over JSON and reports a total;
//! each identifier then drives three XML fetches against a download host:
//! the item descriptor (required), its file listing, and its catalog record
//! (both optional, embedded into the descriptor when present).

use gatherer_shared::ContentFormat;

use crate::assembler::IdentifierStrategy;
use crate::pagination::{IdRule, PageSpec, PaginationPolicy};
use crate::pipeline::{StagePlan, StageSource, UriTemplate};

use super::ProviderProfile;

/// Build the profile. `download_base` hosts the per-item files;
/// `page_size` is the search page size.
pub fn archive_profile(download_base: &str, page_size: usize) -> ProviderProfile {
    let base = download_base.trim_end_matches('/');
    ProviderProfile {
        name: "archive".into(),
        format: ContentFormat::Xml,
        page: Some(PageSpec {
            format: ContentFormat::Json,
            entries_path: "response/docs".into(),
            id_rule: IdRule::Field("identifier".into()),
            total_path: Some("response/numFound".into()),
            policy: PaginationPolicy::OffsetLimit {
                offset_param: "start".into(),
                limit_param: "rows".into(),
                limit: page_size,
            },
        }),
        stages: vec![
            StagePlan::primary(UriTemplate::new(format!("{base}/{{id}}/{{id}}_meta.xml"))),
            StagePlan::optional(
                StageSource::Template(UriTemplate::new(format!(
                    "{base}/{{id}}/{{id}}_files.xml"
                ))),
                "files",
            ),
            StagePlan::optional(
                StageSource::Template(UriTemplate::new(format!(
                    "{base}/{{id}}/{{id}}_marc.xml"
                ))),
                "marc",
            ),
        ],
        identifier: IdentifierStrategy::FromSource,
        default_concurrency: 10,
    }
}
