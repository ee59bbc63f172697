//! The per-record fetch pipeline and its batch scheduling.
//!
//! Each record is built through one or more dependent fetch stages. Stage 1
//! applies the provider's URI template to the record identifier; later stages
//! either apply further templates or derive their target URIs from the
//! previous stage's parsed fragment. Across one batch, every stage's requests
//! are dispatched as concurrent tasks and joined together before the next
//! stage begins, so at most one batch's worth of requests is ever in flight.
//! The join barrier between stages is the only synchronization point; no
//! state is shared across concurrent fetches.
//!
//! Per record the state machine is: pending → stage 1 ok → stage 2 ok (…) →
//! assembled, or dropped(reason) at any required stage. Records dropped at a
//! stage are filtered out before the next stage begins, so no downstream
//! requests are wasted on them. A failure on an optional stage leaves a gap
//! in the composite instead of dropping the record.

use regex::Regex;
use tracing::{error, warn};
use url::Url;

use gatherer_shared::{ContentFormat, HarvestError, RecordId, Result, StageRole};

use crate::client::{FetchRequest, HttpClient};
use crate::fragment::Fragment;

// ---------------------------------------------------------------------------
// Stage descriptions
// ---------------------------------------------------------------------------

/// A URI template with `{id}` placeholders, applied to a record identifier.
/// Identifiers that are already full URIs use the bare `{id}` template.
#[derive(Debug, Clone)]
pub struct UriTemplate(String);

impl UriTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    /// Substitute the identifier into every placeholder and parse the result.
    pub fn apply(&self, id: &RecordId) -> Result<Url> {
        let uri = self.0.replace("{id}", id.as_str());
        Url::parse(&uri).map_err(|e| HarvestError::fetch(uri, format!("invalid URI: {e}")))
    }
}

/// How a later stage derives its target URIs from an earlier fragment.
#[derive(Debug, Clone)]
pub enum UriExtraction {
    /// Every URI found at a fixed field path (zero or more).
    FieldPath(String),
    /// The first value among several candidate fields that matches a
    /// pattern; no match means no request for this stage.
    FirstMatching { fields: Vec<String>, pattern: Regex },
}

impl UriExtraction {
    fn extract(&self, fragment: &Fragment) -> Vec<Url> {
        let candidates: Vec<String> = match self {
            Self::FieldPath(path) => fragment.texts_at(path),
            Self::FirstMatching { fields, pattern } => fields
                .iter()
                .flat_map(|f| fragment.texts_at(f))
                .find(|v| pattern.is_match(v))
                .into_iter()
                .collect(),
        };
        candidates
            .iter()
            .filter_map(|c| Url::parse(c).ok())
            .collect()
    }
}

/// Where one stage's requests come from.
#[derive(Debug, Clone)]
pub enum StageSource {
    /// Built from the record identifier.
    Template(UriTemplate),
    /// Derived from the most recent fetched fragment.
    Derived(UriExtraction),
}

/// One fetch stage in a provider's chain.
#[derive(Debug, Clone)]
pub struct StagePlan {
    /// Where this stage's request URIs come from.
    pub source: StageSource,
    /// A failed required stage drops the record; a failed optional stage
    /// only leaves its section out of the composite.
    pub required: bool,
    /// Wrapper node name under which the assembler embeds this stage's
    /// fragments into the primary document. Not used for the primary stage.
    pub attach_as: Option<String>,
}

impl StagePlan {
    /// Required primary stage from a URI template.
    pub fn primary(template: UriTemplate) -> Self {
        Self {
            source: StageSource::Template(template),
            required: true,
            attach_as: None,
        }
    }

    /// Optional follow-up stage embedded under the given wrapper node.
    pub fn optional(source: StageSource, attach_as: impl Into<String>) -> Self {
        Self {
            source,
            required: false,
            attach_as: Some(attach_as.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline output
// ---------------------------------------------------------------------------

/// One fetched fragment with its place in the composite.
#[derive(Debug, Clone)]
pub struct StagedFragment {
    pub role: StageRole,
    /// Wrapper node name for embedding; `None` for the primary fragment.
    pub wrapper: Option<String>,
    pub fragment: Fragment,
}

/// All fragments fetched for one record identifier, in stage order.
/// Maps 1:1 to its [`RecordId`].
#[derive(Debug, Clone)]
pub struct CompositeRecord {
    pub id: RecordId,
    pub fragments: Vec<StagedFragment>,
}

impl CompositeRecord {
    /// The required primary fragment.
    pub fn primary(&self) -> Option<&Fragment> {
        self.fragments
            .iter()
            .find(|f| f.role == StageRole::Primary)
            .map(|f| &f.fragment)
    }
}

/// What one batch produced: completed composites plus per-record drops.
/// Drops never abort the batch.
#[derive(Debug)]
pub struct BatchOutcome {
    /// Composite records that completed every required stage, in input order.
    pub records: Vec<CompositeRecord>,
    /// Records dropped by a required-stage failure (identifier, cause).
    pub errors: Vec<(RecordId, HarvestError)>,
}

// ---------------------------------------------------------------------------
// FetchPipeline
// ---------------------------------------------------------------------------

/// Runs a provider's stage chain for batches of record identifiers.
pub struct FetchPipeline {
    client: HttpClient,
    format: ContentFormat,
    stages: Vec<StagePlan>,
    headers: Vec<(String, String)>,
}

/// In-flight state for one record within a batch. `None` in the batch's
/// build list marks a dropped record.
struct RecordBuild {
    id: RecordId,
    fragments: Vec<StagedFragment>,
}

impl FetchPipeline {
    pub fn new(
        client: HttpClient,
        format: ContentFormat,
        stages: Vec<StagePlan>,
        headers: Vec<(String, String)>,
    ) -> Self {
        Self {
            client,
            format,
            stages,
            headers,
        }
    }

    /// Run the whole stage chain for one batch of identifiers.
    ///
    /// Concurrency is bounded by the batch width: each stage dispatches its
    /// requests as concurrent tasks and joins all of them before the next
    /// stage begins.
    pub async fn run_batch(&self, ids: &[RecordId]) -> BatchOutcome {
        let mut builds: Vec<Option<RecordBuild>> = ids
            .iter()
            .map(|id| {
                Some(RecordBuild {
                    id: id.clone(),
                    fragments: Vec::new(),
                })
            })
            .collect();
        let mut errors: Vec<(RecordId, HarvestError)> = Vec::new();

        for (stage_index, plan) in self.stages.iter().enumerate() {
            let role = StageRole::for_stage(stage_index);
            self.run_stage(plan, role, &mut builds, &mut errors).await;
        }

        let records = builds
            .into_iter()
            .flatten()
            .map(|b| CompositeRecord {
                id: b.id,
                fragments: b.fragments,
            })
            .collect();

        BatchOutcome { records, errors }
    }

    /// Convenience for spot fetches: run the chain for exactly one
    /// identifier.
    pub async fn run_one(&self, id: &RecordId) -> Result<CompositeRecord> {
        let mut outcome = self.run_batch(std::slice::from_ref(id)).await;
        match outcome.records.pop() {
            Some(record) => Ok(record),
            None => Err(outcome
                .errors
                .pop()
                .map(|(_, e)| e)
                .unwrap_or_else(|| HarvestError::fetch(id.as_str(), "record produced nothing"))),
        }
    }

    /// Dispatch and join one stage's requests across the whole batch.
    async fn run_stage(
        &self,
        plan: &StagePlan,
        role: StageRole,
        builds: &mut [Option<RecordBuild>],
        errors: &mut Vec<(RecordId, HarvestError)>,
    ) {
        // Work out every request this stage needs, across all live records.
        let mut requests: Vec<(usize, FetchRequest)> = Vec::new();
        for (index, slot) in builds.iter_mut().enumerate() {
            let Some(build) = slot else { continue };

            let uris = match &plan.source {
                StageSource::Template(template) => match template.apply(&build.id) {
                    Ok(uri) => vec![uri],
                    Err(e) => {
                        if plan.required {
                            error!(identifier = %build.id, error = %e, "record dropped");
                            errors.push((build.id.clone(), e));
                            *slot = None;
                        }
                        continue;
                    }
                },
                StageSource::Derived(extraction) => match build.fragments.last() {
                    Some(staged) => extraction.extract(&staged.fragment),
                    None => Vec::new(),
                },
            };

            if uris.is_empty() && plan.required {
                let e = HarvestError::fetch(build.id.as_str(), "no URI derived for required stage");
                error!(identifier = %build.id, error = %e, "record dropped");
                errors.push((build.id.clone(), e));
                *slot = None;
                continue;
            }

            for uri in uris {
                requests.push((index, FetchRequest::with_headers(uri, &self.headers)));
            }
        }

        // Dispatch the stage concurrently, then join every task before the
        // next stage begins.
        let mut handles = Vec::with_capacity(requests.len());
        for (index, request) in requests {
            let client = self.client.clone();
            let uri = request.uri.clone();
            handles.push((
                index,
                uri,
                tokio::spawn(async move { client.fetch_ok(&request).await }),
            ));
        }

        for (index, uri, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(HarvestError::fetch(uri.as_str(), format!("task failed: {e}"))),
            };

            // A record may already have been dropped by an earlier fetch of
            // this same stage.
            let Some(slot) = builds.get_mut(index) else {
                continue;
            };
            let Some(build) = slot.as_mut() else { continue };

            // Parse failures are handled exactly like fetch failures for
            // this stage.
            let fragment = result.and_then(|r| Fragment::parse(&r.body, self.format));
            match fragment {
                Ok(fragment) => build.fragments.push(StagedFragment {
                    role,
                    wrapper: plan.attach_as.clone(),
                    fragment,
                }),
                Err(e) => {
                    if plan.required {
                        error!(identifier = %build.id, stage = %role, error = %e, "record dropped");
                        errors.push((build.id.clone(), e));
                        *slot = None;
                    } else {
                        warn!(identifier = %build.id, stage = %role, error = %e, "optional stage missing");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatherer_shared::HttpConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> HttpClient {
        HttpClient::new(&HttpConfig::default()).unwrap()
    }

    fn ids(names: &[&str]) -> Vec<RecordId> {
        names.iter().map(|n| RecordId::new(*n)).collect()
    }

    async fn mount_meta(server: &MockServer, id: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/download/{id}/{id}_meta.xml")))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                "<metadata><identifier>{id}</identifier><title>t</title></metadata>"
            )))
            .mount(server)
            .await;
    }

    async fn mount_files(server: &MockServer, id: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/download/{id}/{id}_files.xml")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(format!("<files><file name=\"{id}.pdf\"/></files>")),
            )
            .mount(server)
            .await;
    }

    fn two_stage_plan(base: &str) -> Vec<StagePlan> {
        vec![
            StagePlan::primary(UriTemplate::new(format!(
                "{base}/download/{{id}}/{{id}}_meta.xml"
            ))),
            StagePlan::optional(
                StageSource::Template(UriTemplate::new(format!(
                    "{base}/download/{{id}}/{{id}}_files.xml"
                ))),
                "files",
            ),
        ]
    }

    #[test]
    fn template_substitutes_every_placeholder() {
        let template = UriTemplate::new("http://a.org/download/{id}/{id}_meta.xml");
        let uri = template.apply(&RecordId::new("id1")).unwrap();
        assert_eq!(uri.as_str(), "http://a.org/download/id1/id1_meta.xml");

        // Identifiers that are already URIs pass through a bare template.
        let bare = UriTemplate::new("{id}");
        let uri = bare
            .apply(&RecordId::new("http://a.org/objects/lib:99/mods"))
            .unwrap();
        assert_eq!(uri.as_str(), "http://a.org/objects/lib:99/mods");
    }

    #[tokio::test]
    async fn one_failed_required_stage_drops_only_that_record() {
        let server = MockServer::start().await;
        for id in ["id1", "id2", "id3"] {
            mount_meta(&server, id).await;
            mount_files(&server, id).await;
        }
        // id4's primary fetch blows up.
        Mock::given(method("GET"))
            .and(path("/download/id4/id4_meta.xml"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        // Dropped records must not reach stage 2.
        Mock::given(method("GET"))
            .and(path("/download/id4/id4_files.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<files/>"))
            .expect(0)
            .mount(&server)
            .await;

        let pipeline = FetchPipeline::new(
            client(),
            ContentFormat::Xml,
            two_stage_plan(&server.uri()),
            vec![],
        );
        let outcome = pipeline
            .run_batch(&ids(&["id1", "id2", "id3", "id4"]))
            .await;

        assert_eq!(outcome.records.len(), 3);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].0, RecordId::new("id4"));
        assert!(outcome.errors[0].1.to_string().contains("HTTP 500"));
    }

    #[tokio::test]
    async fn missing_optional_stage_leaves_a_gap_not_a_drop() {
        let server = MockServer::start().await;
        for id in ["id1", "id2", "id3", "id4"] {
            mount_meta(&server, id).await;
        }
        for id in ["id1", "id2", "id3"] {
            mount_files(&server, id).await;
        }
        Mock::given(method("GET"))
            .and(path("/download/id4/id4_files.xml"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let pipeline = FetchPipeline::new(
            client(),
            ContentFormat::Xml,
            two_stage_plan(&server.uri()),
            vec![],
        );
        let outcome = pipeline
            .run_batch(&ids(&["id1", "id2", "id3", "id4"]))
            .await;

        assert_eq!(outcome.records.len(), 4);
        assert!(outcome.errors.is_empty());

        let with_files = outcome
            .records
            .iter()
            .filter(|r| r.fragments.iter().any(|f| f.role == StageRole::Secondary))
            .count();
        assert_eq!(with_files, 3);

        let id4 = outcome
            .records
            .iter()
            .find(|r| r.id == RecordId::new("id4"))
            .unwrap();
        assert_eq!(id4.fragments.len(), 1);
        assert!(id4.primary().is_some());
    }

    #[tokio::test]
    async fn derived_stage_follows_reference_from_primary() {
        let server = MockServer::start().await;
        let item_url = format!("{}/mods/cap7", server.uri());
        Mock::given(method("GET"))
            .and(path("/capture/cap7"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                r#"{{"uuid":"cap7","apiUri":"{item_url}"}}"#
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/mods/cap7"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"titleInfo":"x"}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let stages = vec![
            StagePlan::primary(UriTemplate::new(format!(
                "{}/capture/{{id}}",
                server.uri()
            ))),
            StagePlan::optional(
                StageSource::Derived(UriExtraction::FieldPath("apiUri".into())),
                "extension",
            ),
        ];
        let pipeline = FetchPipeline::new(client(), ContentFormat::Json, stages, vec![]);
        let record = pipeline.run_one(&RecordId::new("cap7")).await.unwrap();

        assert_eq!(record.fragments.len(), 2);
        assert_eq!(record.fragments[1].role, StageRole::Secondary);
        assert_eq!(record.fragments[1].wrapper.as_deref(), Some("extension"));
    }

    #[tokio::test]
    async fn candidate_extraction_takes_first_pattern_hit() {
        let primary = Fragment::parse(
            r#"{"refs":["http://x.org/search/?q=1","http://x.org/files/f1.xml"],
                "alt":"http://x.org/files/f2.xml"}"#,
            ContentFormat::Json,
        )
        .unwrap();

        let extraction = UriExtraction::FirstMatching {
            fields: vec!["refs".into(), "alt".into()],
            pattern: Regex::new(r"/files/").unwrap(),
        };
        let uris = extraction.extract(&primary);
        assert_eq!(uris.len(), 1);
        assert_eq!(uris[0].as_str(), "http://x.org/files/f1.xml");
    }

    #[tokio::test]
    async fn run_one_surfaces_the_drop_cause() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/download/gone/gone_meta.xml"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let pipeline = FetchPipeline::new(
            client(),
            ContentFormat::Xml,
            two_stage_plan(&server.uri()),
            vec![],
        );
        let err = pipeline.run_one(&RecordId::new("gone")).await.unwrap_err();
        assert!(matches!(err, HarvestError::Fetch { .. }));
    }
}
