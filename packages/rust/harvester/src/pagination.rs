//! Identifier discovery: walking remote pagination.
//!
//! An [`IdentifierSource`] yields a lazy, forward-only sequence of record
//! identifiers, either by walking a provider's pagination (cursor token,
//! offset/limit, next-link URL, or a single unpaginated manifest page) or by
//! draining a locally supplied identifier list. Multiple root collections are
//! walked sequentially and concatenated.
//!
//! Pagination state is an immutable value threaded through successive page
//! fetches — never a mutable cursor shared across operations. A failed or
//! malformed page request is fatal only for its own collection: it is logged
//! and that collection's traversal ends, while sibling collections continue.
//! A page with no entries ends a collection without error; entries that yield
//! no identifier are skipped and traversal advances normally.

use std::collections::VecDeque;

use regex::Regex;
use tracing::{debug, error};
use url::Url;

use gatherer_shared::{ContentFormat, HarvestError, RecordId, Result};

use crate::client::{FetchRequest, HttpClient};
use crate::fragment::Fragment;
use crate::id_source::IdList;

// ---------------------------------------------------------------------------
// Page description
// ---------------------------------------------------------------------------

/// How a provider's result pages advance.
#[derive(Debug, Clone)]
pub enum PaginationPolicy {
    /// Each page response embeds a token for the next page; the token is sent
    /// back as a query parameter. Terminates when the token is absent.
    Cursor { param: String, token_path: String },
    /// Pages are requested at increasing offsets until the total reported by
    /// the first page is reached.
    OffsetLimit {
        offset_param: String,
        limit_param: String,
        limit: usize,
    },
    /// Each page response embeds a full URL for the next page. Terminates
    /// when the link is absent.
    NextLink { link_path: String },
    /// One unpaginated page (a collection manifest document).
    Single,
}

/// How to pull an identifier out of one page entry.
#[derive(Debug, Clone)]
pub enum IdRule {
    /// Fixed field path within the entry.
    Field(String),
    /// First of several candidate fields whose value matches a pattern.
    /// Entries with no match yield nothing.
    FirstMatching { fields: Vec<String>, pattern: Regex },
}

impl IdRule {
    /// Apply the rule to one page entry.
    fn extract(&self, entry: &Fragment) -> Option<RecordId> {
        match self {
            Self::Field(path) => entry.text_at(path).map(RecordId::new),
            Self::FirstMatching { fields, pattern } => fields
                .iter()
                .flat_map(|f| entry.texts_at(f))
                .find(|v| pattern.is_match(v))
                .map(RecordId::new),
        }
    }
}

/// Describes a provider's page documents: where the entries live, how each
/// entry yields an identifier, where the provider-reported total is, and how
/// pages advance.
#[derive(Debug, Clone)]
pub struct PageSpec {
    /// Format of page documents.
    pub format: ContentFormat,
    /// Path to the per-item entry list within a page document.
    pub entries_path: String,
    /// How each entry yields an identifier.
    pub id_rule: IdRule,
    /// Path to the provider-reported total, when the provider has one.
    pub total_path: Option<String>,
    /// How pages advance.
    pub policy: PaginationPolicy,
}

impl PageSpec {
    /// The per-item entries of one page document, in page order.
    fn page_entries(&self, page: &Fragment) -> Vec<Fragment> {
        page.entries_at(&self.entries_path)
    }

    /// Extract identifiers from a page's entries. Entries the rule cannot
    /// resolve are skipped; the result may be shorter than the entry list.
    fn ids_from(&self, entries: &[Fragment]) -> Vec<RecordId> {
        entries
            .iter()
            .filter_map(|entry| self.id_rule.extract(entry))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Pagination state
// ---------------------------------------------------------------------------

/// Immutable position within one collection's pagination.
#[derive(Debug, Clone, PartialEq)]
pub enum PaginationState {
    /// Before the first page request.
    Start,
    /// Next page is requested with this cursor token.
    Cursor(String),
    /// Next page is requested at this offset; `total` was reported by the
    /// first page.
    Offset { offset: usize, total: usize },
    /// Next page lives at this URL.
    NextLink(Url),
    /// Traversal finished.
    Done,
}

// ---------------------------------------------------------------------------
// Paginator: one collection
// ---------------------------------------------------------------------------

/// Fetches successive pages of one collection, threading [`PaginationState`]
/// through each call.
struct Paginator<'a> {
    client: &'a HttpClient,
    spec: &'a PageSpec,
    root: &'a Url,
    params: &'a [(String, String)],
    headers: &'a [(String, String)],
}

impl Paginator<'_> {
    /// Build the request for the given state. Must not be called with
    /// [`PaginationState::Done`].
    fn page_request(&self, state: &PaginationState) -> Result<FetchRequest> {
        let uri = match state {
            PaginationState::Start => self.page_uri(None, None),
            PaginationState::Cursor(token) => match &self.spec.policy {
                PaginationPolicy::Cursor { param, .. } => {
                    self.page_uri(Some((param.as_str(), token.as_str())), None)
                }
                _ => {
                    return Err(HarvestError::pagination(
                        self.root.as_str(),
                        "cursor state under non-cursor policy",
                    ));
                }
            },
            PaginationState::Offset { offset, .. } => self.page_uri(None, Some(*offset)),
            PaginationState::NextLink(url) => url.clone(),
            PaginationState::Done => {
                return Err(HarvestError::pagination(
                    self.root.as_str(),
                    "page requested after traversal finished",
                ));
            }
        };
        Ok(FetchRequest::with_headers(uri, self.headers))
    }

    /// Root URI with harvest params plus any policy parameters.
    fn page_uri(&self, cursor: Option<(&str, &str)>, offset: Option<usize>) -> Url {
        let mut uri = self.root.clone();
        {
            let mut pairs = uri.query_pairs_mut();
            for (k, v) in self.params {
                pairs.append_pair(k, v);
            }
            if let Some((param, token)) = cursor {
                pairs.append_pair(param, token);
            }
            if let PaginationPolicy::OffsetLimit {
                offset_param,
                limit_param,
                limit,
            } = &self.spec.policy
            {
                pairs.append_pair(offset_param, &offset.unwrap_or(0).to_string());
                pairs.append_pair(limit_param, &limit.to_string());
            }
        }
        uri
    }

    /// Fetch the page for `state`, returning the parsed page document and the
    /// state for the page after it.
    async fn fetch_page(&self, state: &PaginationState) -> Result<(Fragment, PaginationState)> {
        let request = self.page_request(state)?;
        let result = self
            .client
            .fetch_ok(&request)
            .await
            .map_err(|e| HarvestError::pagination(self.root.as_str(), e.to_string()))?;
        let page = Fragment::parse(&result.body, self.spec.format)
            .map_err(|e| HarvestError::pagination(self.root.as_str(), e.to_string()))?;

        let next = self.next_state(state, &page);
        Ok((page, next))
    }

    /// Derive the follow-up state from the current state and page response.
    fn next_state(&self, state: &PaginationState, page: &Fragment) -> PaginationState {
        match &self.spec.policy {
            PaginationPolicy::Cursor { token_path, .. } => match page.text_at(token_path) {
                Some(token) if !token.is_empty() => PaginationState::Cursor(token),
                _ => PaginationState::Done,
            },
            PaginationPolicy::OffsetLimit { limit, .. } => {
                let (offset, total) = match state {
                    PaginationState::Offset { offset, total } => (*offset, *total),
                    // First page: read the provider-reported total.
                    _ => {
                        let total = self
                            .spec
                            .total_path
                            .as_deref()
                            .and_then(|p| page.text_at(p))
                            .and_then(|t| t.parse().ok())
                            .unwrap_or(0);
                        (0, total)
                    }
                };
                let next = offset + limit;
                if next >= total {
                    PaginationState::Done
                } else {
                    PaginationState::Offset {
                        offset: next,
                        total,
                    }
                }
            }
            PaginationPolicy::NextLink { link_path } => page
                .text_at(link_path)
                .and_then(|link| Url::parse(&link).ok())
                .map(PaginationState::NextLink)
                .unwrap_or(PaginationState::Done),
            PaginationPolicy::Single => PaginationState::Done,
        }
    }
}

// ---------------------------------------------------------------------------
// IdentifierSource
// ---------------------------------------------------------------------------

enum SourceMode {
    /// Walk remote pagination across the configured collections.
    Paged {
        spec: PageSpec,
        collections: Vec<Url>,
        params: Vec<(String, String)>,
        headers: Vec<(String, String)>,
        current: usize,
        state: PaginationState,
    },
    /// Drain a locally supplied identifier list.
    Static(VecDeque<RecordId>),
}

/// Lazy, forward-only sequence of record identifiers. Not resumable
/// mid-session.
pub struct IdentifierSource {
    client: HttpClient,
    mode: SourceMode,
    /// Identifiers pulled from the current page but not yet yielded. Holds at
    /// most one page.
    buffer: VecDeque<RecordId>,
}

impl IdentifierSource {
    /// Source that walks the given collections' pagination sequentially.
    pub fn paged(
        client: HttpClient,
        spec: PageSpec,
        collections: Vec<Url>,
        params: Vec<(String, String)>,
        headers: Vec<(String, String)>,
    ) -> Self {
        Self {
            client,
            mode: SourceMode::Paged {
                spec,
                collections,
                params,
                headers,
                current: 0,
                state: PaginationState::Start,
            },
            buffer: VecDeque::new(),
        }
    }

    /// Source driven by a static identifier list.
    pub fn from_list(client: HttpClient, list: IdList) -> Self {
        Self {
            client,
            mode: SourceMode::Static(list.into_ids().into()),
            buffer: VecDeque::new(),
        }
    }

    /// Pull the next identifier, fetching further pages as needed.
    ///
    /// Page failures end the failing collection only: the error is logged and
    /// traversal moves on to the next configured collection.
    pub async fn next_id(&mut self) -> Option<RecordId> {
        loop {
            if let Some(id) = self.buffer.pop_front() {
                return Some(id);
            }

            match &mut self.mode {
                SourceMode::Static(ids) => return ids.pop_front(),
                SourceMode::Paged {
                    spec,
                    collections,
                    params,
                    headers,
                    current,
                    state,
                } => {
                    if *state == PaginationState::Done {
                        *current += 1;
                        *state = PaginationState::Start;
                    }
                    let root = collections.get(*current)?;

                    let paginator = Paginator {
                        client: &self.client,
                        spec,
                        root,
                        params,
                        headers,
                    };

                    match paginator.fetch_page(state).await {
                        Ok((page, next_state)) => {
                            let entries = spec.page_entries(&page);
                            if entries.is_empty() {
                                // A page with no entries ends this collection,
                                // not the harvest.
                                *state = PaginationState::Done;
                            } else {
                                // Entries the rule cannot resolve are skipped;
                                // traversal still advances.
                                let ids = spec.ids_from(&entries);
                                debug!(
                                    collection = %root,
                                    entries = entries.len(),
                                    ids = ids.len(),
                                    "page fetched"
                                );
                                self.buffer.extend(ids);
                                *state = next_state;
                            }
                        }
                        Err(e) => {
                            // Fatal for this collection only; siblings continue.
                            error!(collection = %root, error = %e, "pagination failed, abandoning collection");
                            *state = PaginationState::Done;
                        }
                    }
                }
            }
        }
    }

    /// Provider-reported total across all collections, or the static list
    /// size. Providers with no reported total are counted by walking their
    /// pages. Unlike [`next_id`](Self::next_id), a page failure here
    /// propagates: a count is either right or an error.
    pub async fn count(&self) -> Result<usize> {
        match &self.mode {
            SourceMode::Static(ids) => Ok(ids.len() + self.buffer.len()),
            SourceMode::Paged {
                spec,
                collections,
                params,
                headers,
                ..
            } => {
                let mut total = 0;
                for root in collections {
                    let paginator = Paginator {
                        client: &self.client,
                        spec,
                        root,
                        params,
                        headers,
                    };
                    total += match &spec.total_path {
                        Some(path) => {
                            let (page, _) = paginator.fetch_page(&PaginationState::Start).await?;
                            page.text_at(path)
                                .and_then(|t| t.parse::<usize>().ok())
                                .ok_or_else(|| {
                                    HarvestError::pagination(
                                        root.as_str(),
                                        format!("no total found at '{path}'"),
                                    )
                                })?
                        }
                        None => {
                            // No reported total: walk the pages, counting the
                            // identifiers each one yields.
                            let mut count = 0;
                            let mut state = PaginationState::Start;
                            while state != PaginationState::Done {
                                let (page, next) = paginator.fetch_page(&state).await?;
                                let entries = spec.page_entries(&page);
                                if entries.is_empty() {
                                    break;
                                }
                                count += spec.ids_from(&entries).len();
                                state = next;
                            }
                            count
                        }
                    };
                }
                Ok(total)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatherer_shared::HttpConfig;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> HttpClient {
        HttpClient::new(&HttpConfig::default()).unwrap()
    }

    fn cursor_spec() -> PageSpec {
        PageSpec {
            format: ContentFormat::Json,
            entries_path: "docs".into(),
            id_rule: IdRule::Field("id".into()),
            total_path: Some("total".into()),
            policy: PaginationPolicy::Cursor {
                param: "cursor".into(),
                token_path: "next_cursor".into(),
            },
        }
    }

    async fn drain(source: &mut IdentifierSource) -> Vec<String> {
        let mut ids = Vec::new();
        while let Some(id) = source.next_id().await {
            ids.push(id.0);
        }
        ids
    }

    #[tokio::test]
    async fn cursor_pagination_terminates_after_three_pages() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("cursor", "A"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"docs":[{"id":"id3"},{"id":"id4"}],"next_cursor":"B"}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("cursor", "B"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"docs":[{"id":"id5"}]}"#),
            )
            .expect(1)
            .mount(&server)
            .await;
        // First request carries no cursor parameter.
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"docs":[{"id":"id1"},{"id":"id2"}],"next_cursor":"A"}"#,
            ))
            .expect(1)
            .with_priority(10)
            .mount(&server)
            .await;

        let root = Url::parse(&format!("{}/search", server.uri())).unwrap();
        let mut source =
            IdentifierSource::paged(client(), cursor_spec(), vec![root], vec![], vec![]);

        // All per-page identifiers, in page order; exactly 3 page requests
        // (the mock expectations verify the count on drop).
        assert_eq!(
            drain(&mut source).await,
            vec!["id1", "id2", "id3", "id4", "id5"]
        );
    }

    #[tokio::test]
    async fn offset_pagination_stops_at_reported_total() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("start", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"total":3,"docs":[{"id":"a"},{"id":"b"}]}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("start", "2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"total":3,"docs":[{"id":"c"}]}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let spec = PageSpec {
            format: ContentFormat::Json,
            entries_path: "docs".into(),
            id_rule: IdRule::Field("id".into()),
            total_path: Some("total".into()),
            policy: PaginationPolicy::OffsetLimit {
                offset_param: "start".into(),
                limit_param: "rows".into(),
                limit: 2,
            },
        };
        let root = Url::parse(&format!("{}/search", server.uri())).unwrap();
        let mut source = IdentifierSource::paged(client(), spec, vec![root], vec![], vec![]);

        assert_eq!(drain(&mut source).await, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn next_link_pagination_follows_embedded_urls() {
        let server = MockServer::start().await;

        let page2_url = format!("{}/page2", server.uri());
        Mock::given(method("GET"))
            .and(path("/collection"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                r#"{{"results":[{{"id":"one"}}],"pagination":{{"next":"{page2_url}"}}}}"#
            )))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/page2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"results":[{"id":"two"}],"pagination":{"next":null}}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let spec = PageSpec {
            format: ContentFormat::Json,
            entries_path: "results".into(),
            id_rule: IdRule::Field("id".into()),
            total_path: Some("pagination/of".into()),
            policy: PaginationPolicy::NextLink {
                link_path: "pagination/next".into(),
            },
        };
        let root = Url::parse(&format!("{}/collection", server.uri())).unwrap();
        let mut source = IdentifierSource::paged(client(), spec, vec![root], vec![], vec![]);

        assert_eq!(drain(&mut source).await, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn candidate_field_rule_takes_first_pattern_match() {
        let entry = Fragment::parse(
            r#"{"aka":["http://x.org/resource/a1/","http://x.org/item/a1/"],
                "id":"http://x.org/search/?q=a1",
                "url":"http://x.org/item/a1/"}"#,
            ContentFormat::Json,
        )
        .unwrap();

        let rule = IdRule::FirstMatching {
            fields: vec!["aka".into(), "id".into(), "url".into()],
            pattern: Regex::new(r"x\.org/item/").unwrap(),
        };
        assert_eq!(
            rule.extract(&entry),
            Some(RecordId::new("http://x.org/item/a1/"))
        );

        let no_match = Fragment::parse(r#"{"id":"plain"}"#, ContentFormat::Json).unwrap();
        assert_eq!(rule.extract(&no_match), None);
    }

    #[tokio::test]
    async fn page_with_no_matching_entries_does_not_end_collection() {
        let server = MockServer::start().await;

        // Page 1 has entries, but none passes the item pattern. The chain
        // must still follow the next link.
        let page2_url = format!("{}/page2", server.uri());
        Mock::given(method("GET"))
            .and(path("/collection"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                r#"{{"results":[{{"id":"http://x.org/search/?q=a"}},{{"id":"http://x.org/search/?q=b"}}],"pagination":{{"next":"{page2_url}"}}}}"#
            )))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/page2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"results":[{"id":"http://x.org/item/a1/"}],"pagination":{"next":null}}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let spec = PageSpec {
            format: ContentFormat::Json,
            entries_path: "results".into(),
            id_rule: IdRule::FirstMatching {
                fields: vec!["id".into()],
                pattern: Regex::new(r"x\.org/item/").unwrap(),
            },
            total_path: None,
            policy: PaginationPolicy::NextLink {
                link_path: "pagination/next".into(),
            },
        };
        let root = Url::parse(&format!("{}/collection", server.uri())).unwrap();
        let mut source = IdentifierSource::paged(client(), spec, vec![root], vec![], vec![]);

        assert_eq!(drain(&mut source).await, vec!["http://x.org/item/a1/"]);
    }

    #[tokio::test]
    async fn count_walk_skips_unresolvable_entries() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("cursor", "A"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                // Entries present but none carries the id field.
                r#"{"docs":[{"other":"x"},{"other":"y"}],"next_cursor":"B"}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("cursor", "B"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"docs":[{"id":"id3"}]}"#),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"docs":[{"id":"id1"},{"id":"id2"}],"next_cursor":"A"}"#,
            ))
            .expect(1)
            .with_priority(10)
            .mount(&server)
            .await;

        let mut spec = cursor_spec();
        spec.total_path = None;
        let root = Url::parse(&format!("{}/search", server.uri())).unwrap();
        let source = IdentifierSource::paged(client(), spec, vec![root], vec![], vec![]);

        // The unresolvable middle page contributes nothing but does not end
        // the walk.
        assert_eq!(source.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn failed_collection_does_not_stop_siblings() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/healthy"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"docs":[{"id":"ok1"},{"id":"ok2"}]}"#),
            )
            .mount(&server)
            .await;

        let roots = vec![
            Url::parse(&format!("{}/broken", server.uri())).unwrap(),
            Url::parse(&format!("{}/healthy", server.uri())).unwrap(),
        ];
        let mut source = IdentifierSource::paged(client(), cursor_spec(), roots, vec![], vec![]);

        // The broken collection is abandoned; the healthy one still yields.
        assert_eq!(drain(&mut source).await, vec!["ok1", "ok2"]);
    }

    #[tokio::test]
    async fn static_list_yields_in_file_order_and_counts() {
        let list = IdList::from_reader("7441504,\n7563000,\n12014747\n".as_bytes()).unwrap();
        let mut source = IdentifierSource::from_list(client(), list);

        assert_eq!(source.count().await.unwrap(), 3);
        assert_eq!(
            drain(&mut source).await,
            vec!["7441504", "7563000", "12014747"]
        );
    }

    #[tokio::test]
    async fn count_sums_reported_totals_across_collections() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"total":40,"docs":[{"id":"x"}]}"#),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"total":2,"docs":[{"id":"y"}]}"#),
            )
            .mount(&server)
            .await;

        let roots = vec![
            Url::parse(&format!("{}/a", server.uri())).unwrap(),
            Url::parse(&format!("{}/b", server.uri())).unwrap(),
        ];
        let source = IdentifierSource::paged(client(), cursor_spec(), roots, vec![], vec![]);
        assert_eq!(source.count().await.unwrap(), 42);
    }
}
