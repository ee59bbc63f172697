//! The harvest façade: `count`, `get_record`, and the lazy record stream.
//!
//! A [`Harvester`] wires a provider profile and harvest options to the
//! identifier source, fetch pipeline, and assembler. Its [`records`]
//! stream is pull-based and buffers at most one batch: identifiers are
//! taken W at a time, each batch is fetched with W concurrent tasks and
//! joined, and the assembled records are handed out before the next batch
//! starts. Batch k's records always precede batch k+1's; within a batch no
//! order is guaranteed among the fetches themselves.
//!
//! [`records`]: Harvester::records

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{error, info, instrument};

use gatherer_shared::{
    HarvestError, HarvestOptions, HarvestReport, HttpConfig, OriginalRecord, RecordId, Result,
};

use crate::assembler::{Assembler, DigestMinter, Minter};
use crate::client::HttpClient;
use crate::id_source::IdList;
use crate::pagination::IdentifierSource;
use crate::pipeline::FetchPipeline;
use crate::providers::ProviderProfile;

/// Base URI for the default digest minter. Real deployments plug in the
/// minting service via [`Harvester::with_minter`].
const DEFAULT_MINT_BASE: &str = "http://records.localdomain";

/// Orchestrates one provider's harvest.
pub struct Harvester {
    options: HarvestOptions,
    profile: ProviderProfile,
    client: HttpClient,
    pipeline: FetchPipeline,
    assembler: Assembler,
}

impl Harvester {
    /// Build a harvester, validating configuration before any fetching
    /// begins. Configuration problems abort startup unconditionally.
    pub fn new(
        profile: ProviderProfile,
        mut options: HarvestOptions,
        http: &HttpConfig,
    ) -> Result<Self> {
        profile.validate()?;
        if options.name.is_empty() {
            options.name = profile.name.clone();
        }
        if options.concurrency == 0 {
            options.concurrency = profile.default_concurrency;
        }
        options.validate()?;

        if profile.page.is_none() && options.id_list_path.is_none() {
            return Err(HarvestError::config(format!(
                "provider '{}' has no pagination; an identifier-list file is required",
                profile.name
            )));
        }

        let client = HttpClient::new(http)?;
        let pipeline = FetchPipeline::new(
            client.clone(),
            profile.format,
            profile.stages.clone(),
            options.headers.clone(),
        );
        let assembler = Assembler::new(
            options.name.clone(),
            profile.identifier.clone(),
            Arc::new(DigestMinter::new(DEFAULT_MINT_BASE)),
        );

        Ok(Self {
            options,
            profile,
            client,
            pipeline,
            assembler,
        })
    }

    /// Replace the default minter with the external minting service.
    pub fn with_minter(mut self, minter: Arc<dyn Minter>) -> Self {
        self.assembler = Assembler::new(
            self.options.name.clone(),
            self.profile.identifier.clone(),
            minter,
        );
        self
    }

    /// Batch width W for this run.
    pub fn concurrency(&self) -> usize {
        self.options.concurrency
    }

    fn id_source(&self) -> Result<IdentifierSource> {
        match &self.options.id_list_path {
            Some(path) => {
                let list = IdList::from_file(path)?;
                Ok(IdentifierSource::from_list(self.client.clone(), list))
            }
            None => {
                // new() guarantees a page spec when there is no list.
                let spec = self.profile.page.clone().ok_or_else(|| {
                    HarvestError::config("provider has neither pagination nor an identifier list")
                })?;
                Ok(IdentifierSource::paged(
                    self.client.clone(),
                    spec,
                    self.options.uris.clone(),
                    self.options.params.clone(),
                    self.options.headers.clone(),
                ))
            }
        }
    }

    /// Provider-reported total across collections, or the identifier-list
    /// size when the provider cannot report a reliable one. A completed
    /// harvest commonly yields fewer records than this when per-record
    /// failures occurred.
    pub async fn count(&self) -> Result<usize> {
        self.id_source()?.count().await
    }

    /// Fetch and assemble exactly one record, independent of bulk
    /// iteration. Used for spot fetches and retries.
    #[instrument(skip(self), fields(harvest = %self.options.name))]
    pub async fn get_record(&self, id: &RecordId) -> Result<OriginalRecord> {
        let composite = self.pipeline.run_one(id).await?;
        self.assembler.assemble(composite)
    }

    /// The full lazy, boundable record sequence.
    pub fn records(&self) -> Result<RecordStream<'_>> {
        let remaining = match self.options.max_records {
            0 => None,
            cap => Some(cap),
        };
        info!(
            harvest = %self.options.name,
            concurrency = self.options.concurrency,
            max_records = self.options.max_records,
            "starting harvest"
        );
        Ok(RecordStream {
            harvester: self,
            source: self.id_source()?,
            remaining,
            buffer: VecDeque::new(),
            report: HarvestReport::start(self.options.name.clone()),
        })
    }
}

// ---------------------------------------------------------------------------
// RecordStream
// ---------------------------------------------------------------------------

/// Lazy pull stream over assembled records. Holds at most one batch of
/// output; nothing is fetched until the caller pulls.
pub struct RecordStream<'a> {
    harvester: &'a Harvester,
    source: IdentifierSource,
    /// Records still allowed under `max_records`; `None` is unlimited.
    /// Decremented as identifiers are taken, so the cut happens before any
    /// fetch is issued.
    remaining: Option<usize>,
    buffer: VecDeque<OriginalRecord>,
    report: HarvestReport,
}

impl RecordStream<'_> {
    /// Pull the next assembled record, running further batches as needed.
    /// Per-record failures are logged, counted in the report, and skipped;
    /// they never end the stream.
    pub async fn next_record(&mut self) -> Option<OriginalRecord> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Some(record);
            }

            let batch = self.next_id_batch().await;
            if batch.is_empty() {
                self.report.finish();
                return None;
            }

            let outcome = self.harvester.pipeline.run_batch(&batch).await;
            for (id, e) in outcome.errors {
                // Already logged by the pipeline at drop time.
                self.report.dropped += 1;
                self.report.errors.push((id.0, e.to_string()));
            }
            for composite in outcome.records {
                let id = composite.id.clone();
                match self.harvester.assembler.assemble(composite) {
                    Ok(record) => {
                        self.report.emitted += 1;
                        self.buffer.push_back(record);
                    }
                    Err(e) => {
                        error!(identifier = %id, error = %e, "record dropped");
                        self.report.dropped += 1;
                        self.report.errors.push((id.0, e.to_string()));
                    }
                }
            }
            // A batch may drop every record; keep pulling.
        }
    }

    /// Drain the stream into memory. Mostly for small harvests and tests.
    pub async fn collect_all(&mut self) -> Vec<OriginalRecord> {
        let mut records = Vec::new();
        while let Some(record) = self.next_record().await {
            records.push(record);
        }
        records
    }

    /// The running report: emitted/dropped counts, per-record failures, and
    /// timing. Finalized once the stream returns `None`.
    pub fn report(&self) -> &HarvestReport {
        &self.report
    }

    /// Take up to W identifiers, honoring the `max_records` cut before any
    /// fetch is issued.
    async fn next_id_batch(&mut self) -> Vec<RecordId> {
        let width = self.harvester.options.concurrency;
        let mut batch = Vec::with_capacity(width);
        while batch.len() < width {
            if self.remaining == Some(0) {
                break;
            }
            match self.source.next_id().await {
                Some(id) => {
                    if let Some(left) = &mut self.remaining {
                        *left -= 1;
                    }
                    batch.push(id);
                }
                None => break,
            }
        }
        batch
    }
}
