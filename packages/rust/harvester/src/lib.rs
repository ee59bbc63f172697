//! Concurrent multi-source metadata harvesting.
//!
//! This crate provides:
//! - [`pagination`] — Identifier discovery over paged provider endpoints
//! - [`id_source`] — Static identifier lists for providers without pagination
//! - [`pipeline`] — Batched, multi-stage per-record fetch chains
//! - [`assembler`] — Composite assembly and identifier minting
//! - [`providers`] — Built-in provider profiles
//! - [`Harvester`] — The façade tying them together

pub mod assembler;
pub mod client;
pub mod fragment;
pub mod harvester;
pub mod id_source;
pub mod pagination;
pub mod pipeline;
pub mod providers;

// Re-export public API at crate root for ergonomic imports.
pub use assembler::{Assembler, DigestMinter, IdentifierStrategy, Minter};
pub use client::{FetchRequest, FetchResult, HttpClient};
pub use fragment::Fragment;
pub use harvester::{Harvester, RecordStream};
pub use id_source::IdList;
pub use pagination::{IdRule, IdentifierSource, PageSpec, PaginationPolicy, PaginationState};
pub use pipeline::{
    BatchOutcome, CompositeRecord, FetchPipeline, StagePlan, StageSource, StagedFragment,
    UriExtraction, UriTemplate,
};
pub use providers::{
    ProviderProfile, archive_profile, linked_search_profile, manifest_profile,
    paged_catalog_profile,
};
