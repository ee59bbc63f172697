//! Shared types, error model, and configuration for Gatherer.
//!
//! This crate is the foundation depended on by the harvester core and the
//! CLI. It provides:
//! - [`HarvestError`] — the unified error type
//! - Domain types ([`RecordId`], [`OriginalRecord`], [`HarvestReport`])
//! - Configuration ([`AppConfig`], [`HarvestOptions`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, HarvestOptions, HttpConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from,
};
pub use error::{HarvestError, Result};
pub use types::{ContentFormat, HarvestReport, OriginalRecord, RecordId, SessionId, StageRole};
