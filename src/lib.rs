//! cabledex - a normalized catalog of consumer cable capabilities.
//!
//! The pipeline crawls vendor product pages, extracts structured cable
//! specifications with evidence pointers, deduplicates and quality-gates
//! them, and answers ranked "which cable is this" queries. A second entry
//! point infers the same capability fields from a free-text description of
//! a physical cable.
//!
//! This crate is the thin outer shell: the CLI plus re-exports of the
//! member crates that do the work.

pub mod cli;

pub use cabledex_config as config;
pub use cabledex_core as core;
pub use cabledex_engine as engine;
pub use cabledex_extract as extract;
pub use cabledex_fetch as fetch;
pub use cabledex_infer as infer;
pub use cabledex_llm as llm;
pub use cabledex_normalize as normalize;
pub use cabledex_quality as quality;
pub use cabledex_store as store;

pub use cabledex_config::EnvConfig;
pub use cabledex_engine::{IngestOptions, IngestService, SeedIngestRequest};
pub use cabledex_infer::InferenceService;
pub use cabledex_store::CatalogStore;
