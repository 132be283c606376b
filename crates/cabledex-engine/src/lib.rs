//! Workflow engine and query surface for the cabledex catalog.
//!
//! [`IngestService`] executes seed-URL batches end to end: seed
//! normalization, per-item retries with exponential backoff, evidence
//! insertion, variant/spec upsert and workflow finalization. The same
//! service exposes the read side: the ranked top-cables query, workflow
//! reports and the enrichment queue summary.

mod ingest;
mod ranking;
mod report;

pub use ingest::{IngestOptions, IngestService, SeedIngestRequest, SeedIngestResult, backoff_delay};
pub use ranking::{EvidenceSummary, TopCableRow, score_spec};
pub use report::WorkflowReport;
