//! In-memory catalog store.
//!
//! [`CatalogStore`] owns the seven tables of the catalog: workflows, workflow
//! items, evidence sources, cable variants, normalized specs, enrichment jobs
//! and manual inference sessions. One mutex guards the whole state; every
//! public operation takes the lock exactly once, so each call observes and
//! commits a consistent snapshot. That single-lock discipline is what makes
//! `upsert_variant_and_insert_spec` atomic and serializes enrichment-job
//! mutations per variant (at most one open job can ever exist).
//!
//! Evidence inserts are append-only; rows are never mutated after insert, and
//! a content-hash collision just means the same content was fetched twice.

mod hash;
mod merge;
mod store;

pub use hash::content_hash;
pub use store::{CatalogStore, EnrichmentQueueSummary, UpsertOutcome};
