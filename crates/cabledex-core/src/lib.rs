//! Core data model for the cabledex catalog
//!
//! This crate defines the row types held by the catalog store, the shared
//! enums (connectors, statuses, quality states), the typed ids assigned by
//! the store, and the error taxonomy used across the workspace. It carries
//! no I/O and no business logic; the other crates build on these shapes.

pub mod error;
pub mod ids;
pub mod types;

pub use error::{
    CabledexError, ConfigError, ExtractionError, FetchError, NotFoundError, PersistenceError,
    Result, TimeoutError, ValidationError,
};
pub use ids::{EvidenceId, JobId, SpecId, VariantId, WorkflowId, WorkflowItemId};
pub use types::*;
