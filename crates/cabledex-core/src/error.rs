//! Error taxonomy for cabledex.
//!
//! Structured errors are organized by concern and aggregated into
//! [`CabledexError`] via `#[from]`. Library code returns these types and does
//! NOT call `std::process::exit()`; the CLI maps errors to exit codes.
//!
//! | Kind | Meaning |
//! |------|---------|
//! | `Config` | Missing or invalid environment variable; fatal on entry |
//! | `Fetch` | Non-2xx or network failure from the web fetcher; retried per item |
//! | `Extraction` | LLM schema violation or missing critical evidence; retried |
//! | `Persistence` | Missing row where one was expected; fatal for the operation |
//! | `Validation` | Caller-provided invalid ids or arguments |
//! | `Timeout` | Bounded abort of an LLM call; fails the current attempt |
//! | `NotFound` | Unknown template id or unmatched URL |

use std::time::Duration;
use thiserror::Error;

/// Convenience alias used across the workspace.
pub type Result<T> = std::result::Result<T, CabledexError>;

/// Top-level error type returned by cabledex library operations.
#[derive(Error, Debug)]
pub enum CabledexError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Timeout: {0}")]
    Timeout(#[from] TimeoutError),

    #[error("Not found: {0}")]
    NotFound(#[from] NotFoundError),
}

impl CabledexError {
    /// Whether the ingest item loop should retry this error.
    ///
    /// Transient network failures, LLM schema violations (non-determinism can
    /// recover), and provider 4xx responses are retried up to the attempt
    /// limit. Persistence and validation failures are not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Fetch(_) | Self::Extraction(_) | Self::Timeout(_)
        )
    }
}

/// Environment configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {name}")]
    MissingEnv { name: String },

    #[error("Invalid boolean for {name}: {value:?} (expected true/false/1/0/yes/no)")]
    InvalidBool { name: String, value: String },
}

/// Web fetcher failures (Firecrawl or raw page GETs).
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("{service} returned status {status} for {url}")]
    Status {
        service: String,
        status: u16,
        url: String,
    },

    #[error("{service} request failed: {message}")]
    Transport { service: String, message: String },

    #[error("{service} returned an unusable payload: {message}")]
    Payload { service: String, message: String },
}

/// Extraction failures from either pipeline.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("LLM output violated the extraction schema: {0}")]
    SchemaViolation(String),

    #[error("extraction is missing critical evidence for: {}", .0.join(", "))]
    MissingCriticalEvidence(Vec<String>),

    #[error("no cables could be extracted from {url}")]
    NoCables { url: String },

    #[error("LLM gateway error: {0}")]
    Gateway(String),
}

/// A row was missing where one was expected.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("missing {table} row {id}")]
    MissingRow { table: &'static str, id: String },
}

impl PersistenceError {
    #[must_use]
    pub fn missing(table: &'static str, id: impl ToString) -> Self {
        Self::MissingRow {
            table,
            id: id.to_string(),
        }
    }
}

/// Caller supplied an invalid argument.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("invalid {name}: {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    #[error("prompt is empty")]
    EmptyPrompt,

    #[error("unknown question id {question_id}")]
    UnknownQuestion { question_id: String },
}

/// Bounded abort of an LLM call.
#[derive(Error, Debug)]
#[error("{operation} timed out after {:.1}s", .limit.as_secs_f64())]
pub struct TimeoutError {
    pub operation: &'static str,
    pub limit: Duration,
}

/// Lookups that can legitimately miss.
#[derive(Error, Debug)]
pub enum NotFoundError {
    #[error("unknown template id {id}")]
    Template { id: String },

    #[error("no vendor template matches {url}")]
    UnmatchedUrl { url: String },

    #[error("no workflow runs recorded yet")]
    NoWorkflows,
}
