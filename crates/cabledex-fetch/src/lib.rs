//! Web fetching for cabledex.
//!
//! Two fetch surfaces feed the pipeline:
//!
//! - [`ScrapeService`] — the Firecrawl scrape API, used by the generic
//!   (LLM-backed) extractor to obtain markdown + html snapshots;
//! - [`PageFetcher`] — plain GETs against vendor pages, used by the
//!   Shopify-style templates for search pages, product JSON endpoints and
//!   search-suggest payloads.
//!
//! Both ride on [`HttpClient`], a shared reqwest wrapper with per-request
//! timeouts, bounded retry for 5xx/network failures, and secret redaction of
//! error text before it is logged or persisted.

mod firecrawl;
mod http;
mod page;
pub mod redact;

// Test doubles; not part of the public API stability guarantees.
#[doc(hidden)]
pub mod testing;

pub use firecrawl::{FirecrawlClient, ScrapeService, ScrapedPage};
pub use http::HttpClient;
pub use page::{HttpPageFetcher, PageFetcher};
