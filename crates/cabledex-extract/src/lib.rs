//! Source extractors for cabledex.
//!
//! Two pipelines turn a product URL into [`ParsedCable`] candidates:
//!
//! - **Vendor templates** ([`registry`], [`ShopifyAdapter`]) parse the
//!   product JSON Shopify-style storefronts embed in their pages (falling
//!   back to the `/products/<handle>.js` endpoint and the search-suggest
//!   API). Deterministic, no LLM involved.
//! - **Generic fallback** ([`GenericLlmExtractor`]) scrapes markdown/html
//!   and asks the LLM gateway for a schema-constrained extraction when no
//!   template matches.
//!
//! Both emit the same shape: cables with capability fields plus evidence
//! pointers for every critical field.

pub mod canonical;
mod fields;
mod generic;
mod product;
mod registry;
mod shopify;

pub use canonical::canonicalize_url;
pub use generic::GenericLlmExtractor;
pub use registry::{
    CandidateProduct, TemplateInfo, VendorTemplate, list_templates, registry, template_by_id,
    template_for_url,
};
pub use shopify::ShopifyAdapter;

use cabledex_core::ParsedCable;

/// Result of extracting one source URL: the snapshot to persist as evidence
/// plus the cables parsed out of it.
#[derive(Debug, Clone)]
pub struct SourceExtraction {
    pub url: String,
    pub canonical_url: String,
    pub markdown: String,
    pub html: String,
    pub cables: Vec<ParsedCable>,
}
