//! Shopify storefront adapter: discovery and product extraction.

use crate::canonical::canonicalize_url;
use crate::fields::map_product;
use crate::product::{embedded_products, product_from_value, suggest_products};
use crate::registry::{CandidateProduct, VendorTemplate};
use crate::SourceExtraction;
use cabledex_core::{ExtractionError, FetchError, Result};
use cabledex_fetch::PageFetcher;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

/// Tokens that mark a description as carrying capability information.
static CAPABILITY_SIGNAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)watt|\d+\s*w\b|gbps|usb|thunderbolt|lightning|\d+\s*hz").unwrap());

/// Template-driven adapter over one Shopify storefront.
pub struct ShopifyAdapter<'a> {
    template: &'static VendorTemplate,
    fetcher: &'a dyn PageFetcher,
}

impl<'a> ShopifyAdapter<'a> {
    #[must_use]
    pub fn new(template: &'static VendorTemplate, fetcher: &'a dyn PageFetcher) -> Self {
        Self { template, fetcher }
    }

    /// Discover candidate product URLs from the vendor's search surface.
    ///
    /// Fetches the search page for each configured term and walks the
    /// embedded JSON for product objects; when no embedded JSON is found at
    /// all, falls back to the search-suggest endpoint. Results are filtered
    /// through the template's candidate predicate, canonicalized,
    /// deduplicated in order, and truncated to `max_items`.
    ///
    /// # Errors
    ///
    /// Individual term fetches may fail without failing discovery; an empty
    /// result is returned only when every surface came up empty.
    pub async fn discover_product_urls(&self, max_items: usize) -> Result<Vec<String>> {
        let mut candidates: Vec<Value> = Vec::new();

        for term in self.template.search_terms {
            let search_url = self.template.search_url(term);
            match self.fetcher.fetch_text(&search_url).await {
                Ok(html) => candidates.extend(embedded_products(&html)),
                Err(err) => {
                    warn!(template = self.template.id, term, error = %err, "search page fetch failed");
                }
            }
        }

        if candidates.is_empty() {
            debug!(
                template = self.template.id,
                "no embedded product JSON, falling back to search suggest"
            );
            for term in self.template.search_terms {
                let suggest_url = self.template.suggest_url(term);
                let Ok(body) = self.fetcher.fetch_text(&suggest_url).await else {
                    continue;
                };
                if let Ok(value) = serde_json::from_str::<Value>(&body) {
                    candidates.extend(suggest_products(&value));
                }
            }
        }

        let mut urls: Vec<String> = Vec::new();
        for candidate in &candidates {
            let Some(handle) = candidate.get("handle").and_then(Value::as_str) else {
                continue;
            };
            let title = candidate
                .get("title")
                .or_else(|| candidate.get("name"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            let summary_html = candidate
                .get("body_html")
                .or_else(|| candidate.get("body"))
                .or_else(|| candidate.get("description"))
                .and_then(Value::as_str)
                .unwrap_or_default();

            if !self.template.include_candidate(&CandidateProduct {
                handle,
                title,
                summary_html,
            }) {
                continue;
            }

            let product_url = self.template.product_url(handle);
            let canonical = canonicalize_url(&product_url).unwrap_or(product_url);
            if !urls.contains(&canonical) {
                urls.push(canonical);
            }
            if urls.len() >= max_items {
                break;
            }
        }

        debug!(
            template = self.template.id,
            discovered = urls.len(),
            "discovery finished"
        );
        Ok(urls)
    }

    /// Extract cables from a product URL.
    ///
    /// Returns `Ok(None)` when the URL does not belong to this template.
    /// Resolves the handle, reads the product JSON (embedded page payload
    /// first, then the `.js` endpoint), optionally merges a supplemental
    /// description from search-suggest when the base description carries no
    /// capability signals, and maps one cable per variant.
    ///
    /// # Errors
    ///
    /// `FetchError` when no payload surface is reachable;
    /// `ExtractionError::NoCables` when the product JSON cannot be mapped.
    pub async fn extract_from_product_url(&self, url: &str) -> Result<Option<SourceExtraction>> {
        let Some(handle) = self.template.handle_from_url(url) else {
            return Ok(None);
        };

        let mut found: Option<(String, crate::product::CanonicalProduct)> = None;

        match self
            .fetcher
            .fetch_text(&self.template.product_url(&handle))
            .await
        {
            Ok(html) => {
                for value in embedded_products(&html) {
                    let matches_handle =
                        value.get("handle").and_then(Value::as_str) == Some(handle.as_str());
                    if matches_handle && let Some(product) = product_from_value(&value) {
                        found = Some((html.clone(), product));
                        break;
                    }
                }
            }
            Err(err) => {
                debug!(handle, error = %err, "product page fetch failed, trying .js endpoint");
            }
        }

        let (raw_payload, mut product) = match found {
            Some(found) => found,
            None => {
                let body = self
                    .fetcher
                    .fetch_text(&self.template.product_js_url(&handle))
                    .await?;
                let value: Value =
                    serde_json::from_str(&body).map_err(|e| FetchError::Payload {
                        service: "vendor".to_string(),
                        message: format!("product JSON for {handle} does not parse: {e}"),
                    })?;
                let product = product_from_value(&value).ok_or_else(|| {
                    ExtractionError::NoCables {
                        url: url.to_string(),
                    }
                })?;
                (body, product)
            }
        };

        if !CAPABILITY_SIGNAL.is_match(&product.description_html) {
            self.merge_suggest_description(&handle, &mut product).await;
        }

        let cables = map_product(self.template, &product, url);
        if cables.is_empty() {
            return Err(ExtractionError::NoCables {
                url: url.to_string(),
            }
            .into());
        }

        let canonical_url = canonicalize_url(url).unwrap_or_else(|| url.to_string());
        Ok(Some(SourceExtraction {
            url: url.to_string(),
            canonical_url,
            markdown: product.description_text(),
            html: raw_payload,
            cables,
        }))
    }

    /// Pull a richer description out of search-suggest when the product JSON
    /// itself says nothing about capabilities. Best-effort.
    async fn merge_suggest_description(
        &self,
        handle: &str,
        product: &mut crate::product::CanonicalProduct,
    ) {
        let Ok(body) = self
            .fetcher
            .fetch_text(&self.template.suggest_url(handle))
            .await
        else {
            return;
        };
        let Ok(value) = serde_json::from_str::<Value>(&body) else {
            return;
        };

        for suggested in suggest_products(&value) {
            if suggested.get("handle").and_then(Value::as_str) != Some(handle) {
                continue;
            }
            let extra = suggested
                .get("body")
                .or_else(|| suggested.get("body_html"))
                .or_else(|| suggested.get("description"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            if CAPABILITY_SIGNAL.is_match(extra) {
                debug!(handle, "merged supplemental description from search suggest");
                product.description_html.push('\n');
                product.description_html.push_str(extra);
                return;
            }
        }
    }
}
