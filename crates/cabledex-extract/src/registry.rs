//! Vendor template registry.
//!
//! Process-wide immutable table of the storefronts the catalog knows how to
//! parse directly. Adding a vendor is one entry plus an include predicate.

use once_cell::sync::Lazy;
use serde::Serialize;
use url::Url;

/// A product candidate surfaced during discovery, before filtering.
#[derive(Debug, Clone)]
pub struct CandidateProduct<'a> {
    pub handle: &'a str,
    pub title: &'a str,
    pub summary_html: &'a str,
}

/// Declarative description of one Shopify-style storefront.
pub struct VendorTemplate {
    pub id: &'static str,
    pub name: &'static str,
    pub base_url: &'static str,
    pub search_path: &'static str,
    pub search_query_param: &'static str,
    /// Queries issued during discovery.
    pub search_terms: &'static [&'static str],
    pub product_path_prefix: &'static str,
    include: fn(&CandidateProduct<'_>) -> bool,
}

impl VendorTemplate {
    /// Whether a URL points at a product page of this vendor.
    #[must_use]
    pub fn matches_product_url(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };
        let base_host = Url::parse(self.base_url)
            .ok()
            .and_then(|b| b.host_str().map(ToString::to_string));
        let Some(base_host) = base_host else {
            return false;
        };

        let host = host.trim_start_matches("www.");
        let base_host = base_host.trim_start_matches("www.");
        host == base_host && parsed.path().starts_with(self.product_path_prefix)
    }

    /// Apply the vendor's candidate filter.
    #[must_use]
    pub fn include_candidate(&self, candidate: &CandidateProduct<'_>) -> bool {
        (self.include)(candidate)
    }

    #[must_use]
    pub fn search_url(&self, term: &str) -> String {
        format!(
            "{}{}?{}={}",
            self.base_url, self.search_path, self.search_query_param, term
        )
    }

    #[must_use]
    pub fn suggest_url(&self, term: &str) -> String {
        format!(
            "{}/search/suggest.json?q={}&resources[type]=product",
            self.base_url, term
        )
    }

    #[must_use]
    pub fn product_url(&self, handle: &str) -> String {
        format!("{}{}{}", self.base_url, self.product_path_prefix, handle)
    }

    #[must_use]
    pub fn product_js_url(&self, handle: &str) -> String {
        format!("{}{}{}.js", self.base_url, self.product_path_prefix, handle)
    }

    /// Extract the product handle from a URL under this template.
    #[must_use]
    pub fn handle_from_url(&self, url: &str) -> Option<String> {
        if !self.matches_product_url(url) {
            return None;
        }
        let parsed = Url::parse(url).ok()?;
        let rest = parsed.path().strip_prefix(self.product_path_prefix)?;
        let handle = rest
            .split('/')
            .next()
            .unwrap_or_default()
            .trim_end_matches(".js");
        if handle.is_empty() {
            None
        } else {
            Some(handle.to_string())
        }
    }
}

/// Shared include predicate: cables only, no adjacent accessory categories.
fn cable_candidate(candidate: &CandidateProduct<'_>) -> bool {
    let haystack = format!("{} {}", candidate.title, candidate.summary_html).to_lowercase();
    if !haystack.contains("cable") {
        return false;
    }
    const EXCLUDED: [&str; 8] = [
        "adapter",
        "hub",
        "wall charger",
        "power bank",
        "dock",
        "stand",
        "mount",
        "organizer",
    ];
    !EXCLUDED.iter().any(|word| candidate.title.to_lowercase().contains(word))
}

static REGISTRY: Lazy<Vec<VendorTemplate>> = Lazy::new(|| {
    vec![
        VendorTemplate {
            id: "anker",
            name: "Anker",
            base_url: "https://www.anker.com",
            search_path: "/search",
            search_query_param: "q",
            search_terms: &["usb-c cable", "charging cable"],
            product_path_prefix: "/products/",
            include: cable_candidate,
        },
        VendorTemplate {
            id: "ugreen",
            name: "UGREEN",
            base_url: "https://www.ugreen.com",
            search_path: "/search",
            search_query_param: "q",
            search_terms: &["usb-c cable", "thunderbolt cable"],
            product_path_prefix: "/products/",
            include: cable_candidate,
        },
    ]
});

/// All registered vendor templates.
#[must_use]
pub fn registry() -> &'static [VendorTemplate] {
    &REGISTRY
}

/// Look up a template by id.
#[must_use]
pub fn template_by_id(id: &str) -> Option<&'static VendorTemplate> {
    REGISTRY.iter().find(|t| t.id.eq_ignore_ascii_case(id))
}

/// Find the template whose product space contains `url`.
#[must_use]
pub fn template_for_url(url: &str) -> Option<&'static VendorTemplate> {
    REGISTRY.iter().find(|t| t.matches_product_url(url))
}

/// Public projection of a template for the `listShopifyTemplates` RPC.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub base_url: &'static str,
}

/// Templates as listed by the discovery RPC.
#[must_use]
pub fn list_templates() -> Vec<TemplateInfo> {
    REGISTRY
        .iter()
        .map(|t| TemplateInfo {
            id: t.id,
            name: t.name,
            base_url: t.base_url,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_contains_the_builtin_vendors() {
        let ids: Vec<&str> = registry().iter().map(|t| t.id).collect();
        assert!(ids.contains(&"anker"));
        assert!(ids.contains(&"ugreen"));
        assert!(template_by_id("ANKER").is_some());
        assert!(template_by_id("nope").is_none());
    }

    #[test]
    fn product_url_matching_respects_host_and_prefix() {
        let anker = template_by_id("anker").unwrap();
        assert!(anker.matches_product_url("https://www.anker.com/products/a8856-cable"));
        assert!(anker.matches_product_url("https://anker.com/products/a8856-cable"));
        assert!(!anker.matches_product_url("https://www.anker.com/collections/cables"));
        assert!(!anker.matches_product_url("https://www.ugreen.com/products/cable"));
        assert!(!anker.matches_product_url("not a url"));
    }

    #[test]
    fn handles_are_extracted_from_product_urls() {
        let anker = template_by_id("anker").unwrap();
        assert_eq!(
            anker.handle_from_url("https://www.anker.com/products/a8856-cable?variant=1"),
            Some("a8856-cable".to_string())
        );
        assert_eq!(
            anker.handle_from_url("https://www.anker.com/products/a8856-cable.js"),
            Some("a8856-cable".to_string())
        );
        assert_eq!(anker.handle_from_url("https://www.anker.com/search"), None);
    }

    #[test]
    fn candidate_filter_keeps_cables_and_drops_accessories() {
        let anker = template_by_id("anker").unwrap();
        let keep = CandidateProduct {
            handle: "a8856",
            title: "Anker Prime USB-C Cable",
            summary_html: "",
        };
        assert!(anker.include_candidate(&keep));

        let drop = CandidateProduct {
            handle: "hub-1",
            title: "Anker USB-C Hub with Cable",
            summary_html: "",
        };
        assert!(!anker.include_candidate(&drop));

        let not_a_cable = CandidateProduct {
            handle: "charger-1",
            title: "Anker 240W Charger",
            summary_html: "",
        };
        assert!(!anker.include_candidate(&not_a_cable));
    }

    #[test]
    fn endpoint_urls_are_well_formed() {
        let anker = template_by_id("anker").unwrap();
        assert_eq!(
            anker.search_url("usb-c cable"),
            "https://www.anker.com/search?q=usb-c cable"
        );
        assert_eq!(
            anker.product_js_url("a8856-cable"),
            "https://www.anker.com/products/a8856-cable.js"
        );
        assert!(anker.suggest_url("cable").contains("resources[type]=product"));
    }
}
