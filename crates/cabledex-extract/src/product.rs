//! Canonical product records parsed from Shopify payloads.
//!
//! Three wire shapes feed into [`CanonicalProduct`]: JSON embedded in search
//! or product pages ("next data" scripts), the `/products/<handle>.js`
//! endpoint, and search-suggest results. All are traversed structurally —
//! any object carrying `{handle, title|name, variants[]}` counts as a
//! product, wherever it nests.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// JSON script blocks in a storefront page.
static JSON_SCRIPT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<script[^>]*type="application/(?:json|ld\+json)"[^>]*>(.*?)</script>"#)
        .unwrap()
});

/// HTML tags, for crude text extraction from description html.
static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());

/// One purchasable variant of a product.
#[derive(Debug, Clone, Default)]
pub struct ProductVariant {
    pub title: Option<String>,
    pub sku: Option<String>,
    pub options: Vec<String>,
    pub image: Option<String>,
}

/// Vendor-agnostic product record.
#[derive(Debug, Clone, Default)]
pub struct CanonicalProduct {
    pub handle: String,
    pub title: String,
    pub vendor: Option<String>,
    pub description_html: String,
    pub images: Vec<String>,
    pub variants: Vec<ProductVariant>,
}

impl CanonicalProduct {
    /// Description with tags stripped, for text matching and markdown
    /// snapshots.
    #[must_use]
    pub fn description_text(&self) -> String {
        strip_html(&self.description_html)
    }
}

/// Strip tags and collapse whitespace.
#[must_use]
pub fn strip_html(html: &str) -> String {
    let text = HTML_TAG.replace_all(html, " ");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract every embedded product object from a storefront HTML page.
#[must_use]
pub fn embedded_products(html: &str) -> Vec<Value> {
    let mut products = Vec::new();
    for capture in JSON_SCRIPT.captures_iter(html) {
        if let Ok(value) = serde_json::from_str::<Value>(capture[1].trim()) {
            collect_products(&value, &mut products);
        }
    }
    products
}

/// Recursively collect objects shaped like products.
pub fn collect_products(value: &Value, out: &mut Vec<Value>) {
    match value {
        Value::Object(map) => {
            let has_handle = map.get("handle").is_some_and(Value::is_string);
            let has_title = map.get("title").is_some_and(Value::is_string)
                || map.get("name").is_some_and(Value::is_string);
            let has_variants = map.get("variants").is_some_and(Value::is_array);
            if has_handle && has_title && has_variants {
                out.push(value.clone());
            }
            for child in map.values() {
                collect_products(child, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_products(item, out);
            }
        }
        _ => {}
    }
}

/// Products in a search-suggest payload
/// (`resources.results.products[]`), indexed by handle upstream.
#[must_use]
pub fn suggest_products(payload: &Value) -> Vec<Value> {
    payload
        .pointer("/resources/results/products")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Map a raw product JSON object into a [`CanonicalProduct`].
///
/// Returns `None` when the object lacks a handle or title.
#[must_use]
pub fn product_from_value(value: &Value) -> Option<CanonicalProduct> {
    let obj = value.as_object()?;
    let handle = obj.get("handle")?.as_str()?.to_string();
    let title = obj
        .get("title")
        .or_else(|| obj.get("name"))?
        .as_str()?
        .to_string();

    let vendor = obj
        .get("vendor")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string);

    let description_html = obj
        .get("description")
        .or_else(|| obj.get("body_html"))
        .or_else(|| obj.get("body"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let images = obj
        .get("images")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(o) => o
                        .get("src")
                        .or_else(|| o.get("url"))
                        .and_then(Value::as_str)
                        .map(ToString::to_string),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    let variants = obj
        .get("variants")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(variant_from_value).collect())
        .unwrap_or_default();

    Some(CanonicalProduct {
        handle,
        title,
        vendor,
        description_html,
        images,
        variants,
    })
}

fn variant_from_value(value: &Value) -> Option<ProductVariant> {
    let obj = value.as_object()?;
    let title = obj
        .get("title")
        .or_else(|| obj.get("name"))
        .and_then(Value::as_str)
        .map(ToString::to_string);
    let sku = obj
        .get("sku")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string);
    let options = obj
        .get("options")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default();
    let image = obj
        .get("featured_image")
        .and_then(|fi| fi.get("src"))
        .or_else(|| obj.get("image"))
        .and_then(Value::as_str)
        .map(ToString::to_string);

    Some(ProductVariant {
        title,
        sku,
        options,
        image,
    })
}
