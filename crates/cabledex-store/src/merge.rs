//! Field-level merge rules applied when an upsert hits an existing variant.

use once_cell::sync::Lazy;
use regex::Regex;

/// Length tokens embedded in model names, e.g. "6ft" or "2 m".
static LENGTH_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b\d+(?:\.\d+)?\s*(?:ft|feet|m|meter|meters)\b").unwrap());

/// Whether a model string embeds a length token.
#[must_use]
pub fn has_length_token(model: &str) -> bool {
    LENGTH_TOKEN.is_match(model)
}

/// Merge two model strings: prefer the one without an embedded length token;
/// when both have or both lack one, keep the longer string (existing wins
/// ties).
#[must_use]
pub fn merge_model(existing: &str, parsed: &str) -> String {
    match (has_length_token(existing), has_length_token(parsed)) {
        (true, false) => parsed.to_string(),
        (false, true) => existing.to_string(),
        _ => {
            if parsed.len() > existing.len() {
                parsed.to_string()
            } else {
                existing.to_string()
            }
        }
    }
}

/// A variant label is a placeholder when it just repeats the SKU.
#[must_use]
pub fn is_placeholder_variant(variant: &str, sku: Option<&str>) -> bool {
    sku.is_some_and(|s| variant.eq_ignore_ascii_case(s))
}

/// Merge two variant labels relative to the merged SKU: prefer the
/// non-placeholder; when both are placeholders or both descriptive, keep the
/// longer string (existing wins ties).
#[must_use]
pub fn merge_variant_label(
    existing: Option<&str>,
    parsed: Option<&str>,
    sku: Option<&str>,
) -> Option<String> {
    match (existing, parsed) {
        (None, None) => None,
        (Some(e), None) => Some(e.to_string()),
        (None, Some(p)) => Some(p.to_string()),
        (Some(e), Some(p)) => {
            let e_placeholder = is_placeholder_variant(e, sku);
            let p_placeholder = is_placeholder_variant(p, sku);
            let chosen = match (e_placeholder, p_placeholder) {
                (true, false) => p,
                (false, true) => e,
                _ => {
                    if p.len() > e.len() {
                        p
                    } else {
                        e
                    }
                }
            };
            Some(chosen.to_string())
        }
    }
}

/// Order-preserving set union: existing URLs first, new ones appended.
#[must_use]
pub fn union_image_urls(existing: &[String], parsed: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = existing.to_vec();
    for url in parsed {
        if !merged.iter().any(|u| u == url) {
            merged.push(url.clone());
        }
    }
    merged
}
