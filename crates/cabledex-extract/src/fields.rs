//! Per-variant field extraction rules for template-parsed products.

use crate::canonical::canonicalize_url;
use crate::product::{CanonicalProduct, ProductVariant};
use crate::registry::VendorTemplate;
use cabledex_core::{
    Connector, DataSpec, ParsedCable, ParsedEvidence, PowerSpec, VideoSpec, field_paths,
};
use cabledex_normalize::{
    clamp_data_capability_by_connector, infer_max_gbps_from_generation, normalize_connector,
    parse_refresh_hz, resolution_label, resolution_rank,
};
use once_cell::sync::Lazy;
use regex::Regex;

/// Wattage claims above this are treated as noise (nothing consumer ships
/// more than 500 W over a cable).
const MAX_PLAUSIBLE_WATTS: f64 = 500.0;

const CONNECTOR_TOKEN: &str =
    r"usb[\s-]?c|type[\s-]?c|usb[\s-]?a|type[\s-]?a|light(?:e)?ning|micro[\s-]?usb";

static PAIR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)({CONNECTOR_TOKEN})\s*(?:to|→|↔|->|/)\s*({CONNECTOR_TOKEN})"
    ))
    .unwrap()
});

static CONNECTOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?i){CONNECTOR_TOKEN}")).unwrap());

static WATTS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*w(?:atts?)?\b").unwrap());

static PD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bpd\b|power\s+delivery").unwrap());

static EPR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bepr\b|extended\s+power\s+range|pd\s*3\.1").unwrap());

static EXPLICIT_GBPS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\d+(?:\.\d+)?\s*gbps").unwrap());

static GENERATION_PHRASE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)usb\s*4(?:\s*v2)?|thunderbolt\s*\d|\btb\s*\d\b|usb\s*3\.\d(?:\s*gen\s*\d(?:\s*[x×]\s*2)?)?|gen\s*\d(?:\s*[x×]\s*2)?|usb\s*2\.0",
    )
    .unwrap()
});

static NEGATIVE_VIDEO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:does\s*not|doesn['’]t|do\s*not|not|no)\s+support(?:ing)?\s+(?:screen\s+mirroring|video(?:\s+output)?)|no\s+video|charge\s+only|charging\s+only",
    )
    .unwrap()
});

static POSITIVE_VIDEO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)screen\s+mirroring|video\s+output|display\s*port|hdmi|alt\s*mode|external\s+monitor",
    )
    .unwrap()
});

static PAREN_HINT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(([^)]+)\)").unwrap());

static LENGTH_HINT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b\d+(?:\.\d+)?\s*(?:ft|m|cm|in)\b").unwrap());

/// Map a canonical product into one [`ParsedCable`] per variant.
#[must_use]
pub fn map_product(
    template: &VendorTemplate,
    product: &CanonicalProduct,
    source_url: &str,
) -> Vec<ParsedCable> {
    let description = product.description_text();
    let (brand, brand_snippet) = resolve_brand(product.vendor.as_deref(), template);
    let model = ensure_brand_prefix(&product.title, &brand);
    let product_url = canonicalize_url(source_url).unwrap_or_else(|| source_url.to_string());

    let single_variant = product.variants.len() <= 1;
    let variants: Vec<ProductVariant> = if product.variants.is_empty() {
        vec![ProductVariant::default()]
    } else {
        product.variants.clone()
    };

    variants
        .iter()
        .map(|variant| {
            let label = variant_label(variant, product, single_variant);
            let full_text = [
                product.title.as_str(),
                description.as_str(),
                label.as_deref().unwrap_or_default(),
            ]
            .join("\n");

            let pair = connector_pair(&product.title, &description, &full_text);
            let power = extract_power(&product.title, &description, label.as_deref());
            let mut data = extract_data(&full_text);
            let video = extract_video(&product.title, &description);
            clamp_data_capability_by_connector(pair.from, pair.to, &mut data);

            let evidence = build_evidence(
                &brand_snippet,
                &product.title,
                &pair,
                &power,
                &data,
                &video,
                &full_text,
            );

            ParsedCable {
                brand: brand.clone(),
                model: model.clone(),
                variant: label,
                sku: variant.sku.clone(),
                connector_from: pair.from,
                connector_to: pair.to,
                product_url: Some(product_url.clone()),
                image_urls: collect_images(variant, product),
                power: power.spec,
                data,
                video: video.spec,
                evidence,
            }
        })
        .collect()
}

fn slugify(s: &str) -> String {
    let mut slug = String::new();
    let mut last_dash = true;
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    slug.trim_end_matches('-').to_string()
}

/// Prefer the vendor string; unknown or template-derived vendors normalize
/// to the canonical template name.
fn resolve_brand(vendor: Option<&str>, template: &VendorTemplate) -> (String, String) {
    let Some(vendor) = vendor.map(str::trim).filter(|v| !v.is_empty()) else {
        return (template.name.to_string(), template.name.to_string());
    };
    if vendor.eq_ignore_ascii_case("unknown") {
        return (template.name.to_string(), template.name.to_string());
    }

    let vendor_slug = slugify(vendor);
    let template_slug = slugify(template.name);
    let template_derived = vendor_slug == template_slug
        || vendor_slug.starts_with(&format!("{template_slug}-"))
        || vendor_slug.ends_with(&format!("-{template_slug}"));

    if template_derived {
        (template.name.to_string(), vendor.to_string())
    } else {
        (vendor.to_string(), vendor.to_string())
    }
}

fn ensure_brand_prefix(title: &str, brand: &str) -> String {
    if title.to_lowercase().starts_with(&brand.to_lowercase()) {
        title.to_string()
    } else {
        format!("{brand} {title}")
    }
}

struct PairResult {
    from: Connector,
    to: Connector,
    snippet: Option<String>,
}

fn connector_pair(title: &str, context: &str, full_text: &str) -> PairResult {
    for haystack in [title, context] {
        if let Some(captures) = PAIR_RE.captures(haystack) {
            return PairResult {
                from: normalize_connector(&captures[1]),
                to: normalize_connector(&captures[2]),
                snippet: Some(truncate_snippet(captures.get(0).unwrap().as_str())),
            };
        }
    }

    if title.to_lowercase().contains("thunderbolt") {
        return PairResult {
            from: Connector::UsbC,
            to: Connector::UsbC,
            snippet: Some(truncate_snippet(title)),
        };
    }

    let mut seen = Vec::new();
    for token in CONNECTOR_RE.find_iter(full_text) {
        let connector = normalize_connector(token.as_str());
        if connector != Connector::Unknown && !seen.iter().any(|(c, _)| *c == connector) {
            seen.push((connector, token.as_str().to_string()));
        }
    }

    match seen.len() {
        0 => PairResult {
            from: Connector::Unknown,
            to: Connector::Unknown,
            snippet: None,
        },
        1 => PairResult {
            from: seen[0].0,
            to: seen[0].0,
            snippet: Some(seen[0].1.clone()),
        },
        _ => PairResult {
            from: seen[0].0,
            to: seen[1].0,
            snippet: Some(format!("{} / {}", seen[0].1, seen[1].1)),
        },
    }
}

struct PowerResult {
    spec: PowerSpec,
    snippet: Option<String>,
}

fn max_watts_token(text: &str) -> Option<(f64, String)> {
    WATTS_RE
        .captures_iter(text)
        .filter_map(|c| {
            let watts: f64 = c[1].parse().ok()?;
            (watts <= MAX_PLAUSIBLE_WATTS).then(|| (watts, c[0].to_string()))
        })
        .fold(None, |best, candidate| match best {
            Some((w, _)) if w >= candidate.0 => best,
            _ => Some(candidate),
        })
}

/// Max wattage across product-level text; a wattage embedded in the variant
/// label overrides the product-level default for that spec.
fn extract_power(title: &str, description: &str, label: Option<&str>) -> PowerResult {
    let product_level = max_watts_token(&format!("{title}\n{description}"));
    let variant_level = label.and_then(max_watts_token);
    let chosen = variant_level.or(product_level);

    let text = format!("{title}\n{description}");
    let pd_supported = PD_RE.is_match(&text).then_some(true);
    let epr_supported = EPR_RE.is_match(&text).then_some(true);

    match chosen {
        Some((watts, snippet)) => PowerResult {
            spec: PowerSpec {
                max_watts: Some(watts),
                pd_supported,
                epr_supported,
            },
            snippet: Some(snippet),
        },
        None => PowerResult {
            spec: PowerSpec {
                max_watts: None,
                pd_supported,
                epr_supported,
            },
            snippet: None,
        },
    }
}

fn extract_data(full_text: &str) -> DataSpec {
    DataSpec {
        usb_generation: GENERATION_PHRASE_RE
            .find(full_text)
            .map(|m| m.as_str().trim().to_string()),
        max_gbps: infer_max_gbps_from_generation(full_text),
    }
}

struct VideoResult {
    spec: VideoSpec,
    snippet: Option<String>,
}

/// Negative video statements win over positive ones.
fn extract_video(title: &str, description: &str) -> VideoResult {
    let text = format!("{title}\n{description}");

    let negative = NEGATIVE_VIDEO_RE.find(&text);
    let positive = POSITIVE_VIDEO_RE.find(&text);
    let rank = resolution_rank(&text);

    let (explicitly_supported, snippet) = if let Some(m) = negative {
        (Some(false), Some(truncate_snippet(m.as_str())))
    } else if let Some(m) = positive {
        (Some(true), Some(truncate_snippet(m.as_str())))
    } else if rank.is_some() {
        (Some(true), None)
    } else {
        (None, None)
    };

    VideoResult {
        spec: VideoSpec {
            explicitly_supported,
            max_resolution: rank
                .and_then(resolution_label)
                .map(ToString::to_string),
            max_refresh_hz: parse_refresh_hz(&text),
        },
        snippet,
    }
}

fn variant_label(
    variant: &ProductVariant,
    product: &CanonicalProduct,
    single_variant: bool,
) -> Option<String> {
    if let Some(title) = variant
        .title
        .as_deref()
        .filter(|t| !t.is_empty() && !t.eq_ignore_ascii_case("Default Title"))
    {
        return Some(title.to_string());
    }

    if !variant.options.is_empty() {
        return Some(variant.options.join(" / "));
    }

    if single_variant {
        if let Some(captures) = PAREN_HINT_RE.captures(&product.title) {
            return Some(captures[1].trim().to_string());
        }
        if let Some(m) = LENGTH_HINT_RE.find(&product.title) {
            return Some(m.as_str().to_string());
        }
    }

    variant.sku.clone()
}

fn collect_images(variant: &ProductVariant, product: &CanonicalProduct) -> Vec<String> {
    let mut images = Vec::new();
    let candidates = variant
        .image
        .iter()
        .chain(product.images.iter());
    for raw in candidates {
        let normalized = normalize_image_url(raw);
        if !normalized.is_empty() && !images.contains(&normalized) {
            images.push(normalized);
        }
    }
    images
}

/// Scheme-relative CDN URLs become https; everything else passes through.
fn normalize_image_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        trimmed.to_string()
    }
}

fn truncate_snippet(s: &str) -> String {
    const MAX_SNIPPET_CHARS: usize = 160;
    let collapsed = s.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(MAX_SNIPPET_CHARS).collect()
}

#[allow(clippy::too_many_arguments)]
fn build_evidence(
    brand_snippet: &str,
    title: &str,
    pair: &PairResult,
    power: &PowerResult,
    data: &DataSpec,
    video: &VideoResult,
    full_text: &str,
) -> Vec<ParsedEvidence> {
    let mut evidence = vec![
        ParsedEvidence {
            field_path: field_paths::BRAND.to_string(),
            snippet: Some(truncate_snippet(brand_snippet)),
        },
        ParsedEvidence {
            field_path: field_paths::MODEL.to_string(),
            snippet: Some(truncate_snippet(title)),
        },
        ParsedEvidence {
            field_path: field_paths::CONNECTOR_FROM.to_string(),
            snippet: pair.snippet.clone(),
        },
        ParsedEvidence {
            field_path: field_paths::CONNECTOR_TO.to_string(),
            snippet: pair.snippet.clone(),
        },
    ];

    if power.spec.max_watts.is_some() {
        evidence.push(ParsedEvidence {
            field_path: field_paths::POWER_MAX_WATTS.to_string(),
            snippet: power.snippet.clone(),
        });
    }

    if data.max_gbps.is_some() {
        let snippet = EXPLICIT_GBPS_RE
            .find(full_text)
            .map(|m| m.as_str().to_string())
            .or_else(|| data.usb_generation.clone());
        evidence.push(ParsedEvidence {
            field_path: field_paths::DATA_MAX_GBPS.to_string(),
            snippet,
        });
    }

    if video.spec.explicitly_supported.is_some() {
        evidence.push(ParsedEvidence {
            field_path: field_paths::VIDEO_SUPPORTED.to_string(),
            snippet: video.snippet.clone(),
        });
    }

    evidence
}
