//! Ranking query: score, dedupe and prune specs into the top-N list.
//!
//! This is the single documented ranker. Base ordering comes from the
//! completeness score; an optional search query layers a boost on top
//! (connector-pair preference outranks brand matching, fuzzy brand matching
//! tolerates misspellings, and a wattage token boosts rows whose extracted
//! wattage agrees).

use cabledex_core::{
    Connector, EvidenceId, NormalizedSpec, QualityState, SpecId, Timestamp, VariantId, WorkflowId,
};
use cabledex_normalize::normalize_connector;
use cabledex_store::CatalogStore;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;

/// Boost for a matching connector pair; outranks the brand boost.
const CONNECTOR_PAIR_BOOST: u32 = 100;
/// Boost for a fuzzy brand match.
const BRAND_BOOST: u32 = 40;
/// Boost for a wattage token agreeing with the row.
const WATTS_BOOST: u32 = 20;

static QUERY_CONNECTOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)usb[\s-]?c|type[\s-]?c|usb[\s-]?a|type[\s-]?a|light(?:e)?ning|micro[\s-]?usb")
        .unwrap()
});

static QUERY_WATTS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*w(?:atts?)?\b").unwrap());

static LENGTH_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b\d+(?:\.\d+)?\s*(?:ft|feet|m|meter|meters)\b").unwrap());

/// Hydrated evidence metadata attached to a top row.
#[derive(Debug, Clone, Serialize)]
pub struct EvidenceSummary {
    pub id: EvidenceId,
    pub url: String,
    pub canonical_url: String,
    pub fetched_at: Timestamp,
    pub content_hash: String,
}

/// One row of the user-visible top list, projected for faceting.
#[derive(Debug, Clone, Serialize)]
pub struct TopCableRow {
    pub variant_id: VariantId,
    pub spec_id: SpecId,
    pub workflow_id: WorkflowId,
    pub brand: String,
    pub model: String,
    pub variant: Option<String>,
    pub sku: Option<String>,
    pub connector_from: Connector,
    pub connector_to: Connector,
    pub product_url: Option<String>,
    pub image_urls: Vec<String>,
    pub quality_state: QualityState,
    pub quality_issues: Vec<String>,
    pub power: cabledex_core::PowerSpec,
    pub data: cabledex_core::DataSpec,
    pub video: cabledex_core::VideoSpec,
    pub score: u32,
    pub evidence: Vec<EvidenceSummary>,
}

impl TopCableRow {
    fn newest_evidence_fetch(&self) -> Option<Timestamp> {
        self.evidence.first().map(|e| e.fetched_at)
    }
}

/// Spec completeness score.
#[must_use]
pub fn score_spec(spec: &NormalizedSpec) -> u32 {
    let mut score = 0;
    if spec.power.max_watts.is_some() {
        score += 5;
    }
    if spec.power.pd_supported == Some(true) {
        score += 2;
    }
    if spec.power.epr_supported == Some(true) {
        score += 1;
    }
    if spec.data.max_gbps.is_some() {
        score += 4;
    }
    if spec.data.usb_generation.is_some() {
        score += 3;
    }
    if spec.video.explicitly_supported == Some(true) {
        score += 2;
    }
    if spec.video.max_resolution.is_some() {
        score += 1;
    }
    if spec.video.max_refresh_hz.is_some() {
        score += 1;
    }
    if !spec.evidence_refs.is_empty() {
        score += 1;
    }
    score
}

/// The top-cables query per the documented pipeline: scan newest specs, keep
/// the best spec per variant, hydrate, prune legacy rows, dedupe by
/// `(brand, sku)`, apply the optional search boost, filter by quality state
/// and truncate.
#[must_use]
pub fn get_top_cables(
    store: &CatalogStore,
    limit: usize,
    search_query: Option<&str>,
    include_states: &[QualityState],
) -> Vec<TopCableRow> {
    if limit == 0 {
        return Vec::new();
    }
    let scan_limit = limit.saturating_mul(40).max(limit);
    let specs = store.newest_specs(scan_limit);

    let mut rows = rows_from_specs(store, specs);
    rows = prune_legacy_rows(rows);
    rows = dedupe_by_brand_sku(rows);
    sort_rows(&mut rows, search_query);
    rows.retain(|row| include_states.contains(&row.quality_state));
    rows.truncate(limit);
    rows
}

/// Best spec per variant, hydrated with variant + evidence rows.
pub(crate) fn rows_from_specs(
    store: &CatalogStore,
    specs: Vec<NormalizedSpec>,
) -> Vec<TopCableRow> {
    let mut best: HashMap<VariantId, NormalizedSpec> = HashMap::new();
    for spec in specs {
        match best.get(&spec.variant_id) {
            Some(current)
                if (score_spec(current), current.created_at, current.id)
                    >= (score_spec(&spec), spec.created_at, spec.id) => {}
            _ => {
                best.insert(spec.variant_id, spec);
            }
        }
    }

    let mut rows = Vec::with_capacity(best.len());
    for spec in best.into_values() {
        let Ok(variant) = store.variant(spec.variant_id) else {
            continue;
        };
        let score = score_spec(&spec);
        let evidence = store
            .evidence_many(&spec.evidence_source_ids)
            .into_iter()
            .map(|e| EvidenceSummary {
                id: e.id,
                url: e.url,
                canonical_url: e.canonical_url,
                fetched_at: e.fetched_at,
                content_hash: e.content_hash,
            })
            .collect();
        rows.push(TopCableRow {
            variant_id: variant.id,
            spec_id: spec.id,
            workflow_id: spec.workflow_id,
            brand: variant.brand,
            model: variant.model,
            variant: variant.variant,
            sku: variant.sku,
            connector_from: variant.connector_from,
            connector_to: variant.connector_to,
            product_url: variant.product_url,
            image_urls: variant.image_urls,
            quality_state: variant.quality_state,
            quality_issues: variant.quality_issues,
            power: spec.power,
            data: spec.data,
            video: spec.video,
            score,
            evidence,
        });
    }
    rows
}

fn has_variant_signal(row: &TopCableRow) -> bool {
    row.sku.as_deref().is_some_and(|s| !s.trim().is_empty())
        || row.variant.as_deref().is_some_and(|v| !v.trim().is_empty())
}

fn is_descriptive_model(model: &str) -> bool {
    let lower = model.to_lowercase();
    model.contains(char::is_whitespace) || lower.contains("usb") || lower.contains("cable")
}

/// Drop placeholder rows that predate properly-parsed variants: within a
/// `(product_url | brand+pair)` group, rows without variant signals lose to
/// rows with them, and non-descriptive model strings lose to descriptive
/// ones.
fn prune_legacy_rows(rows: Vec<TopCableRow>) -> Vec<TopCableRow> {
    let mut groups: HashMap<String, Vec<TopCableRow>> = HashMap::new();
    for row in rows {
        let key = row.product_url.clone().unwrap_or_else(|| {
            format!(
                "{}|{}|{}",
                row.brand.to_lowercase(),
                row.connector_from,
                row.connector_to
            )
        });
        groups.entry(key).or_default().push(row);
    }

    let mut kept = Vec::new();
    for (_, group) in groups {
        let any_with_signal = group.iter().any(has_variant_signal);
        let descriptive_models: Vec<String> = group
            .iter()
            .filter(|r| is_descriptive_model(&r.model))
            .map(|r| r.model.clone())
            .collect();

        for row in group {
            if any_with_signal && !has_variant_signal(&row) {
                continue;
            }
            if !descriptive_models.is_empty()
                && !is_descriptive_model(&row.model)
                && !descriptive_models.iter().any(|m| m == &row.model)
            {
                continue;
            }
            kept.push(row);
        }
    }
    kept
}

/// Keep one row per `(brand, sku)`: higher score wins, then length-neutral
/// model, then newer evidence fetch, then longer model.
fn dedupe_by_brand_sku(rows: Vec<TopCableRow>) -> Vec<TopCableRow> {
    let mut without_sku = Vec::new();
    let mut by_key: HashMap<(String, String), TopCableRow> = HashMap::new();

    for row in rows {
        let Some(sku) = row.sku.clone().filter(|s| !s.trim().is_empty()) else {
            without_sku.push(row);
            continue;
        };
        let key = (row.brand.to_lowercase(), sku.to_lowercase());
        match by_key.get(&key) {
            Some(current) if !beats(&row, current) => {}
            _ => {
                by_key.insert(key, row);
            }
        }
    }

    without_sku.extend(by_key.into_values());
    without_sku
}

fn beats(challenger: &TopCableRow, incumbent: &TopCableRow) -> bool {
    if challenger.score != incumbent.score {
        return challenger.score > incumbent.score;
    }
    let challenger_neutral = !LENGTH_TOKEN_RE.is_match(&challenger.model);
    let incumbent_neutral = !LENGTH_TOKEN_RE.is_match(&incumbent.model);
    if challenger_neutral != incumbent_neutral {
        return challenger_neutral;
    }
    let challenger_fetch = challenger.newest_evidence_fetch();
    let incumbent_fetch = incumbent.newest_evidence_fetch();
    if challenger_fetch != incumbent_fetch {
        return challenger_fetch > incumbent_fetch;
    }
    challenger.model.len() > incumbent.model.len()
}

fn sort_rows(rows: &mut [TopCableRow], search_query: Option<&str>) {
    let boosts: HashMap<u64, u32> = rows
        .iter()
        .map(|row| {
            let boost = search_query.map_or(0, |q| search_boost(row, q));
            (row.spec_id.as_u64(), boost)
        })
        .collect();

    rows.sort_by(|a, b| {
        let boost_a = boosts.get(&a.spec_id.as_u64()).copied().unwrap_or(0);
        let boost_b = boosts.get(&b.spec_id.as_u64()).copied().unwrap_or(0);
        boost_b
            .cmp(&boost_a)
            .then_with(|| b.score.cmp(&a.score))
            .then_with(|| b.newest_evidence_fetch().cmp(&a.newest_evidence_fetch()))
            .then_with(|| b.spec_id.cmp(&a.spec_id))
    });
}

/// Levenshtein distance, for fuzzy brand matching.
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

fn search_boost(row: &TopCableRow, query: &str) -> u32 {
    let mut boost = 0;

    // Connector-pair preference: requested connectors outrank brand.
    let mentioned: Vec<Connector> = QUERY_CONNECTOR_RE
        .find_iter(query)
        .map(|m| normalize_connector(m.as_str()))
        .filter(|c| *c != Connector::Unknown)
        .collect();
    if mentioned.len() >= 2 {
        let forward = row.connector_from == mentioned[0] && row.connector_to == mentioned[1];
        let reverse = row.connector_from == mentioned[1] && row.connector_to == mentioned[0];
        if forward || reverse {
            boost += CONNECTOR_PAIR_BOOST;
        }
    } else if mentioned.len() == 1
        && (row.connector_from == mentioned[0] || row.connector_to == mentioned[0])
    {
        boost += CONNECTOR_PAIR_BOOST / 2;
    }

    // Fuzzy brand match: misspellings within edit distance 2 keep the brand.
    let brand = row.brand.to_lowercase();
    let brand_matched = query
        .to_lowercase()
        .split_whitespace()
        .any(|word| word.len() >= 3 && edit_distance(word, &brand) <= 2);
    if brand_matched {
        boost += BRAND_BOOST;
    }

    // Wattage token: boost rows whose extracted wattage agrees within 10 %.
    if let Some(captures) = QUERY_WATTS_RE.captures(query)
        && let Ok(wanted) = captures[1].parse::<f64>()
        && let Some(actual) = row.power.max_watts
        && (actual - wanted).abs() <= wanted * 0.1
    {
        boost += WATTS_BOOST;
    }

    boost
}
