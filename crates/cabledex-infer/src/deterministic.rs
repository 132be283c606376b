//! Deterministic prompt parsing.

use cabledex_core::{CableDraft, Connector, UncertaintyCategory};
use cabledex_normalize::{
    LIGHTNING_GENERATION, normalize_connector, parse_refresh_hz, resolution_label, resolution_rank,
};
use once_cell::sync::Lazy;
use regex::Regex;

const CONNECTOR_TOKEN: &str =
    r"usb[\s-]?c\b|type[\s-]?c\b|usb[\s-]?a\b|type[\s-]?a\b|light(?:e)?ning|micro[\s-]?usb";

static PAIR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"({CONNECTOR_TOKEN})\s*(?:to|→|↔|⇄|->|/)\s*({CONNECTOR_TOKEN})"
    ))
    .unwrap()
});

static CONNECTOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(CONNECTOR_TOKEN).unwrap());

static WATTS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*w(?:atts?)?\b").unwrap());

static EXPLICIT_GBPS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*gbps").unwrap());

static DATA_ONLY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"data[\s-]?only|sync[\s-]?only|no charging").unwrap());

static CHARGING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"charg|power delivery|\bpd\b|\bwatts?\b|\bepr\b").unwrap());

static NEGATIVE_VIDEO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"no video|charge only|charging only|no display|not support(?:ing)? (?:video|screen)|no screen")
        .unwrap()
});

static POSITIVE_VIDEO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"display\s?port|alt\s?mode|monitor|hdmi|screen mirroring|video").unwrap()
});

/// Generation hints with their canonical label and implied Gbps.
static GENERATION_TABLE: Lazy<Vec<(Regex, &'static str, f64)>> = Lazy::new(|| {
    [
        (r"usb\s*4\s*(?:v|version\s*)?2|thunderbolt\s*5|\btb\s*5\b", "USB4 v2", 80.0),
        (r"thunderbolt\s*4|\btb\s*4\b", "Thunderbolt 4", 40.0),
        (r"thunderbolt\s*3|\btb\s*3\b", "Thunderbolt 3", 40.0),
        (r"usb\s*4", "USB4", 40.0),
        (r"gen\s*2\s*[x×]\s*2", "USB 3.2 Gen 2x2", 20.0),
        (r"gen\s*2", "USB 3.2 Gen 2", 10.0),
        (r"usb\s*3(?:\.\d)?\b|gen\s*1", "USB 3.2 Gen 1", 5.0),
        (r"usb\s*2(?:\.0)?\b", "USB 2.0", 0.48),
    ]
    .into_iter()
    .map(|(pattern, label, gbps)| (Regex::new(pattern).unwrap(), label, gbps))
    .collect()
});

/// Outcome of the deterministic pass.
#[derive(Debug, Clone)]
pub struct DeterministicOutcome {
    pub draft: CableDraft,
    pub notes: Vec<String>,
    pub uncertainties: Vec<UncertaintyCategory>,
    /// Seed confidence, already clamped to `[0, 0.99]`.
    pub confidence: f64,
    pub single_connector_mention: bool,
}

fn format_number(value: f64) -> String {
    if (value.fract()).abs() < f64::EPSILON {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Parse a free-text cable description into a draft.
///
/// Operates on the lowercased, whitespace-collapsed prompt. Each detected
/// signal appends a human-readable note; the seed confidence is
/// `0.23 + 0.17 * resolved_categories - 0.06 (single connector) + 0.06 (any notes)`.
#[must_use]
pub fn parse_prompt(prompt: &str) -> DeterministicOutcome {
    let text = prompt.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ");
    let mut draft = CableDraft::default();
    let mut notes = Vec::new();
    let mut single_connector_mention = false;

    // Connector pair: explicit "X to Y" (or arrow/slash) first, then ordered
    // distinct mentions. A single mention never auto-fills both ends.
    if let Some(captures) = PAIR_RE.captures(&text) {
        draft.connector_from = Some(normalize_connector(&captures[1]));
        draft.connector_to = Some(normalize_connector(&captures[2]));
        notes.push(format!(
            "Connector pair \"{}\" detected in description",
            captures.get(0).unwrap().as_str()
        ));
    } else {
        let mut seen: Vec<Connector> = Vec::new();
        for token in CONNECTOR_RE.find_iter(&text) {
            let connector = normalize_connector(token.as_str());
            if connector != Connector::Unknown && !seen.contains(&connector) {
                seen.push(connector);
            }
        }
        match seen.len() {
            0 => {}
            1 => {
                draft.connector_from = Some(seen[0]);
                single_connector_mention = true;
                notes.push(format!("Only one connector ({}) mentioned", seen[0]));
            }
            _ => {
                draft.connector_from = Some(seen[0]);
                draft.connector_to = Some(seen[1]);
                notes.push(format!(
                    "Connectors {} and {} mentioned in order",
                    seen[0], seen[1]
                ));
            }
        }
    }

    // Wattage: max token wins; any wattage implies the cable charges.
    let max_watts = WATTS_RE
        .captures_iter(&text)
        .filter_map(|c| c[1].parse::<f64>().ok())
        .fold(None::<f64>, |acc, w| Some(acc.map_or(w, |a| a.max(w))));
    if let Some(watts) = max_watts {
        draft.watts = Some(format_number(watts));
        draft.data_only = Some(false);
        notes.push(format!("Wattage {}W found", format_number(watts)));
    }

    if DATA_ONLY_RE.is_match(&text) {
        draft.data_only = Some(true);
        notes.push("Data-only wording found".to_string());
    }
    if CHARGING_RE.is_match(&text) {
        draft.data_only = Some(false);
    }

    // Data: explicit Gbps token wins; otherwise the strongest generation
    // hint implies a value.
    let explicit_gbps = EXPLICIT_GBPS_RE
        .captures_iter(&text)
        .filter_map(|c| c[1].parse::<f64>().ok())
        .fold(None::<f64>, |acc, g| Some(acc.map_or(g, |a| a.max(g))));

    let generation_hit = GENERATION_TABLE
        .iter()
        .filter(|(re, _, _)| re.is_match(&text))
        .max_by(|a, b| a.2.total_cmp(&b.2));
    if let Some((_, label, implied)) = generation_hit {
        draft.usb_generation = Some((*label).to_string());
        notes.push(format!("Generation hint {label}"));
        if explicit_gbps.is_none() {
            draft.gbps = Some(format_number(*implied));
        }
    }
    if let Some(gbps) = explicit_gbps {
        draft.gbps = Some(format_number(gbps));
        notes.push(format!("Explicit {} Gbps rating", format_number(gbps)));
    }

    // Video: negative wording wins over positive; a resolution or refresh
    // rate upgrades unknown support to "yes".
    if NEGATIVE_VIDEO_RE.is_match(&text) {
        draft.video_support = Some("no".to_string());
        notes.push("Description rules out video".to_string());
    } else if POSITIVE_VIDEO_RE.is_match(&text) {
        draft.video_support = Some("yes".to_string());
        notes.push("Video support wording found".to_string());
    }

    if let Some(rank) = resolution_rank(&text) {
        draft.max_resolution = resolution_label(rank).map(ToString::to_string);
        if draft.video_support.is_none() {
            draft.video_support = Some("yes".to_string());
        }
        notes.push(format!(
            "Resolution {} mentioned",
            draft.max_resolution.as_deref().unwrap_or("?")
        ));
    }
    if let Some(hz) = parse_refresh_hz(&text) {
        draft.max_refresh_hz = Some(format_number(hz));
        if draft.video_support.is_none() {
            draft.video_support = Some("yes".to_string());
        }
    }

    // A Lightning end caps everything: USB 2.0 generation, 0.48 Gbps, no
    // video, regardless of other wording.
    let has_lightning = draft.connector_from == Some(Connector::Lightning)
        || draft.connector_to == Some(Connector::Lightning);
    if has_lightning {
        draft.usb_generation = Some(LIGHTNING_GENERATION.to_string());
        draft.gbps = Some("0.48".to_string());
        draft.video_support = Some("no".to_string());
        notes.push("Lightning end caps data at USB 2.0".to_string());
    }

    let uncertainties = unresolved_categories(&draft);
    let resolved = 4 - uncertainties.len();

    let mut confidence = 0.17f64.mul_add(resolved as f64, 0.23);
    if single_connector_mention {
        confidence -= 0.06;
    }
    if !notes.is_empty() {
        confidence += 0.06;
    }
    let confidence = confidence.clamp(0.0, 0.99);

    DeterministicOutcome {
        draft,
        notes,
        uncertainties,
        confidence,
        single_connector_mention,
    }
}

/// Categories whose representative draft fields are still unset.
#[must_use]
pub fn unresolved_categories(draft: &CableDraft) -> Vec<UncertaintyCategory> {
    let mut out = Vec::new();
    if draft.watts.is_none() && draft.data_only != Some(true) {
        out.push(UncertaintyCategory::Power);
    }
    if draft.gbps.is_none() && draft.usb_generation.is_none() {
        out.push(UncertaintyCategory::Data);
    }
    if draft.video_support.is_none() {
        out.push(UncertaintyCategory::Video);
    }
    if draft.connector_from.is_none() || draft.connector_to.is_none() {
        out.push(UncertaintyCategory::Connector);
    }
    out
}
