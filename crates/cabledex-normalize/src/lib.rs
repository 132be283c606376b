//! Pure capability normalizers.
//!
//! Every function here is deterministic over its string input: no hidden
//! state, all regexes compiled once at module load. These back both the
//! vendor extractors and the manual inference parser, and enforce the
//! physical ceilings the connectors impose (a Lightning end caps data at
//! USB 2.0 speeds regardless of what the marketing copy claims).

use cabledex_core::{Connector, DataSpec};
use once_cell::sync::Lazy;
use regex::Regex;

/// Generation label used when a Lightning end forces the USB 2.0 ceiling.
pub const LIGHTNING_GENERATION: &str = "USB 2.0 (Lightning ceiling)";

/// Data ceiling for Lightning cables, in Gbps.
pub const LIGHTNING_MAX_GBPS: f64 = 0.48;

static NUMBER_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").unwrap());

static EXPLICIT_GBPS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*gbps").unwrap());

static REFRESH_HZ: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*hz").unwrap());

/// Generation hint table, checked independently; the maximum match wins.
///
/// "Gen 2" intentionally also matches inside "Gen 2x2": the 2x2 row scores
/// higher and max semantics pick it, which sidesteps lookahead.
static GENERATION_HINTS: Lazy<Vec<(Regex, f64)>> = Lazy::new(|| {
    [
        (r"(?i)usb\s*4\s*(?:v|version\s*)?2|usb4\s+2\.0|thunderbolt\s*5|\btb\s*5\b", 80.0),
        (r"(?i)usb\s*4|thunderbolt\s*[34]|\btb\s*[34]\b", 40.0),
        (r"(?i)gen\s*2\s*[x×]\s*2", 20.0),
        (r"(?i)gen\s*2", 10.0),
        (r"(?i)usb\s*3(?:\.\d)?\b|gen\s*1|superspeed", 5.0),
        (r"(?i)usb\s*2(?:\.0)?\b|hi-?speed", 0.48),
    ]
    .into_iter()
    .map(|(pattern, gbps)| (Regex::new(pattern).unwrap(), gbps))
    .collect()
});

/// Return the maximum non-negative numeric token in `s`, if any.
///
/// `"60, 100, 240W"` parses to `240.0`; an empty or tokenless string parses
/// to `None`.
#[must_use]
pub fn parse_positive_number(s: &str) -> Option<f64> {
    NUMBER_TOKEN
        .find_iter(s)
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .filter(|n| n.is_finite() && *n >= 0.0)
        .fold(None, |acc, n| match acc {
            Some(best) if best >= n => Some(best),
            _ => Some(n),
        })
}

/// Normalize a connector mention to the enumerated set.
///
/// Matching is case- and whitespace-insensitive and tolerates the common
/// "lightening" misspelling. Anything outside the alias table is `Unknown`.
#[must_use]
pub fn normalize_connector(s: &str) -> Connector {
    let key: String = s
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();

    match key.as_str() {
        "usbc" | "typec" | "usbtypec" | "cport" => Connector::UsbC,
        "usba" | "typea" | "usbtypea" => Connector::UsbA,
        "lightning" | "lightening" => Connector::Lightning,
        "microusb" | "usbmicro" | "microb" | "usbmicrob" => Connector::MicroUsb,
        _ => Connector::Unknown,
    }
}

/// Infer the maximum Gbps a marketing string implies.
///
/// Two passes: generation hints first (USB4 v2/TB5 -> 80, USB4/TB4/TB3 -> 40,
/// Gen 2x2 -> 20, Gen 2 -> 10, USB 3.x/Gen 1 -> 5, USB 2 -> 0.48), keeping
/// the maximum match; then explicit `NN Gbps` tokens. When both are present
/// the result is the max of the two, so an explicit token can only raise the
/// inferred value.
#[must_use]
pub fn infer_max_gbps_from_generation(s: &str) -> Option<f64> {
    let inferred = GENERATION_HINTS
        .iter()
        .filter(|(re, _)| re.is_match(s))
        .map(|(_, gbps)| *gbps)
        .fold(None::<f64>, |acc, g| Some(acc.map_or(g, |a| a.max(g))));

    let explicit = EXPLICIT_GBPS
        .captures_iter(s)
        .filter_map(|c| c[1].parse::<f64>().ok())
        .fold(None::<f64>, |acc, g| Some(acc.map_or(g, |a| a.max(g))));

    match (explicit, inferred) {
        (Some(e), Some(i)) => Some(e.max(i)),
        (Some(e), None) => Some(e),
        (None, i) => i,
    }
}

/// Ordinal resolution rank: 720p=1, 1080p=2, 1440p=3, 4K=4, 5K=5, 8K=6.
///
/// Named tokens win; bare `<number>p` tokens fall back to bucketed
/// thresholds. The maximum rank mentioned anywhere in the string is returned.
#[must_use]
pub fn resolution_rank(s: &str) -> Option<u8> {
    static NAMED: Lazy<Vec<(Regex, u8)>> = Lazy::new(|| {
        [
            (r"(?i)\b8k\b|4320p", 6u8),
            (r"(?i)\b5k\b|2880p", 5),
            (r"(?i)\b4k\b|2160p|\buhd\b|ultra\s*hd", 4),
            (r"(?i)1440p|\b2k\b|\bqhd\b", 3),
            (r"(?i)1080p|\bfhd\b|full\s*hd", 2),
            (r"(?i)720p\b|\bhd\b", 1),
        ]
        .into_iter()
        .map(|(pattern, rank)| (Regex::new(pattern).unwrap(), rank))
        .collect()
    });
    static BARE_P: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(\d{3,4})\s*p\b").unwrap());

    let named = NAMED
        .iter()
        .filter(|(re, _)| re.is_match(s))
        .map(|(_, rank)| *rank)
        .max();

    let bare = BARE_P
        .captures_iter(s)
        .filter_map(|c| c[1].parse::<u32>().ok())
        .map(|lines| match lines {
            n if n >= 4320 => 6,
            n if n >= 2880 => 5,
            n if n >= 2160 => 4,
            n if n >= 1440 => 3,
            n if n >= 1080 => 2,
            _ => 1,
        })
        .max();

    named.max(bare)
}

/// Canonical label for a resolution rank produced by [`resolution_rank`].
#[must_use]
pub const fn resolution_label(rank: u8) -> Option<&'static str> {
    match rank {
        1 => Some("720p"),
        2 => Some("1080p"),
        3 => Some("1440p"),
        4 => Some("4K"),
        5 => Some("5K"),
        6 => Some("8K"),
        _ => None,
    }
}

/// Parse the maximum refresh-rate token (`NN Hz`) from a string.
#[must_use]
pub fn parse_refresh_hz(s: &str) -> Option<f64> {
    REFRESH_HZ
        .captures_iter(s)
        .filter_map(|c| c[1].parse::<f64>().ok())
        .fold(None::<f64>, |acc, hz| Some(acc.map_or(hz, |a| a.max(hz))))
}

/// Enforce the physical ceiling a Lightning end imposes on a data spec.
///
/// If either connector is Lightning, `max_gbps` clamps to 0.48 and the
/// generation is forced to mention "USB 2.0" when it does not already.
pub fn clamp_data_capability_by_connector(from: Connector, to: Connector, data: &mut DataSpec) {
    if !from.is_lightning() && !to.is_lightning() {
        return;
    }

    data.max_gbps = Some(
        data.max_gbps
            .map_or(LIGHTNING_MAX_GBPS, |g| g.min(LIGHTNING_MAX_GBPS)),
    );

    let mentions_usb2 = data
        .usb_generation
        .as_deref()
        .is_some_and(|g| g.contains("USB 2.0"));
    if !mentions_usb2 {
        data.usb_generation = Some(LIGHTNING_GENERATION.to_string());
    }
}
