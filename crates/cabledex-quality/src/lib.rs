//! Quality gating for cable variants.
//!
//! [`assess`] is a pure function over the fields a variant and its freshly
//! parsed spec expose. It emits an issue list; the variant is `Ready` iff
//! that list is empty (the two are never allowed to disagree — the state is
//! derived, not stored independently).

use cabledex_core::{Connector, QualityState, field_paths};
use serde::Serialize;

/// Values treated as absent for brand/model checks.
const PLACEHOLDER_VALUES: [&str; 4] = ["unknown", "n/a", "none", "null"];

/// One detected quality issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum QualityIssue {
    MissingBrand,
    MissingModel,
    MissingConnectorFrom,
    MissingConnectorTo,
    MissingProductUrl,
    MissingImages,
    MissingEvidence,
    /// Critical evidence paths absent from the spec's evidence refs.
    MissingCriticalEvidence(Vec<String>),
    /// Both ends USB-C but no positive wattage extracted.
    MissingUsbCPower,
}

impl QualityIssue {
    /// Stable string code stored on the variant row.
    #[must_use]
    pub fn code(&self) -> String {
        match self {
            Self::MissingBrand => "missing_brand".to_string(),
            Self::MissingModel => "missing_model".to_string(),
            Self::MissingConnectorFrom => "missing_connector_from".to_string(),
            Self::MissingConnectorTo => "missing_connector_to".to_string(),
            Self::MissingProductUrl => "missing_product_url".to_string(),
            Self::MissingImages => "missing_images".to_string(),
            Self::MissingEvidence => "missing_evidence".to_string(),
            Self::MissingCriticalEvidence(paths) => {
                format!("missing_critical_evidence:{}", paths.join(","))
            }
            Self::MissingUsbCPower => "missing_usb_c_power".to_string(),
        }
    }
}

/// Assessment result: derived state plus the issues that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub state: QualityState,
    pub issues: Vec<QualityIssue>,
}

impl QualityReport {
    /// Issue codes in detection order, as stored on the variant row.
    #[must_use]
    pub fn issue_codes(&self) -> Vec<String> {
        self.issues.iter().map(QualityIssue::code).collect()
    }

    /// The first issue, used as the enrichment job reason.
    #[must_use]
    pub fn first_issue_code(&self) -> Option<String> {
        self.issues.first().map(QualityIssue::code)
    }
}

/// Inputs to an assessment: the merged variant plus the parsed spec's power
/// and evidence.
#[derive(Debug, Clone)]
pub struct QualityInput<'a> {
    pub brand: &'a str,
    pub model: &'a str,
    pub connector_from: Connector,
    pub connector_to: Connector,
    pub product_url: Option<&'a str>,
    pub image_urls: &'a [String],
    pub max_watts: Option<f64>,
    /// Field paths present in the spec's evidence refs.
    pub evidence_paths: Vec<&'a str>,
}

fn is_placeholder(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty()
        || PLACEHOLDER_VALUES
            .iter()
            .any(|p| trimmed.eq_ignore_ascii_case(p))
}

/// Compute the quality state and issue list for a variant + spec.
#[must_use]
pub fn assess(input: &QualityInput<'_>) -> QualityReport {
    let mut issues = Vec::new();

    if is_placeholder(input.brand) {
        issues.push(QualityIssue::MissingBrand);
    }
    if is_placeholder(input.model) {
        issues.push(QualityIssue::MissingModel);
    }
    if input.connector_from == Connector::Unknown {
        issues.push(QualityIssue::MissingConnectorFrom);
    }
    if input.connector_to == Connector::Unknown {
        issues.push(QualityIssue::MissingConnectorTo);
    }
    if input.product_url.is_none_or(|u| u.trim().is_empty()) {
        issues.push(QualityIssue::MissingProductUrl);
    }
    if input.image_urls.is_empty() {
        issues.push(QualityIssue::MissingImages);
    }

    if input.evidence_paths.is_empty() {
        issues.push(QualityIssue::MissingEvidence);
    } else {
        let missing: Vec<String> = field_paths::CRITICAL
            .iter()
            .filter(|critical| !input.evidence_paths.iter().any(|p| p == *critical))
            .map(ToString::to_string)
            .collect();
        if !missing.is_empty() {
            issues.push(QualityIssue::MissingCriticalEvidence(missing));
        }
    }

    if input.connector_from == Connector::UsbC
        && input.connector_to == Connector::UsbC
        && input.max_watts.unwrap_or(0.0) <= 0.0
    {
        issues.push(QualityIssue::MissingUsbCPower);
    }

    let state = if issues.is_empty() {
        QualityState::Ready
    } else {
        QualityState::NeedsEnrichment
    };

    QualityReport { state, issues }
}
