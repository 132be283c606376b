//! Merging the deterministic and LLM passes.

use crate::deterministic::{DeterministicOutcome, unresolved_categories};
use crate::llm::LlmInference;
use cabledex_core::{CableDraft, ConfidenceBand, UncertaintyCategory};

/// Confidence below this is `low`.
pub const MEDIUM_THRESHOLD: f64 = 0.55;
/// Confidence at or above this is `high`; also the ready/needs-followup cut.
pub const HIGH_THRESHOLD: f64 = 0.78;

/// Weight of the deterministic confidence when an LLM result is present.
const DETERMINISTIC_WEIGHT: f64 = 0.35;
const LLM_WEIGHT: f64 = 0.65;

/// Result of merging both passes.
#[derive(Debug, Clone)]
pub struct MergedInference {
    pub draft: CableDraft,
    /// Clamped to `[0, 0.99]`.
    pub confidence: f64,
    pub band: ConfidenceBand,
    pub uncertainties: Vec<UncertaintyCategory>,
    pub notes: Vec<String>,
    pub llm_used: bool,
}

/// Clamp a session confidence into its legal range.
#[must_use]
pub fn clamp_confidence(confidence: f64) -> f64 {
    confidence.clamp(0.0, 0.99)
}

/// Discretize a confidence value for UI presentation.
#[must_use]
pub fn band_for(confidence: f64) -> ConfidenceBand {
    if confidence < MEDIUM_THRESHOLD {
        ConfidenceBand::Low
    } else if confidence < HIGH_THRESHOLD {
        ConfidenceBand::Medium
    } else {
        ConfidenceBand::High
    }
}

/// Merge field-by-field: deterministic values win where set, the LLM patch
/// fills the rest. Uncertainties are the union of both passes plus any
/// category whose representative draft field is still unset after the merge.
#[must_use]
pub fn merge(deterministic: &DeterministicOutcome, llm: Option<&LlmInference>) -> MergedInference {
    let mut draft = deterministic.draft.clone();
    let mut notes = deterministic.notes.clone();

    if let Some(llm) = llm {
        draft.fill_missing_from(&llm.draft_patch);
        if let Some(note) = &llm.notes {
            notes.push(note.clone());
        }
    }

    let mut uncertainties: Vec<UncertaintyCategory> = Vec::new();
    let mut add_all = |categories: &[UncertaintyCategory]| {
        for category in categories {
            if !uncertainties.contains(category) {
                uncertainties.push(*category);
            }
        }
    };
    add_all(&deterministic.uncertainties);
    if let Some(llm) = llm {
        add_all(&llm.uncertainties);
    }
    add_all(&unresolved_categories(&draft));

    let confidence = match llm {
        Some(llm) => {
            deterministic
                .confidence
                .mul_add(DETERMINISTIC_WEIGHT, llm.confidence * LLM_WEIGHT)
        }
        None => deterministic.confidence,
    };
    let confidence = clamp_confidence(confidence);

    MergedInference {
        draft,
        confidence,
        band: band_for(confidence),
        uncertainties,
        notes,
        llm_used: llm.is_some(),
    }
}
