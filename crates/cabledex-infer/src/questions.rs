//! Follow-up question generation.

use cabledex_core::{CableDraft, FollowUpQuestion, QuestionStatus, UncertaintyCategory};

/// Categories in the order questions are asked.
pub const QUESTION_PRIORITY: [UncertaintyCategory; 4] = [
    UncertaintyCategory::Power,
    UncertaintyCategory::Data,
    UncertaintyCategory::Video,
    UncertaintyCategory::Connector,
];

/// At most this many questions per inference run.
pub const MAX_FOLLOW_UPS: usize = 3;

/// Build the follow-up questions for an uncertainty set: the first three
/// categories in priority order, one canned question each.
#[must_use]
pub fn build_follow_ups(
    uncertainties: &[UncertaintyCategory],
    draft: &CableDraft,
) -> Vec<FollowUpQuestion> {
    QUESTION_PRIORITY
        .iter()
        .filter(|category| uncertainties.contains(category))
        .take(MAX_FOLLOW_UPS)
        .map(|category| question_for(*category, draft))
        .collect()
}

fn question_for(category: UncertaintyCategory, draft: &CableDraft) -> FollowUpQuestion {
    let (question, apply_if_yes, apply_if_no) = match category {
        UncertaintyCategory::Power => (
            "Is the cable rated for fast charging (60W or more)?".to_string(),
            CableDraft {
                watts: Some("100".to_string()),
                data_only: Some(false),
                ..CableDraft::default()
            },
            CableDraft {
                watts: Some("30".to_string()),
                data_only: Some(false),
                ..CableDraft::default()
            },
        ),
        UncertaintyCategory::Data => (
            "Is it a high-speed data cable (10Gbps or faster)?".to_string(),
            CableDraft {
                gbps: Some("10".to_string()),
                usb_generation: Some("USB 3.2 Gen 2".to_string()),
                ..CableDraft::default()
            },
            CableDraft {
                gbps: Some("0.48".to_string()),
                usb_generation: Some("USB 2.0".to_string()),
                ..CableDraft::default()
            },
        ),
        UncertaintyCategory::Video => (
            "Can it drive an external display (video or Alt Mode)?".to_string(),
            CableDraft {
                video_support: Some("yes".to_string()),
                ..CableDraft::default()
            },
            CableDraft {
                video_support: Some("no".to_string()),
                ..CableDraft::default()
            },
        ),
        UncertaintyCategory::Connector => {
            // When one end is known, "yes" mirrors it to the other end.
            let known = draft.connector_from.or(draft.connector_to);
            let yes = CableDraft {
                connector_from: known,
                connector_to: known,
                ..CableDraft::default()
            };
            (
                "Are both ends the same connector type?".to_string(),
                yes,
                CableDraft::default(),
            )
        }
    };

    FollowUpQuestion {
        id: format!("followup-{}", category.as_str()),
        category,
        question,
        status: QuestionStatus::Pending,
        apply_if_yes,
        apply_if_no,
        apply_if_skip: CableDraft::default(),
    }
}
