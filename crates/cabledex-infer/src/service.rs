//! Session-level inference service: the public RPC surface.

use crate::deterministic::parse_prompt;
use crate::llm::run_llm_pass;
use crate::merge::{HIGH_THRESHOLD, MEDIUM_THRESHOLD, band_for, clamp_confidence, merge};
use crate::questions::{MAX_FOLLOW_UPS, QUESTION_PRIORITY, build_follow_ups};
use cabledex_core::{
    CableDraft, ConfidenceBand, ManualSession, PersistenceError, QuestionAnswer, QuestionStatus,
    Result, SessionStatus, ValidationError,
};
use cabledex_fetch::redact::redact_error_message;
use cabledex_llm::LlmGateway;
use cabledex_store::CatalogStore;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Confidence bump for a yes/no answer.
const ANSWER_CONFIDENCE_BUMP: f64 = 0.08;
/// Confidence bump for a skip.
const SKIP_CONFIDENCE_BUMP: f64 = 0.03;

/// Normalize a workspace id: sessions are keyed lower-case and trimmed.
#[must_use]
pub fn normalize_workspace_id(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Compact session status for polling UIs.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSummary {
    pub status: SessionStatus,
    pub confidence: f64,
    pub confidence_band: ConfidenceBand,
    pub pending_questions: usize,
    pub answered_question_count: u32,
}

/// Static defaults surfaced to UIs via `get_defaults`.
#[derive(Debug, Clone, Serialize)]
pub struct InferenceDefaults {
    pub connectors: Vec<&'static str>,
    pub medium_band_threshold: f64,
    pub high_band_threshold: f64,
    pub question_priority: Vec<&'static str>,
    pub max_follow_ups: usize,
}

/// Manual inference over per-workspace sessions.
///
/// Constructed without a gateway the service runs deterministic-only, which
/// is also the configuration used when `AI_GATEWAY_API_KEY` is absent.
pub struct InferenceService {
    store: Arc<CatalogStore>,
    gateway: Option<Arc<dyn LlmGateway>>,
    model: String,
}

impl InferenceService {
    #[must_use]
    pub fn new(
        store: Arc<CatalogStore>,
        gateway: Option<Arc<dyn LlmGateway>>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            store,
            gateway,
            model: model.into(),
        }
    }

    /// Fetch or lazily create the session for a workspace.
    pub fn ensure_session(&self, workspace_id: &str) -> ManualSession {
        self.store
            .ensure_session(&normalize_workspace_id(workspace_id), Utc::now())
    }

    #[must_use]
    pub fn get_session(&self, workspace_id: &str) -> Option<ManualSession> {
        self.store.get_session(&normalize_workspace_id(workspace_id))
    }

    /// Merge a caller-supplied patch into the draft (patch fields win).
    ///
    /// # Errors
    ///
    /// `PersistenceError::MissingRow` when no session exists yet.
    pub fn patch_draft(&self, workspace_id: &str, patch: &CableDraft) -> Result<ManualSession> {
        let key = normalize_workspace_id(workspace_id);
        let mut session = self
            .store
            .get_session(&key)
            .ok_or_else(|| PersistenceError::missing("manual_inference_sessions", &key))?;
        session.draft.apply_patch(patch);
        session.updated_at = Utc::now();
        self.store.put_session(session.clone());
        Ok(session)
    }

    /// Drop all inference state and return a fresh idle session.
    pub fn reset_session(&self, workspace_id: &str) -> ManualSession {
        self.store
            .reset_session(&normalize_workspace_id(workspace_id), Utc::now())
    }

    /// Run both inference passes over a prompt and rewrite the session.
    ///
    /// The deterministic pass is pure; the LLM pass is bounded at 8 s. Any
    /// LLM failure (including the bounded abort) records the error on the
    /// session, transitions it to `failed`, and re-raises for the caller.
    ///
    /// # Errors
    ///
    /// `ValidationError::EmptyPrompt` for blank prompts (rejected before
    /// any session write or LLM call); LLM errors as described above.
    pub async fn submit_prompt(&self, workspace_id: &str, prompt: &str) -> Result<ManualSession> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ValidationError::EmptyPrompt.into());
        }
        let key = normalize_workspace_id(workspace_id);

        let mut session = self.store.ensure_session(&key, Utc::now());
        session.status = SessionStatus::InferenceRunning;
        session.prompt = Some(prompt.to_string());
        session.last_error = None;
        session.updated_at = Utc::now();
        self.store.put_session(session.clone());

        let deterministic = parse_prompt(prompt);

        let llm = match &self.gateway {
            Some(gateway) => {
                match run_llm_pass(gateway.as_ref(), &self.model, prompt).await {
                    Ok(inference) => Some(inference),
                    Err(err) => {
                        let message = redact_error_message(&err.to_string());
                        warn!(workspace = %key, error = %message, "inference LLM pass failed");
                        session.status = SessionStatus::Failed;
                        session.last_error = Some(message);
                        session.updated_at = Utc::now();
                        self.store.put_session(session);
                        return Err(err);
                    }
                }
            }
            None => None,
        };

        let merged = merge(&deterministic, llm.as_ref());
        let questions = build_follow_ups(&merged.uncertainties, &merged.draft);

        session.draft = merged.draft;
        session.confidence = merged.confidence;
        session.confidence_band = merged.band;
        session.notes = if merged.notes.is_empty() {
            None
        } else {
            Some(merged.notes.join("; "))
        };
        session.llm_used = merged.llm_used;
        session.answered_question_count = 0;
        session.status = if !questions.is_empty() && merged.confidence < HIGH_THRESHOLD {
            SessionStatus::NeedsFollowup
        } else {
            SessionStatus::Ready
        };
        session.follow_up_questions = questions;
        session.updated_at = Utc::now();

        info!(
            workspace = %key,
            confidence = session.confidence,
            status = ?session.status,
            questions = session.follow_up_questions.len(),
            "inference completed"
        );
        self.store.put_session(session.clone());
        Ok(session)
    }

    /// Apply one follow-up answer: mutate the draft with the chosen branch
    /// patch, mark the question answered, bump confidence (never down), and
    /// recompute the status from the remaining pending count.
    ///
    /// # Errors
    ///
    /// `PersistenceError::MissingRow` for an unknown workspace,
    /// `ValidationError` for an unknown or already-answered question id.
    pub fn answer_question(
        &self,
        workspace_id: &str,
        question_id: &str,
        answer: QuestionAnswer,
    ) -> Result<ManualSession> {
        let key = normalize_workspace_id(workspace_id);
        let mut session = self
            .store
            .get_session(&key)
            .ok_or_else(|| PersistenceError::missing("manual_inference_sessions", &key))?;

        let question = session
            .follow_up_questions
            .iter_mut()
            .find(|q| q.id == question_id)
            .ok_or_else(|| ValidationError::UnknownQuestion {
                question_id: question_id.to_string(),
            })?;
        if question.status == QuestionStatus::Answered {
            return Err(ValidationError::InvalidArgument {
                name: "question_id",
                reason: format!("question {question_id} was already answered"),
            }
            .into());
        }

        let patch = match answer {
            QuestionAnswer::Yes => question.apply_if_yes.clone(),
            QuestionAnswer::No => question.apply_if_no.clone(),
            QuestionAnswer::Skip => question.apply_if_skip.clone(),
        };
        question.status = QuestionStatus::Answered;

        session.draft.apply_patch(&patch);
        session.answered_question_count += 1;

        let bump = match answer {
            QuestionAnswer::Skip => SKIP_CONFIDENCE_BUMP,
            _ => ANSWER_CONFIDENCE_BUMP,
        };
        session.confidence = clamp_confidence(session.confidence + bump);
        session.confidence_band = band_for(session.confidence);

        let pending = session
            .follow_up_questions
            .iter()
            .filter(|q| q.status == QuestionStatus::Pending)
            .count();
        session.status = if pending > 0 && session.confidence < HIGH_THRESHOLD {
            SessionStatus::NeedsFollowup
        } else {
            SessionStatus::Ready
        };
        session.updated_at = Utc::now();

        self.store.put_session(session.clone());
        Ok(session)
    }

    /// Status summary for a workspace (lazily creating the session).
    pub fn get_status_summary(&self, workspace_id: &str) -> StatusSummary {
        let session = self.ensure_session(workspace_id);
        StatusSummary {
            status: session.status,
            confidence: session.confidence,
            confidence_band: session.confidence_band,
            pending_questions: session
                .follow_up_questions
                .iter()
                .filter(|q| q.status == QuestionStatus::Pending)
                .count(),
            answered_question_count: session.answered_question_count,
        }
    }

    /// Inference defaults for UI consumption.
    #[must_use]
    pub fn get_defaults() -> InferenceDefaults {
        InferenceDefaults {
            connectors: vec!["USB-C", "USB-A", "Lightning", "Micro-USB"],
            medium_band_threshold: MEDIUM_THRESHOLD,
            high_band_threshold: HIGH_THRESHOLD,
            question_priority: QUESTION_PRIORITY.iter().map(|c| c.as_str()).collect(),
            max_follow_ups: MAX_FOLLOW_UPS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cabledex_core::{CabledexError, Connector};
    use cabledex_llm::testing::{ScriptedReply, StaticGateway};
    use serde_json::json;

    fn det_only_service() -> InferenceService {
        InferenceService::new(
            Arc::new(CatalogStore::new()),
            None,
            "anthropic/claude-3-5-haiku",
        )
    }

    fn service_with(gateway: StaticGateway) -> InferenceService {
        InferenceService::new(
            Arc::new(CatalogStore::new()),
            Some(Arc::new(gateway)),
            "anthropic/claude-3-5-haiku",
        )
    }

    #[tokio::test]
    async fn rich_prompt_goes_straight_to_ready() {
        let svc = det_only_service();
        let session = svc
            .submit_prompt("Acme", "USB-C to USB-C braided cable, 240W PD, USB4, 8K 120Hz")
            .await
            .unwrap();

        assert_eq!(session.status, SessionStatus::Ready);
        assert!(session.confidence > 0.7);
        assert!(session.follow_up_questions.len() <= 1);
        assert!(!session.llm_used);
        assert_eq!(session.draft.connector_from, Some(Connector::UsbC));
    }

    #[tokio::test]
    async fn vague_prompt_needs_followup_with_at_most_three_questions() {
        let svc = det_only_service();
        let session = svc.submit_prompt("acme", "old white cable").await.unwrap();

        assert_eq!(session.status, SessionStatus::NeedsFollowup);
        assert!(!session.follow_up_questions.is_empty());
        assert!(session.follow_up_questions.len() <= 3);
        assert_eq!(session.confidence_band, ConfidenceBand::Low);
    }

    #[tokio::test]
    async fn empty_prompt_is_rejected_without_touching_anything() {
        let gateway = StaticGateway::new();
        let svc = service_with(gateway);

        let err = svc.submit_prompt("acme", "   ").await.unwrap_err();
        assert!(matches!(
            err,
            CabledexError::Validation(ValidationError::EmptyPrompt)
        ));
        assert!(svc.get_session("acme").is_none());
    }

    #[tokio::test]
    async fn llm_patch_fills_gaps_and_blends_confidence() {
        let gateway = StaticGateway::answering(json!({
            "confidence": 0.9,
            "draftPatch": {"videoSupport": "no", "gbps": "0.48", "usbGeneration": "USB 2.0"},
            "uncertainties": [],
        }));
        let svc = service_with(gateway);

        let session = svc
            .submit_prompt("acme", "usb-c to usb-a 60w charging cable")
            .await
            .unwrap();

        assert!(session.llm_used);
        assert_eq!(session.draft.video_support.as_deref(), Some("no"));
        // Deterministic watts survive the merge.
        assert_eq!(session.draft.watts.as_deref(), Some("60"));
        assert_eq!(session.status, SessionStatus::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_llm_fails_the_session_and_reraises() {
        let gateway = StaticGateway::new().with_scripted(ScriptedReply::Hang);
        let svc = service_with(gateway);

        let err = svc
            .submit_prompt("acme", "usb-c mystery cable")
            .await
            .unwrap_err();
        assert!(matches!(err, CabledexError::Timeout(_)));

        let session = svc.get_session("acme").unwrap();
        assert_eq!(session.status, SessionStatus::Failed);
        assert!(session.last_error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn answering_questions_is_monotonic_and_drains_to_ready() {
        let svc = det_only_service();
        let session = svc.submit_prompt("acme", "old white cable").await.unwrap();
        let mut confidence = session.confidence;
        let ids: Vec<String> = session
            .follow_up_questions
            .iter()
            .map(|q| q.id.clone())
            .collect();

        for (index, id) in ids.iter().enumerate() {
            let session = svc
                .answer_question("acme", id, QuestionAnswer::Yes)
                .unwrap();
            assert!(
                session.confidence >= confidence,
                "answer must never decrease confidence"
            );
            confidence = session.confidence;

            let answered = session
                .follow_up_questions
                .iter()
                .filter(|q| q.status == QuestionStatus::Answered)
                .count();
            assert_eq!(answered, index + 1);
        }

        let session = svc.get_session("acme").unwrap();
        assert_eq!(session.status, SessionStatus::Ready);
        assert_eq!(session.answered_question_count as usize, ids.len());
    }

    #[tokio::test]
    async fn yes_answers_apply_their_patch() {
        let svc = det_only_service();
        let session = svc.submit_prompt("acme", "old white cable").await.unwrap();
        assert!(session.draft.watts.is_none());

        let session = svc
            .answer_question("acme", "followup-power", QuestionAnswer::Yes)
            .unwrap();
        assert_eq!(session.draft.watts.as_deref(), Some("100"));
        assert_eq!(session.draft.data_only, Some(false));
    }

    #[tokio::test]
    async fn skip_bumps_less_than_an_answer() {
        let svc = det_only_service();
        let before = svc
            .submit_prompt("skipper", "old white cable")
            .await
            .unwrap();

        let after_skip = svc
            .answer_question("skipper", "followup-power", QuestionAnswer::Skip)
            .unwrap();
        assert!((after_skip.confidence - (before.confidence + 0.03)).abs() < 1e-9);
        // Skip leaves the draft untouched.
        assert!(after_skip.draft.watts.is_none());

        let after_no = svc
            .answer_question("skipper", "followup-data", QuestionAnswer::No)
            .unwrap();
        assert!((after_no.confidence - (after_skip.confidence + 0.08)).abs() < 1e-9);
        assert_eq!(after_no.draft.gbps.as_deref(), Some("0.48"));
    }

    #[tokio::test]
    async fn double_answering_a_question_is_rejected() {
        let svc = det_only_service();
        svc.submit_prompt("acme", "old white cable").await.unwrap();
        svc.answer_question("acme", "followup-power", QuestionAnswer::Yes)
            .unwrap();

        let err = svc
            .answer_question("acme", "followup-power", QuestionAnswer::No)
            .unwrap_err();
        assert!(matches!(err, CabledexError::Validation(_)));

        let err = svc
            .answer_question("acme", "followup-nonsense", QuestionAnswer::Yes)
            .unwrap_err();
        assert!(matches!(
            err,
            CabledexError::Validation(ValidationError::UnknownQuestion { .. })
        ));
    }

    #[tokio::test]
    async fn confidence_never_exceeds_the_clamp() {
        let svc = det_only_service();
        let session = svc
            .submit_prompt("acme", "usb-c to usb-c 240w usb4 4k 120hz cable")
            .await
            .unwrap();
        assert!(session.confidence <= 0.99);
    }

    #[tokio::test]
    async fn workspace_ids_normalize_to_one_session() {
        let svc = det_only_service();
        svc.submit_prompt("  ACME  ", "usb-c cable").await.unwrap();

        let session = svc.get_session("acme").unwrap();
        assert_eq!(session.workspace_id, "acme");
        assert!(svc.get_session("AcMe").is_some());
    }

    #[tokio::test]
    async fn reset_returns_a_fresh_idle_session() {
        let svc = det_only_service();
        svc.submit_prompt("acme", "usb-c to usb-c 100w cable")
            .await
            .unwrap();

        let fresh = svc.reset_session("acme");
        assert_eq!(fresh.status, SessionStatus::Idle);
        assert_eq!(fresh.confidence, 0.0);
        assert!(fresh.prompt.is_none());
        assert!(fresh.follow_up_questions.is_empty());
    }

    #[tokio::test]
    async fn patch_draft_overrides_fields() {
        let svc = det_only_service();
        svc.submit_prompt("acme", "usb-c cable").await.unwrap();

        let patched = svc
            .patch_draft(
                "acme",
                &CableDraft {
                    watts: Some("65".to_string()),
                    ..CableDraft::default()
                },
            )
            .unwrap();
        assert_eq!(patched.draft.watts.as_deref(), Some("65"));

        // Unknown workspace has no session to patch.
        assert!(svc.patch_draft("ghost", &CableDraft::default()).is_err());
    }

    #[tokio::test]
    async fn status_summary_reflects_the_session() {
        let svc = det_only_service();
        svc.submit_prompt("acme", "old white cable").await.unwrap();

        let summary = svc.get_status_summary("acme");
        assert_eq!(summary.status, SessionStatus::NeedsFollowup);
        assert!(summary.pending_questions > 0);
        assert_eq!(summary.answered_question_count, 0);

        let defaults = InferenceService::get_defaults();
        assert_eq!(defaults.question_priority, vec!["power", "data", "video", "connector"]);
        assert!(defaults.connectors.contains(&"USB-C"));
    }
}
