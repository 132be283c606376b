//! Row types and shared shapes for the cable catalog.

use crate::ids::{EvidenceId, JobId, SpecId, VariantId, WorkflowId, WorkflowItemId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type used on every row.
pub type Timestamp = DateTime<Utc>;

/// Connector types recognized by the catalog.
///
/// Anything outside this set normalizes to `Unknown`; the catalog makes no
/// attempt to model exotic connectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Connector {
    #[serde(rename = "USB-C")]
    UsbC,
    #[serde(rename = "USB-A")]
    UsbA,
    Lightning,
    #[serde(rename = "Micro-USB")]
    MicroUsb,
    Unknown,
}

impl Connector {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UsbC => "USB-C",
            Self::UsbA => "USB-A",
            Self::Lightning => "Lightning",
            Self::MicroUsb => "Micro-USB",
            Self::Unknown => "Unknown",
        }
    }

    /// True when this end caps the cable at USB 2.0 speeds.
    #[must_use]
    pub const fn is_lightning(self) -> bool {
        matches!(self, Self::Lightning)
    }
}

impl fmt::Display for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate status of an ingestion workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Running,
    Completed,
    Failed,
}

/// Status of a single seed-URL item.
///
/// Transitions are monotonic except `Pending -> InProgress`, which repeats
/// once per retry attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl ItemStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Enrichment job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    /// Pending and in-progress jobs count as open; at most one open job may
    /// exist per variant.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }
}

/// Quality state derived from the issue list: `Ready` iff no issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityState {
    Ready,
    NeedsEnrichment,
}

/// One ingestion workflow run over a batch of seed URLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub status: WorkflowStatus,
    pub allowed_domains: Vec<String>,
    pub seed_urls: Vec<String>,
    pub started_at: Timestamp,
    pub finished_at: Option<Timestamp>,
    pub total_items: u32,
    pub completed_items: u32,
    pub failed_items: u32,
    /// First item error observed during the run, if any.
    pub last_error: Option<String>,
}

/// One seed URL inside a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowItem {
    pub id: WorkflowItemId,
    pub workflow_id: WorkflowId,
    pub url: String,
    pub canonical_url: String,
    pub status: ItemStatus,
    /// Strictly increasing across retries.
    pub attempt_count: u32,
    pub evidence_source_id: Option<EvidenceId>,
    pub normalized_spec_id: Option<SpecId>,
    pub last_error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Append-only snapshot of a fetched page. Never mutated after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceSource {
    pub id: EvidenceId,
    pub workflow_id: WorkflowId,
    pub url: String,
    pub canonical_url: String,
    pub fetched_at: Timestamp,
    /// Hex sha-256 over `canonical_url + markdown + html`.
    pub content_hash: String,
    pub html: String,
    pub markdown: String,
}

/// Deduplicated purchasable cable variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CableVariant {
    pub id: VariantId,
    pub brand: String,
    pub model: String,
    pub variant: Option<String>,
    pub sku: Option<String>,
    pub connector_from: Connector,
    pub connector_to: Connector,
    pub product_url: Option<String>,
    /// Grows monotonically as a set across upserts.
    pub image_urls: Vec<String>,
    pub quality_state: QualityState,
    pub quality_issues: Vec<String>,
    pub quality_updated_at: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Power capabilities of a spec.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerSpec {
    pub max_watts: Option<f64>,
    pub pd_supported: Option<bool>,
    pub epr_supported: Option<bool>,
}

/// Data capabilities of a spec.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSpec {
    pub usb_generation: Option<String>,
    pub max_gbps: Option<f64>,
}

/// Video capabilities of a spec.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoSpec {
    pub explicitly_supported: Option<bool>,
    pub max_resolution: Option<String>,
    pub max_refresh_hz: Option<f64>,
}

/// Evidence pointer tying an extracted field to a stored source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRef {
    /// Dotted field path, e.g. `connectorPair.from` or `power.maxWatts`.
    pub field_path: String,
    pub source_id: EvidenceId,
    pub snippet: Option<String>,
}

/// Well-known evidence field paths.
pub mod field_paths {
    pub const BRAND: &str = "brand";
    pub const MODEL: &str = "model";
    pub const CONNECTOR_FROM: &str = "connectorPair.from";
    pub const CONNECTOR_TO: &str = "connectorPair.to";
    pub const POWER_MAX_WATTS: &str = "power.maxWatts";
    pub const DATA_MAX_GBPS: &str = "data.maxGbps";
    pub const VIDEO_SUPPORTED: &str = "video.explicitlySupported";

    /// Paths every extraction must carry evidence for.
    pub const CRITICAL: [&str; 4] = [BRAND, MODEL, CONNECTOR_FROM, CONNECTOR_TO];
}

/// One normalized capability record produced by a successful extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedSpec {
    pub id: SpecId,
    pub workflow_id: WorkflowId,
    pub variant_id: VariantId,
    pub evidence_source_ids: Vec<EvidenceId>,
    pub power: PowerSpec,
    pub data: DataSpec,
    pub video: VideoSpec,
    pub evidence_refs: Vec<EvidenceRef>,
    pub created_at: Timestamp,
}

/// Enrichment job opened when a variant fails quality gating.
///
/// `attempt_count` is cumulative across reopenings: a failed job reopened as
/// `pending` keeps its count, so consumers must treat it as a lifetime total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentJob {
    pub id: JobId,
    pub variant_id: VariantId,
    pub workflow_id: WorkflowId,
    pub status: JobStatus,
    pub reason: Option<String>,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Evidence pointer emitted by an extractor, before the snapshot row exists.
///
/// The store resolves these into [`EvidenceRef`]s once the evidence source id
/// is known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedEvidence {
    pub field_path: String,
    pub snippet: Option<String>,
}

/// One cable candidate produced by a source extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedCable {
    pub brand: String,
    pub model: String,
    pub variant: Option<String>,
    pub sku: Option<String>,
    pub connector_from: Connector,
    pub connector_to: Connector,
    pub product_url: Option<String>,
    pub image_urls: Vec<String>,
    pub power: PowerSpec,
    pub data: DataSpec,
    pub video: VideoSpec,
    pub evidence: Vec<ParsedEvidence>,
}

impl ParsedCable {
    /// True when either end is Lightning, which caps data capability.
    #[must_use]
    pub fn has_lightning_end(&self) -> bool {
        self.connector_from.is_lightning() || self.connector_to.is_lightning()
    }
}

/// Status of a manual inference session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    InferenceRunning,
    NeedsFollowup,
    Ready,
    Failed,
}

/// Coarse banding of a confidence value for UI presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    Low,
    Medium,
    High,
}

/// Uncertainty category an inference run can flag for follow-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UncertaintyCategory {
    Connector,
    Power,
    Data,
    Video,
}

impl UncertaintyCategory {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connector => "connector",
            Self::Power => "power",
            Self::Data => "data",
            Self::Video => "video",
        }
    }
}

/// Draft capability fields under manual inference.
///
/// Numeric fields stay raw strings so partially-specified user input survives
/// round trips; `data_only` distinguishes sync-only cables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CableDraft {
    pub connector_from: Option<Connector>,
    pub connector_to: Option<Connector>,
    pub watts: Option<String>,
    pub usb_generation: Option<String>,
    pub gbps: Option<String>,
    /// "yes" / "no" once resolved.
    pub video_support: Option<String>,
    pub max_resolution: Option<String>,
    pub max_refresh_hz: Option<String>,
    pub data_only: Option<bool>,
}

impl CableDraft {
    /// Overlay `patch` on top of this draft: set fields in the patch win.
    pub fn apply_patch(&mut self, patch: &CableDraft) {
        if patch.connector_from.is_some() {
            self.connector_from = patch.connector_from;
        }
        if patch.connector_to.is_some() {
            self.connector_to = patch.connector_to;
        }
        if patch.watts.is_some() {
            self.watts = patch.watts.clone();
        }
        if patch.usb_generation.is_some() {
            self.usb_generation = patch.usb_generation.clone();
        }
        if patch.gbps.is_some() {
            self.gbps = patch.gbps.clone();
        }
        if patch.video_support.is_some() {
            self.video_support = patch.video_support.clone();
        }
        if patch.max_resolution.is_some() {
            self.max_resolution = patch.max_resolution.clone();
        }
        if patch.max_refresh_hz.is_some() {
            self.max_refresh_hz = patch.max_refresh_hz.clone();
        }
        if patch.data_only.is_some() {
            self.data_only = patch.data_only;
        }
    }

    /// Fill unset fields from `other`, never overwriting set ones.
    pub fn fill_missing_from(&mut self, other: &CableDraft) {
        if self.connector_from.is_none() {
            self.connector_from = other.connector_from;
        }
        if self.connector_to.is_none() {
            self.connector_to = other.connector_to;
        }
        if self.watts.is_none() {
            self.watts = other.watts.clone();
        }
        if self.usb_generation.is_none() {
            self.usb_generation = other.usb_generation.clone();
        }
        if self.gbps.is_none() {
            self.gbps = other.gbps.clone();
        }
        if self.video_support.is_none() {
            self.video_support = other.video_support.clone();
        }
        if self.max_resolution.is_none() {
            self.max_resolution = other.max_resolution.clone();
        }
        if self.max_refresh_hz.is_none() {
            self.max_refresh_hz = other.max_refresh_hz.clone();
        }
        if self.data_only.is_none() {
            self.data_only = other.data_only;
        }
    }
}

/// Answer to a follow-up question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionAnswer {
    Yes,
    No,
    Skip,
}

/// Status of a single follow-up question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    Pending,
    Answered,
}

/// One yes/no/skip follow-up prompt with pre-baked draft patches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowUpQuestion {
    pub id: String,
    pub category: UncertaintyCategory,
    pub question: String,
    pub status: QuestionStatus,
    pub apply_if_yes: CableDraft,
    pub apply_if_no: CableDraft,
    pub apply_if_skip: CableDraft,
}

/// Per-workspace manual inference session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualSession {
    /// Normalized (lower-case, trimmed) workspace id.
    pub workspace_id: String,
    pub draft: CableDraft,
    pub prompt: Option<String>,
    pub status: SessionStatus,
    /// Clamped to `[0, 0.99]` at every write.
    pub confidence: f64,
    pub confidence_band: ConfidenceBand,
    pub notes: Option<String>,
    pub follow_up_questions: Vec<FollowUpQuestion>,
    pub answered_question_count: u32,
    pub llm_used: bool,
    pub last_error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
