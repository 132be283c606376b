//! The catalog store and its operations.

use crate::hash::content_hash;
use crate::merge;
use cabledex_core::{
    CableVariant, EnrichmentJob, EvidenceId, EvidenceRef, EvidenceSource, ItemStatus, JobId,
    JobStatus, ManualSession, NormalizedSpec, ParsedCable, PersistenceError, QualityState,
    SessionStatus, SpecId, Timestamp, VariantId, Workflow, WorkflowId, WorkflowItem,
    WorkflowItemId, WorkflowStatus,
};
use cabledex_normalize::clamp_data_capability_by_connector;
use cabledex_quality::{QualityInput, QualityReport, assess};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tracing::debug;

/// Result of one variant upsert + spec insert.
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub variant: CableVariant,
    pub spec: NormalizedSpec,
    pub quality: QualityReport,
    /// False when an existing variant was merged into.
    pub created_variant: bool,
}

/// Counts of non-terminal enrichment work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EnrichmentQueueSummary {
    pub pending: usize,
    pub in_progress: usize,
    pub failed: usize,
}

#[derive(Default)]
struct CatalogState {
    next_id: HashMap<&'static str, u64>,
    workflows: BTreeMap<u64, Workflow>,
    items: BTreeMap<u64, WorkflowItem>,
    evidence: BTreeMap<u64, EvidenceSource>,
    variants: BTreeMap<u64, CableVariant>,
    specs: BTreeMap<u64, NormalizedSpec>,
    jobs: BTreeMap<u64, EnrichmentJob>,
    sessions: HashMap<String, ManualSession>,
}

impl CatalogState {
    fn assign(&mut self, table: &'static str) -> u64 {
        let next = self.next_id.entry(table).or_insert(0);
        *next += 1;
        *next
    }
}

/// Typed in-memory document store for the catalog.
///
/// All operations lock the whole state once, which gives row-level atomicity
/// and serializes enrichment-job mutations per variant.
#[derive(Default)]
pub struct CatalogStore {
    state: Mutex<CatalogState>,
}

impl CatalogStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ----- workflows -------------------------------------------------------

    pub fn create_workflow(
        &self,
        seed_urls: Vec<String>,
        allowed_domains: Vec<String>,
        now: Timestamp,
    ) -> Workflow {
        let mut state = self.state.lock().unwrap();
        let id = WorkflowId(state.assign("workflows"));
        let workflow = Workflow {
            id,
            status: WorkflowStatus::Running,
            allowed_domains,
            total_items: seed_urls.len() as u32,
            seed_urls,
            started_at: now,
            finished_at: None,
            completed_items: 0,
            failed_items: 0,
            last_error: None,
        };
        state.workflows.insert(id.as_u64(), workflow.clone());
        workflow
    }

    /// # Errors
    ///
    /// `PersistenceError::MissingRow` when the workflow does not exist.
    pub fn add_workflow_item(
        &self,
        workflow_id: WorkflowId,
        url: &str,
        canonical_url: &str,
        now: Timestamp,
    ) -> Result<WorkflowItem, PersistenceError> {
        let mut state = self.state.lock().unwrap();
        if !state.workflows.contains_key(&workflow_id.as_u64()) {
            return Err(PersistenceError::missing("workflows", workflow_id));
        }
        let id = WorkflowItemId(state.assign("workflow_items"));
        let item = WorkflowItem {
            id,
            workflow_id,
            url: url.to_string(),
            canonical_url: canonical_url.to_string(),
            status: ItemStatus::Pending,
            attempt_count: 0,
            evidence_source_id: None,
            normalized_spec_id: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        state.items.insert(id.as_u64(), item.clone());
        Ok(item)
    }

    /// Transition an item to in-progress for a new attempt; returns the new
    /// attempt count (strictly increasing).
    ///
    /// # Errors
    ///
    /// `PersistenceError::MissingRow` when the item does not exist.
    pub fn begin_item_attempt(
        &self,
        item_id: WorkflowItemId,
        now: Timestamp,
    ) -> Result<u32, PersistenceError> {
        let mut state = self.state.lock().unwrap();
        let item = state
            .items
            .get_mut(&item_id.as_u64())
            .ok_or_else(|| PersistenceError::missing("workflow_items", item_id))?;
        item.status = ItemStatus::InProgress;
        item.attempt_count += 1;
        item.updated_at = now;
        Ok(item.attempt_count)
    }

    /// Mark an item completed and bump the workflow's completed counter.
    ///
    /// # Errors
    ///
    /// `PersistenceError::MissingRow` when the item or workflow is gone.
    pub fn complete_item(
        &self,
        item_id: WorkflowItemId,
        evidence_id: EvidenceId,
        spec_id: Option<SpecId>,
        now: Timestamp,
    ) -> Result<(), PersistenceError> {
        let mut state = self.state.lock().unwrap();
        let item = state
            .items
            .get_mut(&item_id.as_u64())
            .ok_or_else(|| PersistenceError::missing("workflow_items", item_id))?;
        item.status = ItemStatus::Completed;
        item.evidence_source_id = Some(evidence_id);
        item.normalized_spec_id = spec_id;
        item.last_error = None;
        item.updated_at = now;
        let workflow_id = item.workflow_id;

        let workflow = state
            .workflows
            .get_mut(&workflow_id.as_u64())
            .ok_or_else(|| PersistenceError::missing("workflows", workflow_id))?;
        workflow.completed_items += 1;
        Ok(())
    }

    /// Mark an item failed, recording the error on the item and propagating
    /// the first observed error to the workflow.
    ///
    /// # Errors
    ///
    /// `PersistenceError::MissingRow` when the item or workflow is gone.
    pub fn fail_item(
        &self,
        item_id: WorkflowItemId,
        error: &str,
        now: Timestamp,
    ) -> Result<(), PersistenceError> {
        let mut state = self.state.lock().unwrap();
        let item = state
            .items
            .get_mut(&item_id.as_u64())
            .ok_or_else(|| PersistenceError::missing("workflow_items", item_id))?;
        item.status = ItemStatus::Failed;
        item.last_error = Some(error.to_string());
        item.updated_at = now;
        let workflow_id = item.workflow_id;

        let workflow = state
            .workflows
            .get_mut(&workflow_id.as_u64())
            .ok_or_else(|| PersistenceError::missing("workflows", workflow_id))?;
        workflow.failed_items += 1;
        if workflow.last_error.is_none() {
            workflow.last_error = Some(error.to_string());
        }
        Ok(())
    }

    /// Finalize a workflow once all items are terminal: `failed` iff any item
    /// failed, else `completed`.
    ///
    /// # Errors
    ///
    /// `PersistenceError::MissingRow` when the workflow does not exist.
    pub fn finalize_workflow(
        &self,
        workflow_id: WorkflowId,
        now: Timestamp,
    ) -> Result<Workflow, PersistenceError> {
        let mut state = self.state.lock().unwrap();
        let workflow = state
            .workflows
            .get_mut(&workflow_id.as_u64())
            .ok_or_else(|| PersistenceError::missing("workflows", workflow_id))?;
        workflow.status = if workflow.failed_items > 0 {
            WorkflowStatus::Failed
        } else {
            WorkflowStatus::Completed
        };
        workflow.finished_at = Some(now);
        Ok(workflow.clone())
    }

    /// # Errors
    ///
    /// `PersistenceError::MissingRow` when the workflow does not exist.
    pub fn workflow(&self, workflow_id: WorkflowId) -> Result<Workflow, PersistenceError> {
        let state = self.state.lock().unwrap();
        state
            .workflows
            .get(&workflow_id.as_u64())
            .cloned()
            .ok_or_else(|| PersistenceError::missing("workflows", workflow_id))
    }

    /// Most recently started workflow, if any (`by_started_at` lookup).
    #[must_use]
    pub fn latest_workflow(&self) -> Option<Workflow> {
        let state = self.state.lock().unwrap();
        state.workflows.values().next_back().cloned()
    }

    /// Items belonging to a workflow, in creation order (`by_workflow`).
    #[must_use]
    pub fn items_for_workflow(&self, workflow_id: WorkflowId) -> Vec<WorkflowItem> {
        let state = self.state.lock().unwrap();
        state
            .items
            .values()
            .filter(|i| i.workflow_id == workflow_id)
            .cloned()
            .collect()
    }

    /// Failed items for a workflow (`by_workflow_status`).
    #[must_use]
    pub fn failed_items_for_workflow(&self, workflow_id: WorkflowId) -> Vec<WorkflowItem> {
        let state = self.state.lock().unwrap();
        state
            .items
            .values()
            .filter(|i| i.workflow_id == workflow_id && i.status == ItemStatus::Failed)
            .cloned()
            .collect()
    }

    // ----- evidence --------------------------------------------------------

    /// Append an evidence snapshot. Rows are never mutated afterwards.
    pub fn insert_evidence(
        &self,
        workflow_id: WorkflowId,
        url: &str,
        canonical_url: &str,
        markdown: &str,
        html: &str,
        now: Timestamp,
    ) -> EvidenceSource {
        let mut state = self.state.lock().unwrap();
        let id = EvidenceId(state.assign("evidence_sources"));
        let source = EvidenceSource {
            id,
            workflow_id,
            url: url.to_string(),
            canonical_url: canonical_url.to_string(),
            fetched_at: now,
            content_hash: content_hash(canonical_url, markdown, html),
            html: html.to_string(),
            markdown: markdown.to_string(),
        };
        state.evidence.insert(id.as_u64(), source.clone());
        source
    }

    /// # Errors
    ///
    /// `PersistenceError::MissingRow` when the evidence row does not exist.
    pub fn evidence(&self, id: EvidenceId) -> Result<EvidenceSource, PersistenceError> {
        let state = self.state.lock().unwrap();
        state
            .evidence
            .get(&id.as_u64())
            .cloned()
            .ok_or_else(|| PersistenceError::missing("evidence_sources", id))
    }

    /// Hydrate evidence rows, sorted newest fetch first.
    #[must_use]
    pub fn evidence_many(&self, ids: &[EvidenceId]) -> Vec<EvidenceSource> {
        let state = self.state.lock().unwrap();
        let mut rows: Vec<EvidenceSource> = ids
            .iter()
            .filter_map(|id| state.evidence.get(&id.as_u64()).cloned())
            .collect();
        rows.sort_by(|a, b| {
            b.fetched_at
                .cmp(&a.fetched_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        rows
    }

    /// Evidence rows sharing a content hash (`by_content_hash`). Collisions
    /// imply duplicate content and are safe.
    #[must_use]
    pub fn evidence_by_content_hash(&self, hash: &str) -> Vec<EvidenceSource> {
        let state = self.state.lock().unwrap();
        state
            .evidence
            .values()
            .filter(|e| e.content_hash == hash)
            .cloned()
            .collect()
    }

    // ----- variants & specs ------------------------------------------------

    /// Upsert the variant a parsed cable belongs to and insert its spec.
    ///
    /// This is the §-critical write path: variant match, field merge, quality
    /// assessment, spec insert and enrichment-job side effects all commit
    /// under one lock acquisition.
    ///
    /// # Errors
    ///
    /// `PersistenceError::MissingRow` when the workflow does not exist.
    pub fn upsert_variant_and_insert_spec(
        &self,
        workflow_id: WorkflowId,
        source_url: &str,
        evidence_id: EvidenceId,
        parsed: &ParsedCable,
        now: Timestamp,
    ) -> Result<UpsertOutcome, PersistenceError> {
        let mut state = self.state.lock().unwrap();
        if !state.workflows.contains_key(&workflow_id.as_u64()) {
            return Err(PersistenceError::missing("workflows", workflow_id));
        }

        // Physical ceiling guard: a Lightning end caps the stored spec no
        // matter what the extractor produced.
        let mut parsed = parsed.clone();
        clamp_data_capability_by_connector(
            parsed.connector_from,
            parsed.connector_to,
            &mut parsed.data,
        );

        let matched = find_variant_match(&state, &parsed);
        let created_variant = matched.is_none();

        let variant_id = match matched {
            Some(id) => {
                let variant = state
                    .variants
                    .get_mut(&id)
                    .expect("matched variant id is present");
                merge_into_variant(variant, &parsed, source_url, now);
                VariantId(id)
            }
            None => {
                let id = VariantId(state.assign("cable_variants"));
                let variant = CableVariant {
                    id,
                    brand: parsed.brand.clone(),
                    model: parsed.model.clone(),
                    variant: parsed.variant.clone(),
                    sku: parsed.sku.clone(),
                    connector_from: parsed.connector_from,
                    connector_to: parsed.connector_to,
                    product_url: parsed
                        .product_url
                        .clone()
                        .or_else(|| Some(source_url.to_string())),
                    image_urls: parsed.image_urls.clone(),
                    quality_state: QualityState::NeedsEnrichment,
                    quality_issues: Vec::new(),
                    quality_updated_at: now,
                    created_at: now,
                    updated_at: now,
                };
                state.variants.insert(id.as_u64(), variant);
                id
            }
        };

        // Quality assessment runs over the merged variant plus the parsed
        // power and evidence.
        let quality = {
            let variant = state
                .variants
                .get(&variant_id.as_u64())
                .expect("variant row just written");
            assess(&QualityInput {
                brand: &variant.brand,
                model: &variant.model,
                connector_from: variant.connector_from,
                connector_to: variant.connector_to,
                product_url: variant.product_url.as_deref(),
                image_urls: &variant.image_urls,
                max_watts: parsed.power.max_watts,
                evidence_paths: parsed.evidence.iter().map(|e| e.field_path.as_str()).collect(),
            })
        };

        {
            let variant = state
                .variants
                .get_mut(&variant_id.as_u64())
                .expect("variant row just written");
            variant.quality_state = quality.state;
            variant.quality_issues = quality.issue_codes();
            variant.quality_updated_at = now;
        }

        let spec_id = SpecId(state.assign("normalized_specs"));
        let spec = NormalizedSpec {
            id: spec_id,
            workflow_id,
            variant_id,
            evidence_source_ids: vec![evidence_id],
            power: parsed.power.clone(),
            data: parsed.data.clone(),
            video: parsed.video.clone(),
            evidence_refs: parsed
                .evidence
                .iter()
                .map(|e| EvidenceRef {
                    field_path: e.field_path.clone(),
                    source_id: evidence_id,
                    snippet: e
                        .snippet
                        .as_deref()
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(ToString::to_string),
                })
                .collect(),
            created_at: now,
        };
        state.specs.insert(spec_id.as_u64(), spec.clone());

        match quality.state {
            QualityState::NeedsEnrichment => {
                let reason = quality
                    .first_issue_code()
                    .unwrap_or_else(|| "unknown".to_string());
                ensure_pending_job(&mut state, variant_id, workflow_id, &reason, now);
            }
            QualityState::Ready => {
                complete_open_jobs(&mut state, variant_id, now);
            }
        }

        let variant = state
            .variants
            .get(&variant_id.as_u64())
            .expect("variant row just written")
            .clone();

        debug!(
            variant = %variant_id,
            spec = %spec_id,
            created = created_variant,
            state = ?quality.state,
            "upserted variant and inserted spec"
        );

        Ok(UpsertOutcome {
            variant,
            spec,
            quality,
            created_variant,
        })
    }

    /// # Errors
    ///
    /// `PersistenceError::MissingRow` when the variant does not exist.
    pub fn variant(&self, id: VariantId) -> Result<CableVariant, PersistenceError> {
        let state = self.state.lock().unwrap();
        state
            .variants
            .get(&id.as_u64())
            .cloned()
            .ok_or_else(|| PersistenceError::missing("cable_variants", id))
    }

    /// All variants, in creation order.
    #[must_use]
    pub fn all_variants(&self) -> Vec<CableVariant> {
        let state = self.state.lock().unwrap();
        state.variants.values().cloned().collect()
    }

    /// Variants matching `(brand, sku)` (`by_brand_sku`).
    #[must_use]
    pub fn variants_by_brand_sku(&self, brand: &str, sku: &str) -> Vec<CableVariant> {
        let state = self.state.lock().unwrap();
        state
            .variants
            .values()
            .filter(|v| {
                v.brand.eq_ignore_ascii_case(brand)
                    && v.sku.as_deref().is_some_and(|s| s.eq_ignore_ascii_case(sku))
            })
            .cloned()
            .collect()
    }

    /// Newest specs first, up to `limit` rows.
    #[must_use]
    pub fn newest_specs(&self, limit: usize) -> Vec<NormalizedSpec> {
        let state = self.state.lock().unwrap();
        state.specs.values().rev().take(limit).cloned().collect()
    }

    /// Specs created by one workflow, in creation order (`by_workflow`).
    #[must_use]
    pub fn specs_for_workflow(&self, workflow_id: WorkflowId) -> Vec<NormalizedSpec> {
        let state = self.state.lock().unwrap();
        state
            .specs
            .values()
            .filter(|s| s.workflow_id == workflow_id)
            .cloned()
            .collect()
    }

    /// Newest spec bound to a variant (`by_variant`).
    #[must_use]
    pub fn latest_spec_for_variant(&self, variant_id: VariantId) -> Option<NormalizedSpec> {
        let state = self.state.lock().unwrap();
        state
            .specs
            .values()
            .rev()
            .find(|s| s.variant_id == variant_id)
            .cloned()
    }

    // ----- enrichment jobs -------------------------------------------------

    /// Jobs for a variant, in creation order (`by_variant`).
    #[must_use]
    pub fn jobs_for_variant(&self, variant_id: VariantId) -> Vec<EnrichmentJob> {
        let state = self.state.lock().unwrap();
        state
            .jobs
            .values()
            .filter(|j| j.variant_id == variant_id)
            .cloned()
            .collect()
    }

    /// Open (pending or in-progress) jobs for a variant (`by_variant_status`).
    #[must_use]
    pub fn open_jobs_for_variant(&self, variant_id: VariantId) -> Vec<EnrichmentJob> {
        let state = self.state.lock().unwrap();
        state
            .jobs
            .values()
            .filter(|j| j.variant_id == variant_id && j.status.is_open())
            .cloned()
            .collect()
    }

    /// Mark a pending job in-progress, bumping its attempt count.
    ///
    /// # Errors
    ///
    /// `PersistenceError::MissingRow` when the job does not exist.
    pub fn begin_enrichment_job(
        &self,
        job_id: JobId,
        now: Timestamp,
    ) -> Result<EnrichmentJob, PersistenceError> {
        let mut state = self.state.lock().unwrap();
        let job = state
            .jobs
            .get_mut(&job_id.as_u64())
            .ok_or_else(|| PersistenceError::missing("enrichment_jobs", job_id))?;
        job.status = JobStatus::InProgress;
        job.attempt_count += 1;
        job.updated_at = now;
        Ok(job.clone())
    }

    /// Mark a job failed with an error message.
    ///
    /// # Errors
    ///
    /// `PersistenceError::MissingRow` when the job does not exist.
    pub fn fail_enrichment_job(
        &self,
        job_id: JobId,
        error: &str,
        now: Timestamp,
    ) -> Result<EnrichmentJob, PersistenceError> {
        let mut state = self.state.lock().unwrap();
        let job = state
            .jobs
            .get_mut(&job_id.as_u64())
            .ok_or_else(|| PersistenceError::missing("enrichment_jobs", job_id))?;
        job.status = JobStatus::Failed;
        job.last_error = Some(error.to_string());
        job.updated_at = now;
        Ok(job.clone())
    }

    /// Queue totals for the review surface.
    #[must_use]
    pub fn enrichment_queue_summary(&self) -> EnrichmentQueueSummary {
        let state = self.state.lock().unwrap();
        let mut summary = EnrichmentQueueSummary::default();
        for job in state.jobs.values() {
            match job.status {
                JobStatus::Pending => summary.pending += 1,
                JobStatus::InProgress => summary.in_progress += 1,
                JobStatus::Failed => summary.failed += 1,
                JobStatus::Completed => {}
            }
        }
        summary
    }

    // ----- manual inference sessions ---------------------------------------

    /// Fetch or lazily create the session for a workspace (`by_workspace`).
    /// The id must already be normalized (lower-case, trimmed).
    pub fn ensure_session(&self, workspace_id: &str, now: Timestamp) -> ManualSession {
        let mut state = self.state.lock().unwrap();
        state
            .sessions
            .entry(workspace_id.to_string())
            .or_insert_with(|| new_session(workspace_id, now))
            .clone()
    }

    #[must_use]
    pub fn get_session(&self, workspace_id: &str) -> Option<ManualSession> {
        let state = self.state.lock().unwrap();
        state.sessions.get(workspace_id).cloned()
    }

    /// Replace a session row wholesale. The caller owns clamping and status
    /// computation; writes are last-write-wins under the store lock.
    pub fn put_session(&self, session: ManualSession) {
        let mut state = self.state.lock().unwrap();
        state
            .sessions
            .insert(session.workspace_id.clone(), session);
    }

    /// Drop a session and recreate it idle.
    pub fn reset_session(&self, workspace_id: &str, now: Timestamp) -> ManualSession {
        let mut state = self.state.lock().unwrap();
        let fresh = new_session(workspace_id, now);
        state
            .sessions
            .insert(workspace_id.to_string(), fresh.clone());
        fresh
    }
}

fn new_session(workspace_id: &str, now: Timestamp) -> ManualSession {
    ManualSession {
        workspace_id: workspace_id.to_string(),
        draft: cabledex_core::CableDraft::default(),
        prompt: None,
        status: SessionStatus::Idle,
        confidence: 0.0,
        confidence_band: cabledex_core::ConfidenceBand::Low,
        notes: None,
        follow_up_questions: Vec::new(),
        answered_question_count: 0,
        llm_used: false,
        last_error: None,
        created_at: now,
        updated_at: now,
    }
}

/// Find the variant a parsed cable merges into, per the match rules:
/// `(brand, sku, connectors)` first, newest row winning; otherwise
/// `(brand, model)` filtered by equal `(variant, sku, connectors)`.
fn find_variant_match(state: &CatalogState, parsed: &ParsedCable) -> Option<u64> {
    let newest = |candidates: Vec<&CableVariant>| -> Option<u64> {
        candidates
            .into_iter()
            .max_by(|a, b| {
                a.updated_at
                    .cmp(&b.updated_at)
                    .then_with(|| a.created_at.cmp(&b.created_at))
                    .then_with(|| a.id.cmp(&b.id))
            })
            .map(|v| v.id.as_u64())
    };

    if let Some(sku) = parsed.sku.as_deref() {
        let by_sku: Vec<&CableVariant> = state
            .variants
            .values()
            .filter(|v| {
                v.brand.eq_ignore_ascii_case(&parsed.brand)
                    && v.sku.as_deref().is_some_and(|s| s.eq_ignore_ascii_case(sku))
                    && same_pair(v, parsed)
            })
            .collect();
        if let Some(found) = newest(by_sku) {
            return Some(found);
        }
    }

    let by_model: Vec<&CableVariant> = state
        .variants
        .values()
        .filter(|v| {
            v.brand.eq_ignore_ascii_case(&parsed.brand)
                && v.model.eq_ignore_ascii_case(&parsed.model)
                && opt_eq(v.variant.as_deref(), parsed.variant.as_deref())
                && opt_eq(v.sku.as_deref(), parsed.sku.as_deref())
                && same_pair(v, parsed)
        })
        .collect();
    newest(by_model)
}

fn same_pair(variant: &CableVariant, parsed: &ParsedCable) -> bool {
    variant.connector_from == parsed.connector_from && variant.connector_to == parsed.connector_to
}

fn opt_eq(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => false,
    }
}

fn merge_into_variant(
    variant: &mut CableVariant,
    parsed: &ParsedCable,
    source_url: &str,
    now: Timestamp,
) {
    variant.image_urls = merge::union_image_urls(&variant.image_urls, &parsed.image_urls);
    variant.model = merge::merge_model(&variant.model, &parsed.model);

    if variant.sku.is_none() {
        variant.sku = parsed.sku.clone();
    }

    variant.variant = merge::merge_variant_label(
        variant.variant.as_deref(),
        parsed.variant.as_deref(),
        variant.sku.as_deref(),
    );

    if variant.product_url.is_none() {
        variant.product_url = parsed
            .product_url
            .clone()
            .or_else(|| Some(source_url.to_string()));
    }

    variant.updated_at = now;
}

/// Keep the "at most one open job per variant" invariant while recording the
/// newest reason: update an open job in place, else reopen the newest failed
/// job, else insert a fresh pending one.
fn ensure_pending_job(
    state: &mut CatalogState,
    variant_id: VariantId,
    workflow_id: WorkflowId,
    reason: &str,
    now: Timestamp,
) {
    if let Some(open) = state
        .jobs
        .values_mut()
        .find(|j| j.variant_id == variant_id && j.status.is_open())
    {
        open.reason = Some(reason.to_string());
        open.workflow_id = workflow_id;
        open.updated_at = now;
        return;
    }

    let newest_failed = state
        .jobs
        .values_mut()
        .filter(|j| j.variant_id == variant_id && j.status == JobStatus::Failed)
        .max_by_key(|j| j.id);
    if let Some(failed) = newest_failed {
        failed.status = JobStatus::Pending;
        failed.reason = Some(reason.to_string());
        failed.last_error = None;
        failed.workflow_id = workflow_id;
        failed.updated_at = now;
        return;
    }

    let id = JobId(state.assign("enrichment_jobs"));
    state.jobs.insert(
        id.as_u64(),
        EnrichmentJob {
            id,
            variant_id,
            workflow_id,
            status: JobStatus::Pending,
            reason: Some(reason.to_string()),
            attempt_count: 0,
            last_error: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        },
    );
}

fn complete_open_jobs(state: &mut CatalogState, variant_id: VariantId, now: Timestamp) {
    for job in state
        .jobs
        .values_mut()
        .filter(|j| j.variant_id == variant_id && j.status.is_open())
    {
        job.status = JobStatus::Completed;
        job.completed_at = Some(now);
        job.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cabledex_core::{Connector, DataSpec, ParsedEvidence, PowerSpec, VideoSpec, field_paths};
    use chrono::{Duration, TimeZone, Utc};

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn full_evidence() -> Vec<ParsedEvidence> {
        field_paths::CRITICAL
            .iter()
            .map(|p| ParsedEvidence {
                field_path: (*p).to_string(),
                snippet: Some(format!("snippet for {p}")),
            })
            .collect()
    }

    fn parsed_cable() -> ParsedCable {
        ParsedCable {
            brand: "Anker".to_string(),
            model: "Anker Prime USB-C Cable".to_string(),
            variant: Some("6ft Black".to_string()),
            sku: Some("A8856".to_string()),
            connector_from: Connector::UsbC,
            connector_to: Connector::UsbC,
            product_url: Some("https://anker.com/products/prime".to_string()),
            image_urls: vec!["https://cdn.anker.com/a.jpg".to_string()],
            power: PowerSpec {
                max_watts: Some(240.0),
                pd_supported: Some(true),
                epr_supported: Some(true),
            },
            data: DataSpec {
                usb_generation: Some("USB4".to_string()),
                max_gbps: Some(40.0),
            },
            video: VideoSpec::default(),
            evidence: full_evidence(),
        }
    }

    fn seeded_store() -> (CatalogStore, WorkflowId, EvidenceId) {
        let store = CatalogStore::new();
        let workflow = store.create_workflow(
            vec!["https://anker.com/products/prime".to_string()],
            vec![],
            t0(),
        );
        let evidence = store.insert_evidence(
            workflow.id,
            "https://anker.com/products/prime",
            "https://anker.com/products/prime",
            "markdown",
            "<html>",
            t0(),
        );
        (store, workflow.id, evidence.id)
    }

    #[test]
    fn content_hash_matches_the_pure_function() {
        let (store, workflow_id, _) = seeded_store();
        let evidence =
            store.insert_evidence(workflow_id, "u", "https://x/p", "md", "<html>", t0());
        assert_eq!(evidence.content_hash, content_hash("https://x/p", "md", "<html>"));
    }

    #[test]
    fn upsert_twice_dedupes_variant_but_appends_specs() {
        let (store, workflow_id, evidence_id) = seeded_store();
        let parsed = parsed_cable();

        let first = store
            .upsert_variant_and_insert_spec(workflow_id, "https://anker.com/products/prime", evidence_id, &parsed, t0())
            .unwrap();
        assert!(first.created_variant);

        let second = store
            .upsert_variant_and_insert_spec(
                workflow_id,
                "https://anker.com/products/prime",
                evidence_id,
                &parsed,
                t0() + Duration::minutes(1),
            )
            .unwrap();
        assert!(!second.created_variant);
        assert_eq!(first.variant.id, second.variant.id);
        assert_eq!(store.all_variants().len(), 1);
        assert_eq!(store.newest_specs(10).len(), 2);
    }

    #[test]
    fn image_urls_grow_monotonically_as_a_set() {
        let (store, workflow_id, evidence_id) = seeded_store();
        let mut parsed = parsed_cable();

        let first = store
            .upsert_variant_and_insert_spec(workflow_id, "src", evidence_id, &parsed, t0())
            .unwrap();

        parsed.image_urls = vec![
            "https://cdn.anker.com/a.jpg".to_string(),
            "https://cdn.anker.com/b.jpg".to_string(),
        ];
        let second = store
            .upsert_variant_and_insert_spec(
                workflow_id,
                "src",
                evidence_id,
                &parsed,
                t0() + Duration::minutes(1),
            )
            .unwrap();

        for url in &first.variant.image_urls {
            assert!(second.variant.image_urls.contains(url));
        }
        assert_eq!(second.variant.image_urls.len(), 2);
    }

    #[test]
    fn lightning_pair_is_clamped_on_ingest() {
        let (store, workflow_id, evidence_id) = seeded_store();
        let mut parsed = parsed_cable();
        parsed.connector_to = Connector::Lightning;
        parsed.data = DataSpec {
            usb_generation: Some("Thunderbolt 3".to_string()),
            max_gbps: Some(40.0),
        };

        let outcome = store
            .upsert_variant_and_insert_spec(workflow_id, "src", evidence_id, &parsed, t0())
            .unwrap();

        assert_eq!(outcome.spec.data.max_gbps, Some(0.48));
        assert!(outcome.spec.data.usb_generation.unwrap().contains("USB 2.0"));
    }

    #[test]
    fn ready_quality_closes_open_jobs() {
        let (store, workflow_id, evidence_id) = seeded_store();

        // First ingest misses images -> needs enrichment, job opened.
        let mut degraded = parsed_cable();
        degraded.image_urls = vec![];
        let first = store
            .upsert_variant_and_insert_spec(workflow_id, "src", evidence_id, &degraded, t0())
            .unwrap();
        assert_eq!(first.quality.state, QualityState::NeedsEnrichment);
        assert_eq!(store.open_jobs_for_variant(first.variant.id).len(), 1);

        // Second ingest completes the variant -> job transitions to completed.
        let complete = parsed_cable();
        let second = store
            .upsert_variant_and_insert_spec(
                workflow_id,
                "src",
                evidence_id,
                &complete,
                t0() + Duration::minutes(1),
            )
            .unwrap();
        assert_eq!(second.quality.state, QualityState::Ready);
        assert!(store.open_jobs_for_variant(first.variant.id).is_empty());

        let jobs = store.jobs_for_variant(first.variant.id);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::Completed);
        assert!(jobs[0].completed_at.is_some());
    }

    #[test]
    fn at_most_one_open_job_per_variant() {
        let (store, workflow_id, evidence_id) = seeded_store();
        let mut degraded = parsed_cable();
        degraded.image_urls = vec![];

        for i in 0..5 {
            store
                .upsert_variant_and_insert_spec(
                    workflow_id,
                    "src",
                    evidence_id,
                    &degraded,
                    t0() + Duration::minutes(i),
                )
                .unwrap();
        }

        let variant_id = store.all_variants()[0].id;
        assert_eq!(store.open_jobs_for_variant(variant_id).len(), 1);
        assert_eq!(store.jobs_for_variant(variant_id).len(), 1);
    }

    #[test]
    fn failed_job_is_reopened_with_cumulative_attempts() {
        let (store, workflow_id, evidence_id) = seeded_store();
        let mut degraded = parsed_cable();
        degraded.image_urls = vec![];

        store
            .upsert_variant_and_insert_spec(workflow_id, "src", evidence_id, &degraded, t0())
            .unwrap();
        let variant_id = store.all_variants()[0].id;
        let job = store.open_jobs_for_variant(variant_id)[0].clone();

        store.begin_enrichment_job(job.id, t0()).unwrap();
        store
            .fail_enrichment_job(job.id, "vendor page unreachable", t0())
            .unwrap();
        assert!(store.open_jobs_for_variant(variant_id).is_empty());

        // Re-ingesting the degraded cable reopens the failed job rather than
        // inserting a second row.
        store
            .upsert_variant_and_insert_spec(
                workflow_id,
                "src",
                evidence_id,
                &degraded,
                t0() + Duration::minutes(1),
            )
            .unwrap();

        let jobs = store.jobs_for_variant(variant_id);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::Pending);
        assert_eq!(jobs[0].attempt_count, 1, "attempt count survives reopening");
        assert!(jobs[0].last_error.is_none(), "reopening clears last_error");
    }

    #[test]
    fn model_merge_prefers_length_neutral_name() {
        let (store, workflow_id, evidence_id) = seeded_store();
        let mut with_length = parsed_cable();
        with_length.model = "Anker Prime USB-C Cable 6ft".to_string();

        store
            .upsert_variant_and_insert_spec(workflow_id, "src", evidence_id, &with_length, t0())
            .unwrap();
        let outcome = store
            .upsert_variant_and_insert_spec(
                workflow_id,
                "src",
                evidence_id,
                &parsed_cable(),
                t0() + Duration::minutes(1),
            )
            .unwrap();

        assert_eq!(outcome.variant.model, "Anker Prime USB-C Cable");
    }

    #[test]
    fn sku_and_product_url_keep_existing_values() {
        let (store, workflow_id, evidence_id) = seeded_store();
        store
            .upsert_variant_and_insert_spec(workflow_id, "src", evidence_id, &parsed_cable(), t0())
            .unwrap();

        let mut second = parsed_cable();
        second.product_url = Some("https://mirror.example.com/prime".to_string());
        let outcome = store
            .upsert_variant_and_insert_spec(
                workflow_id,
                "src",
                evidence_id,
                &second,
                t0() + Duration::minutes(1),
            )
            .unwrap();

        assert_eq!(
            outcome.variant.product_url.as_deref(),
            Some("https://anker.com/products/prime")
        );
        assert_eq!(outcome.variant.sku.as_deref(), Some("A8856"));
    }

    #[test]
    fn empty_snippets_are_dropped_from_evidence_refs() {
        let (store, workflow_id, evidence_id) = seeded_store();
        let mut parsed = parsed_cable();
        parsed.evidence.push(ParsedEvidence {
            field_path: field_paths::POWER_MAX_WATTS.to_string(),
            snippet: Some("   ".to_string()),
        });

        let outcome = store
            .upsert_variant_and_insert_spec(workflow_id, "src", evidence_id, &parsed, t0())
            .unwrap();

        let watts_ref = outcome
            .spec
            .evidence_refs
            .iter()
            .find(|r| r.field_path == field_paths::POWER_MAX_WATTS)
            .unwrap();
        assert!(watts_ref.snippet.is_none());
    }

    #[test]
    fn evidence_refs_point_at_the_inserted_source() {
        let (store, workflow_id, evidence_id) = seeded_store();
        let outcome = store
            .upsert_variant_and_insert_spec(workflow_id, "src", evidence_id, &parsed_cable(), t0())
            .unwrap();

        assert_eq!(outcome.spec.evidence_source_ids, vec![evidence_id]);
        for evidence_ref in &outcome.spec.evidence_refs {
            assert!(outcome.spec.evidence_source_ids.contains(&evidence_ref.source_id));
        }
    }

    #[test]
    fn item_lifecycle_updates_workflow_counters() {
        let (store, workflow_id, evidence_id) = seeded_store();
        let ok_item = store
            .add_workflow_item(workflow_id, "https://a", "https://a", t0())
            .unwrap();
        let bad_item = store
            .add_workflow_item(workflow_id, "https://b", "https://b", t0())
            .unwrap();

        assert_eq!(store.begin_item_attempt(ok_item.id, t0()).unwrap(), 1);
        store
            .complete_item(ok_item.id, evidence_id, None, t0())
            .unwrap();

        assert_eq!(store.begin_item_attempt(bad_item.id, t0()).unwrap(), 1);
        assert_eq!(store.begin_item_attempt(bad_item.id, t0()).unwrap(), 2);
        store.fail_item(bad_item.id, "fetch exploded", t0()).unwrap();

        let workflow = store.finalize_workflow(workflow_id, t0()).unwrap();
        assert_eq!(workflow.status, WorkflowStatus::Failed);
        assert_eq!(workflow.completed_items, 1);
        assert_eq!(workflow.failed_items, 1);
        assert_eq!(workflow.last_error.as_deref(), Some("fetch exploded"));
        assert!(workflow.finished_at.is_some());
    }

    #[test]
    fn missing_rows_surface_as_persistence_errors() {
        let store = CatalogStore::new();
        assert!(store.workflow(WorkflowId(99)).is_err());
        assert!(store.begin_item_attempt(WorkflowItemId(99), t0()).is_err());
        assert!(store.variant(VariantId(99)).is_err());
        assert!(store.evidence(EvidenceId(99)).is_err());
    }

    #[test]
    fn sessions_are_created_lazily_and_reset_cleanly() {
        let store = CatalogStore::new();
        assert!(store.get_session("acme").is_none());

        let session = store.ensure_session("acme", t0());
        assert_eq!(session.status, SessionStatus::Idle);
        assert_eq!(session.confidence, 0.0);

        let mut mutated = session.clone();
        mutated.confidence = 0.5;
        store.put_session(mutated);
        assert_eq!(store.get_session("acme").unwrap().confidence, 0.5);

        let fresh = store.reset_session("acme", t0());
        assert_eq!(fresh.confidence, 0.0);
        assert!(fresh.follow_up_questions.is_empty());
    }

    #[test]
    fn queue_summary_counts_by_status() {
        let (store, workflow_id, evidence_id) = seeded_store();
        let mut degraded = parsed_cable();
        degraded.image_urls = vec![];
        store
            .upsert_variant_and_insert_spec(workflow_id, "src", evidence_id, &degraded, t0())
            .unwrap();

        let mut other = parsed_cable();
        other.sku = Some("A9999".to_string());
        other.image_urls = vec![];
        store
            .upsert_variant_and_insert_spec(workflow_id, "src", evidence_id, &other, t0())
            .unwrap();

        let summary = store.enrichment_queue_summary();
        assert_eq!(summary.pending, 2);
        assert_eq!(summary.in_progress, 0);
        assert_eq!(summary.failed, 0);

        let job = store.open_jobs_for_variant(store.all_variants()[0].id)[0].clone();
        store.begin_enrichment_job(job.id, t0()).unwrap();
        store.fail_enrichment_job(job.id, "boom", t0()).unwrap();

        let summary = store.enrichment_queue_summary();
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.failed, 1);
    }
}
