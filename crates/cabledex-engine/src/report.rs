//! Workflow reports: what a run produced and what failed.

use crate::ranking::{TopCableRow, rows_from_specs};
use cabledex_core::{Result, Workflow, WorkflowId, WorkflowItem};
use cabledex_store::CatalogStore;
use serde::Serialize;

/// Full report for one workflow run.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowReport {
    pub workflow: Workflow,
    /// Cables produced by this run, best spec per variant, ranked by score.
    /// Includes `needs_enrichment` rows — the report is an operator surface.
    pub cables: Vec<TopCableRow>,
    pub failed_items: Vec<WorkflowItem>,
}

pub(crate) fn workflow_report(
    store: &CatalogStore,
    workflow_id: WorkflowId,
    limit: usize,
) -> Result<WorkflowReport> {
    let workflow = store.workflow(workflow_id)?;
    let specs = store.specs_for_workflow(workflow_id);

    let mut cables = rows_from_specs(store, specs);
    cables.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| b.spec_id.cmp(&a.spec_id))
    });
    cables.truncate(limit);

    Ok(WorkflowReport {
        failed_items: store.failed_items_for_workflow(workflow_id),
        workflow,
        cables,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cabledex_core::{
        Connector, DataSpec, ParsedCable, ParsedEvidence, PowerSpec, VideoSpec, field_paths,
    };
    use chrono::{TimeZone, Utc};

    fn parsed(model: &str, sku: &str) -> ParsedCable {
        ParsedCable {
            brand: "Anker".to_string(),
            model: model.to_string(),
            variant: Some("6ft".to_string()),
            sku: Some(sku.to_string()),
            connector_from: Connector::UsbC,
            connector_to: Connector::UsbC,
            product_url: Some(format!("https://shop.example.com/{sku}")),
            image_urls: vec!["https://cdn.example.com/i.jpg".to_string()],
            power: PowerSpec {
                max_watts: Some(100.0),
                pd_supported: Some(true),
                epr_supported: None,
            },
            data: DataSpec::default(),
            video: VideoSpec::default(),
            evidence: field_paths::CRITICAL
                .iter()
                .map(|p| ParsedEvidence {
                    field_path: (*p).to_string(),
                    snippet: None,
                })
                .collect(),
        }
    }

    #[test]
    fn report_collects_cables_and_failed_items() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap();
        let store = CatalogStore::new();
        let workflow = store.create_workflow(
            vec!["https://a".to_string(), "https://b".to_string()],
            vec![],
            now,
        );

        let ok_item = store
            .add_workflow_item(workflow.id, "https://a", "https://a", now)
            .unwrap();
        let bad_item = store
            .add_workflow_item(workflow.id, "https://b", "https://b", now)
            .unwrap();

        let evidence = store.insert_evidence(workflow.id, "https://a", "https://a", "md", "", now);
        let outcome = store
            .upsert_variant_and_insert_spec(workflow.id, "https://a", evidence.id, &parsed("Anker Prime Cable", "A1"), now)
            .unwrap();

        store.begin_item_attempt(ok_item.id, now).unwrap();
        store
            .complete_item(ok_item.id, evidence.id, Some(outcome.spec.id), now)
            .unwrap();
        store.begin_item_attempt(bad_item.id, now).unwrap();
        store.fail_item(bad_item.id, "scrape timed out", now).unwrap();
        store.finalize_workflow(workflow.id, now).unwrap();

        let report = workflow_report(&store, workflow.id, 10).unwrap();
        assert_eq!(report.cables.len(), 1);
        assert_eq!(report.cables[0].sku.as_deref(), Some("A1"));
        assert_eq!(report.failed_items.len(), 1);
        assert_eq!(
            report.failed_items[0].last_error.as_deref(),
            Some("scrape timed out")
        );
        assert_eq!(report.workflow.failed_items, 1);
    }

    #[test]
    fn unknown_workflow_is_a_persistence_error() {
        let store = CatalogStore::new();
        assert!(workflow_report(&store, WorkflowId(42), 10).is_err());
    }
}
