//! Property-based tests for catalog invariants.
//!
//! Verifies the system-level invariants across randomized inputs:
//! enrichment-job uniqueness, content-hash determinism, upsert idempotence,
//! the Lightning data clamp, quality-state duality, confidence clamping and
//! follow-up monotonicity. (The explicit-Gbps-wins property lives with the
//! normalizer in `cabledex-normalize`.)
//!
//! Case counts can be raised via `PROPTEST_CASES` for thorough local runs:
//!
//! ```bash
//! PROPTEST_CASES=256 cargo test --test property_suite
//! ```

use proptest::prelude::*;
use std::env;
use std::sync::Arc;

use cabledex_core::{
    Connector, DataSpec, ParsedCable, ParsedEvidence, PowerSpec, QualityState, QuestionAnswer,
    QuestionStatus, VideoSpec, field_paths,
};
use cabledex_infer::InferenceService;
use cabledex_infer::deterministic::parse_prompt;
use cabledex_infer::llm::LlmInference;
use cabledex_infer::merge::merge;
use cabledex_quality::{QualityInput, assess};
use cabledex_store::{CatalogStore, content_hash};
use chrono::{Duration, TimeZone, Utc};

const DEFAULT_PROPTEST_CASES: u32 = 64;

fn proptest_config() -> ProptestConfig {
    let cases = env::var("PROPTEST_CASES")
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(DEFAULT_PROPTEST_CASES);
    ProptestConfig {
        cases,
        ..ProptestConfig::default()
    }
}

fn t0() -> chrono::DateTime<chrono::Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap()
}

fn critical_evidence() -> Vec<ParsedEvidence> {
    field_paths::CRITICAL
        .iter()
        .map(|p| ParsedEvidence {
            field_path: (*p).to_string(),
            snippet: Some("snippet".to_string()),
        })
        .collect()
}

fn arb_connector() -> impl Strategy<Value = Connector> {
    prop::sample::select(vec![
        Connector::UsbC,
        Connector::UsbA,
        Connector::Lightning,
        Connector::MicroUsb,
    ])
}

fn arb_cable() -> impl Strategy<Value = ParsedCable> {
    (
        prop::sample::select(vec!["Anker", "UGREEN", "Belkin"]),
        0u32..4,
        prop::option::of(0u32..3),
        arb_connector(),
        arb_connector(),
        prop::option::of(1.0f64..300.0),
        prop::bool::ANY,
        prop::collection::vec(0u32..6, 0..4),
    )
        .prop_map(
            |(brand, model_idx, sku_idx, from, to, watts, with_images, image_ids)| ParsedCable {
                brand: brand.to_string(),
                model: format!("{brand} Cable Model {model_idx}"),
                variant: Some("6ft".to_string()),
                sku: sku_idx.map(|i| format!("SKU-{i}")),
                connector_from: from,
                connector_to: to,
                product_url: Some(format!("https://shop.example.com/{brand}/{model_idx}")),
                image_urls: if with_images {
                    image_ids
                        .iter()
                        .map(|i| format!("https://cdn.example.com/{i}.jpg"))
                        .collect()
                } else {
                    vec![]
                },
                power: PowerSpec {
                    max_watts: watts,
                    pd_supported: None,
                    epr_supported: None,
                },
                data: DataSpec::default(),
                video: VideoSpec::default(),
                evidence: critical_evidence(),
            },
        )
}

proptest! {
    #![proptest_config(proptest_config())]

    /// Invariant 1: at most one open enrichment job per variant, no matter
    /// what sequence of upserts runs.
    #[test]
    fn at_most_one_open_enrichment_job(cables in prop::collection::vec(arb_cable(), 1..12)) {
        let store = CatalogStore::new();
        let workflow = store.create_workflow(vec![], vec![], t0());
        let evidence = store.insert_evidence(workflow.id, "u", "https://c", "md", "h", t0());

        for (step, cable) in cables.iter().enumerate() {
            store
                .upsert_variant_and_insert_spec(
                    workflow.id,
                    "src",
                    evidence.id,
                    cable,
                    t0() + Duration::minutes(step as i64),
                )
                .unwrap();

            for variant in store.all_variants() {
                let open = store.open_jobs_for_variant(variant.id).len();
                prop_assert!(open <= 1, "variant {} has {} open jobs", variant.id, open);
            }
        }
    }

    /// Invariant 2: the content hash is deterministic and sensitive to the
    /// markdown component.
    #[test]
    fn content_hash_is_deterministic(
        url in "[a-z]{1,20}",
        markdown_a in "[ -~]{0,80}",
        markdown_b in "[ -~]{0,80}",
        html in "[ -~]{0,80}",
    ) {
        prop_assert_eq!(
            content_hash(&url, &markdown_a, &html),
            content_hash(&url, &markdown_a, &html)
        );
        if markdown_a != markdown_b {
            prop_assert_ne!(
                content_hash(&url, &markdown_a, &html),
                content_hash(&url, &markdown_b, &html)
            );
        }
    }

    /// Invariant 3: re-ingesting one cable leaves exactly one variant, adds
    /// one spec per invocation, and never shrinks the image set.
    #[test]
    fn upsert_is_idempotent_on_variants(cable in arb_cable(), repeats in 1usize..6) {
        let store = CatalogStore::new();
        let workflow = store.create_workflow(vec![], vec![], t0());
        let evidence = store.insert_evidence(workflow.id, "u", "https://c", "md", "h", t0());

        let mut previous_images: Vec<String> = vec![];
        for step in 0..repeats {
            let outcome = store
                .upsert_variant_and_insert_spec(
                    workflow.id,
                    "src",
                    evidence.id,
                    &cable,
                    t0() + Duration::minutes(step as i64),
                )
                .unwrap();

            for url in &previous_images {
                prop_assert!(outcome.variant.image_urls.contains(url));
            }
            previous_images = outcome.variant.image_urls.clone();
        }

        prop_assert_eq!(store.all_variants().len(), 1);
        prop_assert_eq!(store.newest_specs(100).len(), repeats);
    }

    /// Invariant 4: a Lightning end always caps the stored spec at 0.48 Gbps
    /// with a USB 2 generation, whatever the extractor claimed.
    #[test]
    fn lightning_specs_are_always_clamped(
        mut cable in arb_cable(),
        claimed_gbps in 0.1f64..120.0,
    ) {
        cable.connector_to = Connector::Lightning;
        cable.data = DataSpec {
            usb_generation: Some("Thunderbolt 4".to_string()),
            max_gbps: Some(claimed_gbps),
        };

        let store = CatalogStore::new();
        let workflow = store.create_workflow(vec![], vec![], t0());
        let evidence = store.insert_evidence(workflow.id, "u", "https://c", "md", "h", t0());
        let outcome = store
            .upsert_variant_and_insert_spec(workflow.id, "src", evidence.id, &cable, t0())
            .unwrap();

        let spec = store.latest_spec_for_variant(outcome.variant.id).unwrap();
        prop_assert!(spec.data.max_gbps.unwrap() <= 0.48);
        prop_assert!(spec.data.usb_generation.unwrap().contains("USB 2"));
    }

    /// Invariant 5: quality state is `ready` exactly when the issue list is
    /// empty.
    #[test]
    fn quality_state_matches_issue_emptiness(
        brand in prop::sample::select(vec!["Anker", "", "unknown", "Belkin"]),
        model in prop::sample::select(vec!["Prime USB-C Cable", "", "n/a"]),
        from in arb_connector(),
        to in arb_connector(),
        has_url in prop::bool::ANY,
        has_images in prop::bool::ANY,
        watts in prop::option::of(0.0f64..300.0),
        evidence_count in 0usize..5,
    ) {
        let images = if has_images {
            vec!["https://cdn.example.com/i.jpg".to_string()]
        } else {
            vec![]
        };
        let paths: Vec<&str> = field_paths::CRITICAL.iter().take(evidence_count).copied().collect();

        let report = assess(&QualityInput {
            brand,
            model,
            connector_from: from,
            connector_to: to,
            product_url: has_url.then_some("https://shop.example.com/p"),
            image_urls: &images,
            max_watts: watts,
            evidence_paths: paths,
        });

        prop_assert_eq!(
            report.state == QualityState::Ready,
            report.issues.is_empty()
        );
    }

    /// Invariant 7 (merge level): blended confidence stays inside
    /// `[0, 0.99]` for arbitrary prompts and LLM confidences.
    #[test]
    fn merged_confidence_is_clamped(
        words in prop::collection::vec(
            prop::sample::select(vec![
                "usb-c", "usb-a", "lightning", "cable", "240w", "100w", "usb4",
                "thunderbolt", "4k", "8k", "120hz", "data", "only", "charging",
            ]),
            0..8,
        ),
        llm_confidence in 0.0f64..2.0,
        use_llm in prop::bool::ANY,
    ) {
        let prompt = words.join(" ");
        let det = parse_prompt(&prompt);
        prop_assert!((0.0..=0.99).contains(&det.confidence));

        let llm = use_llm.then(|| LlmInference {
            confidence: llm_confidence.min(1.0),
            ..LlmInference::default()
        });
        let merged = merge(&det, llm.as_ref());
        prop_assert!((0.0..=0.99).contains(&merged.confidence));
    }

    /// Invariants 7 + 8 (session level): answering follow-ups never lowers
    /// confidence, never leaves the question pending, and the session
    /// confidence stays clamped at every write.
    #[test]
    fn follow_up_answers_are_monotonic(
        answers in prop::collection::vec(
            prop::sample::select(vec![QuestionAnswer::Yes, QuestionAnswer::No, QuestionAnswer::Skip]),
            1..4,
        ),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let service = InferenceService::new(
            Arc::new(CatalogStore::new()),
            None,
            "anthropic/claude-3-5-haiku",
        );
        let session = runtime
            .block_on(service.submit_prompt("prop", "old mystery cable"))
            .unwrap();
        prop_assert!((0.0..=0.99).contains(&session.confidence));

        let question_ids: Vec<String> = session
            .follow_up_questions
            .iter()
            .map(|q| q.id.clone())
            .collect();
        let mut confidence = session.confidence;

        for (question_id, answer) in question_ids.iter().zip(answers.iter()) {
            let session = service.answer_question("prop", question_id, *answer).unwrap();
            prop_assert!(session.confidence >= confidence);
            prop_assert!((0.0..=0.99).contains(&session.confidence));
            confidence = session.confidence;

            let question = session
                .follow_up_questions
                .iter()
                .find(|q| &q.id == question_id)
                .unwrap();
            prop_assert_eq!(question.status, QuestionStatus::Answered);
        }
    }
}
