//! Manual inference engine.
//!
//! Users describe a physical cable in free text; the engine infers the same
//! structured capability fields the crawler extracts, through two stages:
//!
//! 1. a **deterministic pass** ([`deterministic::parse_prompt`]) — pure regex
//!    parsing over the normalized prompt, producing a draft, human-readable
//!    notes and a seed confidence;
//! 2. an optional **LLM pass** ([`llm`]) — a bounded (8 s, temperature 0)
//!    schema-constrained call whose patch fills the fields the deterministic
//!    pass left open. Deterministic values always win the merge.
//!
//! Remaining uncertainty drives a short follow-up question loop: up to three
//! canned yes/no/skip questions, each carrying pre-baked draft patches.

pub mod deterministic;
pub mod llm;
pub mod merge;
pub mod questions;
mod service;

pub use service::{
    InferenceDefaults, InferenceService, StatusSummary, normalize_workspace_id,
};
