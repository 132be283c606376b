//! CLI argument definitions.

use cabledex_core::QuestionAnswer;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "cabledex", version, about = "Cable capability catalog and inference pipeline")]
pub struct Cli {
    /// Enable verbose structured logging.
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest a batch of seed product URLs and print the run report.
    Ingest {
        /// Seed URLs to crawl.
        #[arg(required = true)]
        seeds: Vec<String>,
        /// Restrict crawling to these domains (repeatable; empty = all).
        #[arg(long = "allow-domain")]
        allowed_domains: Vec<String>,
        /// Cap on items in this run.
        #[arg(long)]
        max_items: Option<usize>,
    },
    /// Discover seed URLs from a vendor template's search surface.
    Discover {
        /// Template id (see `cabledex templates`).
        template: String,
        #[arg(long)]
        max_items: Option<usize>,
    },
    /// List the registered vendor templates.
    Templates,
    /// Ranked top cables (ready rows only).
    Top {
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Optional search query (brand, connector pair, wattage).
        #[arg(long)]
        query: Option<String>,
    },
    /// Top cables for review, including needs-enrichment rows.
    Review {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Report for a workflow run (latest when no id is given).
    Report {
        #[arg(long)]
        workflow: Option<u64>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Enrichment queue summary.
    Queue,
    /// Manual inference session commands.
    Infer {
        #[command(subcommand)]
        command: InferCommands,
    },
    /// Check environment configuration without network calls.
    Doctor,
}

#[derive(Subcommand, Debug)]
pub enum InferCommands {
    /// Submit a free-text cable description.
    Submit { workspace: String, prompt: String },
    /// Answer a follow-up question.
    Answer {
        workspace: String,
        question: String,
        #[arg(value_enum)]
        answer: AnswerArg,
    },
    /// Show the session.
    Show { workspace: String },
    /// Reset the session to idle.
    Reset { workspace: String },
    /// Print the inference defaults.
    Defaults,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum AnswerArg {
    Yes,
    No,
    Skip,
}

impl From<AnswerArg> for QuestionAnswer {
    fn from(value: AnswerArg) -> Self {
        match value {
            AnswerArg::Yes => Self::Yes,
            AnswerArg::No => Self::No,
            AnswerArg::Skip => Self::Skip,
        }
    }
}
