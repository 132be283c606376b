//! CLI entry point and dispatch.

use super::args::{Cli, Commands};
use super::commands;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize tracing: compact human output, env-filter controlled.
fn init_tracing(verbose: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("cabledex=debug,info")
            } else {
                EnvFilter::try_new("cabledex=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(verbose)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .try_init();
}

/// Parse arguments and run the selected command.
///
/// All output, including errors, is handled here; the caller only maps the
/// result to a process exit code.
///
/// # Errors
///
/// Returns the process exit code on failure.
pub fn run() -> Result<(), i32> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            eprintln!("error: failed to start async runtime: {e}");
            1
        })?;

    let result = runtime.block_on(async {
        match cli.command {
            Commands::Ingest {
                seeds,
                allowed_domains,
                max_items,
            } => commands::ingest(seeds, allowed_domains, max_items).await,
            Commands::Discover {
                template,
                max_items,
            } => commands::discover(&template, max_items).await,
            Commands::Templates => commands::templates(),
            Commands::Top { limit, query } => commands::top(limit, query.as_deref()),
            Commands::Review { limit } => commands::review(limit),
            Commands::Report { workflow, limit } => commands::report(workflow, limit),
            Commands::Queue => commands::queue(),
            Commands::Infer { command } => commands::infer(command).await,
            Commands::Doctor => commands::doctor(),
        }
    });

    result.map_err(|err| {
        eprintln!("error: {err:#}");
        1
    })
}
