//! Command-line interface for cabledex.
//!
//! - `args`: clap argument definitions
//! - `run`: entry point, runtime setup and command dispatch
//! - `commands`: command implementations emitting JSON to stdout

pub mod args;
mod commands;
mod run;

pub use args::{AnswerArg, Cli, Commands, InferCommands};
pub use run::run;
