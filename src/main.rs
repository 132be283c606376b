//! cabledex CLI binary
//!
//! Minimal entrypoint: all logic lives in the library; main.rs only maps
//! the run result to a process exit code.

fn main() {
    if let Err(code) = cabledex::cli::run() {
        std::process::exit(code);
    }
}
