//! CLI entry point for the harvester.

use authority_harvester::cli::{self, Cli};
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() {
    let args = Cli::parse();

    // Initialize tracing with WARN level by default (INFO with --verbose), respecting RUST_LOG
    let default_level = if args.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = cli::run(args) {
        eprintln!("Error [{}]: {e}", e.kind());
        std::process::exit(1);
    }
}
