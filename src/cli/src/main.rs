//! Sealcraft CLI entry point.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use sealcraft_cli::commands::{dispatch, Cli};
use sealcraft_core::SealError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = dispatch(cli).await {
        eprintln!("Error: {e}");
        if let Some(hint) = e.downcast_ref::<SealError>().and_then(SealError::hint) {
            eprintln!("Hint: {hint}");
        }
        std::process::exit(1);
    }
}
