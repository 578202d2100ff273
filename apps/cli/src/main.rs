//! jobsignal CLI: harvest job posting details and report what employers ask for.
//!
//! Reads listing stubs, fetches full descriptions with bounded concurrency,
//! deduplicates, scores requirement terms and optionally summarizes the result.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
