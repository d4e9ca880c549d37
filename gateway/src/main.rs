//! Gateway binary entry point.
//!
//! Thin wrapper around the `gateway` library crate: parses the CLI and
//! hands off to `gateway::run`, which owns the actual startup sequence
//! (spec.md §6, SPEC_FULL.md §10-11).

use clap::Parser;
use gateway::config::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    gateway::run(cli).await
}
