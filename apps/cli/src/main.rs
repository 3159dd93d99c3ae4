//! Keywatch CLI: keyword guardrails and evidence flags for AI-built keyword sets.
//!
//! Reads a batch of oracle-categorized keywords, enforces category
//! exclusivity, dedup and completeness, then annotates each keyword with
//! evidence-backed quality flags.

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
