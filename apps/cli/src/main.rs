//! postforge CLI: content pipeline for YouTube videos and topic prompts.
//!
//! Generates posts one at a time or in checkpointed daily batches, and
//! serves the scheduled-trigger endpoints an external cron calls.

mod commands;
mod context;
mod server;

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
