//! marketpulse CLI: run the market news pipeline end to end.
//!
//! Resolves the configured collaborators, runs every stage once, and
//! prints the final pipeline state as JSON.

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
