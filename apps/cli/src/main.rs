//! Gatherer CLI — concurrent metadata harvesting tool.
//!
//! Pulls original records out of cultural-heritage provider APIs and writes
//! them to disk as provider-format documents.

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
