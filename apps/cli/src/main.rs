//! buyergroup CLI: buyer-group discovery for B2B deals.
//!
//! Resolves a target company, searches its people directory, and ranks,
//! classifies and validates the group of people who will decide a deal.

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
