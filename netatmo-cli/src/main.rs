//! Binary crate for the `netatmo` command-line tool.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Bootstrapping the token session
//! - Human-friendly output formatting

use clap::Parser;

mod cli;
mod logging;
mod render;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cmd = cli::Cli::parse();
    cmd.run().await
}
