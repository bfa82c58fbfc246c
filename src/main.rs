// SPDX-License-Identifier: MIT OR Apache-2.0

//! spanseek - span-level similarity search over tokenized corpora
//!
//! Loads pre-tokenized documents, scores every span against a query with
//! embedding similarities and an alignment algorithm, and prints the best.

mod cli;
mod commands;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Initialize tracing with SPANSEEK_LOG env var (e.g., SPANSEEK_LOG=debug spanseek search ...)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_env("SPANSEEK_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let format = cli.format;
    let compact = cli.compact;

    match cli.command {
        Commands::Search(args) => {
            commands::search::run(&args, format, compact)?;
        }
        Commands::Inspect {
            corpus,
            document,
            partition,
        } => {
            commands::inspect::run(&corpus, document, &partition, format, compact)?;
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "spanseek", &mut std::io::stdout());
        }
    }

    Ok(())
}
