// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subcommand implementations

pub mod inspect;
pub mod search;

use crate::cli::{CliLevel, PartitionArgs};
use anyhow::{bail, Context, Result};
use spanseek::config::Config;
use spanseek::document::{Level, Partition};
use spanseek::session::Session;
use spanseek::utils::find_corpus_files;
use spanseek::EmbeddingStore;
use std::path::Path;

/// Config partition with CLI overrides applied
pub fn partition(args: &PartitionArgs, config: &Config) -> Partition {
    let base = config.partition.partition();
    Partition::new(
        match args.level {
            Some(CliLevel::Sentence) => Level::Sentence,
            Some(CliLevel::Token) => Level::Token,
            None => base.level,
        },
        args.window.unwrap_or(base.window_size),
        args.step.unwrap_or(base.window_step),
    )
}

/// Build a session over every document file under `corpus`
pub fn load_session(corpus: &Path, store: EmbeddingStore, config: &Config, quiet: bool) -> Result<Session> {
    let files = find_corpus_files(corpus);
    if files.is_empty() {
        bail!("No document files found under {}", corpus.display());
    }
    let normalizer = config
        .tokens
        .normalizer()
        .context("Invalid [tokens] strip pattern")?;
    let mut session = Session::new(store, normalizer);
    let report = session.load_files(&files);
    if !quiet && !report.skipped.is_empty() {
        eprintln!(
            "Warning: skipped {} malformed document(s)",
            report.skipped.len()
        );
    }
    Ok(session)
}
