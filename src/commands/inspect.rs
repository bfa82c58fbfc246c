// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inspect command: span layout of corpus documents

use crate::cli::{OutputFormat, PartitionArgs};
use anyhow::{Context, Result};
use spanseek::config::{Config, ConfigOutputFormat};
use spanseek::output::{render_structure, to_json, use_colors};
use spanseek::EmbeddingStore;
use std::path::Path;

/// Run the inspect command
pub fn run(
    corpus: &Path,
    document: Option<usize>,
    partition: &PartitionArgs,
    format: Option<OutputFormat>,
    compact: bool,
) -> Result<()> {
    let config = Config::load();
    let format = format.unwrap_or(match config.default_format {
        Some(ConfigOutputFormat::Json) => OutputFormat::Json,
        _ => OutputFormat::Text,
    });
    let partition = super::partition(partition, &config);
    // spans depend only on tokens, so no embedding spaces are loaded
    let session = super::load_session(corpus, EmbeddingStore::exact_match(), &config, false)?;

    let ids: Vec<usize> = match document {
        Some(id) => vec![id],
        None => (0..session.index().len()).collect(),
    };
    let structures = ids
        .into_iter()
        .map(|id| {
            session
                .structure(id, partition)
                .with_context(|| format!("Cannot inspect document {}", id))
        })
        .collect::<Result<Vec<_>>>()?;

    match format {
        OutputFormat::Json => println!("{}", to_json(&structures, compact)?),
        OutputFormat::Text => {
            let use_color = use_colors();
            for structure in &structures {
                println!("{}", render_structure(structure, use_color));
            }
        }
    }
    Ok(())
}
