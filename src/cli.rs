// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI argument parsing using clap

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// spanseek - span-level similarity search over tokenized corpora
///
/// Scores every sentence or token window of a corpus against a query span
/// using embedding similarities and sequence alignment or word mover's distance.
#[derive(Parser, Debug)]
#[command(name = "spanseek")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true)]
    pub format: Option<OutputFormat>,

    /// Compact output (one line per match, no pretty JSON)
    #[arg(long, global = true)]
    pub compact: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for results
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Alignment algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliAlgorithm {
    /// Needleman-Wunsch global alignment
    Nw,
    /// Smith-Waterman local alignment
    Sw,
    /// Waterman-Smith-Beyer local alignment with a gap cost curve
    Wsb,
    /// Word Mover's Distance
    Wmd,
    /// Relaxed Word Mover's Distance
    Rwmd,
    /// Word Rotator's Distance
    Wrd,
}

/// Cosine flavour for embedding comparisons
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliCosine {
    /// Dot product of unit vectors
    Plain,
    /// Zhu et al.
    Zhu,
    /// Sohangir and Wang
    Sohangir,
}

/// Word mover's distance parameter preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliWmdVariant {
    Kusner,
    Vectorian,
    Jablonsky,
}

/// Span partition level
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliLevel {
    Sentence,
    Token,
}

/// Partition flags shared by search and inspect
#[derive(Args, Debug, Clone, Default)]
pub struct PartitionArgs {
    /// Span unit (default: sentence)
    #[arg(long, value_enum)]
    pub level: Option<CliLevel>,

    /// Units per span
    #[arg(long)]
    pub window: Option<usize>,

    /// Units between span starts
    #[arg(long)]
    pub step: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// Document JSON file or directory of them
    pub corpus: PathBuf,

    /// Query text, split on whitespace
    #[arg(short, long, conflicts_with = "query_file", required_unless_present = "query_file")]
    pub text: Option<String>,

    /// Tokenized query JSON (`text` plus `tokens`)
    #[arg(long)]
    pub query_file: Option<PathBuf>,

    /// Load a word-vector text file as a static embedding space (repeatable)
    #[arg(long = "embedding", value_name = "NAME=PATH")]
    pub embeddings: Vec<String>,

    /// Embedding space to compare tokens in (default: first configured, else exact)
    #[arg(long, value_name = "NAME")]
    pub space: Option<String>,

    /// Use a Minkowski distance of this order instead of cosine
    #[arg(long, value_name = "P")]
    pub pnorm: Option<f32>,

    /// Cosine variant to compare vectors with (default: plain)
    #[arg(long, value_enum, conflicts_with = "pnorm")]
    pub cosine: Option<CliCosine>,

    /// Alignment algorithm (default: config, else wsb)
    #[arg(short, long, value_enum)]
    pub algorithm: Option<CliAlgorithm>,

    /// Gap cost: per token for nw/sw, linear step for wsb
    #[arg(long)]
    pub gap: Option<f32>,

    /// Exponential gap cost cutoff for wsb
    #[arg(long)]
    pub gap_cutoff: Option<f32>,

    /// Similarity floor of local alignments
    #[arg(long)]
    pub zero: Option<f32>,

    /// Preset for wmd and rwmd (default: kusner)
    #[arg(long, value_enum)]
    pub variant: Option<CliWmdVariant>,

    /// Penalty per unit of unmoved mass for wmd/rwmd/wrd
    #[arg(long, allow_hyphen_values = true)]
    pub extra_mass_penalty: Option<f32>,

    #[command(flatten)]
    pub partition: PartitionArgs,

    /// Maximum number of matches to return
    #[arg(short = 'm', long)]
    pub max_matches: Option<usize>,

    /// Discard matches scoring below this
    #[arg(long)]
    pub min_score: Option<f32>,

    /// Worker threads
    #[arg(short = 'j', long)]
    pub threads: Option<usize>,

    /// Also align reversed sequences and keep the better score
    #[arg(long)]
    pub bidirectional: bool,

    /// Exponent discounting unmatched query weight
    #[arg(long)]
    pub submatch_weight: Option<f32>,

    /// Weight query tokens by POS tag (repeatable)
    #[arg(long = "pos-weight", value_name = "POS=WEIGHT")]
    pub pos_weights: Vec<String>,

    /// Drop query tokens with this POS tag (repeatable)
    #[arg(long = "ignore-pos", value_name = "POS")]
    pub ignore_pos: Vec<String>,

    /// Fraction of similarity removed when POS tags differ
    #[arg(long)]
    pub pos_mismatch_penalty: Option<f32>,

    /// Token similarities below this count as 0
    #[arg(long)]
    pub similarity_threshold: Option<f32>,

    /// Stop after this many milliseconds and report partial results
    #[arg(long, value_name = "MS")]
    pub timeout: Option<u64>,

    /// Suppress progress bar and statistics
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search a corpus for spans similar to a query
    #[command(alias = "s")]
    Search(SearchArgs),

    /// Show how documents split into spans
    Inspect {
        /// Document JSON file or directory of them
        corpus: PathBuf,

        /// Only this document id
        #[arg(short, long)]
        document: Option<usize>,

        #[command(flatten)]
        partition: PartitionArgs,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
