// SPDX-License-Identifier: MIT OR Apache-2.0

//! Search command implementation

use crate::cli::{CliAlgorithm, CliCosine, CliWmdVariant, OutputFormat, SearchArgs};
use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use spanseek::alignment::{
    AlignmentAlgorithm, GapCost, NeedlemanWunsch, SmithWaterman, WatermanSmithBeyer, WmdVariant,
    WordMoversDistance, WordRotatorsDistance,
};
use spanseek::config::{Config, ConfigOutputFormat};
use spanseek::document::QueryInput;
use spanseek::embedding::{MapResolver, OovPolicy};
use spanseek::filters::TokenFilter;
use spanseek::output::{render_matches, to_json, use_colors};
use spanseek::utils::split_assignment;
use spanseek::{EmbeddingStore, QueryOptions, SearchControl, TokenMetric, TokenPolicy, VectorSpaceMetric, EXACT_MATCH_SPACE};
use std::path::PathBuf;
use std::time::{Duration, Instant};

const PROGRESS_TICKS: u64 = 1000;

/// Run the search command
pub fn run(args: &SearchArgs, format: Option<OutputFormat>, compact: bool) -> Result<()> {
    let config = Config::load();
    let start_time = Instant::now();

    let format = format.unwrap_or(match config.default_format {
        Some(ConfigOutputFormat::Json) => OutputFormat::Json,
        _ => OutputFormat::Text,
    });

    let (store, cli_spaces) = embedding_store(args, &config)?;
    let session = super::load_session(&args.corpus, store, &config, args.quiet)?;

    let input = match (&args.text, &args.query_file) {
        (_, Some(path)) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read query file {}", path.display()))?;
            serde_json::from_str::<QueryInput>(&content)
                .with_context(|| format!("Invalid query JSON in {}", path.display()))?
        }
        (Some(text), None) => QueryInput::from_words(text),
        (None, None) => return Err(anyhow!("Either --text or --query-file is required")),
    };

    let options = query_options(args, &config, &cli_spaces)?;
    let query = session.query(&input, options).context("Failed to compile query")?;

    let search_options = config
        .search
        .options()
        .with_max_matches(config.merge_max_matches(args.max_matches))
        .with_min_score(config.merge_min_score(args.min_score));
    let search_options = match args.threads.or(config.search.threads) {
        Some(threads) => search_options.with_threads(threads),
        None => search_options,
    };

    let mut control = SearchControl::new();
    if let Some(ms) = args.timeout {
        control = control.with_timeout(Duration::from_millis(ms));
    }
    let progress = (!args.quiet && format == OutputFormat::Text).then(|| ProgressBar::new(PROGRESS_TICKS));
    if let Some(pb) = &progress {
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{bar:40.cyan/blue}] {percent}% | Searching {msg}")
                .context("Invalid progress bar template")?
                .progress_chars("##."),
        );
        pb.set_message(format!("{} documents", session.index().len()));
        let sink = pb.clone();
        control = control.with_progress(move |fraction: f64| {
            sink.set_position((fraction * PROGRESS_TICKS as f64) as u64)
        });
    }

    let matches = session
        .find(&query, &search_options, &control)
        .context("Search failed")?;
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }
    let records = session.records(&query, &matches)?;
    let elapsed = start_time.elapsed();

    match format {
        OutputFormat::Json => println!("{}", to_json(&records, compact)?),
        OutputFormat::Text => print!("{}", render_matches(&records, query.text(), compact, use_colors())),
    }

    if control.cancel_token().is_cancelled() {
        eprintln!("Warning: search stopped early; results are partial");
    }
    if !args.quiet {
        eprintln!(
            "\n{} documents | {} matches | {:.2}ms",
            session.index().len(),
            records.len(),
            elapsed.as_secs_f64() * 1000.0
        );
    }
    Ok(())
}

/// Config spaces plus `--embedding NAME=PATH` files; returns the CLI space names in order
fn embedding_store(args: &SearchArgs, config: &Config) -> Result<(EmbeddingStore, Vec<String>)> {
    let mut store = config
        .embedding_store()
        .context("Failed to load configured embeddings")?;
    let mut names = Vec::new();
    for (i, arg) in args.embeddings.iter().enumerate() {
        let default_name = format!("embedding{}", i);
        let (name, path) = split_assignment(arg, &default_name);
        let path = PathBuf::from(path);
        let resolver = MapResolver::from_text_file(name, &path)
            .with_context(|| format!("Failed to load embedding {} from {}", name, path.display()))?;
        store.add_static(name, Box::new(resolver), OovPolicy::Zero);
        names.push(name.to_string());
    }
    Ok((store, names))
}

fn query_options(args: &SearchArgs, config: &Config, cli_spaces: &[String]) -> Result<QueryOptions> {
    let space = args
        .space
        .clone()
        .or_else(|| cli_spaces.first().cloned())
        .or_else(|| config.embeddings.first().map(|e| e.name.clone()))
        .unwrap_or_else(|| EXACT_MATCH_SPACE.to_string());
    let vector_metric = match (args.pnorm, args.cosine) {
        (Some(p), _) => VectorSpaceMetric::pnorm(p, 1.0),
        (None, Some(CliCosine::Zhu)) => VectorSpaceMetric::ZhuCosine,
        (None, Some(CliCosine::Sohangir)) => VectorSpaceMetric::SohangirCosine,
        (None, Some(CliCosine::Plain) | None) => VectorSpaceMetric::Cosine,
    };

    let mut policy = TokenPolicy::default();
    if let Some(penalty) = args.pos_mismatch_penalty {
        policy.pos_mismatch_penalty = penalty;
    }
    if let Some(threshold) = args.similarity_threshold {
        policy.similarity_threshold = threshold;
    }

    let mut options = QueryOptions::default()
        .with_metric(TokenMetric::embedding(space, vector_metric))
        .with_alignment(alignment(args, config)?)
        .with_partition(super::partition(&args.partition, config))
        .with_policy(policy)
        .with_filter(TokenFilter::new(args.ignore_pos.iter().cloned(), Vec::<String>::new()))
        .with_bidirectional(args.bidirectional);
    if let Some(weight) = args.submatch_weight {
        options = options.with_submatch_weight(weight);
    }
    for arg in &args.pos_weights {
        let (pos, weight) = arg
            .split_once('=')
            .ok_or_else(|| anyhow!("--pos-weight expects POS=WEIGHT, got '{}'", arg))?;
        let weight: f32 = weight
            .parse()
            .with_context(|| format!("Invalid weight in --pos-weight {}", arg))?;
        options = options.with_pos_weight(pos, weight);
    }
    Ok(options)
}

fn wmd_variant(variant: Option<CliWmdVariant>) -> WmdVariant {
    match variant {
        None | Some(CliWmdVariant::Kusner) => WmdVariant::Kusner,
        Some(CliWmdVariant::Vectorian) => WmdVariant::Vectorian,
        Some(CliWmdVariant::Jablonsky) => WmdVariant::Jablonsky,
    }
}

/// Algorithm from `--algorithm` (or config), then parameter flags on top
fn alignment(args: &SearchArgs, config: &Config) -> Result<AlignmentAlgorithm> {
    let mut algorithm = match args.algorithm {
        None => config.alignment(),
        Some(CliAlgorithm::Nw) => AlignmentAlgorithm::NeedlemanWunsch(NeedlemanWunsch::default()),
        Some(CliAlgorithm::Sw) => AlignmentAlgorithm::SmithWaterman(SmithWaterman::default()),
        Some(CliAlgorithm::Wsb) => AlignmentAlgorithm::WatermanSmithBeyer(WatermanSmithBeyer::default()),
        Some(CliAlgorithm::Wmd) => AlignmentAlgorithm::WordMoversDistance(
            WordMoversDistance::wmd(wmd_variant(args.variant))
                .ok_or_else(|| anyhow!("The jablonsky preset only exists for rwmd"))?,
        ),
        Some(CliAlgorithm::Rwmd) => {
            AlignmentAlgorithm::WordMoversDistance(WordMoversDistance::rwmd(wmd_variant(args.variant)))
        }
        Some(CliAlgorithm::Wrd) => AlignmentAlgorithm::WordRotatorsDistance(WordRotatorsDistance::default()),
    };

    match &mut algorithm {
        AlignmentAlgorithm::NeedlemanWunsch(p) => {
            if let Some(gap) = args.gap {
                p.gap = gap;
            }
        }
        AlignmentAlgorithm::SmithWaterman(p) => {
            if let Some(gap) = args.gap {
                p.gap = gap;
            }
            if let Some(zero) = args.zero {
                p.zero = zero;
            }
        }
        AlignmentAlgorithm::WatermanSmithBeyer(p) => {
            if let Some(step) = args.gap {
                p.gap = GapCost::Linear { step, start: None };
            }
            if let Some(cutoff) = args.gap_cutoff {
                p.gap = GapCost::Exponential { cutoff };
            }
            if let Some(zero) = args.zero {
                p.zero = zero;
            }
        }
        AlignmentAlgorithm::WordMoversDistance(p) => {
            if let Some(penalty) = args.extra_mass_penalty {
                p.extra_mass_penalty = penalty;
            }
        }
        AlignmentAlgorithm::WordRotatorsDistance(p) => {
            if let Some(penalty) = args.extra_mass_penalty {
                p.extra_mass_penalty = penalty;
            }
        }
    }
    Ok(algorithm)
}
