// SPDX-License-Identifier: MIT OR Apache-2.0

//! spanseek - span-level similarity search over tokenized corpora
//!
//! A query span is scored against every span of every document by building
//! a token similarity matrix from one or more embedding spaces and running
//! an alignment algorithm over it (Needleman-Wunsch, Smith-Waterman,
//! Waterman-Smith-Beyer, Word Mover's or Word Rotator's Distance).

pub mod alignment;
pub mod config;
pub mod document;
pub mod embedding;
pub mod errors;
pub mod filters;
pub mod metric;
pub mod normalize;
pub mod output;
pub mod query;
pub mod search;
pub mod session;
pub mod similarity;
pub mod utils;
pub mod vocabulary;

pub use alignment::{AlignmentAlgorithm, GapCost, WmdVariant, WordMoversDistance, WordRotatorsDistance};
pub use document::{DocumentInput, Partition, QueryInput};
pub use embedding::{EmbeddingStore, OovPolicy, EXACT_MATCH_SPACE};
pub use errors::{Result, SearchError};
pub use metric::VectorSpaceMetric;
pub use query::{Query, QueryOptions};
pub use search::{CancelToken, Match, MatchRecord, SearchControl, SearchOptions};
pub use session::Session;
pub use similarity::{TokenMetric, TokenPolicy};
