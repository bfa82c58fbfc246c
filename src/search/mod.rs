// SPDX-License-Identifier: MIT OR Apache-2.0

//! Search engine: per-document scans, bounded selection, merge

pub mod control;
pub mod engine;
pub mod matches;
pub mod top_k;

pub use control::{CancelToken, ProgressSink, SearchControl};
pub use engine::{SearchEngine, SearchOptions};
pub use matches::{Match, MatchRecord, Region, RegionRecord, TokenMatch};
pub use top_k::{merge, rank, TopK};
