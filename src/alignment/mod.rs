// SPDX-License-Identifier: MIT OR Apache-2.0

//! Alignment engine
//!
//! Every algorithm consumes the same [`AlignmentInput`] (a query x span
//! similarity matrix plus per-token weights) and returns an [`Alignment`]:
//! a score where higher is better and, per query token, the span token it
//! was paired with.

pub mod gap;
pub mod matrix;
mod needleman_wunsch;
mod smith_waterman;
mod transport;
pub mod wmd;
pub mod wrd;

pub use gap::GapCost;
pub use matrix::SimilarityMatrix;
pub use wmd::{WmdVariant, WordMoversDistance};
pub use wrd::WordRotatorsDistance;

use crate::errors::{Result, SearchError};
use crate::vocabulary::TokenId;
use serde::{Deserialize, Serialize};

/// Everything an alignment call reads
#[derive(Debug, Clone, Copy)]
pub struct AlignmentInput<'a> {
    pub matrix: &'a SimilarityMatrix,
    pub query_ids: &'a [TokenId],
    pub span_ids: &'a [TokenId],
    /// Per query token; `None` means all 1
    pub query_weights: Option<&'a [f32]>,
    /// Embedding norms; `None` means all 1
    pub query_magnitudes: Option<&'a [f32]>,
    pub span_magnitudes: Option<&'a [f32]>,
    /// Exponent discounting unmatched query weight in DP normalization
    pub submatch_weight: f32,
}

impl<'a> AlignmentInput<'a> {
    pub fn new(matrix: &'a SimilarityMatrix, query_ids: &'a [TokenId], span_ids: &'a [TokenId]) -> Self {
        Self {
            matrix,
            query_ids,
            span_ids,
            query_weights: None,
            query_magnitudes: None,
            span_magnitudes: None,
            submatch_weight: 0.0,
        }
    }

    pub fn with_query_weights(mut self, weights: &'a [f32]) -> Self {
        self.query_weights = Some(weights);
        self
    }

    pub fn with_magnitudes(mut self, query: &'a [f32], span: &'a [f32]) -> Self {
        self.query_magnitudes = Some(query);
        self.span_magnitudes = Some(span);
        self
    }

    pub fn with_submatch_weight(mut self, submatch_weight: f32) -> Self {
        self.submatch_weight = submatch_weight;
        self
    }

    pub(crate) fn query_weight(&self, i: usize) -> f32 {
        self.query_weights.map_or(1.0, |w| w[i])
    }

    pub(crate) fn query_magnitude(&self, i: usize) -> f32 {
        self.query_magnitudes.map_or(1.0, |m| m[i])
    }

    pub(crate) fn span_magnitude(&self, j: usize) -> f32 {
        self.span_magnitudes.map_or(1.0, |m| m[j])
    }

    /// Check that every side table agrees with the matrix shape
    pub fn validate(&self) -> Result<()> {
        let (m, n) = (self.matrix.rows(), self.matrix.cols());
        let checks = [
            ("query tokens", m, Some(self.query_ids.len())),
            ("span tokens", n, Some(self.span_ids.len())),
            ("query weights", m, self.query_weights.map(<[f32]>::len)),
            ("query magnitudes", m, self.query_magnitudes.map(<[f32]>::len)),
            ("span magnitudes", n, self.span_magnitudes.map(<[f32]>::len)),
        ];
        for (what, expected, actual) in checks {
            if let Some(actual) = actual {
                if actual != expected {
                    return Err(SearchError::dimension(what, expected, actual));
                }
            }
        }
        Ok(())
    }

    fn total_weight(&self) -> f32 {
        (0..self.matrix.rows()).map(|i| self.query_weight(i)).sum()
    }
}

/// Outcome of aligning a query against one span
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    pub score: f32,
    /// Span column paired with each query token
    pub matches: Vec<Option<usize>>,
}

impl Alignment {
    pub fn unmatched(query_len: usize, score: f32) -> Self {
        Self {
            score,
            matches: vec![None; query_len],
        }
    }
}

fn default_gap() -> f32 {
    0.0
}

fn default_zero() -> f32 {
    0.5
}

fn default_true() -> bool {
    true
}

/// Global alignment with linear gap cost
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeedlemanWunsch {
    #[serde(default = "default_gap")]
    pub gap: f32,
}

impl Default for NeedlemanWunsch {
    fn default() -> Self {
        Self {
            gap: default_gap(),
        }
    }
}

/// Local alignment with linear gap cost
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmithWaterman {
    #[serde(default = "default_gap")]
    pub gap: f32,
    #[serde(default = "default_zero")]
    pub zero: f32,
}

impl Default for SmithWaterman {
    fn default() -> Self {
        Self {
            gap: default_gap(),
            zero: default_zero(),
        }
    }
}

/// Local alignment with a general gap cost curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatermanSmithBeyer {
    #[serde(default)]
    pub gap: GapCost,
    #[serde(default = "default_zero")]
    pub zero: f32,
    /// Clip gap costs into [0, 1] instead of rejecting them
    #[serde(default = "default_true")]
    pub clamp_gap: bool,
}

impl Default for WatermanSmithBeyer {
    fn default() -> Self {
        Self {
            gap: GapCost::default(),
            zero: default_zero(),
            clamp_gap: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "kebab-case")]
pub enum AlignmentAlgorithm {
    NeedlemanWunsch(NeedlemanWunsch),
    SmithWaterman(SmithWaterman),
    WatermanSmithBeyer(WatermanSmithBeyer),
    WordMoversDistance(WordMoversDistance),
    WordRotatorsDistance(WordRotatorsDistance),
}

impl Default for AlignmentAlgorithm {
    fn default() -> Self {
        Self::WatermanSmithBeyer(WatermanSmithBeyer::default())
    }
}

impl AlignmentAlgorithm {
    pub fn needleman_wunsch(gap: f32) -> Self {
        Self::NeedlemanWunsch(NeedlemanWunsch { gap })
    }

    pub fn smith_waterman(gap: f32, zero: f32) -> Self {
        Self::SmithWaterman(SmithWaterman { gap, zero })
    }

    pub fn waterman_smith_beyer(gap: GapCost, zero: f32) -> Self {
        Self::WatermanSmithBeyer(WatermanSmithBeyer {
            gap,
            zero,
            clamp_gap: true,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::NeedlemanWunsch(_) => "needleman-wunsch",
            Self::SmithWaterman(_) => "smith-waterman",
            Self::WatermanSmithBeyer(_) => "waterman-smith-beyer",
            Self::WordMoversDistance(_) => "word-movers-distance",
            Self::WordRotatorsDistance(_) => "word-rotators-distance",
        }
    }

    /// Whether the algorithm is order-sensitive (and so can run reversed)
    pub fn is_sequential(&self) -> bool {
        matches!(
            self,
            Self::NeedlemanWunsch(_) | Self::SmithWaterman(_) | Self::WatermanSmithBeyer(_)
        )
    }

    /// Penalty charged for an unaligned run of `length` span tokens inside a match
    pub fn gap_penalty(&self, length: usize) -> Result<f32> {
        match self {
            Self::NeedlemanWunsch(p) => Ok(p.gap * length as f32),
            Self::SmithWaterman(p) => Ok(p.gap.max(0.0) * length as f32),
            Self::WatermanSmithBeyer(p) => p.gap.penalty(length, p.clamp_gap),
            Self::WordMoversDistance(_) | Self::WordRotatorsDistance(_) => Ok(0.0),
        }
    }

    /// Align and score.
    ///
    /// Sequential scores are normalized by the query's reference weight, so
    /// a query fully matched at similarity 1 scores 1.
    pub fn score(&self, input: &AlignmentInput<'_>) -> Result<Alignment> {
        input.validate()?;
        match self {
            Self::WordMoversDistance(p) => p.score(input),
            Self::WordRotatorsDistance(p) => p.score(input),
            Self::NeedlemanWunsch(p) => sequential(input, |matrix| Ok(needleman_wunsch::align(matrix, p.gap))),
            Self::SmithWaterman(p) => sequential(input, |matrix| {
                let gap = p.gap.max(0.0);
                let longest = matrix.rows().max(matrix.cols());
                let table: Vec<f32> = (0..=longest).map(|k| gap * k as f32).collect();
                Ok(smith_waterman::align(matrix, p.zero, &table))
            }),
            Self::WatermanSmithBeyer(p) => sequential(input, |matrix| {
                let longest = matrix.rows().max(matrix.cols());
                let table = p.gap.table(longest, p.clamp_gap)?;
                Ok(smith_waterman::align(matrix, p.zero, &table))
            }),
        }
    }

    /// Like [`score`](Self::score), but sequential algorithms also try the
    /// reversed sequences and keep the better result.
    pub fn score_bidirectional(&self, input: &AlignmentInput<'_>) -> Result<Alignment> {
        let forward = self.score(input)?;
        if !self.is_sequential() {
            return Ok(forward);
        }
        let backward = self.score_reversed(input)?;
        Ok(if backward.score > forward.score {
            backward
        } else {
            forward
        })
    }

    fn score_reversed(&self, input: &AlignmentInput<'_>) -> Result<Alignment> {
        let (m, n) = (input.matrix.rows(), input.matrix.cols());
        let matrix = input.matrix.reversed();
        let query_ids: Vec<TokenId> = input.query_ids.iter().rev().copied().collect();
        let span_ids: Vec<TokenId> = input.span_ids.iter().rev().copied().collect();
        let weights: Option<Vec<f32>> = input
            .query_weights
            .map(|w| w.iter().rev().copied().collect());
        let mut reversed = AlignmentInput::new(&matrix, &query_ids, &span_ids)
            .with_submatch_weight(input.submatch_weight);
        if let Some(weights) = weights.as_deref() {
            reversed = reversed.with_query_weights(weights);
        }
        let alignment = self.score(&reversed)?;
        let mut matches = vec![None; m];
        for (i, j) in alignment.matches.into_iter().enumerate() {
            matches[m - 1 - i] = j.map(|j| n - 1 - j);
        }
        Ok(Alignment {
            score: alignment.score,
            matches,
        })
    }
}

/// Run a dynamic-programming aligner over the weighted matrix
fn sequential(
    input: &AlignmentInput<'_>,
    align: impl FnOnce(&SimilarityMatrix) -> Result<(f32, Vec<Option<usize>>)>,
) -> Result<Alignment> {
    let (raw, matches) = match input.query_weights {
        Some(weights) if weights.iter().any(|w| *w != 1.0) => align(&input.matrix.scale_rows(weights))?,
        _ => align(input.matrix)?,
    };
    Ok(Alignment {
        score: normalize(raw, &matches, input),
        matches,
    })
}

/// `raw / reference`, where the reference discounts unmatched query weight
/// by `(unmatched / total) ^ submatch_weight`.
fn normalize(raw: f32, matches: &[Option<usize>], input: &AlignmentInput<'_>) -> f32 {
    let total = input.total_weight();
    if total <= 0.0 {
        return 0.0;
    }
    let matched: f32 = matches
        .iter()
        .enumerate()
        .filter(|(_, j)| j.is_some())
        .map(|(i, _)| input.query_weight(i))
        .sum();
    let unmatched = (total - matched).max(0.0);
    let reference = matched + (unmatched / total).powf(input.submatch_weight) * unmatched;
    if reference <= 0.0 {
        0.0
    } else {
        raw / reference
    }
}
