// SPDX-License-Identifier: MIT OR Apache-2.0

//! Word Rotator's Distance: mover's distance with mass proportional to
//! embedding vector magnitude.

use super::wmd::{transport_alignment, Problem, Solver};
use super::{Alignment, AlignmentInput};
use crate::errors::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WordRotatorsDistance {
    /// Scale both sides to unit total mass
    pub normalize_magnitudes: bool,
    /// Cost per unit of mass left unmoved; negative disables the charge
    pub extra_mass_penalty: f32,
}

impl Default for WordRotatorsDistance {
    fn default() -> Self {
        Self {
            normalize_magnitudes: true,
            extra_mass_penalty: -1.0,
        }
    }
}

impl WordRotatorsDistance {
    pub(crate) fn score(&self, input: &AlignmentInput<'_>) -> Result<Alignment> {
        let query = (0..input.matrix.rows())
            .map(|i| (input.query_magnitude(i) * input.query_weight(i)) as f64)
            .collect();
        let span = (0..input.matrix.cols())
            .map(|j| input.span_magnitude(j) as f64)
            .collect();
        transport_alignment(
            input,
            Problem {
                query,
                span,
                normalize: self.normalize_magnitudes,
                merge_bins: false,
                solver: Solver::Exact,
                extra_mass_penalty: self.extra_mass_penalty,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::SimilarityMatrix;
    use crate::errors::SearchError;

    #[test]
    fn heavy_tokens_dominate_the_score() {
        // query [a, b] against span [a]; b carries most of the mass
        let matrix = SimilarityMatrix::new(2, 1, vec![1.0, 0.0]).unwrap();
        let ids = [1, 2];
        let span_ids = [1];
        let light_b = [3.0, 1.0];
        let heavy_b = [1.0, 3.0];
        let span_mag = [1.0];
        let wrd = WordRotatorsDistance::default();

        let light = wrd
            .score(&AlignmentInput::new(&matrix, &ids, &span_ids).with_magnitudes(&light_b, &span_mag))
            .unwrap();
        let heavy = wrd
            .score(&AlignmentInput::new(&matrix, &ids, &span_ids).with_magnitudes(&heavy_b, &span_mag))
            .unwrap();
        assert!((light.score - 0.75).abs() < 1e-6);
        assert!((heavy.score - 0.25).abs() < 1e-6);
    }

    #[test]
    fn unnormalized_mass_difference_is_penalized() {
        let matrix = SimilarityMatrix::new(1, 1, vec![1.0]).unwrap();
        let ids = [1];
        let query_mag = [2.0];
        let span_mag = [1.0];
        let input = AlignmentInput::new(&matrix, &ids, &ids).with_magnitudes(&query_mag, &span_mag);
        let wrd = WordRotatorsDistance {
            normalize_magnitudes: false,
            extra_mass_penalty: 0.5,
        };
        let alignment = wrd.score(&input).unwrap();
        assert!((alignment.score - 0.5).abs() < 1e-6);
        assert_eq!(alignment.matches, vec![Some(0)]);
    }

    #[test]
    fn zero_magnitudes_are_degenerate() {
        let matrix = SimilarityMatrix::new(1, 1, vec![1.0]).unwrap();
        let ids = [1];
        let zeros = [0.0];
        let input = AlignmentInput::new(&matrix, &ids, &ids).with_magnitudes(&zeros, &zeros);
        assert!(matches!(
            WordRotatorsDistance::default().score(&input),
            Err(SearchError::DegenerateDistribution)
        ));
    }
}
