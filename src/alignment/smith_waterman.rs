// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local alignment with an arbitrary gap cost table (Waterman-Smith-Beyer).
//!
//! Cells accumulate `sim - zero`, so a pairing only helps when its
//! similarity exceeds `zero`; any cell that would drop to 0 or below resets.
//! Smith-Waterman is the special case of a linear table.

use super::gap::lookup;
use super::matrix::SimilarityMatrix;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Stop,
    Diag,
    Up(u32),
    Left(u32),
}

/// Returns the raw path score (aligned similarities minus gap costs on the
/// path) and the per-query-token pairing.
///
/// When no cell rises above the floor the result collapses to the single
/// most similar cell.
pub(crate) fn align(matrix: &SimilarityMatrix, zero: f32, gap_costs: &[f32]) -> (f32, Vec<Option<usize>>) {
    let (m, n) = (matrix.rows(), matrix.cols());
    let w = n + 1;
    let mut score = vec![0.0f32; (m + 1) * w];
    let mut trace = vec![Step::Stop; (m + 1) * w];
    let mut best = 0.0f32;
    let mut best_cell = None;

    for i in 1..=m {
        for j in 1..=n {
            let mut value = 0.0f32;
            let mut step = Step::Stop;

            let diag = score[(i - 1) * w + j - 1] + matrix.get(i - 1, j - 1) - zero;
            if diag > value {
                value = diag;
                step = Step::Diag;
            }
            for k in 1..=i {
                let up = score[(i - k) * w + j] - lookup(gap_costs, k);
                if up > value {
                    value = up;
                    step = Step::Up(k as u32);
                }
            }
            for k in 1..=j {
                let left = score[i * w + j - k] - lookup(gap_costs, k);
                if left > value {
                    value = left;
                    step = Step::Left(k as u32);
                }
            }

            score[i * w + j] = value;
            trace[i * w + j] = step;
            if value > best {
                best = value;
                best_cell = Some((i, j));
            }
        }
    }

    let mut matches = vec![None; m];
    let Some((mut i, mut j)) = best_cell else {
        return match matrix.max_entry() {
            Some((i, j, sim)) if sim > 0.0 => {
                matches[i] = Some(j);
                (sim, matches)
            }
            _ => (0.0, matches),
        };
    };

    let mut raw = 0.0f32;
    loop {
        match trace[i * w + j] {
            Step::Diag => {
                raw += matrix.get(i - 1, j - 1);
                matches[i - 1] = Some(j - 1);
                i -= 1;
                j -= 1;
            }
            Step::Up(k) => {
                raw -= lookup(gap_costs, k as usize);
                i -= k as usize;
            }
            Step::Left(k) => {
                raw -= lookup(gap_costs, k as usize);
                j -= k as usize;
            }
            Step::Stop => break,
        }
    }

    (raw, matches)
}
