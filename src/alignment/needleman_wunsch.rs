// SPDX-License-Identifier: MIT OR Apache-2.0

//! Global alignment with a linear gap cost

use super::matrix::SimilarityMatrix;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Stop,
    Diag,
    Up,
    Left,
}

/// Align every query token against the whole span.
///
/// Returns the raw score `D[m][n]` and, per query token, the span column it
/// was paired with. Ties prefer the diagonal, then skipping a query token.
pub(crate) fn align(matrix: &SimilarityMatrix, gap: f32) -> (f32, Vec<Option<usize>>) {
    let (m, n) = (matrix.rows(), matrix.cols());
    let w = n + 1;
    let mut score = vec![0.0f32; (m + 1) * w];
    let mut trace = vec![Step::Stop; (m + 1) * w];

    for i in 1..=m {
        score[i * w] = -gap * i as f32;
        trace[i * w] = Step::Up;
    }
    for j in 1..=n {
        score[j] = -gap * j as f32;
        trace[j] = Step::Left;
    }

    for i in 1..=m {
        for j in 1..=n {
            let diag = score[(i - 1) * w + j - 1] + matrix.get(i - 1, j - 1);
            let up = score[(i - 1) * w + j] - gap;
            let left = score[i * w + j - 1] - gap;
            let (best, step) = if diag >= up && diag >= left {
                (diag, Step::Diag)
            } else if up >= left {
                (up, Step::Up)
            } else {
                (left, Step::Left)
            };
            score[i * w + j] = best;
            trace[i * w + j] = step;
        }
    }

    let mut matches = vec![None; m];
    let (mut i, mut j) = (m, n);
    while i > 0 || j > 0 {
        match trace[i * w + j] {
            Step::Diag => {
                matches[i - 1] = Some(j - 1);
                i -= 1;
                j -= 1;
            }
            Step::Up => i -= 1,
            Step::Left => j -= 1,
            Step::Stop => break,
        }
    }

    (score[m * w + n], matches)
}
