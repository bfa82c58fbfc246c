// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query x span similarity matrix

use crate::errors::{Result, SearchError};

/// Row-major `rows x cols` matrix; rows are query tokens, columns span tokens
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl SimilarityMatrix {
    pub fn new(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(SearchError::dimension(
                format!("{}x{} similarity matrix", rows, cols),
                rows * cols,
                data.len(),
            ));
        }
        Ok(Self { rows, cols, data })
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> f32) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for i in 0..rows {
            for j in 0..cols {
                data.push(f(i, j));
            }
        }
        Self { rows, cols, data }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.cols + col]
    }

    pub fn row(&self, row: usize) -> &[f32] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Multiply row `i` by `weights[i]`
    pub fn scale_rows(&self, weights: &[f32]) -> Self {
        let mut scaled = self.clone();
        for (row, w) in scaled.data.chunks_exact_mut(self.cols.max(1)).zip(weights) {
            for cell in row {
                *cell *= w;
            }
        }
        scaled
    }

    /// Both axes reversed
    pub fn reversed(&self) -> Self {
        let mut data = self.data.clone();
        data.reverse();
        Self {
            rows: self.rows,
            cols: self.cols,
            data,
        }
    }

    pub fn transposed(&self) -> Self {
        Self::from_fn(self.cols, self.rows, |i, j| self.get(j, i))
    }

    /// First maximal cell in row-major order
    pub fn max_entry(&self) -> Option<(usize, usize, f32)> {
        let mut best: Option<(usize, usize, f32)> = None;
        for i in 0..self.rows {
            for j in 0..self.cols {
                let value = self.get(i, j);
                if best.map_or(true, |(_, _, b)| value > b) {
                    best = Some((i, j, value));
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_is_checked() {
        assert!(SimilarityMatrix::new(2, 2, vec![0.0; 3]).is_err());
        let m = SimilarityMatrix::new(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(m.get(1, 0), 4.0);
        assert_eq!(m.row(0), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn reversal_and_transpose() {
        let m = SimilarityMatrix::new(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let r = m.reversed();
        assert_eq!(r.get(0, 0), 6.0);
        assert_eq!(r.get(1, 2), 1.0);
        let t = m.transposed();
        assert_eq!((t.rows(), t.cols()), (3, 2));
        assert_eq!(t.get(2, 1), 6.0);
    }

    #[test]
    fn max_entry_prefers_first() {
        let m = SimilarityMatrix::new(2, 2, vec![0.1, 0.9, 0.9, 0.2]).unwrap();
        assert_eq!(m.max_entry(), Some((0, 1, 0.9)));
        assert_eq!(SimilarityMatrix::zeros(0, 3).max_entry(), None);
    }

    #[test]
    fn rows_scale_independently() {
        let m = SimilarityMatrix::new(2, 2, vec![1.0, 0.5, 1.0, 0.5]).unwrap();
        let s = m.scale_rows(&[2.0, 0.0]);
        assert_eq!(s.as_slice(), &[2.0, 1.0, 0.0, 0.0]);
    }
}
