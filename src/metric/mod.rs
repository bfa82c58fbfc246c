// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vector-space metrics
//!
//! A metric maps two embedding vectors to a similarity in [0, 1]. Composite
//! metrics form a small tree (`Lerp`, `Min`, `Max` over two children) and are
//! evaluated over whole batches at once so the cosine leaves reduce to a
//! single matrix product.

pub mod simd;

use crate::embedding::EmbeddedVector;
use serde::{Deserialize, Serialize};
use std::ops::Range;

fn default_p() -> f32 {
    2.0
}

fn default_scale() -> f32 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum VectorSpaceMetric {
    /// `dot / (|a| |b|)`, 0 when either norm is 0
    #[default]
    Cosine,
    /// `sum(sqrt(a'b')) / (sum(a') sum(b'))` over unit vectors (Zhu et al.)
    ZhuCosine,
    /// `sum(sqrt(ab)) / sqrt(sum(a') sum(b'))`, raw products over unit sums (Sohangir and Wang)
    SohangirCosine,
    /// Minkowski distance mapped to `1 / (1 + scale * distance)`
    PNorm {
        #[serde(default = "default_p")]
        p: f32,
        #[serde(default = "default_scale")]
        scale: f32,
    },
    /// `(1 - t) * a + t * b`
    Lerp {
        a: Box<VectorSpaceMetric>,
        b: Box<VectorSpaceMetric>,
        t: f32,
    },
    Min {
        a: Box<VectorSpaceMetric>,
        b: Box<VectorSpaceMetric>,
    },
    Max {
        a: Box<VectorSpaceMetric>,
        b: Box<VectorSpaceMetric>,
    },
}

impl VectorSpaceMetric {
    pub fn pnorm(p: f32, scale: f32) -> Self {
        Self::PNorm { p, scale }
    }

    pub fn lerp(a: Self, b: Self, t: f32) -> Self {
        Self::Lerp {
            a: Box::new(a),
            b: Box::new(b),
            t,
        }
    }

    pub fn min(a: Self, b: Self) -> Self {
        Self::Min {
            a: Box::new(a),
            b: Box::new(b),
        }
    }

    pub fn max(a: Self, b: Self) -> Self {
        Self::Max {
            a: Box::new(a),
            b: Box::new(b),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Self::Cosine => "cosine".to_string(),
            Self::ZhuCosine => "zhu-cosine".to_string(),
            Self::SohangirCosine => "sohangir-cosine".to_string(),
            Self::PNorm { p, scale } => format!("p-norm(p={}, scale={})", p, scale),
            Self::Lerp { a, b, t } => format!("lerp({}, {}, {})", a.name(), b.name(), t),
            Self::Min { a, b } => format!("min({}, {})", a.name(), b.name()),
            Self::Max { a, b } => format!("max({}, {})", a.name(), b.name()),
        }
    }

    /// Similarity of two embedded vectors
    pub fn similarity(&self, a: &EmbeddedVector, b: &EmbeddedVector) -> f32 {
        let raw = match self {
            Self::Cosine => simd::dot(a.unit(), b.unit()),
            Self::ZhuCosine => zhu_cosine(a.unit(), b.unit()),
            Self::SohangirCosine => sohangir_cosine(a.values(), a.unit(), b.values(), b.unit()),
            Self::PNorm { p, scale } => pnorm_similarity(a.values(), b.values(), *p, *scale),
            Self::Lerp { a: ma, b: mb, t } => {
                lerp(ma.similarity(a, b), mb.similarity(a, b), *t)
            }
            Self::Min { a: ma, b: mb } => ma.similarity(a, b).min(mb.similarity(a, b)),
            Self::Max { a: ma, b: mb } => ma.similarity(a, b).max(mb.similarity(a, b)),
        };
        clamp_unit(raw)
    }

    /// Fill `out` (row-major, `query.len() x doc.len()`) with pairwise similarities
    pub fn fill_matrix(&self, query: BatchView<'_>, doc: BatchView<'_>, out: &mut [f32]) {
        debug_assert_eq!(out.len(), query.len() * doc.len());
        match self {
            Self::Cosine => simd::gemm_nt(query.unit, doc.unit, query.dim, out),
            Self::ZhuCosine => fill_pairwise(query, doc, out, |q, d| zhu_cosine(query.unit(q), doc.unit(d))),
            Self::SohangirCosine => fill_pairwise(query, doc, out, |q, d| {
                sohangir_cosine(query.values(q), query.unit(q), doc.values(d), doc.unit(d))
            }),
            Self::PNorm { p, scale } => fill_pairwise(query, doc, out, |q, d| {
                pnorm_similarity(query.values(q), doc.values(d), *p, *scale)
            }),
            Self::Lerp { a, b, t } => {
                let other = combine_children(a, b, query, doc, out);
                for (x, y) in out.iter_mut().zip(other) {
                    *x = lerp(*x, y, *t);
                }
            }
            Self::Min { a, b } => {
                let other = combine_children(a, b, query, doc, out);
                for (x, y) in out.iter_mut().zip(other) {
                    *x = x.min(y);
                }
            }
            Self::Max { a, b } => {
                let other = combine_children(a, b, query, doc, out);
                for (x, y) in out.iter_mut().zip(other) {
                    *x = x.max(y);
                }
            }
        }
        for cell in out.iter_mut() {
            *cell = clamp_unit(*cell);
        }
    }
}

/// Evaluate `a` into `out` and return `b`'s matrix
fn combine_children(
    a: &VectorSpaceMetric,
    b: &VectorSpaceMetric,
    query: BatchView<'_>,
    doc: BatchView<'_>,
    out: &mut [f32],
) -> Vec<f32> {
    a.fill_matrix(query, doc, out);
    let mut other = vec![0.0; out.len()];
    b.fill_matrix(query, doc, &mut other);
    other
}

fn fill_pairwise(query: BatchView<'_>, doc: BatchView<'_>, out: &mut [f32], f: impl Fn(usize, usize) -> f32) {
    for (i, row) in out.chunks_exact_mut(doc.len().max(1)).enumerate().take(query.len()) {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = f(i, j);
        }
    }
}

/// `num / denom`, 0 unless both are finite and `denom` is non-zero
fn ratio(num: f32, denom: f32) -> f32 {
    if denom == 0.0 || !denom.is_finite() || !num.is_finite() {
        0.0
    } else {
        num / denom
    }
}

/// Negative component products have no real root and give NaN
fn sqrt_products(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x * y).sqrt()).sum()
}

fn zhu_cosine(a_unit: &[f32], b_unit: &[f32]) -> f32 {
    let denom = a_unit.iter().sum::<f32>() * b_unit.iter().sum::<f32>();
    ratio(sqrt_products(a_unit, b_unit), denom)
}

fn sohangir_cosine(a: &[f32], a_unit: &[f32], b: &[f32], b_unit: &[f32]) -> f32 {
    let denom = a_unit.iter().sum::<f32>().sqrt() * b_unit.iter().sum::<f32>().sqrt();
    ratio(sqrt_products(a, b), denom)
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    (1.0 - t) * a + t * b
}

/// Clamp to [0, 1]; NaN maps to 0
pub fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Non-positive `p` falls back to the Euclidean norm
fn pnorm_similarity(a: &[f32], b: &[f32], p: f32, scale: f32) -> f32 {
    let distance = if p <= 0.0 || (p - 2.0).abs() < f32::EPSILON {
        a.iter()
            .zip(b)
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt()
    } else if (p - 1.0).abs() < f32::EPSILON {
        a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum::<f32>()
    } else {
        a.iter()
            .zip(b)
            .map(|(x, y)| (x - y).abs().powf(p))
            .sum::<f32>()
            .powf(1.0 / p)
    };
    1.0 / (1.0 + scale * distance)
}

/// Row-major batch of vectors with cached unit rows and norms
#[derive(Debug, Clone, Default)]
pub struct VectorBatch {
    dim: usize,
    values: Vec<f32>,
    unit: Vec<f32>,
    norms: Vec<f32>,
}

impl VectorBatch {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            ..Self::default()
        }
    }

    pub fn from_vectors<'a>(dim: usize, vectors: impl IntoIterator<Item = &'a EmbeddedVector>) -> Self {
        let mut batch = Self::new(dim);
        for vector in vectors {
            batch.push(vector);
        }
        batch
    }

    pub fn push(&mut self, vector: &EmbeddedVector) {
        self.values.extend_from_slice(vector.values());
        self.unit.extend_from_slice(vector.unit());
        self.norms.push(vector.norm());
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.norms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.norms.is_empty()
    }

    pub fn norms(&self) -> &[f32] {
        &self.norms
    }

    pub fn all(&self) -> BatchView<'_> {
        self.view(0..self.len())
    }

    /// Rows `range` of this batch
    pub fn view(&self, range: Range<usize>) -> BatchView<'_> {
        let d = self.dim;
        BatchView {
            dim: d,
            values: &self.values[range.start * d..range.end * d],
            unit: &self.unit[range.start * d..range.end * d],
            norms: &self.norms[range],
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BatchView<'a> {
    dim: usize,
    values: &'a [f32],
    unit: &'a [f32],
    norms: &'a [f32],
}

impl<'a> BatchView<'a> {
    pub fn len(&self) -> usize {
        self.norms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.norms.is_empty()
    }

    pub fn values(&self, row: usize) -> &'a [f32] {
        &self.values[row * self.dim..(row + 1) * self.dim]
    }

    pub fn unit(&self, row: usize) -> &'a [f32] {
        &self.unit[row * self.dim..(row + 1) * self.dim]
    }

    pub fn norms(&self) -> &'a [f32] {
        self.norms
    }
}
