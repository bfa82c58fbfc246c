// SPDX-License-Identifier: MIT OR Apache-2.0

//! Word Mover's Distance and the shared mass-transport scoring.
//!
//! Query and span become distributions over bins (one bin per token, or one
//! per distinct vocabulary id with `normalize_bow`). Moving a unit of mass
//! between two bins costs `1 - sim`. The alignment score is `1 - cost`.

use super::transport;
use super::{Alignment, AlignmentInput};
use crate::errors::{Result, SearchError};
use crate::vocabulary::TokenId;
use serde::{Deserialize, Serialize};

const FLOW_EPS: f64 = 1e-9;

/// Named parameter presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WmdVariant {
    Kusner,
    Vectorian,
    Jablonsky,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WordMoversDistance {
    /// Solve per-source nearest-target bounds instead of the full problem
    pub relaxed: bool,
    /// Exact: one-to-one bin assignment. Relaxed: each source picks a single target
    pub injective: bool,
    /// Relaxed only: also bound the reverse direction and keep the larger cost
    pub symmetric: bool,
    /// Merge repeated tokens into frequency-weighted bins
    pub normalize_bow: bool,
    /// Cost per unit of mass left unmoved; negative disables the charge
    pub extra_mass_penalty: f32,
}

impl Default for WordMoversDistance {
    fn default() -> Self {
        Self {
            relaxed: true,
            injective: true,
            symmetric: false,
            normalize_bow: false,
            extra_mass_penalty: -1.0,
        }
    }
}

impl WordMoversDistance {
    /// Full problem presets; Jablonsky only defines a relaxed variant
    pub fn wmd(variant: WmdVariant) -> Option<Self> {
        match variant {
            WmdVariant::Kusner => Some(Self::full(true)),
            WmdVariant::Vectorian => Some(Self::full(false)),
            WmdVariant::Jablonsky => None,
        }
    }

    fn full(normalize_bow: bool) -> Self {
        Self {
            relaxed: false,
            injective: false,
            symmetric: false,
            normalize_bow,
            extra_mass_penalty: -1.0,
        }
    }

    /// Relaxed presets
    pub fn rwmd(variant: WmdVariant) -> Self {
        let (injective, symmetric, normalize_bow) = match variant {
            WmdVariant::Kusner => (true, true, true),
            WmdVariant::Jablonsky => (false, true, true),
            WmdVariant::Vectorian => (true, false, false),
        };
        Self {
            relaxed: true,
            injective,
            symmetric,
            normalize_bow,
            extra_mass_penalty: -1.0,
        }
    }

    pub fn with_extra_mass_penalty(mut self, penalty: f32) -> Self {
        self.extra_mass_penalty = penalty;
        self
    }

    pub(crate) fn score(&self, input: &AlignmentInput<'_>) -> Result<Alignment> {
        let query: Vec<f64> = (0..input.matrix.rows())
            .map(|i| input.query_weight(i) as f64)
            .collect();
        let span = vec![1.0; input.matrix.cols()];
        let solver = match (self.relaxed, self.injective) {
            (true, injective) => Solver::Relaxed {
                injective,
                symmetric: self.symmetric,
            },
            (false, true) => Solver::Assignment,
            (false, false) => Solver::Exact,
        };
        transport_alignment(
            input,
            Problem {
                query,
                span,
                normalize: true,
                merge_bins: self.normalize_bow,
                solver,
                extra_mass_penalty: self.extra_mass_penalty,
            },
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Solver {
    Relaxed { injective: bool, symmetric: bool },
    Assignment,
    Exact,
}

pub(crate) struct Problem {
    pub query: Vec<f64>,
    pub span: Vec<f64>,
    pub normalize: bool,
    pub merge_bins: bool,
    pub solver: Solver,
    pub extra_mass_penalty: f32,
}

struct Bins {
    mass: Vec<f64>,
    members: Vec<Vec<usize>>,
    bin_of: Vec<usize>,
}

impl Bins {
    fn new(ids: &[TokenId], mass: &[f64], merge: bool) -> Self {
        let mut bins = Self {
            mass: Vec::new(),
            members: Vec::new(),
            bin_of: Vec::with_capacity(ids.len()),
        };
        for (pos, (&id, &m)) in ids.iter().zip(mass).enumerate() {
            let existing = if merge {
                bins.members
                    .iter()
                    .position(|members| ids[members[0]] == id)
            } else {
                None
            };
            match existing {
                Some(bin) => {
                    bins.mass[bin] += m;
                    bins.members[bin].push(pos);
                    bins.bin_of.push(bin);
                }
                None => {
                    bins.bin_of.push(bins.mass.len());
                    bins.mass.push(m);
                    bins.members.push(vec![pos]);
                }
            }
        }
        bins
    }

    fn len(&self) -> usize {
        self.mass.len()
    }
}

/// Score a transport problem and derive token pairings from the plan
pub(crate) fn transport_alignment(input: &AlignmentInput<'_>, problem: Problem) -> Result<Alignment> {
    let matrix = input.matrix;
    let (m, n) = (matrix.rows(), matrix.cols());
    let Problem {
        mut query,
        mut span,
        normalize,
        merge_bins,
        solver,
        extra_mass_penalty,
    } = problem;

    let query_total: f64 = query.iter().map(|v| v.max(0.0)).sum();
    let span_total: f64 = span.iter().map(|v| v.max(0.0)).sum();
    if query_total <= 0.0 && span_total <= 0.0 {
        return Err(SearchError::DegenerateDistribution);
    }
    if query_total <= 0.0 || span_total <= 0.0 {
        return Ok(Alignment::unmatched(m, 0.0));
    }
    for v in query.iter_mut().chain(span.iter_mut()) {
        *v = v.max(0.0);
    }
    if normalize {
        query.iter_mut().for_each(|v| *v /= query_total);
        span.iter_mut().for_each(|v| *v /= span_total);
    }

    let q_bins = Bins::new(input.query_ids, &query, merge_bins);
    let s_bins = Bins::new(input.span_ids, &span, merge_bins);
    let (rows, cols) = (q_bins.len(), s_bins.len());

    let mut cost = vec![0.0f64; rows * cols];
    for a in 0..rows {
        for b in 0..cols {
            let mut best = 0.0f32;
            for &i in &q_bins.members[a] {
                for &j in &s_bins.members[b] {
                    best = best.max(matrix.get(i, j));
                }
            }
            cost[a * cols + b] = 1.0 - best.clamp(0.0, 1.0) as f64;
        }
    }

    let (total_cost, moved, flow) = match solver {
        Solver::Exact => {
            let plan = transport::exact(&q_bins.mass, &s_bins.mass, &cost);
            (plan.cost, plan.moved, plan.flow)
        }
        Solver::Assignment => {
            let mut objective = vec![0.0f64; rows * cols];
            for a in 0..rows {
                for b in 0..cols {
                    let shared = q_bins.mass[a].min(s_bins.mass[b]);
                    objective[a * cols + b] = -shared * (1.0 - cost[a * cols + b]);
                }
            }
            let mut flow = vec![0.0f64; rows * cols];
            let (mut total, mut moved) = (0.0, 0.0);
            for (a, target) in transport::assignment(&objective, rows, cols).into_iter().enumerate() {
                if let Some(b) = target {
                    let shared = q_bins.mass[a].min(s_bins.mass[b]);
                    flow[a * cols + b] = shared;
                    total += shared * cost[a * cols + b];
                    moved += shared;
                }
            }
            (total, moved, flow)
        }
        Solver::Relaxed {
            injective,
            symmetric,
        } => {
            let (forward, flow) = relaxed(&q_bins.mass, &s_bins.mass, &cost, injective);
            let mut total = forward;
            if symmetric {
                let transposed: Vec<f64> = (0..cols)
                    .flat_map(|b| (0..rows).map(move |a| (a, b)))
                    .map(|(a, b)| cost[a * cols + b])
                    .collect();
                let (backward, _) = relaxed(&s_bins.mass, &q_bins.mass, &transposed, injective);
                total = total.max(backward);
            }
            let moved: f64 = flow.iter().sum();
            (total, moved, flow)
        }
    };

    let query_mass: f64 = q_bins.mass.iter().sum();
    let span_mass: f64 = s_bins.mass.iter().sum();
    let unmatched = (query_mass.max(span_mass) - moved).max(0.0);
    let mut total_cost = total_cost;
    if extra_mass_penalty >= 0.0 {
        total_cost += extra_mass_penalty as f64 * unmatched;
    }

    let mut matches = vec![None; m];
    for (i, slot) in matches.iter_mut().enumerate() {
        let a = q_bins.bin_of[i];
        let target = (0..cols)
            .filter(|&b| flow[a * cols + b] > FLOW_EPS)
            .max_by(|&x, &y| {
                flow[a * cols + x]
                    .partial_cmp(&flow[a * cols + y])
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| y.cmp(&x))
            });
        if let Some(b) = target {
            *slot = s_bins.members[b]
                .iter()
                .copied()
                .max_by(|&x, &y| {
                    matrix
                        .get(i, x)
                        .partial_cmp(&matrix.get(i, y))
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| y.cmp(&x))
                });
        }
    }

    debug_assert!(n == 0 || matches.iter().flatten().all(|&j| j < n));
    Ok(Alignment {
        score: (1.0 - total_cost) as f32,
        matches,
    })
}

/// Per-source nearest-target bound.
///
/// `injective` sends each source's whole mass to its cheapest target;
/// otherwise targets are filled in cost order up to their own mass.
fn relaxed(source: &[f64], target: &[f64], cost: &[f64], injective: bool) -> (f64, Vec<f64>) {
    let cols = target.len();
    let mut flow = vec![0.0; source.len() * cols];
    let mut total = 0.0;
    for (a, &mass) in source.iter().enumerate() {
        if mass <= 0.0 || cols == 0 {
            continue;
        }
        let row = &cost[a * cols..(a + 1) * cols];
        let mut order: Vec<usize> = (0..cols).collect();
        order.sort_by(|&x, &y| {
            row[x]
                .partial_cmp(&row[y])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        if injective {
            let b = order[0];
            flow[a * cols + b] = mass;
            total += mass * row[b];
            continue;
        }
        let mut remaining = mass;
        for b in order {
            if remaining <= FLOW_EPS {
                break;
            }
            let take = remaining.min(target[b]);
            flow[a * cols + b] += take;
            total += take * row[b];
            remaining -= take;
        }
    }
    (total, flow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::SimilarityMatrix;

    fn identity(n: usize) -> SimilarityMatrix {
        SimilarityMatrix::from_fn(n, n, |i, j| if i == j { 1.0 } else { 0.0 })
    }

    fn ids(n: usize) -> Vec<TokenId> {
        (0..n as TokenId).collect()
    }

    fn exact_match(query: &[TokenId], span: &[TokenId]) -> SimilarityMatrix {
        SimilarityMatrix::from_fn(query.len(), span.len(), |i, j| {
            if query[i] == span[j] {
                1.0
            } else {
                0.0
            }
        })
    }

    #[test]
    fn exact_injective_identity_costs_nothing() {
        let matrix = identity(4);
        let q = ids(4);
        let input = AlignmentInput::new(&matrix, &q, &q);
        let wmd = WordMoversDistance {
            relaxed: false,
            injective: true,
            ..WordMoversDistance::default()
        };
        let alignment = wmd.score(&input).unwrap();
        assert!((alignment.score - 1.0).abs() < 1e-6);
        assert_eq!(alignment.matches, vec![Some(0), Some(1), Some(2), Some(3)]);
    }

    #[test]
    fn default_is_relaxed_injective_one_way() {
        let wmd = WordMoversDistance::default();
        assert_eq!(
            (wmd.relaxed, wmd.injective, wmd.symmetric, wmd.normalize_bow),
            (true, true, false, false)
        );
        let parsed: WordMoversDistance = toml::from_str("").unwrap();
        assert_eq!(parsed, wmd);
        let kusner = WordMoversDistance::wmd(WmdVariant::Kusner).unwrap();
        assert_eq!(
            (kusner.relaxed, kusner.injective, kusner.symmetric, kusner.normalize_bow),
            (false, false, false, true)
        );
    }

    #[test]
    fn every_preset_scores_identity_as_perfect() {
        let matrix = identity(3);
        let q = ids(3);
        let input = AlignmentInput::new(&matrix, &q, &q);
        let presets = [
            WordMoversDistance::wmd(WmdVariant::Kusner).unwrap(),
            WordMoversDistance::wmd(WmdVariant::Vectorian).unwrap(),
            WordMoversDistance::rwmd(WmdVariant::Kusner),
            WordMoversDistance::rwmd(WmdVariant::Jablonsky),
            WordMoversDistance::rwmd(WmdVariant::Vectorian),
        ];
        for preset in presets {
            let score = preset.score(&input).unwrap().score;
            assert!((score - 1.0).abs() < 1e-6, "{:?} scored {}", preset, score);
        }
        assert!(WordMoversDistance::wmd(WmdVariant::Jablonsky).is_none());
    }

    #[test]
    fn doubled_document_beats_excerpt_query() {
        let doc: Vec<TokenId> = vec![1, 2, 3, 4];
        let doubled: Vec<TokenId> = doc.iter().chain(doc.iter()).copied().collect();
        let excerpt: Vec<TokenId> = vec![1, 2];
        let wmd = WordMoversDistance::wmd(WmdVariant::Kusner).unwrap();

        let full_matrix = exact_match(&doc, &doubled);
        let full = wmd
            .score(&AlignmentInput::new(&full_matrix, &doc, &doubled))
            .unwrap();
        let part_matrix = exact_match(&excerpt, &doubled);
        let part = wmd
            .score(&AlignmentInput::new(&part_matrix, &excerpt, &doubled))
            .unwrap();
        assert!(full.score >= part.score);
        assert!((full.score - 1.0).abs() < 1e-6);
        assert!((part.score - 0.5).abs() < 1e-6);
    }

    #[test]
    fn relaxed_symmetric_takes_worse_direction() {
        // query [a], span [a, b]: forward costs 0, backward must move b's mass
        let q: Vec<TokenId> = vec![1];
        let s: Vec<TokenId> = vec![1, 2];
        let matrix = exact_match(&q, &s);
        let input = AlignmentInput::new(&matrix, &q, &s);
        let one_way = WordMoversDistance::rwmd(WmdVariant::Vectorian);
        assert!((one_way.score(&input).unwrap().score - 1.0).abs() < 1e-6);
        let both = WordMoversDistance::rwmd(WmdVariant::Kusner);
        assert!((both.score(&input).unwrap().score - 0.5).abs() < 1e-6);
    }

    #[test]
    fn extra_mass_penalty_charges_unmoved_mass() {
        // injective assignment of 1 query bin into 2 span bins moves half the mass
        let q: Vec<TokenId> = vec![1];
        let s: Vec<TokenId> = vec![1, 2];
        let matrix = exact_match(&q, &s);
        let input = AlignmentInput::new(&matrix, &q, &s);
        let free = WordMoversDistance {
            injective: true,
            ..WordMoversDistance::wmd(WmdVariant::Kusner).unwrap()
        };
        assert!((free.score(&input).unwrap().score - 1.0).abs() < 1e-6);
        let charged = free.clone().with_extra_mass_penalty(0.5);
        assert!((charged.score(&input).unwrap().score - 0.75).abs() < 1e-6);
    }

    #[test]
    fn zero_mass_everywhere_is_degenerate() {
        let matrix = identity(2);
        let q = ids(2);
        let weights = [0.0, 0.0];
        let input = AlignmentInput::new(&matrix, &q, &q).with_query_weights(&weights);
        let wmd = WordMoversDistance::wmd(WmdVariant::Kusner).unwrap();
        // span side still carries mass, so this is a plain zero score
        assert_eq!(wmd.score(&input).unwrap().score, 0.0);

        let problem = Problem {
            query: vec![0.0, 0.0],
            span: vec![0.0, 0.0],
            normalize: true,
            merge_bins: false,
            solver: Solver::Exact,
            extra_mass_penalty: -1.0,
        };
        assert!(matches!(
            transport_alignment(&input, problem),
            Err(SearchError::DegenerateDistribution)
        ));
    }

    #[test]
    fn bow_bins_merge_repeats() {
        let bins = Bins::new(&[7, 8, 7], &[1.0, 1.0, 1.0], true);
        assert_eq!(bins.mass, vec![2.0, 1.0]);
        assert_eq!(bins.members, vec![vec![0, 2], vec![1]]);
        assert_eq!(bins.bin_of, vec![0, 1, 0]);
    }
}
