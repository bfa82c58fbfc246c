// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded best-K selection and the final merge order

use super::matches::Match;
use crate::document::DocumentId;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Result order: higher score first, then earlier document, then earlier span
pub fn rank(a: &Match, b: &Match) -> Ordering {
    rank_key((a.score, a.document, a.span_index), (b.score, b.document, b.span_index))
}

fn rank_key(a: (f32, DocumentId, usize), b: (f32, DocumentId, usize)) -> Ordering {
    b.0.total_cmp(&a.0)
        .then(a.1.cmp(&b.1))
        .then(a.2.cmp(&b.2))
}

/// Heap entry whose maximum is the worst-ranked match
struct Entry(Match);

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        rank(&self.0, &other.0)
    }
}

/// Keeps the best `capacity` matches seen so far
pub struct TopK {
    capacity: usize,
    heap: BinaryHeap<Entry>,
}

impl TopK {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            heap: BinaryHeap::with_capacity(capacity.saturating_add(1).min(1024)),
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Whether a match with this key would be kept; lets callers skip building it
    pub fn admits(&self, score: f32, document: DocumentId, span: usize) -> bool {
        if self.capacity == 0 {
            return false;
        }
        if self.heap.len() < self.capacity {
            return true;
        }
        match self.heap.peek() {
            Some(worst) => {
                let w = &worst.0;
                rank_key((score, document, span), (w.score, w.document, w.span_index)) == Ordering::Less
            }
            None => true,
        }
    }

    pub fn push(&mut self, m: Match) {
        if self.capacity == 0 {
            return;
        }
        self.heap.push(Entry(m));
        if self.heap.len() > self.capacity {
            self.heap.pop();
        }
    }

    /// Best first
    pub fn into_sorted_vec(self) -> Vec<Match> {
        self.heap.into_sorted_vec().into_iter().map(|e| e.0).collect()
    }
}

/// Merge per-document results into one ordered list of at most `max_matches`
pub fn merge(results: impl IntoIterator<Item = Vec<Match>>, max_matches: usize) -> Vec<Match> {
    let mut all: Vec<Match> = results.into_iter().flatten().collect();
    all.sort_by(rank);
    all.truncate(max_matches);
    all
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Span;

    fn m(document: DocumentId, span_index: usize, score: f32) -> Match {
        Match {
            document,
            span_index,
            span: Span {
                token_at: span_index,
                n_tokens: 1,
            },
            score,
            metric: "exact".into(),
            regions: Vec::new(),
            leading: 0..0,
            trailing: 0..0,
        }
    }

    fn keys(matches: &[Match]) -> Vec<(DocumentId, usize, f32)> {
        matches.iter().map(|m| (m.document, m.span_index, m.score)).collect()
    }

    #[test]
    fn keeps_best_k() {
        let mut top = TopK::new(2);
        for (span, score) in [(0, 0.3), (1, 0.9), (2, 0.5), (3, 0.7)] {
            if top.admits(score, 0, span) {
                top.push(m(0, span, score));
            }
        }
        assert_eq!(keys(&top.into_sorted_vec()), vec![(0, 1, 0.9), (0, 3, 0.7)]);
    }

    #[test]
    fn ties_keep_earlier_spans() {
        let mut top = TopK::new(1);
        top.push(m(0, 4, 0.5));
        assert!(top.admits(0.5, 0, 2));
        assert!(!top.admits(0.5, 0, 7));
        top.push(m(0, 2, 0.5));
        assert_eq!(keys(&top.into_sorted_vec()), vec![(0, 2, 0.5)]);
    }

    #[test]
    fn zero_capacity_keeps_nothing() {
        let mut top = TopK::new(0);
        assert!(!top.admits(1.0, 0, 0));
        top.push(m(0, 0, 1.0));
        assert!(top.is_empty());
    }

    #[test]
    fn merge_breaks_ties_by_document_order() {
        // documents A = 0, B = 1
        let from_b = vec![m(1, 2, 0.9)];
        let from_a = vec![m(0, 1, 0.9), m(0, 0, 0.5)];
        let merged = merge(vec![from_b, from_a], 2);
        assert_eq!(keys(&merged), vec![(0, 1, 0.9), (1, 2, 0.9)]);
    }
}
