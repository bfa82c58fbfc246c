// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parallel span search
//!
//! Each document is scanned by one rayon task into its own [`TopK`]; the
//! per-document lists are merged into the final order afterwards. Workers
//! only read shared state: the vocabulary and embedding store must be fully
//! populated before a search starts.

use super::control::{ProgressTracker, SearchControl};
use super::matches::{Match, Region, TokenMatch};
use super::top_k::{merge, TopK};
use crate::alignment::{Alignment, AlignmentAlgorithm, SimilarityMatrix};
use crate::document::{Document, Span};
use crate::embedding::EmbeddingStore;
use crate::errors::Result;
use crate::query::Query;
use crate::similarity::{DocumentVectors, TokenSimilarity};
use crate::vocabulary::{TokenId, Vocabulary};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

fn default_max_matches() -> usize {
    100
}

fn default_min_score() -> f32 {
    0.2
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    pub max_matches: usize,
    /// Matches scoring below this are discarded
    pub min_score: f32,
    /// Worker threads; `None` uses the global rayon pool
    pub threads: Option<usize>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_matches: default_max_matches(),
            min_score: default_min_score(),
            threads: None,
        }
    }
}

impl SearchOptions {
    pub fn with_max_matches(mut self, max_matches: usize) -> Self {
        self.max_matches = max_matches;
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }
}

pub struct SearchEngine<'a> {
    vocab: &'a Vocabulary,
    store: &'a EmbeddingStore,
}

/// Per-search state shared by all document scans
struct Scan<'q> {
    query: &'q Query,
    similarity: TokenSimilarity<'q>,
    query_magnitudes: Option<Vec<f32>>,
    vocab: &'q Vocabulary,
    options: &'q SearchOptions,
    control: &'q SearchControl,
    metric: String,
}

impl<'a> SearchEngine<'a> {
    pub fn new(vocab: &'a Vocabulary, store: &'a EmbeddingStore) -> Self {
        Self { vocab, store }
    }

    /// Score every span of every document against `query`.
    ///
    /// Cancellation returns whatever was found so far. Per-span alignment
    /// failures skip that span; configuration errors fail the search.
    pub fn find(
        &self,
        query: &Query,
        documents: &[Arc<Document>],
        options: &SearchOptions,
        control: &SearchControl,
    ) -> Result<Vec<Match>> {
        query.options().partition.validate()?;
        if query.is_empty() || options.max_matches == 0 {
            return Ok(Vec::new());
        }

        let similarity = query.similarity(self.store, self.vocab)?;
        let needs_magnitudes = matches!(query.options().alignment, AlignmentAlgorithm::WordRotatorsDistance(_));
        let scan = Scan {
            query,
            query_magnitudes: needs_magnitudes.then(|| similarity.query_magnitudes()),
            similarity,
            vocab: self.vocab,
            options,
            control,
            metric: query.options().metric.name(),
        };
        let total_tokens = documents.iter().map(|d| d.tokens().len()).sum();
        let tracker = control.tracker(total_tokens);

        let run = || -> Result<Vec<Vec<Match>>> {
            documents
                .par_iter()
                .map(|document| scan.document(document, &tracker))
                .collect()
        };
        let per_document = match options.threads {
            Some(threads) => rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()?
                .install(run)?,
            None => run()?,
        };

        let matches = merge(per_document, options.max_matches);
        debug!(
            "query '{}': {} matches from {} documents",
            query.text(),
            matches.len(),
            documents.len()
        );
        Ok(matches)
    }
}

impl Scan<'_> {
    fn document(&self, document: &Document, tracker: &ProgressTracker<'_>) -> Result<Vec<Match>> {
        if self.control.should_stop() {
            return Ok(Vec::new());
        }
        let options = self.query.options();
        let table = document.span_table(options.partition)?;
        let vectors = self.similarity.document(document)?;
        let mut top = TopK::new(self.options.max_matches);
        // progress counts each token once, even under overlapping windows
        let (mut covered, mut counted) = (0, 0);

        for (index, span) in table.iter().enumerate() {
            if self.control.should_stop() {
                debug!("doc {}: cancelled at span {}", document.id(), index);
                return Ok(top.into_sorted_vec());
            }
            if let Some(found) = self.span(document, &vectors, index, *span, &top)? {
                top.push(found);
            }
            let end = span.range().end;
            let fresh = end.saturating_sub(covered.max(span.token_at));
            covered = covered.max(end);
            if fresh > 0 {
                counted += fresh;
                tracker.advance(fresh);
            }
        }

        let rest = document.tokens().len().saturating_sub(counted);
        if rest > 0 {
            tracker.advance(rest);
        }
        Ok(top.into_sorted_vec())
    }

    /// Score one span; `None` when it is empty, skipped or cannot enter `top`
    fn span(
        &self,
        document: &Document,
        vectors: &DocumentVectors,
        index: usize,
        span: Span,
        top: &TopK,
    ) -> Result<Option<Match>> {
        if span.n_tokens == 0 {
            return Ok(None);
        }
        let matrix = self.similarity.matrix(document, vectors, span);
        let alignment = match self.align(document, vectors, span, &matrix) {
            Ok(alignment) => alignment,
            Err(err) if err.is_alignment_error() => {
                debug!("doc {} span {}: skipped ({})", document.id(), index, err);
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        // NaN never passes
        if !(alignment.score >= self.options.min_score) {
            return Ok(None);
        }
        if !top.admits(alignment.score, document.id(), index) {
            return Ok(None);
        }
        self.build_match(document, index, span, &matrix, &alignment).map(Some)
    }

    fn align(
        &self,
        document: &Document,
        vectors: &DocumentVectors,
        span: Span,
        matrix: &SimilarityMatrix,
    ) -> Result<Alignment> {
        let span_ids: Vec<TokenId> = document.span_tokens(span).iter().map(|t| t.id).collect();
        let span_magnitudes = self.query_magnitudes.as_ref().map(|_| vectors.magnitudes(span));
        let mut input = self.query.alignment_input(matrix, &span_ids);
        if let (Some(query), Some(span)) = (&self.query_magnitudes, &span_magnitudes) {
            input = input.with_magnitudes(query, span);
        }
        let algorithm = &self.query.options().alignment;
        if self.query.options().bidirectional {
            algorithm.score_bidirectional(&input)
        } else {
            algorithm.score(&input)
        }
    }

    /// Turn pairings into document-ordered regions; unaligned span ends are omitted
    fn build_match(
        &self,
        document: &Document,
        span_index: usize,
        span: Span,
        matrix: &SimilarityMatrix,
        alignment: &Alignment,
    ) -> Result<Match> {
        let mut pairs: Vec<(usize, usize, f32)> = alignment
            .matches
            .iter()
            .enumerate()
            .filter_map(|(i, j)| j.map(|j| (j, i, matrix.get(i, j))))
            .collect();
        // one region per document token: keep its most similar query token
        pairs.sort_by(|a, b| a.0.cmp(&b.0).then(b.2.total_cmp(&a.2)));
        pairs.dedup_by_key(|p| p.0);

        let tokens = document.tokens();
        let weights = self.query.weights();
        let algorithm = &self.query.options().alignment;
        let mut regions = Vec::with_capacity(pairs.len() * 2);
        let mut previous: Option<usize> = None;
        for &(j, i, similarity) in &pairs {
            let token = span.token_at + j;
            if let Some(prev) = previous {
                if token > prev + 1 {
                    regions.push(Region::Gap {
                        tokens: prev + 1..token,
                        penalty: algorithm.gap_penalty(token - prev - 1)?,
                    });
                }
            }
            regions.push(Region::Matched(TokenMatch {
                query: i,
                token,
                similarity,
                weight: weights[i],
                pos_query: self.vocab.tag(self.query.tokens()[i].pos),
                pos_document: self.vocab.tag(tokens[token].pos),
                metric: self.metric.clone(),
            }));
            previous = Some(token);
        }

        let span_end = span.range().end;
        let (leading, trailing) = match (pairs.first(), previous) {
            (Some(&(first, _, _)), Some(last)) => (span.token_at..span.token_at + first, last + 1..span_end),
            _ => (span.range(), span_end..span_end),
        };

        Ok(Match {
            document: document.id(),
            span_index,
            span,
            score: alignment.score,
            metric: self.metric.clone(),
            regions,
            leading,
            trailing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::{GapCost, WordMoversDistance};
    use crate::document::{DocumentIndex, DocumentInput, QueryInput};
    use crate::normalize::TokenNormalizer;
    use crate::query::QueryOptions;

    struct Corpus {
        vocab: Vocabulary,
        store: EmbeddingStore,
        index: DocumentIndex,
    }

    fn corpus(docs: &[&[&str]]) -> Corpus {
        let vocab = Vocabulary::new();
        let mut index = DocumentIndex::new();
        for (i, sentences) in docs.iter().enumerate() {
            let input = DocumentInput::from_sentences(&format!("doc {}", i), sentences);
            index
                .add_document(&input, &vocab, &TokenNormalizer::default())
                .unwrap();
        }
        Corpus {
            vocab,
            store: EmbeddingStore::exact_match(),
            index,
        }
    }

    fn query(c: &Corpus, text: &str, options: QueryOptions) -> Query {
        Query::new(&QueryInput::from_words(text), options, &c.vocab, &TokenNormalizer::default()).unwrap()
    }

    fn find(c: &Corpus, q: &Query, options: &SearchOptions) -> Vec<Match> {
        SearchEngine::new(&c.vocab, &c.store)
            .find(q, c.index.documents(), options, &SearchControl::new())
            .unwrap()
    }

    #[test]
    fn regions_cover_aligned_range() {
        let c = corpus(&[&["a great bright star shines"]]);
        let options = QueryOptions::default().with_alignment(AlignmentAlgorithm::waterman_smith_beyer(
            GapCost::Constant { cost: 0.2 },
            0.5,
        ));
        let q = query(&c, "great star", options);
        let matches = find(&c, &q, &SearchOptions::default().with_min_score(0.0));
        assert_eq!(matches.len(), 1);
        let m = &matches[0];
        assert_eq!(m.leading, 0..1);
        assert_eq!(m.trailing, 4..5);
        assert_eq!(m.matched().count(), 2);
        let gaps: Vec<_> = m.gaps().collect();
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].0, &(2..3));
        assert!((gaps[0].1 - 0.2).abs() < 1e-6);
        // raw 2 - 0.2 over reference 2
        assert!((m.score - 0.9).abs() < 1e-6);
    }

    #[test]
    fn min_score_filters_and_max_matches_caps() {
        let c = corpus(&[&["red fox", "blue fox", "green frog"], &["red fox jumps"]]);
        let q = query(
            &c,
            "red fox",
            QueryOptions::default().with_alignment(AlignmentAlgorithm::needleman_wunsch(0.0)),
        );
        let all = find(&c, &q, &SearchOptions::default().with_min_score(0.4));
        let keys: Vec<_> = all.iter().map(|m| (m.document, m.span_index)).collect();
        assert_eq!(keys, vec![(0, 0), (1, 0), (0, 1)]);
        let capped = find(&c, &q, &SearchOptions::default().with_min_score(0.4).with_max_matches(1));
        assert_eq!(capped.len(), 1);
        assert_eq!(capped[0].document, 0);
    }

    #[test]
    fn degenerate_spans_are_skipped() {
        let c = corpus(&[&["one two"]]);
        // exact-match vectors have zero norm, so neither side carries rotator mass
        let options = QueryOptions::default()
            .with_alignment(AlignmentAlgorithm::WordRotatorsDistance(Default::default()));
        let q = query(&c, "one", options);
        let matches = find(&c, &q, &SearchOptions::default().with_min_score(-10.0));
        assert!(matches.is_empty());
    }

    #[test]
    fn explicit_thread_count_gives_same_results() {
        let c = corpus(&[&["alpha beta"], &["beta gamma"], &["gamma alpha beta"]]);
        let options = QueryOptions::default()
            .with_alignment(AlignmentAlgorithm::WordMoversDistance(WordMoversDistance::default()));
        let q = query(&c, "alpha beta", options);
        let pooled = find(&c, &q, &SearchOptions::default().with_threads(3));
        let global = find(&c, &q, &SearchOptions::default());
        assert_eq!(pooled, global);
        assert_eq!(pooled[0].document, 0);
    }

    #[test]
    fn empty_query_finds_nothing() {
        let c = corpus(&[&["alpha"]]);
        let q = query(&c, "   ", QueryOptions::default());
        assert!(find(&c, &q, &SearchOptions::default()).is_empty());
    }
}
