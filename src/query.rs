// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queries: one tokenized span plus the options that score it

use crate::alignment::{AlignmentAlgorithm, AlignmentInput, SimilarityMatrix};
use crate::document::{Partition, QueryInput, TableBuilder, Token};
use crate::embedding::{EmbeddedVector, EmbeddingStore};
use crate::errors::{Result, SearchError};
use crate::filters::TokenFilter;
use crate::normalize::TokenNormalizer;
use crate::similarity::{TokenMetric, TokenPolicy, TokenSimilarity};
use crate::vocabulary::{TokenId, Vocabulary};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Scoring options carried by a query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    pub metric: TokenMetric,
    pub alignment: AlignmentAlgorithm,
    pub partition: Partition,
    pub policy: TokenPolicy,
    /// Query tokens removed before scoring
    pub filter: TokenFilter,
    /// Weight per POS tag; unlisted tags weigh 1
    pub pos_weights: BTreeMap<String, f32>,
    /// Exponent discounting unmatched query weight (0 counts it fully)
    pub submatch_weight: f32,
    /// Also align reversed sequences and keep the better score
    pub bidirectional: bool,
}

impl QueryOptions {
    pub fn with_metric(mut self, metric: TokenMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_alignment(mut self, alignment: AlignmentAlgorithm) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn with_partition(mut self, partition: Partition) -> Self {
        self.partition = partition;
        self
    }

    pub fn with_policy(mut self, policy: TokenPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_filter(mut self, filter: TokenFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_pos_weight(mut self, pos: impl Into<String>, weight: f32) -> Self {
        self.pos_weights.insert(pos.into(), weight);
        self
    }

    pub fn with_submatch_weight(mut self, submatch_weight: f32) -> Self {
        self.submatch_weight = submatch_weight;
        self
    }

    pub fn with_bidirectional(mut self, bidirectional: bool) -> Self {
        self.bidirectional = bidirectional;
        self
    }
}

/// A compiled query
#[derive(Debug, Clone)]
pub struct Query {
    text: String,
    tokens: Vec<Token>,
    ids: Vec<TokenId>,
    weights: Vec<f32>,
    /// Input token index of each kept token
    sources: Vec<usize>,
    input_len: usize,
    options: QueryOptions,
    contextual: BTreeMap<String, Vec<EmbeddedVector>>,
}

impl Query {
    pub fn new(
        input: &QueryInput,
        options: QueryOptions,
        vocab: &Vocabulary,
        normalizer: &TokenNormalizer,
    ) -> Result<Self> {
        let passing: Vec<usize> = (0..input.tokens.len())
            .filter(|&i| options.filter.keeps(&input.tokens[i]))
            .collect();
        let filtered: Vec<_> = passing.iter().map(|&i| input.tokens[i].clone()).collect();

        let mut builder = TableBuilder::new("query".to_string(), vocab, normalizer);
        let kept = builder.add_span(&input.text, &filtered)?;
        let table = builder.finish();

        let weights = table
            .tokens
            .iter()
            .map(|t| {
                options
                    .pos_weights
                    .get(&*vocab.tag(t.pos))
                    .copied()
                    .unwrap_or(1.0)
            })
            .collect();

        Ok(Self {
            ids: table.tokens.iter().map(|t| t.id).collect(),
            text: table.text,
            tokens: table.tokens,
            weights,
            sources: kept.into_iter().map(|k| passing[k]).collect(),
            input_len: input.tokens.len(),
            options,
            contextual: BTreeMap::new(),
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn token_text(&self, index: usize) -> &str {
        let token = &self.tokens[index];
        &self.text[token.idx..token.end()]
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn ids(&self) -> &[TokenId] {
        &self.ids
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    pub fn contextual(&self) -> &BTreeMap<String, Vec<EmbeddedVector>> {
        &self.contextual
    }

    /// Bind contextual vectors to the query, one per input token (before filtering)
    pub fn register_contextual(
        &mut self,
        store: &EmbeddingStore,
        name: &str,
        vectors: Vec<Vec<f32>>,
    ) -> Result<()> {
        if vectors.len() != self.input_len {
            return Err(SearchError::dimension(
                format!("contextual vectors of query for {}", name),
                self.input_len,
                vectors.len(),
            ));
        }
        let prepared = store.contextual_space(name)?.prepare(vectors)?;
        let kept = self.sources.iter().map(|&i| prepared[i].clone()).collect();
        self.contextual.insert(name.to_string(), kept);
        Ok(())
    }

    /// Bind the query's token metric to an embedding store
    pub fn similarity<'a>(&self, store: &'a EmbeddingStore, vocab: &'a Vocabulary) -> Result<TokenSimilarity<'a>> {
        TokenSimilarity::new(
            &self.options.metric,
            self.options.policy.clone(),
            store,
            vocab,
            &self.tokens,
            &self.contextual,
        )
    }

    /// Alignment input for one span matrix, with the query's weights attached
    pub fn alignment_input<'a>(&'a self, matrix: &'a SimilarityMatrix, span_ids: &'a [TokenId]) -> AlignmentInput<'a> {
        AlignmentInput::new(matrix, &self.ids, span_ids)
            .with_query_weights(&self.weights)
            .with_submatch_weight(self.options.submatch_weight)
    }
}
