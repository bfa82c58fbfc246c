// SPDX-License-Identifier: MIT OR Apache-2.0

//! Token similarity: embedding lookups combined through vector-space metrics,
//! then shaped by a POS/tag policy.
//!
//! A [`TokenSimilarity`] is built once per query. It keeps the query-side
//! vectors of every embedding leaf, so scoring a span only needs the
//! document side ([`DocumentVectors`], built once per document).

use crate::alignment::SimilarityMatrix;
use crate::document::{Document, Span, Token};
use crate::embedding::{
    ContextualEmbedding, EmbeddedVector, EmbeddingSpace, EmbeddingStore, StaticEmbedding, EXACT_MATCH_SPACE,
};
use crate::errors::{Result, SearchError};
use crate::metric::{clamp_unit, VectorBatch, VectorSpaceMetric};
use crate::vocabulary::Vocabulary;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

fn default_embedding() -> String {
    EXACT_MATCH_SPACE.to_string()
}

/// Which embedding space(s) to compare tokens in, and how
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TokenMetric {
    Embedding {
        #[serde(default = "default_embedding")]
        embedding: String,
        #[serde(default)]
        metric: VectorSpaceMetric,
    },
    Lerp {
        a: Box<TokenMetric>,
        b: Box<TokenMetric>,
        t: f32,
    },
    Min {
        a: Box<TokenMetric>,
        b: Box<TokenMetric>,
    },
    Max {
        a: Box<TokenMetric>,
        b: Box<TokenMetric>,
    },
}

impl Default for TokenMetric {
    fn default() -> Self {
        Self::embedding(EXACT_MATCH_SPACE, VectorSpaceMetric::Cosine)
    }
}

impl TokenMetric {
    pub fn embedding(name: impl Into<String>, metric: VectorSpaceMetric) -> Self {
        Self::Embedding {
            embedding: name.into(),
            metric,
        }
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
            Self::Embedding { embedding, metric } => match metric {
                VectorSpaceMetric::Cosine => embedding.clone(),
                other => format!("{}[{}]", embedding, other.name()),
            },
            Self::Lerp { a, b, t } => format!("lerp({}, {}, {})", a.name(), b.name(), t),
            Self::Min { a, b } => format!("min({}, {})", a.name(), b.name()),
            Self::Max { a, b } => format!("max({}, {})", a.name(), b.name()),
        }
    }

    /// Embedding space names in leaf order (left to right)
    pub fn embeddings(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_embeddings(&mut names);
        names
    }

    fn collect_embeddings<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Self::Embedding { embedding, .. } => names.push(embedding),
            Self::Lerp { a, b, .. } | Self::Min { a, b } | Self::Max { a, b } => {
                a.collect_embeddings(names);
                b.collect_embeddings(names);
            }
        }
    }
}

fn default_falloff() -> f32 {
    1.0
}

/// Adjustments applied to every combined similarity, in field order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenPolicy {
    /// Similarity is raised to this power
    #[serde(default = "default_falloff")]
    pub similarity_falloff: f32,
    /// Values below this become 0
    pub similarity_threshold: f32,
    /// Fraction removed when POS tags differ
    pub pos_mismatch_penalty: f32,
    /// Zero the similarity when fine tags differ
    pub require_tag_match: bool,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            similarity_falloff: default_falloff(),
            similarity_threshold: 0.0,
            pos_mismatch_penalty: 0.0,
            require_tag_match: false,
        }
    }
}

impl TokenPolicy {
    pub fn apply(&self, sim: f32, a: &Token, b: &Token) -> f32 {
        let mut sim = sim;
        if self.similarity_falloff != 1.0 {
            sim = sim.max(0.0).powf(self.similarity_falloff);
        }
        if sim < self.similarity_threshold {
            sim = 0.0;
        }
        if self.pos_mismatch_penalty > 0.0 && a.pos != b.pos {
            sim *= 1.0 - self.pos_mismatch_penalty.clamp(0.0, 1.0);
        }
        if self.require_tag_match && a.tag != b.tag {
            sim = 0.0;
        }
        clamp_unit(sim)
    }

    fn is_identity(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone)]
enum Expr {
    Leaf(usize),
    Lerp(Box<Expr>, Box<Expr>, f32),
    Min(Box<Expr>, Box<Expr>),
    Max(Box<Expr>, Box<Expr>),
}

enum LeafSpace<'a> {
    Static(&'a StaticEmbedding),
    Contextual(&'a ContextualEmbedding),
}

enum QuerySide {
    Static(VectorBatch),
    Contextual(Vec<EmbeddedVector>),
}

struct Leaf<'a> {
    name: String,
    metric: VectorSpaceMetric,
    space: LeafSpace<'a>,
    query: QuerySide,
}

enum DocumentSide {
    Static(VectorBatch),
    Contextual(Arc<Vec<EmbeddedVector>>),
}

/// Document-side vectors for every embedding leaf
pub struct DocumentVectors {
    leaves: Vec<DocumentSide>,
}

impl DocumentVectors {
    /// Embedding norms of the span's tokens in the first leaf's space
    pub fn magnitudes(&self, span: Span) -> Vec<f32> {
        match self.leaves.first() {
            Some(DocumentSide::Static(batch)) => batch.view(span.range()).norms().to_vec(),
            Some(DocumentSide::Contextual(vectors)) => vectors[span.range()].iter().map(EmbeddedVector::norm).collect(),
            None => vec![1.0; span.n_tokens],
        }
    }
}

/// Query-bound token similarity
pub struct TokenSimilarity<'a> {
    vocab: &'a Vocabulary,
    policy: TokenPolicy,
    expr: Expr,
    leaves: Vec<Leaf<'a>>,
    query: Vec<Token>,
}

impl<'a> TokenSimilarity<'a> {
    /// Bind `metric` to a query.
    ///
    /// `contextual` holds the query's own vectors for contextual spaces, one
    /// per query token.
    pub fn new(
        metric: &TokenMetric,
        policy: TokenPolicy,
        store: &'a EmbeddingStore,
        vocab: &'a Vocabulary,
        query: &[Token],
        contextual: &BTreeMap<String, Vec<EmbeddedVector>>,
    ) -> Result<Self> {
        let mut leaves = Vec::new();
        let expr = compile(metric, store, vocab, query, contextual, &mut leaves)?;
        Ok(Self {
            vocab,
            policy,
            expr,
            leaves,
            query: query.to_vec(),
        })
    }

    /// Gather document-side vectors for every leaf
    pub fn document(&self, document: &Document) -> Result<DocumentVectors> {
        let leaves = self
            .leaves
            .iter()
            .map(|leaf| match &leaf.space {
                LeafSpace::Static(space) => {
                    let mut batch = VectorBatch::new(space.dimension());
                    for token in document.tokens() {
                        batch.push(&space.vector(self.vocab, token.id)?);
                    }
                    Ok(DocumentSide::Static(batch))
                }
                LeafSpace::Contextual(space) => match space.document(document.id()) {
                    Some(vectors) if vectors.len() == document.tokens().len() => {
                        Ok(DocumentSide::Contextual(vectors))
                    }
                    Some(vectors) => Err(SearchError::dimension(
                        format!("contextual vectors of document {}", document.id()),
                        document.tokens().len(),
                        vectors.len(),
                    )),
                    None => Err(SearchError::MissingContextual {
                        embedding: leaf.name.clone(),
                        owner: format!("document {}", document.id()),
                    }),
                },
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(DocumentVectors { leaves })
    }

    /// `query x span` similarity matrix
    pub fn matrix(&self, document: &Document, vectors: &DocumentVectors, span: Span) -> SimilarityMatrix {
        let span_tokens = document.span_tokens(span);
        let (m, n) = (self.query.len(), span_tokens.len());
        let mut data = self.evaluate(&self.expr, vectors, span, span_tokens);
        if !self.policy.is_identity() {
            for (i, row) in data.chunks_exact_mut(n.max(1)).enumerate().take(m) {
                for (j, cell) in row.iter_mut().enumerate() {
                    *cell = self.policy.apply(*cell, &self.query[i], &span_tokens[j]);
                }
            }
        }
        SimilarityMatrix::from_fn(m, n, |i, j| data[i * n + j])
    }

    /// Embedding norms of the query tokens in the first leaf's space
    pub fn query_magnitudes(&self) -> Vec<f32> {
        match self.leaves.first().map(|leaf| &leaf.query) {
            Some(QuerySide::Static(batch)) => batch.norms().to_vec(),
            Some(QuerySide::Contextual(vectors)) => vectors.iter().map(EmbeddedVector::norm).collect(),
            None => vec![1.0; self.query.len()],
        }
    }

    fn evaluate(&self, expr: &Expr, vectors: &DocumentVectors, span: Span, span_tokens: &[Token]) -> Vec<f32> {
        match expr {
            Expr::Leaf(index) => self.leaf(*index, &vectors.leaves[*index], span, span_tokens),
            Expr::Lerp(a, b, t) => {
                let (a, b) = (
                    self.evaluate(a, vectors, span, span_tokens),
                    self.evaluate(b, vectors, span, span_tokens),
                );
                a.into_iter().zip(b).map(|(x, y)| (1.0 - t) * x + t * y).collect()
            }
            Expr::Min(a, b) => {
                let b = self.evaluate(b, vectors, span, span_tokens);
                let mut a = self.evaluate(a, vectors, span, span_tokens);
                a.iter_mut().zip(b).for_each(|(x, y)| *x = x.min(y));
                a
            }
            Expr::Max(a, b) => {
                let b = self.evaluate(b, vectors, span, span_tokens);
                let mut a = self.evaluate(a, vectors, span, span_tokens);
                a.iter_mut().zip(b).for_each(|(x, y)| *x = x.max(y));
                a
            }
        }
    }

    fn leaf(&self, index: usize, document: &DocumentSide, span: Span, span_tokens: &[Token]) -> Vec<f32> {
        let leaf = &self.leaves[index];
        let (m, n) = (self.query.len(), span.n_tokens);
        let mut out = vec![0.0f32; m * n];
        match (&leaf.query, document) {
            (QuerySide::Static(query), DocumentSide::Static(doc)) => {
                leaf.metric.fill_matrix(query.all(), doc.view(span.range()), &mut out);
                for (i, q) in self.query.iter().enumerate() {
                    for (j, d) in span_tokens.iter().enumerate() {
                        if q.id == d.id {
                            out[i * n + j] = 1.0;
                        }
                    }
                }
            }
            (QuerySide::Contextual(query), DocumentSide::Contextual(doc)) => {
                let doc = &doc[span.range()];
                for (i, q) in query.iter().enumerate() {
                    for (j, d) in doc.iter().enumerate() {
                        out[i * n + j] = leaf.metric.similarity(q, d);
                    }
                }
            }
            // leaves and their document side are built from the same space
            _ => {}
        }
        out
    }
}

fn compile<'a>(
    metric: &TokenMetric,
    store: &'a EmbeddingStore,
    vocab: &Vocabulary,
    query: &[Token],
    contextual: &BTreeMap<String, Vec<EmbeddedVector>>,
    leaves: &mut Vec<Leaf<'a>>,
) -> Result<Expr> {
    let child = |m: &TokenMetric, leaves: &mut Vec<Leaf<'a>>| {
        compile(m, store, vocab, query, contextual, leaves).map(Box::new)
    };
    Ok(match metric {
        TokenMetric::Embedding { embedding, metric } => {
            let (space, side) = match store.space(embedding)? {
                EmbeddingSpace::Static(space) => {
                    let mut batch = VectorBatch::new(space.dimension());
                    for token in query {
                        batch.push(&space.vector(vocab, token.id)?);
                    }
                    (LeafSpace::Static(space), QuerySide::Static(batch))
                }
                EmbeddingSpace::Contextual(space) => {
                    let vectors = contextual.get(embedding).ok_or_else(|| SearchError::MissingContextual {
                        embedding: embedding.clone(),
                        owner: "query".to_string(),
                    })?;
                    if vectors.len() != query.len() {
                        return Err(SearchError::dimension(
                            "contextual vectors of query",
                            query.len(),
                            vectors.len(),
                        ));
                    }
                    (LeafSpace::Contextual(space), QuerySide::Contextual(vectors.clone()))
                }
            };
            leaves.push(Leaf {
                name: embedding.clone(),
                metric: metric.clone(),
                space,
                query: side,
            });
            Expr::Leaf(leaves.len() - 1)
        }
        TokenMetric::Lerp { a, b, t } => {
            let a = child(a, leaves)?;
            Expr::Lerp(a, child(b, leaves)?, *t)
        }
        TokenMetric::Min { a, b } => {
            let a = child(a, leaves)?;
            Expr::Min(a, child(b, leaves)?)
        }
        TokenMetric::Max { a, b } => {
            let a = child(a, leaves)?;
            Expr::Max(a, child(b, leaves)?)
        }
    })
}

/// Similarity of two tokens outside any document context (static spaces only)
pub fn pair_similarity(
    metric: &TokenMetric,
    policy: &TokenPolicy,
    store: &EmbeddingStore,
    vocab: &Vocabulary,
    a: &Token,
    b: &Token,
) -> Result<f32> {
    fn raw(metric: &TokenMetric, store: &EmbeddingStore, vocab: &Vocabulary, a: &Token, b: &Token) -> Result<f32> {
        Ok(match metric {
            TokenMetric::Embedding { embedding, metric } => {
                let EmbeddingSpace::Static(space) = store.space(embedding)? else {
                    return Err(SearchError::MissingContextual {
                        embedding: embedding.clone(),
                        owner: "token pair".to_string(),
                    });
                };
                if a.id == b.id {
                    1.0
                } else {
                    metric.similarity(&space.vector(vocab, a.id)?, &space.vector(vocab, b.id)?)
                }
            }
            TokenMetric::Lerp { a: ma, b: mb, t } => {
                (1.0 - t) * raw(ma, store, vocab, a, b)? + t * raw(mb, store, vocab, a, b)?
            }
            TokenMetric::Min { a: ma, b: mb } => raw(ma, store, vocab, a, b)?.min(raw(mb, store, vocab, a, b)?),
            TokenMetric::Max { a: ma, b: mb } => raw(ma, store, vocab, a, b)?.max(raw(mb, store, vocab, a, b)?),
        })
    }
    Ok(policy.apply(raw(metric, store, vocab, a, b)?, a, b))
}
