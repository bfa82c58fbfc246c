// SPDX-License-Identifier: MIT OR Apache-2.0

//! Match results and their serializable records

use crate::document::{Document, DocumentId, Span};
use crate::query::Query;
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

/// One aligned query/document token pair
#[derive(Debug, Clone, PartialEq)]
pub struct TokenMatch {
    /// Query token index
    pub query: usize,
    /// Document token index
    pub token: usize,
    pub similarity: f32,
    pub weight: f32,
    pub pos_query: Arc<str>,
    pub pos_document: Arc<str>,
    pub metric: String,
}

/// Piece of the aligned document range
#[derive(Debug, Clone, PartialEq)]
pub enum Region {
    Matched(TokenMatch),
    /// Unaligned document tokens between two matches
    Gap { tokens: Range<usize>, penalty: f32 },
}

impl Region {
    pub fn tokens(&self) -> Range<usize> {
        match self {
            Region::Matched(m) => m.token..m.token + 1,
            Region::Gap { tokens, .. } => tokens.clone(),
        }
    }
}

/// A scored span
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub document: DocumentId,
    /// Index in the span table of the searched partition
    pub span_index: usize,
    pub span: Span,
    pub score: f32,
    pub metric: String,
    /// Matched and gap regions in document order
    pub regions: Vec<Region>,
    /// Span tokens before the first match (not penalized)
    pub leading: Range<usize>,
    /// Span tokens after the last match (not penalized)
    pub trailing: Range<usize>,
}

impl Match {
    pub fn matched(&self) -> impl Iterator<Item = &TokenMatch> {
        self.regions.iter().filter_map(|region| match region {
            Region::Matched(m) => Some(m),
            Region::Gap { .. } => None,
        })
    }

    pub fn gaps(&self) -> impl Iterator<Item = (&Range<usize>, f32)> {
        self.regions.iter().filter_map(|region| match region {
            Region::Gap { tokens, penalty } => Some((tokens, *penalty)),
            Region::Matched(_) => None,
        })
    }
}

/// Serializable region with its text
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RegionRecord {
    Match {
        text: String,
        query_text: String,
        similarity: f32,
        weight: f32,
        pos_query: String,
        pos_document: String,
        metric: String,
    },
    Gap {
        text: String,
        penalty: f32,
    },
}

/// Serializable match for renderers
#[derive(Debug, Clone, Serialize)]
pub struct MatchRecord {
    pub document: DocumentId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,
    pub title: String,
    pub author: String,
    pub span: usize,
    pub score: f32,
    pub metric: String,
    pub omitted_before: String,
    pub regions: Vec<RegionRecord>,
    pub omitted_after: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub location: BTreeMap<String, serde_json::Value>,
}

fn tokens_text(document: &Document, tokens: Range<usize>) -> String {
    if tokens.is_empty() {
        return String::new();
    }
    document
        .span_text(Span {
            token_at: tokens.start,
            n_tokens: tokens.len(),
        })
        .to_string()
}

impl MatchRecord {
    pub fn new(m: &Match, document: &Document, query: &Query) -> Self {
        let regions = m
            .regions
            .iter()
            .map(|region| match region {
                Region::Matched(t) => RegionRecord::Match {
                    text: tokens_text(document, region.tokens()),
                    query_text: query.token_text(t.query).to_string(),
                    similarity: t.similarity,
                    weight: t.weight,
                    pos_query: t.pos_query.to_string(),
                    pos_document: t.pos_document.to_string(),
                    metric: t.metric.clone(),
                },
                Region::Gap { tokens, penalty } => RegionRecord::Gap {
                    text: tokens_text(document, tokens.clone()),
                    penalty: *penalty,
                },
            })
            .collect();
        let meta = document.meta();
        Self {
            document: m.document,
            unique_id: meta.unique_id.clone(),
            title: meta.title.clone(),
            author: meta.author.clone(),
            span: m.span_index,
            score: m.score,
            metric: m.metric.clone(),
            omitted_before: tokens_text(document, m.leading.clone()),
            regions,
            omitted_after: tokens_text(document, m.trailing.clone()),
            location: document.location(m.span.token_at),
        }
    }

    /// Span text reassembled from the record's pieces
    pub fn text(&self) -> String {
        let mut text = self.omitted_before.clone();
        for region in &self.regions {
            match region {
                RegionRecord::Match { text: t, .. } | RegionRecord::Gap { text: t, .. } => text.push_str(t),
            }
        }
        text.push_str(&self.omitted_after);
        text
    }
}
