// SPDX-License-Identifier: MIT OR Apache-2.0

//! Span tables: contiguous token ranges at a partition level

use crate::errors::{Result, SearchError};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Unit a partition window counts in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    #[default]
    Sentence,
    Token,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Sentence => "sentence",
            Level::Token => "token",
        }
    }
}

impl std::str::FromStr for Level {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sentence" | "sentences" => Ok(Level::Sentence),
            "token" | "tokens" => Ok(Level::Token),
            other => Err(SearchError::InvalidPartition(format!("unknown level '{}'", other))),
        }
    }
}

/// Cache key for a span table: level plus sliding window shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Partition {
    pub level: Level,
    pub window_size: usize,
    pub window_step: usize,
}

impl Default for Partition {
    fn default() -> Self {
        Self::sentence()
    }
}

impl Partition {
    pub fn new(level: Level, window_size: usize, window_step: usize) -> Self {
        Self {
            level,
            window_size,
            window_step,
        }
    }

    /// One span per sentence
    pub fn sentence() -> Self {
        Self::new(Level::Sentence, 1, 1)
    }

    pub fn tokens(window_size: usize, window_step: usize) -> Self {
        Self::new(Level::Token, window_size, window_step)
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 || self.window_step == 0 {
            return Err(SearchError::InvalidPartition(format!(
                "window size and step must be positive (got {}/{})",
                self.window_size, self.window_step
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}/{}", self.level.as_str(), self.window_size, self.window_step)
    }
}

/// `n_tokens` tokens starting at `token_at`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub token_at: usize,
    pub n_tokens: usize,
}

impl Span {
    pub fn range(&self) -> Range<usize> {
        self.token_at..self.token_at + self.n_tokens
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanTable {
    partition: Partition,
    spans: Vec<Span>,
}

impl SpanTable {
    /// Slide a window over `units` (each a token range, in token order).
    ///
    /// Produces `ceil(units / step)` spans; the last windows are clipped at
    /// the end of the document.
    pub fn build(partition: Partition, units: &[Span]) -> Result<Self> {
        partition.validate()?;
        let count = units.len().div_ceil(partition.window_step);
        let mut spans = Vec::with_capacity(count);
        for k in 0..count {
            let first = k * partition.window_step;
            let last = (first + partition.window_size).min(units.len()) - 1;
            let token_at = units[first].token_at;
            let end = units[last].range().end;
            spans.push(Span {
                token_at,
                n_tokens: end - token_at,
            });
        }
        Ok(Self { partition, spans })
    }

    pub fn partition(&self) -> Partition {
        self.partition
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<Span> {
        self.spans.get(index).copied().ok_or(SearchError::SpanOutOfRange {
            span: index,
            count: self.spans.len(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Span> {
        self.spans.iter()
    }

    pub fn as_slice(&self) -> &[Span] {
        &self.spans
    }
}
