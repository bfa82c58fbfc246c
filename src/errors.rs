// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for spanseek

use thiserror::Error;

/// Errors raised by the search library
#[derive(Debug, Error)]
pub enum SearchError {
    /// Token or sentence boundaries in supplied document data are inconsistent
    #[error("Malformed input in {document}: {reason}")]
    MalformedInput { document: String, reason: String },

    /// The named embedding space is not registered (or has the wrong kind)
    #[error("Unknown embedding: {0}")]
    UnknownEmbedding(String),

    /// Vector width or token count disagrees with what was declared
    #[error("Dimension mismatch for {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    /// Both transport distributions carry zero mass
    #[error("Degenerate distribution: both sides carry zero mass")]
    DegenerateDistribution,

    /// A gap cost lies outside [0, 1] with clamping disabled
    #[error("Invalid gap cost {value} for gap length {length}")]
    InvalidGapCost { length: usize, value: f32 },

    /// Partition parameters cannot produce a span table
    #[error("Invalid partition: {0}")]
    InvalidPartition(String),

    /// Document id not present in the index
    #[error("Unknown document: {0}")]
    UnknownDocument(usize),

    /// Span index past the end of a span table
    #[error("Span {span} out of range ({count} spans)")]
    SpanOutOfRange { span: usize, count: usize },

    /// A contextual space is used without vectors registered for a document or query
    #[error("Missing contextual vectors for embedding {embedding} in {owner}")]
    MissingContextual { embedding: String, owner: String },

    /// An external embedding resolver failed
    #[error("Resolver error: {0}")]
    Resolver(String),

    /// Worker pool construction failed
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Invalid normalization pattern
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SearchError {
    /// Create a malformed input error
    pub fn malformed(document: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedInput {
            document: document.into(),
            reason: reason.into(),
        }
    }

    /// Create a dimension mismatch error
    pub fn dimension(context: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch {
            context: context.into(),
            expected,
            actual,
        }
    }

    /// Create an unknown embedding error
    pub fn unknown_embedding(name: impl Into<String>) -> Self {
        Self::UnknownEmbedding(name.into())
    }

    /// Create a resolver error
    pub fn resolver(msg: impl Into<String>) -> Self {
        Self::Resolver(msg.into())
    }

    /// Errors scoped to a single alignment call.
    ///
    /// The search engine skips the offending span and keeps going.
    pub fn is_alignment_error(&self) -> bool {
        matches!(
            self,
            Self::DegenerateDistribution | Self::InvalidGapCost { .. }
        )
    }
}

/// Result type for search operations
pub type Result<T> = std::result::Result<T, SearchError>;
