// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding spaces - static per-token vectors and contextual per-occurrence vectors
//!
//! Static spaces are addressed by vocabulary id and filled lazily through a
//! [`TokenResolver`]. Contextual spaces are addressed by document and token
//! position and are supplied from outside.

pub mod resolver;
pub mod store;

pub use resolver::{CommandResolver, MapResolver, NullResolver, TokenResolver};
pub use store::{
    ContextualEmbedding, EmbeddedVector, EmbeddingKind, EmbeddingSpace, EmbeddingStore,
    OovPolicy, StaticEmbedding, EXACT_MATCH_SPACE,
};
