// SPDX-License-Identifier: MIT OR Apache-2.0

//! Named embedding spaces and vector lookup.

use super::resolver::{NullResolver, TokenResolver};
use crate::document::DocumentId;
use crate::errors::{Result, SearchError};
use crate::metric::simd;
use crate::vocabulary::{TokenId, Vocabulary};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Name of the built-in space where only identical tokens are similar
pub const EXACT_MATCH_SPACE: &str = "exact";

/// What a static space returns for tokens its resolver does not know
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OovPolicy {
    /// All-zero vector; similar to nothing
    #[default]
    Zero,
    /// Deterministic pseudo-random unit-scale vector derived from the token
    Hashed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingKind {
    Static,
    Contextual,
}

/// Vector plus its cached L2 norm and unit-length copy
#[derive(Debug, Clone)]
pub struct EmbeddedVector {
    values: Arc<[f32]>,
    unit: Arc<[f32]>,
    norm: f32,
    known: bool,
}

impl EmbeddedVector {
    pub fn new(values: Vec<f32>, known: bool) -> Self {
        let norm = simd::norm(&values);
        let unit: Vec<f32> = if norm > 0.0 {
            values.iter().map(|v| v / norm).collect()
        } else {
            vec![0.0; values.len()]
        };
        Self {
            values: values.into(),
            unit: unit.into(),
            norm,
            known,
        }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn unit(&self) -> &[f32] {
        &self.unit
    }

    pub fn norm(&self) -> f32 {
        self.norm
    }

    /// False when the vector came from the OOV policy
    pub fn is_known(&self) -> bool {
        self.known
    }
}

/// Per-token-string vectors, filled lazily through a resolver.
pub struct StaticEmbedding {
    name: String,
    dimension: usize,
    resolver: Box<dyn TokenResolver>,
    oov: OovPolicy,
    vectors: DashMap<TokenId, EmbeddedVector>,
    fill: Mutex<()>,
    resolutions: AtomicUsize,
}

impl StaticEmbedding {
    pub fn new(name: impl Into<String>, resolver: Box<dyn TokenResolver>, oov: OovPolicy) -> Self {
        let dimension = resolver.dimension();
        Self {
            name: name.into(),
            dimension,
            resolver,
            oov,
            vectors: DashMap::new(),
            fill: Mutex::new(()),
            resolutions: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of ids resolved so far; each id counts once
    pub fn resolutions(&self) -> usize {
        self.resolutions.load(Ordering::Relaxed)
    }

    /// Already-resolved vector, without touching the resolver
    pub fn cached(&self, id: TokenId) -> Option<EmbeddedVector> {
        self.vectors.get(&id).map(|entry| entry.value().clone())
    }

    /// Vector for `id`, resolving it on first use
    pub fn vector(&self, vocab: &Vocabulary, id: TokenId) -> Result<EmbeddedVector> {
        if let Some(vector) = self.cached(id) {
            return Ok(vector);
        }
        self.prefetch(vocab, &[id])?;
        self.cached(id)
            .ok_or_else(|| SearchError::unknown_embedding(self.name.clone()))
    }

    /// Resolve every id in `ids` that has no vector yet, in one batch.
    ///
    /// Returns how many ids were newly resolved.
    pub fn prefetch(&self, vocab: &Vocabulary, ids: &[TokenId]) -> Result<usize> {
        let _guard = self.fill.lock();
        let mut missing: Vec<TokenId> = ids
            .iter()
            .copied()
            .filter(|id| !self.vectors.contains_key(id))
            .collect();
        missing.sort_unstable();
        missing.dedup();
        if missing.is_empty() {
            return Ok(0);
        }

        let tokens: Vec<String> = missing
            .iter()
            .map(|id| vocab.token(*id).map(|t| t.to_string()).unwrap_or_default())
            .collect();
        let refs: Vec<&str> = tokens.iter().map(String::as_str).collect();
        let resolved = self.resolver.resolve_batch(&refs)?;

        let mut oov = 0usize;
        for ((id, token), vector) in missing.iter().zip(&tokens).zip(resolved) {
            let entry = match vector {
                Some(values) => {
                    if values.len() != self.dimension {
                        return Err(SearchError::dimension(
                            format!("embedding {} vector for '{}'", self.name, token),
                            self.dimension,
                            values.len(),
                        ));
                    }
                    EmbeddedVector::new(values, true)
                }
                None => {
                    oov += 1;
                    EmbeddedVector::new(self.oov_vector(token), false)
                }
            };
            self.vectors.insert(*id, entry);
        }
        self.resolutions.fetch_add(missing.len(), Ordering::Relaxed);
        tracing::debug!(
            "{}: resolved {} ids ({} out of vocabulary)",
            self.name,
            missing.len(),
            oov
        );
        Ok(missing.len())
    }

    fn oov_vector(&self, token: &str) -> Vec<f32> {
        match self.oov {
            OovPolicy::Zero => vec![0.0; self.dimension],
            OovPolicy::Hashed => hashed_vector(&self.name, token, self.dimension),
        }
    }
}

/// Deterministic vector in [-1, 1]^dim seeded by space name and token
fn hashed_vector(space: &str, token: &str, dimension: usize) -> Vec<f32> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(space.as_bytes());
    hasher.update(&[0]);
    hasher.update(token.as_bytes());
    let mut reader = hasher.finalize_xof();
    let mut bytes = vec![0u8; dimension * 4];
    reader.fill(&mut bytes);
    bytes
        .chunks_exact(4)
        .map(|chunk| {
            let raw = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            (raw as f64 / u32::MAX as f64 * 2.0 - 1.0) as f32
        })
        .collect()
}

/// Per-occurrence vectors supplied for each document
pub struct ContextualEmbedding {
    name: String,
    dimension: usize,
    documents: DashMap<DocumentId, Arc<Vec<EmbeddedVector>>>,
}

impl ContextualEmbedding {
    pub fn new(name: impl Into<String>, dimension: usize) -> Self {
        Self {
            name: name.into(),
            dimension,
            documents: DashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Validate widths and wrap rows
    pub fn prepare(&self, vectors: Vec<Vec<f32>>) -> Result<Vec<EmbeddedVector>> {
        vectors
            .into_iter()
            .enumerate()
            .map(|(pos, values)| {
                if values.len() != self.dimension {
                    return Err(SearchError::dimension(
                        format!("embedding {} at position {}", self.name, pos),
                        self.dimension,
                        values.len(),
                    ));
                }
                Ok(EmbeddedVector::new(values, true))
            })
            .collect()
    }

    pub fn register(&self, document: DocumentId, vectors: Vec<Vec<f32>>) -> Result<()> {
        let rows = self.prepare(vectors)?;
        self.documents.insert(document, Arc::new(rows));
        Ok(())
    }

    pub fn document(&self, document: DocumentId) -> Option<Arc<Vec<EmbeddedVector>>> {
        self.documents.get(&document).map(|rows| Arc::clone(rows.value()))
    }

    pub fn vector(&self, document: DocumentId, position: usize) -> Option<EmbeddedVector> {
        self.documents
            .get(&document)
            .and_then(|rows| rows.get(position).cloned())
    }
}

pub enum EmbeddingSpace {
    Static(StaticEmbedding),
    Contextual(ContextualEmbedding),
}

impl EmbeddingSpace {
    pub fn kind(&self) -> EmbeddingKind {
        match self {
            Self::Static(_) => EmbeddingKind::Static,
            Self::Contextual(_) => EmbeddingKind::Contextual,
        }
    }

    pub fn dimension(&self) -> usize {
        match self {
            Self::Static(space) => space.dimension(),
            Self::Contextual(space) => space.dimension(),
        }
    }
}

/// Registry of embedding spaces by name
#[derive(Default)]
pub struct EmbeddingStore {
    spaces: BTreeMap<String, EmbeddingSpace>,
}

impl EmbeddingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store holding only the exact-match space
    pub fn exact_match() -> Self {
        let mut store = Self::new();
        store.add_static(EXACT_MATCH_SPACE, Box::new(NullResolver::new(1)), OovPolicy::Zero);
        store
    }

    /// Register (or replace) a static space
    pub fn add_static(
        &mut self,
        name: impl Into<String>,
        resolver: Box<dyn TokenResolver>,
        oov: OovPolicy,
    ) {
        let name = name.into();
        let space = StaticEmbedding::new(name.clone(), resolver, oov);
        self.spaces.insert(name, EmbeddingSpace::Static(space));
    }

    /// Register (or replace) a contextual space
    pub fn add_contextual(&mut self, name: impl Into<String>, dimension: usize) {
        let name = name.into();
        let space = ContextualEmbedding::new(name.clone(), dimension);
        self.spaces.insert(name, EmbeddingSpace::Contextual(space));
    }

    pub fn space(&self, name: &str) -> Result<&EmbeddingSpace> {
        self.spaces
            .get(name)
            .ok_or_else(|| SearchError::unknown_embedding(name))
    }

    pub fn static_space(&self, name: &str) -> Result<&StaticEmbedding> {
        match self.space(name)? {
            EmbeddingSpace::Static(space) => Ok(space),
            EmbeddingSpace::Contextual(_) => Err(SearchError::unknown_embedding(format!(
                "{} (contextual space used where a static one is required)",
                name
            ))),
        }
    }

    pub fn contextual_space(&self, name: &str) -> Result<&ContextualEmbedding> {
        match self.space(name)? {
            EmbeddingSpace::Contextual(space) => Ok(space),
            EmbeddingSpace::Static(_) => Err(SearchError::unknown_embedding(format!(
                "{} (static space used where a contextual one is required)",
                name
            ))),
        }
    }

    /// Static vector for `id` in space `name`
    pub fn vector(&self, vocab: &Vocabulary, name: &str, id: TokenId) -> Result<EmbeddedVector> {
        self.static_space(name)?.vector(vocab, id)
    }

    /// Bind externally computed per-position vectors to a document
    pub fn register_contextual(
        &self,
        document: DocumentId,
        name: &str,
        vectors: Vec<Vec<f32>>,
    ) -> Result<()> {
        self.contextual_space(name)?.register(document, vectors)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.spaces.keys().map(String::as_str)
    }

    pub fn static_spaces(&self) -> impl Iterator<Item = &StaticEmbedding> {
        self.spaces.values().filter_map(|space| match space {
            EmbeddingSpace::Static(space) => Some(space),
            EmbeddingSpace::Contextual(_) => None,
        })
    }
}
