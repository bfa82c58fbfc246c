// SPDX-License-Identifier: MIT OR Apache-2.0

//! A search session: vocabulary, embedding spaces and documents with one lifetime

use crate::document::{DocumentId, DocumentIndex, DocumentInput, DocumentStructure, Partition, QueryInput, Token};
use crate::embedding::EmbeddingStore;
use crate::errors::{Result, SearchError};
use crate::normalize::TokenNormalizer;
use crate::query::{Query, QueryOptions};
use crate::search::{Match, MatchRecord, SearchControl, SearchEngine, SearchOptions};
use crate::similarity::{pair_similarity, TokenMetric, TokenPolicy};
use crate::vocabulary::{TokenId, Vocabulary};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Outcome of loading many documents
#[derive(Debug, Default)]
pub struct CorpusReport {
    pub loaded: Vec<DocumentId>,
    /// Label and reason of every rejected document
    pub skipped: Vec<(String, String)>,
}

pub struct Session {
    vocab: Vocabulary,
    store: EmbeddingStore,
    index: DocumentIndex,
    normalizer: TokenNormalizer,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(EmbeddingStore::exact_match(), TokenNormalizer::default())
    }
}

impl Session {
    pub fn new(store: EmbeddingStore, normalizer: TokenNormalizer) -> Self {
        Self {
            vocab: Vocabulary::new(),
            store,
            index: DocumentIndex::new(),
            normalizer,
        }
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn store(&self) -> &EmbeddingStore {
        &self.store
    }

    pub fn index(&self) -> &DocumentIndex {
        &self.index
    }

    pub fn normalizer(&self) -> &TokenNormalizer {
        &self.normalizer
    }

    pub fn add_document(&mut self, input: &DocumentInput) -> Result<DocumentId> {
        self.index.add_document(input, &self.vocab, &self.normalizer)
    }

    /// Add every document that compiles; malformed ones are logged and skipped
    pub fn load_corpus<'i>(&mut self, inputs: impl IntoIterator<Item = &'i DocumentInput>) -> CorpusReport {
        let mut report = CorpusReport::default();
        for input in inputs {
            match self.add_document(input) {
                Ok(id) => report.loaded.push(id),
                Err(err) => {
                    warn!("Skipping document {}: {}", input.label(), err);
                    report.skipped.push((input.label(), err.to_string()));
                }
            }
        }
        info!(
            "Loaded {} documents ({} skipped), vocabulary of {} tokens",
            report.loaded.len(),
            report.skipped.len(),
            self.vocab.len()
        );
        report
    }

    /// Load JSON files holding one document or an array of documents.
    ///
    /// Unreadable or unparsable files are skipped like malformed documents.
    pub fn load_files(&mut self, paths: &[PathBuf]) -> CorpusReport {
        let mut inputs = Vec::new();
        let mut unreadable = Vec::new();
        for path in paths {
            match read_documents(path) {
                Ok(docs) => inputs.extend(docs),
                Err(err) => {
                    warn!("Skipping {}: {}", path.display(), err);
                    unreadable.push((path.display().to_string(), err.to_string()));
                }
            }
        }
        let mut report = self.load_corpus(&inputs);
        report.skipped.extend(unreadable);
        report
    }

    /// Bind per-token vectors of a contextual space to a document
    pub fn register_contextual(&self, document: DocumentId, name: &str, vectors: Vec<Vec<f32>>) -> Result<()> {
        let tokens = self.index.get(document)?.tokens().len();
        if vectors.len() != tokens {
            return Err(SearchError::dimension(
                format!("contextual vectors of document {}", document),
                tokens,
                vectors.len(),
            ));
        }
        self.store.register_contextual(document, name, vectors)
    }

    pub fn query(&self, input: &QueryInput, options: QueryOptions) -> Result<Query> {
        Query::new(input, options, &self.vocab, &self.normalizer)
    }

    /// Resolve static vectors for every interned token so searches only read.
    ///
    /// Returns how many vectors were newly resolved.
    pub fn compile(&self) -> Result<usize> {
        let ids: Vec<TokenId> = (0..self.vocab.len() as TokenId).collect();
        let mut resolved = 0;
        for space in self.store.static_spaces() {
            resolved += space.prefetch(&self.vocab, &ids)?;
        }
        if resolved > 0 {
            info!("Resolved {} static vectors", resolved);
        }
        Ok(resolved)
    }

    pub fn find(&self, query: &Query, options: &SearchOptions, control: &SearchControl) -> Result<Vec<Match>> {
        self.compile()?;
        SearchEngine::new(&self.vocab, &self.store).find(query, self.index.documents(), options, control)
    }

    pub fn records(&self, query: &Query, matches: &[Match]) -> Result<Vec<MatchRecord>> {
        matches
            .iter()
            .map(|m| Ok(MatchRecord::new(m, self.index.get(m.document)?, query)))
            .collect()
    }

    pub fn structure(&self, document: DocumentId, partition: Partition) -> Result<DocumentStructure> {
        self.index.get(document)?.structure(partition)
    }

    /// Similarity of two token strings under a static metric
    pub fn similarity(&self, a: &str, b: &str, metric: &TokenMetric, policy: &TokenPolicy) -> Result<f32> {
        let token = |text: &str| Token {
            idx: 0,
            len: text.len(),
            pos: self.vocab.intern_tag(""),
            tag: self.vocab.intern_tag(""),
            id: self.vocab.intern(&self.normalizer.normalize(text)),
        };
        let (a, b) = (token(a), token(b));
        pair_similarity(metric, policy, &self.store, &self.vocab, &a, &b)
    }
}

fn read_documents(path: &Path) -> Result<Vec<DocumentInput>> {
    let content = std::fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&content)?;
    Ok(match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<_>, _>>()?,
        other => vec![serde_json::from_value(other)?],
    })
}
