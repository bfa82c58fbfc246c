// SPDX-License-Identifier: MIT OR Apache-2.0

//! Compiled documents: token tables, sentences, and cached span tables

pub mod index;
pub mod input;
pub mod span;

pub use index::DocumentIndex;
pub use input::{DocumentInput, PartitionInput, QueryInput, SentenceInput, TokenInput};
pub use span::{Level, Partition, Span, SpanTable};

use crate::errors::{Result, SearchError};
use crate::normalize::TokenNormalizer;
use crate::vocabulary::{TagId, TokenId, Vocabulary};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Position of a document in its index; also the insertion order
pub type DocumentId = usize;

/// One token record: byte range into the owning text plus interned ids
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub idx: usize,
    pub len: usize,
    pub pos: TagId,
    pub tag: TagId,
    pub id: TokenId,
}

impl Token {
    pub fn end(&self) -> usize {
        self.idx + self.len
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sentence {
    pub span: Span,
    /// Index into the document's partition locations
    pub partition: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocumentMeta {
    pub unique_id: Option<String>,
    pub title: String,
    pub author: String,
}

/// Text and tokens shared by documents and queries
#[derive(Debug, Clone, Default)]
pub(crate) struct TokenTable {
    pub text: String,
    pub tokens: Vec<Token>,
    pub sentences: Vec<Sentence>,
}

/// Character offset to byte offset within one text
struct CharOffsets {
    bytes: Vec<usize>,
}

impl CharOffsets {
    fn new(text: &str) -> Self {
        let bytes = text
            .char_indices()
            .map(|(b, _)| b)
            .chain(std::iter::once(text.len()))
            .collect();
        Self { bytes }
    }

    fn byte(&self, chars: usize) -> Option<usize> {
        self.bytes.get(chars).copied()
    }
}

/// Strings of a pushed token, interned by [`TableBuilder::finish`]
struct PendingToken {
    norm: String,
    pos: String,
    tag: String,
}

/// Builds a token table; nothing reaches the vocabulary until `finish`,
/// so rejected input leaves it untouched
pub(crate) struct TableBuilder<'a> {
    label: String,
    vocab: &'a Vocabulary,
    normalizer: &'a TokenNormalizer,
    table: TokenTable,
    pending: Vec<PendingToken>,
}

impl<'a> TableBuilder<'a> {
    pub fn new(label: String, vocab: &'a Vocabulary, normalizer: &'a TokenNormalizer) -> Self {
        Self {
            label,
            vocab,
            normalizer,
            table: TokenTable::default(),
            pending: Vec::new(),
        }
    }

    fn malformed(&self, reason: String) -> SearchError {
        SearchError::malformed(&self.label, reason)
    }

    /// Byte ranges of `tokens` after validating their ordering against `text`
    fn token_bytes(&self, text: &str, tokens: &[TokenInput]) -> Result<Vec<(usize, usize)>> {
        let offsets = CharOffsets::new(text);
        let mut last_start = 0;
        let mut ranges = Vec::with_capacity(tokens.len());
        for (i, token) in tokens.iter().enumerate() {
            if token.start > token.end || token.start < last_start {
                return Err(self.malformed(format!(
                    "token {} at {}..{} is out of order",
                    i, token.start, token.end
                )));
            }
            let (Some(start), Some(end)) = (offsets.byte(token.start), offsets.byte(token.end)) else {
                return Err(self.malformed(format!(
                    "token {} at {}..{} exceeds the text",
                    i, token.start, token.end
                )));
            };
            last_start = token.start;
            ranges.push((start, end));
        }
        Ok(ranges)
    }

    fn push_token(&mut self, source: &str, token: &TokenInput, byte_range: (usize, usize), base: usize) -> bool {
        let surface = &source[byte_range.0..byte_range.1];
        let normalized = self
            .normalizer
            .normalize(token.norm.as_deref().unwrap_or(surface));
        if normalized.is_empty() {
            return false;
        }
        self.table.tokens.push(Token {
            idx: base + byte_range.0,
            len: byte_range.1 - byte_range.0,
            pos: 0,
            tag: 0,
            id: 0,
        });
        self.pending.push(PendingToken {
            norm: normalized,
            pos: token.pos.clone(),
            tag: token.tag.clone(),
        });
        true
    }

    /// Append the sentences of one partition, copying their text
    pub fn add_partition(&mut self, index: usize, partition: &PartitionInput) -> Result<()> {
        let text = partition.text.as_str();
        let offsets = CharOffsets::new(text);
        let token_bytes = self.token_bytes(text, &partition.tokens)?;
        let mut cursor = 0;
        let mut last_end = 0;

        for (s, sentence) in partition.sents.iter().enumerate() {
            if sentence.start > sentence.end || sentence.start < last_end {
                return Err(self.malformed(format!(
                    "sentence {} at {}..{} is out of order",
                    s, sentence.start, sentence.end
                )));
            }
            let (Some(start), Some(end)) = (offsets.byte(sentence.start), offsets.byte(sentence.end)) else {
                return Err(self.malformed(format!(
                    "sentence {} at {}..{} exceeds the text",
                    s, sentence.start, sentence.end
                )));
            };
            last_end = sentence.end;

            let first = cursor;
            while cursor < partition.tokens.len() && partition.tokens[cursor].start < sentence.end {
                let token = &partition.tokens[cursor];
                if token.start < sentence.start {
                    return Err(self.malformed(format!(
                        "sentence {} starts at {} after its token at {}",
                        s, sentence.start, token.start
                    )));
                }
                if token.end > sentence.end {
                    return Err(self.malformed(format!(
                        "token at {}..{} crosses the end of sentence {} at {}",
                        token.start, token.end, s, sentence.end
                    )));
                }
                cursor += 1;
            }

            let sentence_text = &text[start..end];
            if first == cursor || sentence_text.trim().is_empty() {
                debug!("{}: skipping empty sentence {}", self.label, s);
                continue;
            }

            if !self.table.text.is_empty() && !self.table.text.ends_with(char::is_whitespace) {
                self.table.text.push(' ');
            }
            let base = self.table.text.len();
            self.table.text.push_str(sentence_text);

            let token_at = self.table.tokens.len();
            for t in first..cursor {
                let (ts, te) = token_bytes[t];
                self.push_token(sentence_text, &partition.tokens[t], (ts - start, te - start), base);
            }
            let n_tokens = self.table.tokens.len() - token_at;
            if n_tokens > 0 {
                self.table.sentences.push(Sentence {
                    span: Span { token_at, n_tokens },
                    partition: index,
                });
            }
        }

        if cursor < partition.tokens.len() {
            let token = &partition.tokens[cursor];
            return Err(self.malformed(format!(
                "token at {}..{} lies outside every sentence",
                token.start, token.end
            )));
        }
        Ok(())
    }

    /// Tokens of a free-standing span (queries have no sentence table).
    ///
    /// Returns the indices of the input tokens that were kept.
    pub fn add_span(&mut self, text: &str, tokens: &[TokenInput]) -> Result<Vec<usize>> {
        let token_bytes = self.token_bytes(text, tokens)?;
        let base = self.table.text.len();
        self.table.text.push_str(text);
        let token_at = self.table.tokens.len();
        let mut kept = Vec::with_capacity(tokens.len());
        for (i, (token, range)) in tokens.iter().zip(token_bytes).enumerate() {
            if self.push_token(text, token, range, base) {
                kept.push(i);
            }
        }
        let n_tokens = self.table.tokens.len() - token_at;
        if n_tokens > 0 {
            self.table.sentences.push(Sentence {
                span: Span { token_at, n_tokens },
                partition: 0,
            });
        }
        Ok(kept)
    }

    /// Intern the pushed tokens and hand over the table
    pub fn finish(mut self) -> TokenTable {
        for (token, pending) in self.table.tokens.iter_mut().zip(&self.pending) {
            token.pos = self.vocab.intern_tag(&pending.pos);
            token.tag = self.vocab.intern_tag(&pending.tag);
            token.id = self.vocab.intern(&pending.norm);
        }
        self.table
    }
}

/// A compiled, immutable document
#[derive(Debug)]
pub struct Document {
    id: DocumentId,
    meta: DocumentMeta,
    loc_keys: Vec<String>,
    locations: Vec<Vec<serde_json::Value>>,
    table: TokenTable,
    spans: DashMap<Partition, Arc<SpanTable>>,
    span_builds: AtomicUsize,
}

/// Span layout of a document at one partition, for inspection
#[derive(Debug, Clone, Serialize)]
pub struct DocumentStructure {
    pub id: DocumentId,
    #[serde(flatten)]
    pub meta: DocumentMeta,
    pub partition: String,
    pub tokens: usize,
    pub sentences: usize,
    pub spans: Vec<SpanSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpanSummary {
    pub index: usize,
    pub token_at: usize,
    pub n_tokens: usize,
    pub text: String,
}

impl Document {
    pub fn from_input(
        id: DocumentId,
        input: &DocumentInput,
        vocab: &Vocabulary,
        normalizer: &TokenNormalizer,
    ) -> Result<Self> {
        let mut builder = TableBuilder::new(input.label(), vocab, normalizer);
        for (index, partition) in input.partitions.iter().enumerate() {
            builder.add_partition(index, partition)?;
        }
        Ok(Self {
            id,
            meta: DocumentMeta {
                unique_id: input.unique_id.clone(),
                title: input.title.clone(),
                author: input.author.clone(),
            },
            loc_keys: input.loc_keys.clone(),
            locations: input.partitions.iter().map(|p| p.loc.clone()).collect(),
            table: builder.finish(),
            spans: DashMap::new(),
            span_builds: AtomicUsize::new(0),
        })
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn meta(&self) -> &DocumentMeta {
        &self.meta
    }

    pub fn text(&self) -> &str {
        &self.table.text
    }

    pub fn tokens(&self) -> &[Token] {
        &self.table.tokens
    }

    pub fn sentences(&self) -> &[Sentence] {
        &self.table.sentences
    }

    /// How many span tables have been computed (cache misses)
    pub fn span_builds(&self) -> usize {
        self.span_builds.load(Ordering::Relaxed)
    }

    /// Build on first request, then serve from cache
    pub fn span_table(&self, partition: Partition) -> Result<Arc<SpanTable>> {
        if let Some(table) = self.spans.get(&partition) {
            return Ok(Arc::clone(&table));
        }
        partition.validate()?;
        let entry = self.spans.entry(partition).or_try_insert_with(|| {
            let units: Vec<Span> = match partition.level {
                Level::Sentence => self.table.sentences.iter().map(|s| s.span).collect(),
                Level::Token => (0..self.table.tokens.len())
                    .map(|token_at| Span { token_at, n_tokens: 1 })
                    .collect(),
            };
            let table = SpanTable::build(partition, &units)?;
            self.span_builds.fetch_add(1, Ordering::Relaxed);
            debug!("doc {}: built {} spans for {}", self.id, table.len(), partition);
            Ok::<_, SearchError>(Arc::new(table))
        })?;
        Ok(Arc::clone(&entry))
    }

    pub fn span(&self, partition: Partition, index: usize) -> Result<Span> {
        self.span_table(partition)?.get(index)
    }

    pub fn span_tokens(&self, span: Span) -> &[Token] {
        &self.table.tokens[span.range()]
    }

    /// Text from the span's first token up to the next token after it
    pub fn span_text(&self, span: Span) -> &str {
        let tokens = &self.table.tokens;
        let Some(first) = tokens.get(span.token_at) else {
            return "";
        };
        let end = match tokens.get(span.range().end) {
            Some(next) => next.idx,
            None => tokens[span.range().end - 1].end(),
        };
        &self.table.text[first.idx..end]
    }

    /// Location of the sentence containing `token`, keyed by `loc_keys`
    pub fn location(&self, token: usize) -> BTreeMap<String, serde_json::Value> {
        let sentence = self
            .table
            .sentences
            .partition_point(|s| s.span.range().end <= token);
        let Some(sentence) = self.table.sentences.get(sentence) else {
            return BTreeMap::new();
        };
        let Some(values) = self.locations.get(sentence.partition) else {
            return BTreeMap::new();
        };
        self.loc_keys
            .iter()
            .cloned()
            .zip(values.iter().cloned())
            .collect()
    }

    pub fn structure(&self, partition: Partition) -> Result<DocumentStructure> {
        let table = self.span_table(partition)?;
        let spans = table
            .iter()
            .enumerate()
            .map(|(index, span)| SpanSummary {
                index,
                token_at: span.token_at,
                n_tokens: span.n_tokens,
                text: self.span_text(*span).trim_end().to_string(),
            })
            .collect();
        Ok(DocumentStructure {
            id: self.id,
            meta: self.meta.clone(),
            partition: partition.to_string(),
            tokens: self.table.tokens.len(),
            sentences: self.table.sentences.len(),
            spans,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(input: &DocumentInput) -> Result<Document> {
        let vocab = Vocabulary::new();
        Document::from_input(0, input, &vocab, &TokenNormalizer::default())
    }

    fn token(start: usize, end: usize) -> TokenInput {
        TokenInput {
            start,
            end,
            ..TokenInput::default()
        }
    }

    fn single(text: &str, tokens: Vec<TokenInput>, sents: Vec<SentenceInput>) -> DocumentInput {
        DocumentInput {
            title: "t".into(),
            partitions: vec![PartitionInput {
                text: text.into(),
                tokens,
                sents,
                loc: Vec::new(),
            }],
            ..DocumentInput::default()
        }
    }

    #[test]
    fn compiles_tokens_and_sentences() {
        let doc = compile(&DocumentInput::from_sentences("t", &["The great star", "shines."])).unwrap();
        assert_eq!(doc.tokens().len(), 4);
        assert_eq!(doc.sentences().len(), 2);
        assert_eq!(doc.text(), "The great star shines.");
        let star = doc.tokens()[2];
        assert_eq!(&doc.text()[star.idx..star.end()], "star");
    }

    #[test]
    fn span_text_runs_to_next_token() {
        let doc = compile(&DocumentInput::from_sentences("t", &["a b,  c", "d"])).unwrap();
        let table = doc.span_table(Partition::tokens(1, 1)).unwrap();
        assert_eq!(doc.span_text(table.get(1).unwrap()), "b,  ");
        assert_eq!(doc.span_text(table.get(3).unwrap()), "d");
        let sentences = doc.span_table(Partition::sentence()).unwrap();
        assert_eq!(doc.span_text(sentences.get(0).unwrap()), "a b,  c ");
    }

    #[test]
    fn span_tables_are_cached() {
        let doc = compile(&DocumentInput::from_sentences("t", &["one two", "three"])).unwrap();
        let first = doc.span_table(Partition::sentence()).unwrap();
        let second = doc.span_table(Partition::sentence()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(doc.span_builds(), 1);
        doc.span_table(Partition::tokens(2, 1)).unwrap();
        assert_eq!(doc.span_builds(), 2);
        assert!(doc.span_table(Partition::tokens(0, 1)).is_err());
        assert_eq!(doc.span_builds(), 2);
    }

    #[test]
    fn rejected_document_leaves_vocabulary_untouched() {
        let vocab = Vocabulary::new();
        let mut input = DocumentInput::from_sentences("t", &["alpha beta", "gamma"]);
        let mut broken = input.partitions[0].clone();
        broken.tokens[0].end = 999;
        input.partitions.push(broken);
        let result = Document::from_input(0, &input, &vocab, &TokenNormalizer::default());
        assert!(matches!(result, Err(SearchError::MalformedInput { .. })));
        assert_eq!(vocab.len(), 0);
        assert_eq!(vocab.id("alpha"), None);
        assert_eq!(vocab.tag_id(&input.partitions[0].tokens[0].pos), None);

        input.partitions.pop();
        let doc = Document::from_input(0, &input, &vocab, &TokenNormalizer::default()).unwrap();
        assert_eq!(vocab.len(), 3);
        assert_eq!(doc.tokens()[1].id, vocab.id("beta").unwrap());
    }

    #[test]
    fn token_before_sentence_start_is_malformed() {
        let input = single("ab cd", vec![token(0, 2), token(3, 5)], vec![SentenceInput { start: 1, end: 5 }]);
        assert!(matches!(compile(&input), Err(SearchError::MalformedInput { .. })));
    }

    #[test]
    fn token_crossing_sentence_end_is_malformed() {
        let input = single(
            "ab cd",
            vec![token(0, 4)],
            vec![SentenceInput { start: 0, end: 3 }, SentenceInput { start: 3, end: 5 }],
        );
        assert!(matches!(compile(&input), Err(SearchError::MalformedInput { .. })));
    }

    #[test]
    fn out_of_range_offsets_are_malformed() {
        let input = single("ab", vec![token(0, 9)], vec![SentenceInput { start: 0, end: 2 }]);
        assert!(compile(&input).is_err());
        let unordered = single("ab cd", vec![token(3, 5), token(0, 2)], vec![SentenceInput { start: 0, end: 5 }]);
        assert!(compile(&unordered).is_err());
    }

    #[test]
    fn empty_sentences_are_skipped() {
        let input = single(
            "ab    cd",
            vec![token(0, 2), token(6, 8)],
            vec![
                SentenceInput { start: 0, end: 2 },
                SentenceInput { start: 2, end: 6 },
                SentenceInput { start: 6, end: 8 },
            ],
        );
        let doc = compile(&input).unwrap();
        assert_eq!(doc.sentences().len(), 2);
        assert_eq!(doc.text(), "ab cd");
    }

    #[test]
    fn multibyte_offsets_map_to_bytes() {
        let input = single(
            "für Öl",
            vec![token(0, 3), token(4, 6)],
            vec![SentenceInput { start: 0, end: 6 }],
        );
        let doc = compile(&input).unwrap();
        let oil = doc.tokens()[1];
        assert_eq!(&doc.text()[oil.idx..oil.end()], "Öl");
    }

    #[test]
    fn explicit_norm_drives_interning() {
        let vocab = Vocabulary::new();
        let mut input = DocumentInput::from_sentences("t", &["Stars shine"]);
        input.partitions[0].tokens[0].norm = Some("star".into());
        let doc = Document::from_input(0, &input, &vocab, &TokenNormalizer::default()).unwrap();
        assert_eq!(vocab.id("star"), Some(doc.tokens()[0].id));
        assert_eq!(vocab.id("stars"), None);
        assert_eq!(vocab.token(doc.tokens()[1].id).as_deref(), Some("shine"));
    }

    #[test]
    fn locations_follow_partitions() {
        let mut input = DocumentInput::from_sentences("t", &["a b"]);
        input.loc_keys = vec!["page".into()];
        input.partitions[0].loc = vec![serde_json::json!(7)];
        let mut second = PartitionInput::from_sentences(&["c"]);
        second.loc = vec![serde_json::json!(8)];
        input.partitions.push(second);
        let doc = compile(&input).unwrap();
        assert_eq!(doc.location(1)["page"], serde_json::json!(7));
        assert_eq!(doc.location(2)["page"], serde_json::json!(8));
        assert!(doc.location(99).is_empty());
    }

    #[test]
    fn structure_lists_spans() {
        let doc = compile(&DocumentInput::from_sentences("Title", &["a b", "c"])).unwrap();
        let structure = doc.structure(Partition::sentence()).unwrap();
        assert_eq!(structure.spans.len(), 2);
        assert_eq!(structure.spans[0].text, "a b");
        assert_eq!(structure.partition, "sentence:1/1");
    }
}
