// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{Document, DocumentId, DocumentInput, Partition, SpanTable, Token};
use crate::errors::{Result, SearchError};
use crate::normalize::TokenNormalizer;
use crate::vocabulary::Vocabulary;
use std::sync::Arc;

/// Documents in insertion order; a document's id is its position
#[derive(Debug, Default)]
pub struct DocumentIndex {
    documents: Vec<Arc<Document>>,
}

impl DocumentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile and append a document. A malformed document is rejected whole.
    pub fn add_document(
        &mut self,
        input: &DocumentInput,
        vocab: &Vocabulary,
        normalizer: &TokenNormalizer,
    ) -> Result<DocumentId> {
        let id = self.documents.len();
        let document = Document::from_input(id, input, vocab, normalizer)?;
        self.documents.push(Arc::new(document));
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn get(&self, id: DocumentId) -> Result<&Arc<Document>> {
        self.documents.get(id).ok_or(SearchError::UnknownDocument(id))
    }

    pub fn documents(&self) -> &[Arc<Document>] {
        &self.documents
    }

    pub fn span_table(&self, id: DocumentId, partition: Partition) -> Result<Arc<SpanTable>> {
        self.get(id)?.span_table(partition)
    }

    pub fn span_text(&self, id: DocumentId, partition: Partition, span: usize) -> Result<&str> {
        let document = self.get(id)?;
        let span = document.span(partition, span)?;
        Ok(document.span_text(span))
    }

    pub fn span_tokens(&self, id: DocumentId, partition: Partition, span: usize) -> Result<&[Token]> {
        let document = self.get(id)?;
        let span = document.span(partition, span)?;
        Ok(document.span_tokens(span))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with(docs: &[&[&str]]) -> (DocumentIndex, Vocabulary) {
        let vocab = Vocabulary::new();
        let normalizer = TokenNormalizer::default();
        let mut index = DocumentIndex::new();
        for (i, sentences) in docs.iter().enumerate() {
            let input = DocumentInput::from_sentences(&format!("doc {}", i), sentences);
            index.add_document(&input, &vocab, &normalizer).unwrap();
        }
        (index, vocab)
    }

    #[test]
    fn ids_follow_insertion_order() {
        let (index, _) = index_with(&[&["a"], &["b c"]]);
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(1).unwrap().meta().title, "doc 1");
        assert!(matches!(index.get(2), Err(SearchError::UnknownDocument(2))));
    }

    #[test]
    fn span_lookups() {
        let (index, vocab) = index_with(&[&["the great star", "shines"]]);
        let sentence = Partition::sentence();
        assert_eq!(index.span_text(0, sentence, 0).unwrap(), "the great star ");
        let tokens = index.span_tokens(0, sentence, 1).unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(vocab.token(tokens[0].id).as_deref(), Some("shines"));
        assert!(matches!(
            index.span_text(0, sentence, 5),
            Err(SearchError::SpanOutOfRange { span: 5, count: 2 })
        ));
    }

    #[test]
    fn span_table_is_idempotent() {
        let (index, _) = index_with(&[&["one two three"]]);
        let first = index.span_table(0, Partition::sentence()).unwrap();
        let second = index.span_table(0, Partition::sentence()).unwrap();
        assert_eq!(*first, *second);
        assert_eq!(index.get(0).unwrap().span_builds(), 1);
    }

    #[test]
    fn malformed_document_is_not_added() {
        let vocab = Vocabulary::new();
        let mut index = DocumentIndex::new();
        let mut input = DocumentInput::from_sentences("bad", &["a b"]);
        input.partitions[0].tokens[1].end = 99;
        assert!(index
            .add_document(&input, &vocab, &TokenNormalizer::default())
            .is_err());
        assert!(index.is_empty());
    }
}
