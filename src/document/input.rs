// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pre-tokenized document and query records produced by an NLP pipeline.
//!
//! Offsets are character offsets into the owning partition's `text`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentInput {
    #[serde(default)]
    pub unique_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    /// Names for the positional values in each partition's `loc`
    #[serde(default)]
    pub loc_keys: Vec<String>,
    #[serde(default)]
    pub partitions: Vec<PartitionInput>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartitionInput {
    pub text: String,
    #[serde(default)]
    pub tokens: Vec<TokenInput>,
    #[serde(default)]
    pub sents: Vec<SentenceInput>,
    #[serde(default)]
    pub loc: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenInput {
    pub start: usize,
    pub end: usize,
    #[serde(default)]
    pub pos: String,
    #[serde(default)]
    pub tag: String,
    /// Lemma or other normalized form; replaces the surface text for interning
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub norm: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentenceInput {
    pub start: usize,
    pub end: usize,
}

/// A query span: one text with its tokens
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryInput {
    pub text: String,
    #[serde(default)]
    pub tokens: Vec<TokenInput>,
}

/// Whitespace-delimited tokens of `text` with empty tags
fn split_words(text: &str) -> Vec<TokenInput> {
    let mut tokens = Vec::new();
    let mut start = None;
    let mut count = 0;
    for (pos, ch) in text.chars().enumerate() {
        count = pos + 1;
        match (ch.is_whitespace(), start) {
            (true, Some(s)) => {
                tokens.push(TokenInput {
                    start: s,
                    end: pos,
                    ..TokenInput::default()
                });
                start = None;
            }
            (false, None) => start = Some(pos),
            _ => {}
        }
    }
    if let Some(s) = start {
        tokens.push(TokenInput {
            start: s,
            end: count,
            ..TokenInput::default()
        });
    }
    tokens
}

impl QueryInput {
    pub fn from_words(text: &str) -> Self {
        Self {
            text: text.to_string(),
            tokens: split_words(text),
        }
    }
}

impl PartitionInput {
    /// One partition whose sentences are the given strings, tokenized on whitespace
    pub fn from_sentences(sentences: &[&str]) -> Self {
        let mut text = String::new();
        let mut tokens = Vec::new();
        let mut sents = Vec::new();
        let mut offset = 0;
        for sentence in sentences {
            if !text.is_empty() {
                text.push(' ');
                offset += 1;
            }
            text.push_str(sentence);
            let len = sentence.chars().count();
            tokens.extend(split_words(sentence).into_iter().map(|t| TokenInput {
                start: t.start + offset,
                end: t.end + offset,
                ..t
            }));
            sents.push(SentenceInput {
                start: offset,
                end: offset + len,
            });
            offset += len;
        }
        Self {
            text,
            tokens,
            sents,
            loc: Vec::new(),
        }
    }
}

impl DocumentInput {
    pub fn from_sentences(title: &str, sentences: &[&str]) -> Self {
        Self {
            title: title.to_string(),
            partitions: vec![PartitionInput::from_sentences(sentences)],
            ..Self::default()
        }
    }

    /// Identifier used in log and error messages
    pub fn label(&self) -> String {
        match (&self.unique_id, self.title.is_empty()) {
            (Some(id), _) => id.clone(),
            (None, false) => self.title.clone(),
            (None, true) => "<untitled>".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_use_character_offsets() {
        let query = QueryInput::from_words("  große  star ");
        let spans: Vec<_> = query.tokens.iter().map(|t| (t.start, t.end)).collect();
        assert_eq!(spans, vec![(2, 7), (9, 13)]);
    }

    #[test]
    fn sentences_are_joined_with_spaces() {
        let partition = PartitionInput::from_sentences(&["the great star", "it shines"]);
        assert_eq!(partition.text, "the great star it shines");
        assert_eq!(
            partition.sents,
            vec![
                SentenceInput { start: 0, end: 14 },
                SentenceInput { start: 15, end: 24 }
            ]
        );
        assert_eq!(partition.tokens[3].start, 15);
        assert_eq!(partition.tokens.len(), 5);
    }

    #[test]
    fn parses_pipeline_json() {
        let json = r#"{
            "unique_id": "doc-1",
            "title": "Hamlet",
            "author": "Shakespeare",
            "loc_keys": ["act", "scene"],
            "partitions": [{
                "text": "To be.",
                "tokens": [
                    {"start": 0, "end": 2, "pos": "PART", "tag": "TO"},
                    {"start": 3, "end": 5, "pos": "AUX", "tag": "VB", "norm": "be"}
                ],
                "sents": [{"start": 0, "end": 6}],
                "loc": [3, 1]
            }]
        }"#;
        let doc: DocumentInput = serde_json::from_str(json).unwrap();
        assert_eq!(doc.label(), "doc-1");
        assert_eq!(doc.partitions[0].tokens[1].norm.as_deref(), Some("be"));
        assert_eq!(doc.partitions[0].loc.len(), 2);
    }
}
