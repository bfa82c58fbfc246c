// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query token filtering
//!
//! Drops query tokens whose part-of-speech or fine-grained tag is listed,
//! e.g. `PUNCT` or `DET`, before the query is compiled.

use crate::document::TokenInput;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Sets of POS and tag values to remove
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenFilter {
    pub pos: BTreeSet<String>,
    pub tag: BTreeSet<String>,
}

impl TokenFilter {
    pub fn new<P, T>(pos: P, tag: T) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        Self {
            pos: pos.into_iter().map(Into::into).collect(),
            tag: tag.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pos.is_empty() && self.tag.is_empty()
    }

    /// Check if a token passes the filter
    pub fn keeps(&self, token: &TokenInput) -> bool {
        !self.pos.contains(&token.pos) && !self.tag.contains(&token.tag)
    }

    /// Tokens that pass, in their original order
    pub fn apply(&self, tokens: &[TokenInput]) -> Vec<TokenInput> {
        tokens.iter().filter(|t| self.keeps(t)).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(pos: &str, tag: &str) -> TokenInput {
        TokenInput {
            pos: pos.into(),
            tag: tag.into(),
            ..TokenInput::default()
        }
    }

    #[test]
    fn test_empty_filter_keeps_everything() {
        let filter = TokenFilter::default();
        assert!(filter.is_empty());
        assert!(filter.keeps(&token("PUNCT", ".")));
    }

    #[test]
    fn test_pos_and_tag_filters() {
        let filter = TokenFilter::new(["PUNCT", "DET"], ["VBZ"]);
        let tokens = vec![token("DET", "DT"), token("NOUN", "NN"), token("VERB", "VBZ"), token("PUNCT", ".")];
        let kept = filter.apply(&tokens);
        assert_eq!(kept, vec![token("NOUN", "NN")]);
    }
}
