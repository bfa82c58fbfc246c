// SPDX-License-Identifier: MIT OR Apache-2.0

//! Token string interning
//!
//! IDs are dense, 0-based and assigned in first-seen order. They are never
//! reused for the lifetime of a [`Vocabulary`].

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Dense vocabulary id of a normalized token string
pub type TokenId = u32;

/// Interned id of a POS or fine-grained tag
pub type TagId = u32;

#[derive(Debug, Default)]
struct Interner {
    ids: HashMap<Arc<str>, u32>,
    strings: Vec<Arc<str>>,
}

impl Interner {
    fn get(&self, value: &str) -> Option<u32> {
        self.ids.get(value).copied()
    }

    fn insert(&mut self, value: &str) -> u32 {
        if let Some(id) = self.ids.get(value) {
            return *id;
        }
        let id = self.strings.len() as u32;
        let shared: Arc<str> = Arc::from(value);
        self.strings.push(Arc::clone(&shared));
        self.ids.insert(shared, id);
        id
    }
}

/// Session-wide token and tag interner.
///
/// Shared by reference between documents, queries and embedding spaces.
/// Reads take a shared lock; growth happens while documents and queries
/// are built, never during a search scan.
#[derive(Debug, Default)]
pub struct Vocabulary {
    tokens: RwLock<Interner>,
    tags: RwLock<Interner>,
}

impl Vocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the id for `token`, creating one on first sight
    pub fn intern(&self, token: &str) -> TokenId {
        if let Some(id) = self.tokens.read().get(token) {
            return id;
        }
        self.tokens.write().insert(token)
    }

    /// Look up an id without creating one
    pub fn id(&self, token: &str) -> Option<TokenId> {
        self.tokens.read().get(token)
    }

    /// String for an id
    pub fn token(&self, id: TokenId) -> Option<Arc<str>> {
        self.tokens.read().strings.get(id as usize).cloned()
    }

    pub fn len(&self) -> usize {
        self.tokens.read().strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all interned strings in id order
    pub fn tokens(&self) -> Vec<Arc<str>> {
        self.tokens.read().strings.clone()
    }

    pub fn intern_tag(&self, tag: &str) -> TagId {
        if let Some(id) = self.tags.read().get(tag) {
            return id;
        }
        self.tags.write().insert(tag)
    }

    pub fn tag_id(&self, tag: &str) -> Option<TagId> {
        self.tags.read().get(tag)
    }

    pub fn tag(&self, id: TagId) -> Arc<str> {
        self.tags
            .read()
            .strings
            .get(id as usize)
            .cloned()
            .unwrap_or_else(|| Arc::from(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn ids_are_dense_and_stable() {
        let vocab = Vocabulary::new();
        assert_eq!(vocab.intern("star"), 0);
        assert_eq!(vocab.intern("great"), 1);
        assert_eq!(vocab.intern("star"), 0);
        assert_eq!(vocab.len(), 2);
        assert_eq!(vocab.id("great"), Some(1));
        assert_eq!(vocab.id("shines"), None);
        assert_eq!(vocab.token(1).as_deref(), Some("great"));
        assert!(vocab.token(7).is_none());
    }

    #[test]
    fn concurrent_interning_yields_one_id_per_string() {
        let vocab = Arc::new(Vocabulary::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let vocab = Arc::clone(&vocab);
                thread::spawn(move || {
                    (0..100)
                        .map(|i| vocab.intern(&format!("w{i}")))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let results: Vec<Vec<TokenId>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(vocab.len(), 100);
        for ids in &results[1..] {
            assert_eq!(ids, &results[0]);
        }
    }

    #[test]
    fn tags_have_their_own_id_space() {
        let vocab = Vocabulary::new();
        vocab.intern("noun");
        assert_eq!(vocab.intern_tag("NOUN"), 0);
        assert_eq!(vocab.intern_tag("ADJ"), 1);
        assert_eq!(&*vocab.tag(1), "ADJ");
        assert_eq!(&*vocab.tag(9), "");
    }

    #[test]
    fn tag_ids_do_not_wrap() {
        let vocab = Vocabulary::new();
        let last = (0..70_000).map(|i| vocab.intern_tag(&format!("T{i}"))).last();
        assert_eq!(last, Some(69_999));
        assert_eq!(vocab.tag_id("T65536"), Some(65_536));
        assert_eq!(&*vocab.tag(65_536), "T65536");
        assert_eq!(vocab.intern_tag("T0"), 0);
    }
}
