// SPDX-License-Identifier: MIT OR Apache-2.0

//! Token normalization applied before vocabulary interning

use crate::errors::Result;
use regex::Regex;

/// Maps a surface token to the string that gets interned
#[derive(Debug, Clone)]
pub struct TokenNormalizer {
    lowercase: bool,
    strip: Option<Regex>,
}

impl Default for TokenNormalizer {
    fn default() -> Self {
        Self {
            lowercase: true,
            strip: None,
        }
    }
}

impl TokenNormalizer {
    /// Build a normalizer; `strip` is a regex whose matches are erased
    pub fn new(lowercase: bool, strip: Option<&str>) -> Result<Self> {
        let strip = match strip {
            Some(pattern) if !pattern.is_empty() => Some(Regex::new(pattern)?),
            _ => None,
        };
        Ok(Self { lowercase, strip })
    }

    /// Keep case as supplied
    pub fn verbatim() -> Self {
        Self {
            lowercase: false,
            strip: None,
        }
    }

    pub fn normalize(&self, raw: &str) -> String {
        let stripped = match &self.strip {
            Some(re) => re.replace_all(raw, "").into_owned(),
            None => raw.to_string(),
        };
        if self.lowercase {
            stripped.to_lowercase()
        } else {
            stripped
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_lowercases() {
        assert_eq!(TokenNormalizer::default().normalize("Star"), "star");
        assert_eq!(TokenNormalizer::verbatim().normalize("Star"), "Star");
    }

    #[test]
    fn strip_pattern_erases_matches() {
        let normalizer = TokenNormalizer::new(true, Some(r"[^\p{L}\p{N}]")).unwrap();
        assert_eq!(normalizer.normalize("Star's!"), "stars");
    }

    #[test]
    fn bad_pattern_is_reported() {
        assert!(TokenNormalizer::new(true, Some("[")).is_err());
    }
}
