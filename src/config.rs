// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration file support for spanseek
//!
//! Loads configuration from .spanseekrc.toml in current directory or ~/.config/spanseek/config.toml

use crate::alignment::AlignmentAlgorithm;
use crate::document::{Level, Partition};
use crate::embedding::{CommandResolver, EmbeddingStore, MapResolver, OovPolicy, TokenResolver};
use crate::errors::{Result, SearchError};
use crate::normalize::TokenNormalizer;
use crate::search::SearchOptions;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Output format for results (mirrored from cli for library use)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOutputFormat {
    #[default]
    Text,
    Json,
}

/// Search limits
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub max_matches: Option<usize>,
    pub min_score: Option<f32>,
    /// Worker threads (defaults to the rayon global pool)
    pub threads: Option<usize>,
}

impl SearchConfig {
    /// Get max matches (defaults to 100)
    pub fn max_matches(&self) -> usize {
        self.max_matches
            .unwrap_or_else(|| SearchOptions::default().max_matches)
    }

    /// Get minimum score (defaults to 0.2)
    pub fn min_score(&self) -> f32 {
        self.min_score
            .unwrap_or_else(|| SearchOptions::default().min_score)
    }

    pub fn options(&self) -> SearchOptions {
        SearchOptions {
            max_matches: self.max_matches(),
            min_score: self.min_score(),
            threads: self.threads,
        }
    }
}

/// Span partition
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    pub level: Option<Level>,
    pub window_size: Option<usize>,
    pub window_step: Option<usize>,
}

impl PartitionConfig {
    /// Get the partition (defaults to one span per sentence)
    pub fn partition(&self) -> Partition {
        Partition::new(
            self.level.unwrap_or_default(),
            self.window_size.unwrap_or(1),
            self.window_step.unwrap_or(1),
        )
    }
}

/// Token normalization applied before interning
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TokensConfig {
    pub lowercase: Option<bool>,
    /// Regex whose matches are erased from every token
    pub strip: Option<String>,
}

impl TokensConfig {
    /// Get lowercase (defaults to true)
    pub fn lowercase(&self) -> bool {
        self.lowercase.unwrap_or(true)
    }

    pub fn normalizer(&self) -> Result<TokenNormalizer> {
        TokenNormalizer::new(self.lowercase(), self.strip.as_deref())
    }
}

/// One static embedding space, loaded from a vector file or an external command
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub name: String,
    /// Word-vector text file (word2vec / GloVe / fastText)
    pub path: Option<PathBuf>,
    /// Shell command speaking the JSON embedding protocol
    pub command: Option<String>,
    /// Model identifier passed to the command
    pub model: Option<String>,
    /// Vector width; required with `command`
    pub dim: Option<usize>,
    pub oov: Option<OovPolicy>,
}

impl EmbeddingConfig {
    /// Get OOV policy (defaults to Zero)
    pub fn oov(&self) -> OovPolicy {
        self.oov.unwrap_or_default()
    }

    /// Get model identifier (defaults to the space name)
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(&self.name)
    }

    /// Build the resolver this entry describes
    pub fn resolver(&self, base: &Path) -> Result<Box<dyn TokenResolver>> {
        match (&self.path, &self.command) {
            (Some(path), None) => {
                let path = if path.is_absolute() {
                    path.clone()
                } else {
                    base.join(path)
                };
                let resolver = MapResolver::from_text_file(self.name.clone(), &path)?;
                if let Some(dim) = self.dim {
                    if dim != resolver.dimension() {
                        return Err(SearchError::dimension(
                            format!("embedding {} in {}", self.name, path.display()),
                            dim,
                            resolver.dimension(),
                        ));
                    }
                }
                Ok(Box::new(resolver))
            }
            (None, Some(command)) => {
                let dim = self.dim.ok_or_else(|| {
                    SearchError::resolver(format!("embedding {} needs `dim` with `command`", self.name))
                })?;
                Ok(Box::new(CommandResolver::new(
                    command.clone(),
                    self.model().to_string(),
                    dim,
                )))
            }
            _ => Err(SearchError::resolver(format!(
                "embedding {} needs exactly one of `path` or `command`",
                self.name
            ))),
        }
    }
}

/// Configuration loaded from .spanseekrc.toml or ~/.config/spanseek/config.toml
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default output format (text or json)
    pub default_format: Option<ConfigOutputFormat>,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub partition: PartitionConfig,

    /// Alignment algorithm and its parameters
    pub alignment: Option<AlignmentAlgorithm>,

    #[serde(default)]
    pub tokens: TokensConfig,

    #[serde(default, rename = "embedding")]
    pub embeddings: Vec<EmbeddingConfig>,

    /// Directory the config was read from; relative embedding paths resolve against it
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Config {
    /// Load configuration from files
    ///
    /// Precedence (highest to lowest):
    /// 1. .spanseekrc.toml in current directory
    /// 2. ~/.config/spanseek/config.toml
    pub fn load() -> Self {
        if let Some(config) = Self::load_from_path(Path::new(".spanseekrc.toml")) {
            return config;
        }

        if let Some(home) = dirs::home_dir() {
            let config_path = home.join(".config").join("spanseek").join("config.toml");
            if let Some(config) = Self::load_from_path(&config_path) {
                return config;
            }
        }

        Self::default()
    }

    pub fn load_from_path(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match Self::parse(&content) {
            Ok(mut config) => {
                config.base_dir = path
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_default();
                Some(config)
            }
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Get the alignment algorithm (defaults to Waterman-Smith-Beyer)
    pub fn alignment(&self) -> AlignmentAlgorithm {
        self.alignment.clone().unwrap_or_default()
    }

    /// Merge CLI options with config (CLI wins)
    pub fn merge_max_matches(&self, cli_value: Option<usize>) -> usize {
        cli_value.unwrap_or_else(|| self.search.max_matches())
    }

    pub fn merge_min_score(&self, cli_value: Option<f32>) -> f32 {
        cli_value.unwrap_or_else(|| self.search.min_score())
    }

    /// Exact-match store plus every configured space
    pub fn embedding_store(&self) -> Result<EmbeddingStore> {
        let mut store = EmbeddingStore::exact_match();
        for entry in &self.embeddings {
            let resolver = entry.resolver(&self.base_dir)?;
            store.add_static(entry.name.clone(), resolver, entry.oov());
        }
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::GapCost;

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.search.max_matches(), SearchOptions::default().max_matches);
        assert_eq!(config.partition.partition(), Partition::sentence());
        assert_eq!(config.alignment(), AlignmentAlgorithm::default());
        assert!(config.tokens.lowercase());
        assert!(config.embeddings.is_empty());
    }

    #[test]
    fn sections_parse() {
        let config = Config::parse(
            r#"
default_format = "json"

[search]
max_matches = 5
min_score = 0.5
threads = 2

[partition]
level = "token"
window_size = 6
window_step = 3

[alignment]
algorithm = "waterman-smith-beyer"
zero = 0.25
gap = { type = "linear", step = 0.1 }

[tokens]
lowercase = false
strip = "[.,]"

[[embedding]]
name = "glove"
path = "vectors/glove.txt"
oov = "hashed"
"#,
        )
        .unwrap();
        assert_eq!(config.default_format, Some(ConfigOutputFormat::Json));
        let options = config.search.options();
        assert_eq!(options.max_matches, 5);
        assert_eq!(options.threads, Some(2));
        assert_eq!(config.merge_max_matches(Some(9)), 9);
        assert_eq!(config.merge_min_score(None), 0.5);
        assert_eq!(config.partition.partition(), Partition::tokens(6, 3));
        assert_eq!(
            config.alignment(),
            AlignmentAlgorithm::waterman_smith_beyer(GapCost::Linear { step: 0.1, start: None }, 0.25)
        );
        assert!(!config.tokens.lowercase());
        assert_eq!(config.tokens.normalizer().unwrap().normalize("Hi."), "Hi");
        assert_eq!(config.embeddings[0].oov(), OovPolicy::Hashed);
        assert_eq!(config.embeddings[0].model(), "glove");
    }

    #[test]
    fn embedding_paths_resolve_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("toy.txt"), "cat 1 0\ndog 0 1\n").unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[[embedding]]\nname = \"toy\"\npath = \"toy.txt\"\ndim = 2\n").unwrap();
        let config = Config::load_from_path(&path).unwrap();
        let store = config.embedding_store().unwrap();
        assert_eq!(store.static_space("toy").unwrap().dimension(), 2);
        assert!(store.static_space("exact").is_ok());
    }

    #[test]
    fn embedding_entries_need_one_source() {
        let config = Config::parse("[[embedding]]\nname = \"x\"\n").unwrap();
        assert!(matches!(config.embedding_store(), Err(SearchError::Resolver(_))));
        let command = Config::parse("[[embedding]]\nname = \"x\"\ncommand = \"true\"\n").unwrap();
        assert!(command.embedding_store().is_err());
    }
}
