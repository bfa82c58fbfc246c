// SPDX-License-Identifier: MIT OR Apache-2.0

//! Token-to-vector resolvers backing static embedding spaces.
//!
//! A resolver maps a normalized token string to a fixed-width vector, or
//! reports it as absent so the space can fall back to its OOV policy.

use crate::errors::{Result, SearchError};
use serde_json::Value;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Command, Stdio};

const DEFAULT_COMMAND_BATCH_SIZE: usize = 64;

/// Source of static token vectors.
pub trait TokenResolver: Send + Sync {
    /// Identifier used in logs
    fn name(&self) -> &str;

    /// Width of every vector this resolver returns
    fn dimension(&self) -> usize;

    /// Resolve a batch of tokens, one slot per input
    fn resolve_batch(&self, tokens: &[&str]) -> Result<Vec<Option<Vec<f32>>>>;

    fn resolve(&self, token: &str) -> Result<Option<Vec<f32>>> {
        let mut result = self.resolve_batch(&[token])?;
        Ok(result.pop().flatten())
    }
}

/// In-memory table, typically loaded from a word-vector text file
#[derive(Debug, Clone)]
pub struct MapResolver {
    name: String,
    dimension: usize,
    vectors: HashMap<String, Vec<f32>>,
}

impl MapResolver {
    /// Build from explicit entries; every vector must be `dimension` wide
    pub fn new(
        name: impl Into<String>,
        dimension: usize,
        entries: impl IntoIterator<Item = (String, Vec<f32>)>,
    ) -> Result<Self> {
        let name = name.into();
        let mut vectors = HashMap::new();
        for (token, vector) in entries {
            if vector.len() != dimension {
                return Err(SearchError::dimension(
                    format!("vector for '{}' in {}", token, name),
                    dimension,
                    vector.len(),
                ));
            }
            vectors.insert(token, vector);
        }
        Ok(Self {
            name,
            dimension,
            vectors,
        })
    }

    /// Load `token v1 v2 ... vd` lines (word2vec/GloVe text format).
    ///
    /// A leading `count dim` header line is skipped. The width of the first
    /// vector fixes the dimension; later rows of another width are dropped.
    pub fn from_text_file(name: impl Into<String>, path: &Path) -> Result<Self> {
        let name = name.into();
        let reader = BufReader::new(File::open(path)?);
        let mut dimension = 0usize;
        let mut vectors = HashMap::new();
        let mut skipped = 0usize;

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let mut fields = line.split_whitespace();
            let Some(token) = fields.next() else {
                continue;
            };
            let values: Vec<&str> = fields.collect();
            if line_no == 0
                && values.len() == 1
                && token.parse::<usize>().is_ok()
                && values[0].parse::<usize>().is_ok()
            {
                continue;
            }
            let parsed: std::result::Result<Vec<f32>, _> =
                values.iter().map(|v| v.parse::<f32>()).collect();
            let Ok(vector) = parsed else {
                skipped += 1;
                continue;
            };
            if dimension == 0 {
                dimension = vector.len();
            }
            if vector.is_empty() || vector.len() != dimension {
                skipped += 1;
                continue;
            }
            vectors.insert(token.to_string(), vector);
        }

        if skipped > 0 {
            tracing::warn!(
                "{}: skipped {} malformed vector rows in {}",
                name,
                skipped,
                path.display()
            );
        }
        tracing::info!(
            "{}: loaded {} vectors of dimension {}",
            name,
            vectors.len(),
            dimension
        );

        Ok(Self {
            name,
            dimension,
            vectors,
        })
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

impl TokenResolver for MapResolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn resolve_batch(&self, tokens: &[&str]) -> Result<Vec<Option<Vec<f32>>>> {
        Ok(tokens
            .iter()
            .map(|token| self.vectors.get(*token).cloned())
            .collect())
    }
}

/// Resolver that shells out to an external process.
///
/// The command reads `{"model": ..., "texts": [...]}` on stdin and prints
/// either a JSON array of rows or an object holding one under `embeddings`,
/// `vectors` or `data`. A `null` row marks the token as absent.
pub struct CommandResolver {
    command: String,
    model: String,
    dimension: usize,
    batch_size: usize,
}

impl CommandResolver {
    pub fn new(command: String, model: String, dimension: usize) -> Self {
        Self {
            command,
            model,
            dimension,
            batch_size: DEFAULT_COMMAND_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    fn run_command(&self, texts: &[&str]) -> Result<Vec<Option<Vec<f32>>>> {
        let payload = serde_json::json!({
            "model": self.model,
            "texts": texts,
        });

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                SearchError::resolver(format!(
                    "failed to spawn embedding command '{}': {}",
                    self.command, e
                ))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(payload.to_string().as_bytes())?;
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SearchError::resolver(format!(
                "embedding command failed (status {}): {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let parsed: Value = serde_json::from_str(stdout.trim())?;
        let rows = match parsed {
            Value::Array(arr) => arr,
            Value::Object(mut obj) => match ["embeddings", "vectors", "data"]
                .iter()
                .find_map(|key| obj.remove(*key))
            {
                Some(Value::Array(arr)) => arr,
                _ => {
                    return Err(SearchError::resolver(
                        "embedding command output missing 'embeddings' array",
                    ))
                }
            },
            _ => {
                return Err(SearchError::resolver(
                    "embedding command output must be a JSON array or object",
                ))
            }
        };

        if rows.len() != texts.len() {
            return Err(SearchError::dimension(
                format!("rows returned by '{}'", self.command),
                texts.len(),
                rows.len(),
            ));
        }

        rows.into_iter()
            .map(|row| match row {
                Value::Null => Ok(None),
                Value::Array(values) => values
                    .iter()
                    .map(|value| {
                        value.as_f64().map(|v| v as f32).ok_or_else(|| {
                            SearchError::resolver("embedding value must be a number")
                        })
                    })
                    .collect::<Result<Vec<f32>>>()
                    .map(Some),
                _ => Err(SearchError::resolver(
                    "embedding row must be an array or null",
                )),
            })
            .collect()
    }
}

impl TokenResolver for CommandResolver {
    fn name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn resolve_batch(&self, tokens: &[&str]) -> Result<Vec<Option<Vec<f32>>>> {
        let mut out = Vec::with_capacity(tokens.len());
        for chunk in tokens.chunks(self.batch_size) {
            out.extend(self.run_command(chunk)?);
        }
        Ok(out)
    }
}

/// Resolver that knows no tokens.
///
/// Paired with the zero OOV policy it yields an exact-match space: only
/// identical vocabulary ids score above zero.
pub struct NullResolver {
    dimension: usize,
}

impl NullResolver {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl TokenResolver for NullResolver {
    fn name(&self) -> &str {
        "null"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn resolve_batch(&self, tokens: &[&str]) -> Result<Vec<Option<Vec<f32>>>> {
        Ok(vec![None; tokens.len()])
    }
}
