// SPDX-License-Identifier: MIT OR Apache-2.0

//! Utility functions for spanseek

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extension of document files picked up from corpus directories
pub const DOCUMENT_EXTENSION: &str = "json";

/// Document files under `root`, sorted so document ids are stable across runs.
///
/// A file path is returned as is; directories are walked recursively for
/// `*.json`, skipping hidden entries.
pub fn find_corpus_files(root: impl AsRef<Path>) -> Vec<PathBuf> {
    let root = root.as_ref();
    if root.is_file() {
        return vec![root.to_path_buf()];
    }
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()))
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(DOCUMENT_EXTENSION))
        })
        .collect();
    files.sort();
    files
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|s| s.starts_with('.'))
}

/// Split `NAME=VALUE`; a bare value gets `default_name`
pub fn split_assignment<'a>(arg: &'a str, default_name: &'a str) -> (&'a str, &'a str) {
    match arg.split_once('=') {
        Some((name, value)) if !name.is_empty() => (name, value),
        _ => (default_name, arg),
    }
}
