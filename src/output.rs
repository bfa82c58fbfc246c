// SPDX-License-Identifier: MIT OR Apache-2.0

//! Output and color utilities for consistent terminal formatting
//!
//! Provides shared color functions respecting NO_COLOR environment variable.

use crate::document::DocumentStructure;
use crate::search::{MatchRecord, RegionRecord};
use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;

/// Check if colors should be used (respects NO_COLOR env var)
pub fn use_colors() -> bool {
    std::env::var("NO_COLOR").is_err()
}

/// Colorize document title (cyan)
pub fn colorize_title(text: &str, use_color: bool) -> String {
    if use_color {
        text.cyan().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize score (yellow)
pub fn colorize_score(score: f32, use_color: bool) -> String {
    let text = format!("{:.3}", score);
    if use_color {
        text.yellow().to_string()
    } else {
        text
    }
}

/// Colorize aligned token (red bold)
pub fn colorize_match(text: &str, use_color: bool) -> String {
    if use_color {
        text.red().bold().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize gap and omitted text (dimmed)
pub fn colorize_context(text: &str, use_color: bool) -> String {
    if use_color {
        text.dimmed().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize metric name (green)
pub fn colorize_kind(text: &str, use_color: bool) -> String {
    if use_color {
        text.green().to_string()
    } else {
        text.to_string()
    }
}

/// Serialize for `--format json`; `compact` drops pretty printing
pub fn to_json<T: Serialize + ?Sized>(value: &T, compact: bool) -> serde_json::Result<String> {
    if compact {
        serde_json::to_string(value)
    } else {
        serde_json::to_string_pretty(value)
    }
}

fn header(record: &MatchRecord, use_color: bool) -> String {
    let mut line = colorize_title(
        if record.title.is_empty() {
            "<untitled>"
        } else {
            &record.title
        },
        use_color,
    );
    if !record.author.is_empty() {
        let _ = write!(line, " ({})", record.author);
    }
    let _ = write!(
        line,
        "  doc {} span {}  score {}  [{}]",
        record.document,
        record.span,
        colorize_score(record.score, use_color),
        colorize_kind(&record.metric, use_color)
    );
    if !record.location.is_empty() {
        let loc: Vec<String> = record
            .location
            .iter()
            .map(|(k, v)| match v {
                serde_json::Value::String(s) => format!("{}={}", k, s),
                other => format!("{}={}", k, other),
            })
            .collect();
        let _ = write!(line, "  {}", loc.join(" "));
    }
    line
}

/// Span text with aligned tokens highlighted and everything else dimmed
pub fn highlight(record: &MatchRecord, use_color: bool) -> String {
    let mut out = colorize_context(&record.omitted_before, use_color);
    for region in &record.regions {
        match region {
            RegionRecord::Match { text, .. } => {
                // keep trailing whitespace out of the highlight
                let trimmed = text.trim_end();
                out.push_str(&colorize_match(trimmed, use_color));
                out.push_str(&text[trimmed.len()..]);
            }
            RegionRecord::Gap { text, .. } => out.push_str(&colorize_context(text, use_color)),
        }
    }
    out.push_str(&colorize_context(&record.omitted_after, use_color));
    out.trim_end().to_string()
}

/// Per-token alignment table lines
fn alignment_lines(record: &MatchRecord, use_color: bool) -> Vec<String> {
    record
        .regions
        .iter()
        .map(|region| match region {
            RegionRecord::Match {
                text,
                query_text,
                similarity,
                weight,
                pos_query,
                pos_document,
                metric,
            } => {
                let mut line = format!(
                    "    {} ~ {}  sim {:.3}",
                    query_text,
                    colorize_match(text.trim_end(), use_color),
                    similarity
                );
                if *weight != 1.0 {
                    let _ = write!(line, "  weight {:.2}", weight);
                }
                if !pos_query.is_empty() || !pos_document.is_empty() {
                    let _ = write!(line, "  {}/{}", pos_query, pos_document);
                }
                let _ = write!(line, "  [{}]", colorize_kind(metric, use_color));
                line
            }
            RegionRecord::Gap { text, penalty } => format!(
                "    {}  gap {:.3}",
                colorize_context(text.trim_end(), use_color),
                penalty
            ),
        })
        .collect()
}

/// Human-readable match listing.
///
/// `compact` prints one line per match without the alignment table.
pub fn render_matches(records: &[MatchRecord], query: &str, compact: bool, use_color: bool) -> String {
    let mut out = String::new();
    if records.is_empty() {
        if use_color {
            let _ = writeln!(out, "{} No matches found for: {}", "✗".red(), query.yellow());
        } else {
            let _ = writeln!(out, "No matches found for: {}", query);
        }
        return out;
    }

    if !compact {
        if use_color {
            let _ = writeln!(
                out,
                "\n{} Found {} matches for: {}\n",
                "✓".green(),
                records.len().to_string().cyan(),
                query.yellow()
            );
        } else {
            let _ = writeln!(out, "\nFound {} matches for: {}\n", records.len(), query);
        }
    }

    for record in records {
        if compact {
            let _ = writeln!(
                out,
                "{}\t{}\t{}\t{}",
                colorize_score(record.score, use_color),
                record.document,
                record.span,
                highlight(record, use_color).replace('\n', " ")
            );
            continue;
        }
        let _ = writeln!(out, "{}", header(record, use_color));
        let _ = writeln!(out, "  {}", highlight(record, use_color));
        for line in alignment_lines(record, use_color) {
            let _ = writeln!(out, "{}", line);
        }
        out.push('\n');
    }
    out
}

/// Span layout listing for `inspect`
pub fn render_structure(structure: &DocumentStructure, use_color: bool) -> String {
    let mut out = String::new();
    let title = if structure.meta.title.is_empty() {
        "<untitled>"
    } else {
        &structure.meta.title
    };
    let _ = writeln!(
        out,
        "{}  doc {}  {} tokens  {} sentences  {} spans at {}",
        colorize_title(title, use_color),
        structure.id,
        structure.tokens,
        structure.sentences,
        structure.spans.len(),
        structure.partition
    );
    let width = structure.spans.len().saturating_sub(1).to_string().len();
    for span in &structure.spans {
        let _ = writeln!(
            out,
            "{:>width$}  {}+{}  {}",
            span.index,
            span.token_at,
            span.n_tokens,
            span.text,
            width = width
        );
    }
    out
}
