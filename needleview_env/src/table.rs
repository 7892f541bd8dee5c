//! Whitespace-delimited numeric tables.
//!
//! Every data file the needle tooling produces (plans, recorded needle
//! motion, live tracker output, insertion targets) is plain text with one
//! row of floats per line and an optional header. Lines carrying fewer than
//! two fields are not data rows and are skipped.

use crate::error::EnvError;
use std::fs;
use std::path::Path;

/// Rows shorter than this are treated as blank/comment lines.
pub const MIN_ROW_FIELDS: usize = 2;

/// A parsed numeric table.
pub type Table = Vec<Vec<f64>>;

/// Parses table text, skipping the first `header_lines` lines.
///
/// Fails with `EnvError::MalformedTable` (1-based line number) when a data
/// row contains a token that is not a float.
pub fn parse_table(text: &str, header_lines: usize) -> Result<Table, EnvError> {
    let mut rows = Vec::new();

    for (idx, line) in text.lines().enumerate().skip(header_lines) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < MIN_ROW_FIELDS {
            continue;
        }
        rows.push(parse_fields(&fields, idx + 1)?);
    }

    Ok(rows)
}

/// Reads and parses a table file.
pub fn read_table(path: impl AsRef<Path>, header_lines: usize) -> Result<Table, EnvError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let rows = parse_table(&text, header_lines)?;
    tracing::debug!("Loaded {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

/// Formats rows back into table text.
///
/// Floats use Rust's shortest round-trip representation, so parsing the
/// output reproduces the input values exactly.
pub fn format_table(rows: &[Vec<f64>], header: Option<&str>) -> String {
    let mut out = String::new();
    if let Some(header) = header {
        out.push_str(header);
        out.push('\n');
    }
    for row in rows {
        out.push_str(&format_row(row));
        out.push('\n');
    }
    out
}

/// Formats a single row as space-separated values.
pub fn format_row(row: &[f64]) -> String {
    row.iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// The last line of a file that carries any content, and whether it was
/// newline-terminated (a writer may still be mid-line otherwise).
pub fn last_content_line(text: &str) -> Option<(&str, bool)> {
    let body = text.trim_end();
    if body.is_empty() {
        return None;
    }
    let terminated = text[body.len()..].contains('\n');
    let last = body.rsplit('\n').next().unwrap_or(body).trim();
    Some((last, terminated))
}

pub(crate) fn parse_fields(fields: &[&str], line: usize) -> Result<Vec<f64>, EnvError> {
    fields
        .iter()
        .map(|f| {
            f.parse::<f64>()
                .map_err(|e| EnvError::malformed(line, format!("'{}': {}", f, e)))
        })
        .collect()
}
