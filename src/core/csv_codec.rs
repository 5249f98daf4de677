//! CSV import/export for customer rows.
//!
//! Parsing is line based: every line after the header is one row, and quotes
//! are only unescaped inside their own line. `parse(&serialize(rows))` gives the
//! rows back (as strings) when the rows share one key set and no value carries
//! surrounding whitespace or a line break.

use crate::domain::model::{DownloadArtifact, Row};
use crate::utils::error::Result;
use serde_json::Value;

/// Parses CSV text into rows keyed by the header line.
///
/// Fewer than two lines (after trimming the text) yields no rows. Fields are
/// trimmed, short records are padded with empty strings and surplus fields are
/// dropped. A blank line becomes a row of empty strings; an unterminated quote
/// runs to the end of its line only.
pub fn parse(text: &str) -> Result<Vec<Row>> {
    let lines: Vec<&str> = text.trim().split('\n').collect();
    if lines.len() < 2 {
        return Ok(Vec::new());
    }

    let headers = split_line(lines[0])?;
    let mut rows = Vec::with_capacity(lines.len() - 1);

    for line in &lines[1..] {
        let mut values = split_line(line)?.into_iter();
        let mut row = Row::new();
        for header in &headers {
            let value = values.next().unwrap_or_default();
            row.insert(header.clone(), Value::String(value));
        }
        rows.push(row);
    }

    tracing::debug!("Parsed {} rows with {} columns", rows.len(), headers.len());
    Ok(rows)
}

/// Splits one line into trimmed, unquoted fields.
fn split_line(line: &str) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(line.as_bytes());

    match reader.records().next() {
        Some(record) => Ok(record?.iter().map(str::to_string).collect()),
        None => Ok(Vec::new()),
    }
}

/// Serializes rows using the key order of the first row as the header.
pub fn serialize(rows: &[Row]) -> String {
    let Some(first) = rows.first() else {
        return String::new();
    };

    let headers: Vec<&String> = first.keys().collect();
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(
        headers
            .iter()
            .map(|header| escape_field(header))
            .collect::<Vec<_>>()
            .join(","),
    );

    for row in rows {
        let line = headers
            .iter()
            .map(|header| format_value(row.get(header.as_str())))
            .collect::<Vec<_>>()
            .join(",");
        lines.push(line);
    }

    lines.join("\n")
}

fn format_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => escape_field(text),
        Some(Value::Bool(flag)) => flag.to_string(),
        Some(Value::Number(number)) => number.to_string(),
        // 巢狀值輸出成 JSON 文字
        Some(other) => escape_field(&other.to_string()),
    }
}

fn escape_field(text: &str) -> String {
    if text.contains(',') || text.contains('"') {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

/// `customers.csv` -> `customers_predictions.csv`
pub fn predictions_filename(original: &str) -> String {
    let name = std::path::Path::new(original)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(original);

    let stem = if name.to_ascii_lowercase().ends_with(".csv") {
        &name[..name.len() - 4]
    } else {
        name
    };
    format!("{}_predictions.csv", stem)
}

pub fn build_artifact(original_filename: &str, rows: &[Row]) -> DownloadArtifact {
    DownloadArtifact {
        filename: predictions_filename(original_filename),
        contents: serialize(rows),
    }
}
