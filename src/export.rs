//! CSV export of database results

use serde_json::Value;
use std::borrow::Cow;
use std::path::Path;

/// File name used when the caller does not pick one
pub const DEFAULT_CSV_FILENAME: &str = "query-results.csv";

/// Render a header line plus one line per row, joined with `\n`.
///
/// Fields containing a comma, a double quote or a newline are quoted, with
/// embedded quotes doubled. Null cells become empty fields.
pub fn to_csv(columns: &[String], rows: &[Vec<Value>]) -> String {
    let header = columns
        .iter()
        .map(|c| escape_field(c))
        .collect::<Vec<_>>()
        .join(",");

    let lines = rows.iter().map(|row| {
        row.iter()
            .map(|cell| escape_field(&cell_text(cell)).into_owned())
            .collect::<Vec<_>>()
            .join(",")
    });

    std::iter::once(header)
        .chain(lines)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Write the CSV rendering of a result to `path`
pub fn export_csv(path: &Path, columns: &[String], rows: &[Vec<Value>]) -> std::io::Result<()> {
    std::fs::write(path, to_csv(columns, rows))?;
    tracing::info!(path = %path.display(), rows = rows.len(), "Exported CSV");
    Ok(())
}

fn cell_text(cell: &Value) -> Cow<'_, str> {
    match cell {
        Value::Null => Cow::Borrowed(""),
        Value::String(s) => Cow::Borrowed(s),
        other => Cow::Owned(other.to_string()),
    }
}

fn escape_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}
