//! Bulk import and export of catalog records (JSON and CSV).
//!
//! Import is forgiving per row and strict per file: an unparseable file is
//! a single failure, while individually invalid rows are skipped and
//! reported without aborting the batch.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::db::{BookExport, BooksRepository, CreateBook, Genre};

/// Minimum accepted published year for imported rows.
const MIN_IMPORT_YEAR: i32 = 1800;

/// Fixed CSV header, shared by import and export.
pub const CSV_HEADER: [&str; 4] = ["title", "author", "genre", "published_year"];

/// Outcome of a bulk import: rows that made it plus per-row failures.
#[derive(Debug, Default, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub errors: Vec<String>,
}

/// A half-parsed import row; validation turns it into a `CreateBook`.
#[derive(Debug, Default, Clone)]
pub struct RawRecord {
    pub title: Option<String>,
    pub author: Option<String>,
    pub genre: Option<String>,
    pub published_year: Option<String>,
}

/// File-level import failure (encoding, malformed JSON/CSV, wrong shape).
#[derive(Debug, thiserror::Error)]
#[error("Import failed: {0}")]
pub struct ImportFileError(pub String);

/// Parse an uploaded payload into raw rows. Files named `*.json` must hold
/// an array of objects; everything else is read as CSV keyed by its header
/// line.
pub fn parse_records(filename: &str, bytes: &[u8]) -> Result<Vec<RawRecord>, ImportFileError> {
    let text =
        std::str::from_utf8(bytes).map_err(|e| ImportFileError(format!("invalid UTF-8: {e}")))?;

    if filename.ends_with(".json") {
        parse_json(text)
    } else {
        parse_csv(text)
    }
}

fn parse_json(text: &str) -> Result<Vec<RawRecord>, ImportFileError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ImportFileError(format!("invalid JSON: {e}")))?;

    let Value::Array(entries) = value else {
        return Err(ImportFileError("JSON must be an array of records".to_string()));
    };

    Ok(entries.into_iter().map(raw_from_json).collect())
}

fn raw_from_json(entry: Value) -> RawRecord {
    let Value::Object(map) = entry else {
        // Not an object at all; fails row validation downstream.
        return RawRecord::default();
    };

    let text_field = |key: &str| -> Option<String> {
        map.get(key).and_then(|v| v.as_str()).map(str::to_string)
    };

    RawRecord {
        title: text_field("title"),
        author: text_field("author"),
        genre: text_field("genre"),
        published_year: map.get("published_year").and_then(|v| match v {
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) => Some(s.clone()),
            _ => None,
        }),
    }
}

fn parse_csv(text: &str) -> Result<Vec<RawRecord>, ImportFileError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| ImportFileError(format!("invalid CSV: {e}")))?
        .clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ImportFileError(format!("invalid CSV: {e}")))?;
        let mut raw = RawRecord::default();
        for (header, field) in headers.iter().zip(record.iter()) {
            match header {
                "title" => raw.title = Some(field.to_string()),
                "author" => raw.author = Some(field.to_string()),
                "genre" => raw.genre = Some(field.to_string()),
                "published_year" => raw.published_year = Some(field.to_string()),
                _ => {}
            }
        }
        rows.push(raw);
    }

    Ok(rows)
}

/// Validate one raw row: all four fields present and non-blank, genre in
/// the fixed enum, year an integer of at least 1800.
pub fn validate_record(raw: &RawRecord) -> Option<CreateBook> {
    let title = raw.title.as_deref().map(str::trim).filter(|t| !t.is_empty())?;
    let author = raw.author.as_deref().map(str::trim).filter(|a| !a.is_empty())?;
    let genre: Genre = raw.genre.as_deref()?.parse().ok()?;
    let year: i32 = raw.published_year.as_deref()?.trim().parse().ok()?;
    if year < MIN_IMPORT_YEAR {
        return None;
    }

    Some(CreateBook {
        title: title.to_string(),
        author: author.to_string(),
        genre,
        published_year: year,
    })
}

/// Run a parsed batch against the store. Row numbers in error messages are
/// 1-based, matching what users see in their file.
pub async fn import_books(repo: &BooksRepository, rows: Vec<RawRecord>) -> ImportReport {
    let mut report = ImportReport::default();

    for (index, raw) in rows.into_iter().enumerate() {
        let row = index + 1;
        let Some(record) = validate_record(&raw) else {
            report.errors.push(format!("row {row}: invalid record"));
            continue;
        };

        match repo.create(record).await {
            Ok(_) => report.imported += 1,
            Err(e) => report.errors.push(format!("row {row}: {e}")),
        }
    }

    report
}

/// Render export rows as CSV with the fixed header.
pub fn export_csv(rows: &[BookExport]) -> anyhow::Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    for row in rows {
        let year = row.published_year.to_string();
        writer.write_record([
            row.title.as_str(),
            row.author.as_str(),
            row.genre.as_str(),
            year.as_str(),
        ])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("flushing CSV writer: {e}"))?;
    Ok(String::from_utf8(bytes)?)
}

/// Timestamped attachment name for CSV downloads.
pub fn export_filename() -> String {
    format!("books_export_{}.csv", Utc::now().format("%Y%m%d_%H%M%S"))
}
