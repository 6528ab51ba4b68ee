//! CSV ingestion and structural validation.

pub mod dataset;

pub use self::dataset::{Column, ColumnType, Dataset, Value};

use thiserror::Error;
use tracing::{debug, info};

/// Minimum number of numeric columns needed to pick two features.
pub const MIN_NUMERIC_COLUMNS: usize = 2;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("the uploaded file is empty")]
    Empty,

    #[error("unsupported file type '{0}': only CSV files are accepted")]
    UnsupportedFileType(String),

    #[error("the file is not valid UTF-8 text (line {line})")]
    InvalidEncoding { line: u64 },

    #[error("line {line}: expected {expected} fields, found {found}")]
    RaggedRow { line: u64, expected: u64, found: u64 },

    #[error("malformed CSV: {0}")]
    Malformed(String),
}

impl From<csv::Error> for ParseError {
    fn from(err: csv::Error) -> Self {
        let line = err.position().map(|p| p.line()).unwrap_or(0);
        match err.kind() {
            csv::ErrorKind::Utf8 { .. } => ParseError::InvalidEncoding { line },
            csv::ErrorKind::UnequalLengths {
                expected_len, len, ..
            } => ParseError::RaggedRow {
                line,
                expected: *expected_len,
                found: *len,
            },
            _ => ParseError::Malformed(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("The uploaded file needs at least two numeric columns for analysis (found {found}).")]
    TooFewNumericColumns { found: usize },

    #[error("contamination must be between {min} and {max}, got {value}")]
    ContaminationOutOfRange { value: f64, min: f64, max: f64 },
}

/// Reject uploads whose name or declared type is clearly not CSV.
///
/// Either hint may be absent; a missing hint is not a rejection.
pub fn check_upload_type(file_name: Option<&str>, content_type: Option<&str>) -> Result<(), ParseError> {
    if let Some(name) = file_name.filter(|n| !n.is_empty()) {
        let is_csv = std::path::Path::new(name)
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if !is_csv {
            return Err(ParseError::UnsupportedFileType(name.to_string()));
        }
    }
    if let Some(mime) = content_type {
        let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        let accepted = matches!(
            essence.as_str(),
            "text/csv"
                | "application/csv"
                | "text/comma-separated-values"
                | "application/vnd.ms-excel"
                | "text/plain"
                | "application/octet-stream"
                | ""
        );
        if !accepted {
            return Err(ParseError::UnsupportedFileType(essence));
        }
    }
    Ok(())
}

/// Parse a comma-separated byte stream with a header row into a [`Dataset`].
///
/// Header names are whitespace-trimmed. A header without data rows is a
/// valid, empty dataset.
pub fn parse_csv(bytes: &[u8]) -> Result<Dataset, ParseError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF".as_slice()).unwrap_or(bytes);
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ParseError::Empty);
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if headers.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(Value::parse).collect::<Vec<_>>());
    }

    let dataset = Dataset::new(headers, rows);
    debug!(
        rows = dataset.len(),
        columns = dataset.columns().len(),
        "parsed CSV upload"
    );
    Ok(dataset)
}

/// Ensure the dataset has enough numeric columns, returning them in order.
pub fn validate(dataset: &Dataset) -> Result<Vec<String>, ValidationError> {
    let numeric = dataset.numeric_columns();
    if numeric.len() < MIN_NUMERIC_COLUMNS {
        info!(found = numeric.len(), "dataset rejected: too few numeric columns");
        return Err(ValidationError::TooFewNumericColumns {
            found: numeric.len(),
        });
    }
    Ok(numeric)
}
