//! Presentation of a scored run: the anomaly table, its CSV export and the
//! scatter chart.

pub mod chart;
pub mod export;

use serde::Serialize;

/// Number of rows shown in the data preview.
pub const PREVIEW_ROWS: usize = 5;

/// A header plus rows of already formatted cells.
///
/// The page and the download are both rendered from this one value, so what
/// is downloaded is exactly what is shown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl AnomalyTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
