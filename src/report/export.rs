//! CSV export of the anomaly table.

use crate::report::AnomalyTable;
use anyhow::{Context, Result};

pub const EXPORT_FILE_NAME: &str = "detected_anomalies.csv";
pub const EXPORT_CONTENT_TYPE: &str = "text/csv; charset=utf-8";

/// Serialize the table as UTF-8, comma-separated, header first, no index column.
pub fn to_csv(table: &AnomalyTable) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer
        .write_record(table.columns())
        .context("failed to write CSV header")?;
    for row in table.rows() {
        writer.write_record(row).context("failed to write CSV row")?;
    }

    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("failed to flush CSV export: {}", e.error()))
}
