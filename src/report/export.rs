//! JSON and CSV export of merged tables and program summaries.

use crate::analysis::Table;
use crate::error::{Error, Result};
use crate::models::ProgramSummary;
use serde_json::Value;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{info, warn};

/// Text of one CSV cell. `null` is an empty cell; nested values are JSON.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Write rows as a JSON array of objects.
pub fn write_json(table: &Table, path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, &table.rows)
        .map_err(|e| Error::io(path, std::io::Error::from(e)))?;
    writer.flush().map_err(|e| Error::io(path, e))?;

    info!("Data successfully saved to {} in json format.", path.display());
    Ok(())
}

/// Write rows as CSV with a header of `table.columns`.
pub fn write_csv(table: &Table, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| Error::csv(path, e))?;

    writer
        .write_record(&table.columns)
        .map_err(|e| Error::csv(path, e))?;

    for row in &table.rows {
        let record = table
            .columns
            .iter()
            .map(|column| row.get(column).map(cell_text).unwrap_or_default());
        writer.write_record(record).map_err(|e| Error::csv(path, e))?;
    }
    writer.flush().map_err(|e| Error::io(path, e))?;

    info!("Data successfully saved to {} in csv format.", path.display());
    Ok(())
}

/// Write the ranked program summary. Skipped with a warning when empty.
///
/// Returns whether a file was written.
pub fn write_summary_csv(summaries: &[ProgramSummary], path: &Path) -> Result<bool> {
    if summaries.is_empty() {
        warn!("No data available to save to {}.", path.display());
        return Ok(false);
    }

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|e| Error::csv(path, e))?;
    writer
        .write_record(ProgramSummary::COLUMNS)
        .map_err(|e| Error::csv(path, e))?;
    for summary in summaries {
        writer.serialize(summary).map_err(|e| Error::csv(path, e))?;
    }
    writer.flush().map_err(|e| Error::io(path, e))?;

    info!(
        "Data successfully saved to {} ({} programs)",
        path.display(),
        summaries.len()
    );
    Ok(true)
}
