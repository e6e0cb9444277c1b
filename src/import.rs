//! CSV Import
//!
//! Reads `row,column[,timestamp]` lines into bits for `Frame::import`.
//! Timestamps use `TIMESTAMP_FORMAT` (`2017-03-02T04:00`) or RFC 3339.

use crate::index::Bit;
use crate::schema::{datetime_to_timestamp, parse_timestamp};
use std::io::Read;
use std::path::Path;

/// Most per-line errors kept in a result
const MAX_REPORTED_ERRORS: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// CSV bit importer
#[derive(Debug, Clone, Default)]
pub struct CsvImporter {
    has_header: bool,
}

/// Result of a CSV import operation
#[derive(Debug, Default)]
pub struct CsvImportResult {
    pub bits: Vec<Bit>,
    pub rows_processed: usize,
    pub rows_failed: usize,
    pub errors: Vec<String>,
}

impl CsvImporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip the first line
    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    /// Import bits from a CSV file
    pub fn import(&self, path: &Path) -> Result<CsvImportResult, ImportError> {
        let file = std::fs::File::open(path).map_err(csv::Error::from)?;
        self.import_reader(file)
    }

    /// Import from a CSV string
    pub fn import_str(&self, data: &str) -> Result<CsvImportResult, ImportError> {
        self.import_reader(data.as_bytes())
    }

    pub fn import_reader<R: Read>(&self, reader: R) -> Result<CsvImportResult, ImportError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(self.has_header)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut result = CsvImportResult::default();
        for (line_num, record) in reader.records().enumerate() {
            let line = if self.has_header { line_num + 2 } else { line_num + 1 };

            let parsed = record
                .map_err(|e| e.to_string())
                .and_then(|record| parse_record(&record));
            match parsed {
                Ok(Some(bit)) => {
                    result.bits.push(bit);
                    result.rows_processed += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    result.rows_failed += 1;
                    if result.errors.len() < MAX_REPORTED_ERRORS {
                        result.errors.push(format!("Line {}: {}", line, e));
                    }
                }
            }
        }

        if result.rows_failed > result.errors.len() {
            result
                .errors
                .push(format!("... and {} more errors", result.rows_failed - result.errors.len()));
        }

        tracing::debug!(
            "CSV import: {} bits, {} failed lines",
            result.rows_processed,
            result.rows_failed
        );
        Ok(result)
    }
}

/// Blank lines yield `None`
fn parse_record(record: &csv::StringRecord) -> Result<Option<Bit>, String> {
    if record.iter().all(str::is_empty) {
        return Ok(None);
    }
    if record.len() < 2 {
        return Err("expected row and column".to_string());
    }

    let row_id: u64 = record[0]
        .parse()
        .map_err(|_| format!("invalid row id: {}", &record[0]))?;
    let column_id: u64 = record[1]
        .parse()
        .map_err(|_| format!("invalid column id: {}", &record[1]))?;

    let mut bit = Bit::new(row_id, column_id);
    if let Some(ts) = record.get(2).filter(|s| !s.is_empty()) {
        let t = parse_timestamp(ts).ok_or_else(|| format!("invalid timestamp: {}", ts))?;
        bit = bit.with_timestamp(datetime_to_timestamp(t));
    }
    Ok(Some(bit))
}
