//! Delimited-text ingest.
//!
//! A [`TableSource`] reads a header line plus data rows and yields one
//! [`Routed`] item per row:
//!
//! - rows matching the header width pass through as records
//! - rows of the wrong width are trapped (stage `ingest`) with their line number
//! - unreadable input is a hard error and ends the run
//!
//! Cells are decoded as lossy UTF-8 so a single bad byte never aborts a run.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::ByteRecord;

use crate::domain::{Record, Routed, Schema, TrapRecord, Value};
use crate::error::{PatternError, RecordError};

/// Stage name attached to rows rejected while reading.
pub const INGEST_STAGE: &str = "ingest";

/// Streaming reader over one delimited table.
pub struct TableSource<R: Read> {
    reader: csv::Reader<R>,
    schema: Schema,
    row: ByteRecord,
    label: String,
}

impl TableSource<File> {
    /// Open a delimited file and read its header.
    pub fn open(path: &Path, delimiter: u8) -> Result<Self, PatternError> {
        let file = File::open(path).map_err(|e| PatternError::io(path, e))?;
        Self::from_reader(file, delimiter, path.display().to_string())
    }
}

impl<R: Read> TableSource<R> {
    pub fn from_reader(reader: R, delimiter: u8, label: impl Into<String>) -> Result<Self, PatternError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers = reader.byte_headers()?.clone();
        let schema = Schema::new(headers.iter().map(normalize_header_name))?;

        Ok(Self {
            reader,
            schema,
            row: ByteRecord::new(),
            label: label.into(),
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl<R: Read> Iterator for TableSource<R> {
    type Item = Result<Routed, PatternError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.read_byte_record(&mut self.row) {
            Ok(false) => None,
            Err(e) => Some(Err(e.into())),
            Ok(true) => {
                let values: Vec<Value> = self
                    .row
                    .iter()
                    .map(|cell| Value::from_cell(&String::from_utf8_lossy(cell)))
                    .collect();
                let record = Record::new(values);
                if record.len() == self.schema.len() {
                    return Some(Ok(Routed::Pass(record)));
                }
                let line = self.row.position().map(|p| p.line()).unwrap_or(0);
                let reason = RecordError::MalformedRow {
                    expected: self.schema.len(),
                    found: record.len(),
                };
                Some(Ok(Routed::Trapped(TrapRecord::new(
                    record,
                    INGEST_STAGE,
                    format!("line {line}: {reason}"),
                ))))
            }
        }
    }
}

fn normalize_header_name(name: &[u8]) -> String {
    // Spreadsheet exports sometimes prefix the first header with a BOM.
    String::from_utf8_lossy(name)
        .trim()
        .trim_start_matches('\u{feff}')
        .to_string()
}
