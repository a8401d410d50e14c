//! Record sinks and run artifacts.
//!
//! Every sink writes a header line first, so an empty result still produces a
//! well-formed table. The flow graph (`.dot`) and the JSON run report are
//! written with plain helpers.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::domain::{FlowConfig, Record, Schema};
use crate::error::PatternError;
use crate::flow::RunReport;

/// Destination for records of one schema.
pub trait RecordSink {
    fn write(&mut self, record: &Record) -> Result<(), PatternError>;

    /// Flush buffered output. Called once at the end of a run.
    fn finish(&mut self) -> Result<(), PatternError> {
        Ok(())
    }
}

/// Delimited-text sink.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
    written: u64,
}

impl CsvSink<File> {
    /// Create (or truncate) `path`, creating parent directories as needed.
    pub fn create(path: &Path, schema: &Schema, delimiter: u8) -> Result<Self, PatternError> {
        create_parent_dir(path)?;
        let file = File::create(path).map_err(|e| PatternError::io(path, e))?;
        Self::from_writer(file, schema, delimiter)
    }
}

impl<W: Write> CsvSink<W> {
    pub fn from_writer(writer: W, schema: &Schema, delimiter: u8) -> Result<Self, PatternError> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .flexible(false)
            .from_writer(writer);
        writer.write_record(schema.fields())?;
        Ok(Self { writer, written: 0 })
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush and hand back the underlying writer.
    pub fn into_inner(self) -> Result<W, PatternError> {
        self.writer
            .into_inner()
            .map_err(|e| PatternError::io("<sink>", e.into_error()))
    }
}

impl<W: Write> RecordSink for CsvSink<W> {
    fn write(&mut self, record: &Record) -> Result<(), PatternError> {
        self.writer
            .write_record(record.values().iter().map(|v| v.to_string()))?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), PatternError> {
        self.writer.flush().map_err(|e| PatternError::io("<sink>", e))
    }
}

/// Collects records in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    records: Vec<Record>,
    finished: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl RecordSink for MemorySink {
    fn write(&mut self, record: &Record) -> Result<(), PatternError> {
        self.records.push(record.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<(), PatternError> {
        self.finished = true;
        Ok(())
    }
}

fn create_parent_dir(path: &Path) -> Result<(), PatternError> {
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => fs::create_dir_all(parent).map_err(|e| PatternError::io(parent, e)),
        None => Ok(()),
    }
}

/// Write the flow graph in Graphviz format.
pub fn write_dot(path: &Path, dot: &str) -> Result<(), PatternError> {
    create_parent_dir(path)?;
    fs::write(path, dot).map_err(|e| PatternError::io(path, e))
}

#[derive(Debug, Serialize)]
struct ReportFile<'a> {
    tool: &'static str,
    generated_at: String,
    input: String,
    output: String,
    trap: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    #[serde(flatten)]
    report: &'a RunReport,
}

/// Write the run report as pretty JSON.
pub fn write_report_json(path: &Path, report: &RunReport, config: &FlowConfig) -> Result<(), PatternError> {
    create_parent_dir(path)?;
    let file = File::create(path).map_err(|e| PatternError::io(path, e))?;
    let doc = ReportFile {
        tool: "pattern",
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        input: config.input.display().to_string(),
        output: config.output.display().to_string(),
        trap: config.trap.display().to_string(),
        model: config.model.as_ref().map(|p| p.display().to_string()),
        report,
    };
    serde_json::to_writer_pretty(file, &doc)?;
    Ok(())
}
