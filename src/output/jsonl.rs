//! JSON-lines sink
//!
//! One message per line:
//! `{"type":"RECORD","stream":...,"record":...}` and
//! `{"type":"STATE","value":{"bookmarks":...}}`.

use serde_json::{json, Value};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

use super::{OutputError, OutputResult, RecordSink};

const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Writes records and state as JSON lines
pub struct JsonLinesSink {
    writer: BufWriter<Box<dyn Write + Send>>,
    records_written: u64,
}

impl JsonLinesSink {
    /// Sink over any writer
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, writer),
            records_written: 0,
        }
    }

    /// Sink writing to stdout
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Sink writing to a new file at `path`
    pub fn create<P: AsRef<Path>>(path: P) -> OutputResult<Self> {
        let path = path.as_ref();
        info!("Creating JSON-lines output: path={}", path.display());

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| OutputError::IoError(format!("Failed to create directory: {}", e)))?;
        }
        let file = File::create(path)
            .map_err(|e| OutputError::IoError(format!("Failed to create file: {}", e)))?;
        Ok(Self::new(Box::new(file)))
    }

    /// Number of records written so far
    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    fn write_line(&mut self, message: &Value) -> OutputResult<()> {
        serde_json::to_writer(&mut self.writer, message)
            .map_err(|e| OutputError::SerializationError(e.to_string()))?;
        self.writer
            .write_all(b"\n")
            .map_err(|e| OutputError::IoError(e.to_string()))
    }
}

impl RecordSink for JsonLinesSink {
    fn write_record(&mut self, stream: &str, record: &Value) -> OutputResult<()> {
        self.write_line(&json!({
            "type": "RECORD",
            "stream": stream,
            "record": record,
        }))?;
        self.records_written += 1;
        Ok(())
    }

    fn write_state(&mut self, state: &Value) -> OutputResult<()> {
        self.write_line(&json!({
            "type": "STATE",
            "value": state,
        }))?;
        // State lines mark a durable point for consumers
        self.flush()
    }

    fn flush(&mut self) -> OutputResult<()> {
        self.writer
            .flush()
            .map_err(|e| OutputError::FlushError(e.to_string()))
    }

    fn close(mut self: Box<Self>) -> OutputResult<()> {
        self.flush()?;
        debug!(records = self.records_written, "JSON-lines sink closed");
        Ok(())
    }
}
