//! Record and state output

use serde_json::Value;

pub mod jsonl;

pub use jsonl::JsonLinesSink;

/// Output errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Buffer flush error
    #[error("flush error: {0}")]
    FlushError(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Destination of extracted records and bookmark state
pub trait RecordSink: Send {
    /// Write one record of `stream`
    fn write_record(&mut self, stream: &str, record: &Value) -> OutputResult<()>;

    /// Write multiple records of `stream` at once
    fn write_records(&mut self, stream: &str, records: &[Value]) -> OutputResult<()> {
        for record in records {
            self.write_record(stream, record)?;
        }
        Ok(())
    }

    /// Write a state message (see [`crate::state::StateFile::to_message`])
    fn write_state(&mut self, state: &Value) -> OutputResult<()>;

    /// Flush any buffered data
    fn flush(&mut self) -> OutputResult<()>;

    /// Close the sink and finalize output
    fn close(self: Box<Self>) -> OutputResult<()>;
}
