//! Report CSV decoding and row enrichment

use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use super::literal::{coerce, CellValue};
use super::ReportError;
use crate::ISO_SECONDS_FORMAT;

/// Run-scoped values attached to every decoded row
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichContext {
    /// Requested interval start
    pub report_start_at: i64,
    /// Interval end of the run that produced the file
    pub report_end_at: i64,
    /// Extraction time, `%Y-%m-%dT%H:%M:%SZ`
    pub loaded_at: String,
    /// Columns hashed into the synthetic key, in order
    pub id_keys: Vec<String>,
    /// Name of the synthetic key column (`{stream}_id`)
    pub key_column: String,
}

impl EnrichContext {
    /// Context for one download of `stream`
    pub fn new(
        stream: &str,
        id_keys: Vec<String>,
        report_start_at: i64,
        report_end_at: i64,
        loaded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            report_start_at,
            report_end_at,
            loaded_at: loaded_at.format(ISO_SECONDS_FORMAT).to_string(),
            id_keys,
            key_column: format!("{stream}_id"),
        }
    }
}

/// One decoded report row, columns in file order followed by the
/// bookkeeping columns
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExtractedRow {
    columns: Vec<(String, CellValue)>,
}

impl ExtractedRow {
    /// Value of a column
    pub fn get(&self, name: &str) -> Option<&CellValue> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value)
    }

    /// Set a column, replacing an existing one in place
    pub fn set(&mut self, name: &str, value: CellValue) {
        match self.columns.iter_mut().find(|(column, _)| column == name) {
            Some((_, existing)) => *existing = value,
            None => self.columns.push((name.to_string(), value)),
        }
    }

    /// Columns in order
    pub fn columns(&self) -> &[(String, CellValue)] {
        &self.columns
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the row has no columns
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Convert to a JSON object, keeping column order
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .columns
            .iter()
            .map(|(name, value)| {
                (
                    name.clone(),
                    serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
                )
            })
            .collect();
        serde_json::Value::Object(map)
    }
}

impl Serialize for ExtractedRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, value) in &self.columns {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Synthetic primary key: lowercase hex MD5 over the string forms of the
/// present, non-null `id_keys` columns, concatenated in `id_keys` order
pub fn synthetic_key(row: &ExtractedRow, id_keys: &[String]) -> String {
    let mut hasher = Md5::new();
    for key in id_keys {
        if let Some(value) = row.get(key).filter(|v| !v.is_null()) {
            hasher.update(value.to_string().as_bytes());
        }
    }
    format!("{:x}", hasher.finalize())
}

/// Decode a report file into enriched rows
///
/// Rows are produced lazily. A malformed record yields one
/// [`ReportError::Csv`] and ends the iteration.
pub fn decode<'a>(csv_bytes: &'a [u8], ctx: &'a EnrichContext) -> RowIter<'a> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(csv_bytes);

    let headers = reader
        .headers()
        .map(|h| h.iter().map(str::to_string).collect::<Vec<_>>())
        .map_err(|e| e.to_string());

    RowIter {
        reader,
        headers,
        ctx,
        record: csv::StringRecord::new(),
        done: false,
    }
}

/// Lazy iterator over decoded rows
pub struct RowIter<'a> {
    reader: csv::Reader<&'a [u8]>,
    headers: Result<Vec<String>, String>,
    ctx: &'a EnrichContext,
    record: csv::StringRecord,
    done: bool,
}

fn enrich(headers: &[String], record: &csv::StringRecord, ctx: &EnrichContext) -> ExtractedRow {
    let mut row = ExtractedRow {
        columns: Vec::with_capacity(headers.len() + 4),
    };
    for (name, raw) in headers.iter().zip(record.iter()) {
        row.set(name, coerce(raw));
    }
    row.set("report_start_at", CellValue::Integer(ctx.report_start_at));
    row.set("report_end_at", CellValue::Integer(ctx.report_end_at));
    row.set("loaded_at", CellValue::Text(ctx.loaded_at.clone()));
    let key = synthetic_key(&row, &ctx.id_keys);
    row.set(&ctx.key_column, CellValue::Text(key));
    row
}

impl Iterator for RowIter<'_> {
    type Item = Result<ExtractedRow, ReportError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let headers = match &self.headers {
            Ok(headers) => headers,
            Err(e) => {
                let message = format!("invalid header row: {e}");
                self.done = true;
                return Some(Err(ReportError::Csv(message)));
            }
        };

        match self.reader.read_record(&mut self.record) {
            Ok(true) => Some(Ok(enrich(headers, &self.record, self.ctx))),
            Ok(false) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(ReportError::Csv(e.to_string())))
            }
        }
    }
}
