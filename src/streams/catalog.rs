//! Stream catalog
//!
//! The catalog lists every stream the connector can sync, with its
//! extraction strategy, endpoint or report type, and key columns.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::ExtractionStrategy;
use crate::ReportType;

/// Embedded catalog data
const CATALOG_JSON: &str = include_str!("streams.json");

/// Global catalog instance (loaded once)
static CATALOG: Lazy<Result<StreamCatalog, CatalogError>> =
    Lazy::new(|| StreamCatalog::from_json(CATALOG_JSON));

/// How list objects become records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordShape {
    /// Each object is one record
    #[default]
    Object,
    /// Each `{id, rates: {currency: rate}}` object becomes one record per rate
    RateTable,
}

/// One stream in the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamDefinition {
    name: String,
    #[serde(default)]
    description: String,
    strategy: ExtractionStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    report_type: Option<ReportType>,
    #[serde(default)]
    primary_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    replication_key: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    id_keys: Vec<String>,
    #[serde(default)]
    shape: RecordShape,
}

impl StreamDefinition {
    /// Stream name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human description
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Extraction strategy
    pub fn strategy(&self) -> ExtractionStrategy {
        self.strategy
    }

    /// Endpoint path of a paginated stream
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Report type of a report stream
    pub fn report_type(&self) -> Option<&ReportType> {
        self.report_type.as_ref()
    }

    /// Columns hashed into the synthetic key of a report stream
    pub fn id_keys(&self) -> &[String] {
        &self.id_keys
    }

    /// Record shape of a paginated stream
    pub fn shape(&self) -> RecordShape {
        self.shape
    }

    /// Primary key columns of emitted records
    ///
    /// Report streams are keyed by their synthetic `{name}_id` column.
    pub fn key_properties(&self) -> Vec<String> {
        match self.strategy {
            ExtractionStrategy::ReportExtraction => vec![format!("{}_id", self.name)],
            ExtractionStrategy::PaginatedPoll => self.primary_keys.clone(),
        }
    }

    /// Field the bookmark tracks
    pub fn replication_key(&self) -> Option<&str> {
        match self.strategy {
            ExtractionStrategy::ReportExtraction => Some("report_end_at"),
            ExtractionStrategy::PaginatedPoll => self.replication_key.as_deref(),
        }
    }

    fn validate(&self) -> Result<(), CatalogError> {
        let invalid = |reason: &str| CatalogError::ParseError(format!("stream {}: {reason}", self.name));

        if self.name.trim().is_empty() {
            return Err(CatalogError::ParseError("stream name cannot be empty".to_string()));
        }

        match self.strategy {
            ExtractionStrategy::PaginatedPoll => {
                match self.path.as_deref() {
                    Some(path) if path.starts_with('/') => {}
                    _ => return Err(invalid("paginated streams need a path starting with '/'")),
                }
                if self.primary_keys.is_empty() {
                    return Err(invalid("paginated streams need primary keys"));
                }
            }
            ExtractionStrategy::ReportExtraction => {
                let report_type = self
                    .report_type
                    .as_ref()
                    .ok_or_else(|| invalid("report streams need a report_type"))?;
                ReportType::new(report_type.as_str()).map_err(|e| invalid(&e))?;
                if self.id_keys.is_empty() {
                    return Err(invalid("report streams need id_keys"));
                }
            }
        }
        Ok(())
    }
}

/// Catalog of syncable streams
#[derive(Debug, Clone)]
pub struct StreamCatalog {
    schema_version: String,
    streams: Vec<StreamDefinition>,
}

impl StreamCatalog {
    /// Load the embedded catalog
    ///
    /// This is a singleton operation - the catalog is parsed once and cached.
    pub fn load() -> Result<&'static Self, CatalogError> {
        CATALOG.as_ref().map_err(Clone::clone)
    }

    /// Parse and validate a catalog from JSON
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let raw: RawCatalog = serde_json::from_str(json)
            .map_err(|e| CatalogError::ParseError(format!("Failed to parse catalog: {e}")))?;

        let mut seen = HashSet::new();
        for stream in &raw.streams {
            stream.validate()?;
            if !seen.insert(stream.name.as_str()) {
                return Err(CatalogError::ParseError(format!(
                    "duplicate stream name: {}",
                    stream.name
                )));
            }
        }

        Ok(Self {
            schema_version: raw.schema_version,
            streams: raw.streams,
        })
    }

    /// Catalog schema version
    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    /// All streams in catalog order
    pub fn streams(&self) -> &[StreamDefinition] {
        &self.streams
    }

    /// Look up a stream by name
    pub fn get(&self, name: &str) -> Result<&StreamDefinition, CatalogError> {
        self.streams
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| CatalogError::NotFound(format!("Stream {name} not found in catalog")))
    }

    /// Resolve a wildcard pattern to matching streams
    ///
    /// # Pattern Syntax
    /// - `*` matches any sequence of characters
    /// - `activity_*` matches both activity reports
    /// - `*_summary_1` matches both summary reports
    pub fn resolve_pattern(&self, pattern: &str) -> Result<Vec<&StreamDefinition>, CatalogError> {
        if !pattern.contains('*') {
            return self.get(pattern).map(|s| vec![s]);
        }

        let matches: Vec<_> = self
            .streams
            .iter()
            .filter(|s| matches_pattern(pattern, &s.name))
            .collect();

        if matches.is_empty() {
            return Err(CatalogError::NotFound(format!(
                "Pattern {pattern} does not match any stream"
            )));
        }
        Ok(matches)
    }

    /// Resolve several patterns, deduplicated, in catalog order
    ///
    /// An empty pattern list selects every stream.
    pub fn select<S: AsRef<str>>(&self, patterns: &[S]) -> Result<Vec<&StreamDefinition>, CatalogError> {
        if patterns.is_empty() {
            return Ok(self.streams.iter().collect());
        }

        let mut wanted = HashSet::new();
        for pattern in patterns {
            for stream in self.resolve_pattern(pattern.as_ref().trim())? {
                wanted.insert(stream.name.as_str());
            }
        }

        Ok(self
            .streams
            .iter()
            .filter(|s| wanted.contains(s.name.as_str()))
            .collect())
    }
}

/// Match a name against a pattern where `*` matches any run of characters
fn matches_pattern(pattern: &str, value: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    if !pattern.contains('*') {
        return pattern == value;
    }

    let parts: Vec<&str> = pattern.split('*').collect();
    let last = parts.len() - 1;

    let mut pos = 0;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }

        if i == 0 {
            if !value.starts_with(part) {
                return false;
            }
            pos = part.len();
        } else if i == last {
            if value.len() < pos + part.len() || !value[pos..].ends_with(part) {
                return false;
            }
        } else if let Some(found) = value[pos..].find(part) {
            pos += found + part.len();
        } else {
            return false;
        }
    }

    true
}

/// Raw catalog structure for deserialization
#[derive(Debug, Deserialize)]
struct RawCatalog {
    schema_version: String,
    streams: Vec<StreamDefinition>,
}

/// Errors that can occur when working with the catalog
#[derive(Debug, Clone, thiserror::Error)]
pub enum CatalogError {
    /// Failed to parse catalog JSON
    #[error("catalog parse error: {0}")]
    ParseError(String),

    /// Stream not found in catalog
    #[error("stream not found: {0}")]
    NotFound(String),
}
