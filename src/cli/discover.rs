//! CLI command for listing catalog streams

use clap::Args;
use serde_json::json;

use super::CliError;
use crate::streams::catalog::StreamCatalog;

/// Discover subcommand
#[derive(Debug, Args)]
pub struct DiscoverCommand {
    /// Optional stream pattern (supports wildcards)
    pub pattern: Option<String>,

    /// Output format
    #[arg(long, default_value = "human")]
    pub format: OutputFormat,
}

/// Output format for discover
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

impl DiscoverCommand {
    /// Execute the discover command
    pub fn execute(&self) -> Result<(), CliError> {
        let catalog = StreamCatalog::load()?;
        let streams = match &self.pattern {
            Some(p) => catalog.resolve_pattern(p)?,
            None => catalog.streams().iter().collect(),
        };

        match self.format {
            OutputFormat::Json => {
                let entries: Vec<_> = streams
                    .iter()
                    .map(|s| {
                        json!({
                            "stream": s.name(),
                            "description": s.description(),
                            "strategy": s.strategy(),
                            "report_type": s.report_type().map(|t| t.as_str()),
                            "key_properties": s.key_properties(),
                            "replication_key": s.replication_key(),
                        })
                    })
                    .collect();
                let rendered = serde_json::to_string_pretty(&entries)
                    .map_err(|e| CliError::InvalidArgument(format!("Failed to render JSON: {e}")))?;
                println!("{rendered}");
            }
            OutputFormat::Human => {
                println!(
                    "Found {} streams (catalog {}):\n",
                    streams.len(),
                    catalog.schema_version()
                );
                for s in streams {
                    println!(
                        "{} | {} | keys={} | replication={}",
                        s.name(),
                        s.strategy(),
                        s.key_properties().join(","),
                        s.replication_key().unwrap_or("-"),
                    );
                }
            }
        }

        Ok(())
    }
}
