//! Validation subcommand

use clap::Parser;
use std::path::{Path, PathBuf};

use super::CliError;
use crate::config::TapConfig;
use crate::state::StateFile;

/// Validate command for checking config and state files
#[derive(Parser, Debug)]
pub struct ValidateCommand {
    /// What to validate
    #[command(subcommand)]
    pub target: ValidateTarget,
}

/// Target type for validation
#[derive(clap::Subcommand, Debug)]
pub enum ValidateTarget {
    /// Validate a config file
    Config {
        /// Config file path
        path: PathBuf,
    },
    /// Validate a state file
    State {
        /// State file path
        path: PathBuf,
    },
}

impl ValidateCommand {
    /// Execute the validation command
    pub fn execute(&self) -> Result<(), CliError> {
        match &self.target {
            ValidateTarget::Config { path } => self.validate_config(path),
            ValidateTarget::State { path } => self.validate_state(path),
        }
    }

    fn validate_config(&self, path: &Path) -> Result<(), CliError> {
        let config = TapConfig::load(path)?;
        println!("Valid config: {}", path.display());
        println!("  API key: {:?}", config.api_key);
        println!("  Base URL: {}", config.base_url);
        match config.start_timestamp()? {
            Some(ts) => println!("  Start date: {ts}"),
            None => println!("  Start date: (none)"),
        }
        println!("  Max retries: {}", config.max_retries);
        println!("  Report max attempts: {}", config.report.max_attempts);
        Ok(())
    }

    fn validate_state(&self, path: &Path) -> Result<(), CliError> {
        if !path.exists() {
            return Err(CliError::InvalidArgument(format!(
                "{} does not exist",
                path.display()
            )));
        }

        let state = StateFile::load(path)?;
        println!("Valid state: {} (schema {})", path.display(), state.schema_version());
        println!("  Bookmarks: {}", state.bookmarks().len());
        for (stream, bookmark) in state.bookmarks() {
            println!(
                "  - {} {}={}",
                stream,
                bookmark.replication_key(),
                bookmark.value()
            );
        }
        println!("  Checkpoints: {}", state.checkpoints().len());
        Ok(())
    }
}
