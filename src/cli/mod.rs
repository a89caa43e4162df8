//! CLI command implementations

use clap::{Parser, Subcommand};

pub mod discover;
pub mod error;
pub mod sync;
pub mod validate;

pub use discover::DiscoverCommand;
pub use error::CliError;
pub use sync::{SyncArgs, SyncSummary};
pub use validate::ValidateCommand;

/// Stripe connector CLI
#[derive(Parser, Debug)]
#[command(name = "tap-stripe")]
#[command(about = "Extract Stripe objects and reports as JSON lines", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Maximum number of retries for failed requests (range: 1-20), overrides the config
    #[arg(long, global = true, value_parser = clap::value_parser!(u32).range(1..=20))]
    pub max_retries: Option<u32>,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sync selected streams and emit records and state
    Sync(SyncArgs),

    /// List catalog streams
    Discover(DiscoverCommand),

    /// Validate a config or state file
    Validate(ValidateCommand),
}
