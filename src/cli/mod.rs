//! CLI command implementations

use clap::{Parser, Subcommand};
use std::str::FromStr;

use crate::store::DEFAULT_DATABASE_URL;

pub mod error;
pub mod run;
pub mod series;
pub mod status;

pub use error::CliError;
pub use run::RunArgs;
pub use series::{PricesCommand, SeriesArgs, VolumeCommand};
pub use status::{DatesCommand, LabelsCommand, StatusCommand};

/// Market history ingestion CLI
#[derive(Parser, Debug)]
#[command(name = "market-history-ingest")]
#[command(about = "Ingest daily market history archives into a local database", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// Database URL
    #[arg(long, global = true, default_value = DEFAULT_DATABASE_URL)]
    pub database_url: String,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch and store every completed day not yet in the database
    Run(RunArgs),

    /// Summarize the database contents
    Status(StatusCommand),

    /// List completed dates
    Dates(DatesCommand),

    /// List stored region or type labels
    Labels(LabelsCommand),

    /// Average, highest and lowest prices for selected regions and types
    Prices(PricesCommand),

    /// Traded volume and order counts for selected regions and types
    Volume(VolumeCommand),
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

/// Print `value` as pretty JSON
pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
