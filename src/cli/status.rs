//! Read-only commands: status, dates, labels

use clap::Args;

use super::{print_json, Cli, CliError, OutputFormat};
use crate::store::{MarketStore, SqliteMarketStore};
use crate::IdKind;

/// Status subcommand
#[derive(Debug, Args)]
pub struct StatusCommand {}

impl StatusCommand {
    /// Print the store summary
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let store = SqliteMarketStore::connect(&cli.database_url).await?;
        let summary = store.summary().await?;

        match cli.output_format {
            OutputFormat::Json => print_json(&summary)?,
            OutputFormat::Human => {
                println!("Completed days: {}", summary.completed_days);
                match (summary.first_date, summary.last_date) {
                    (Some(first), Some(last)) => println!("Date range:     {first} .. {last}"),
                    _ => println!("Date range:     (none)"),
                }
                println!("Market rows:    {}", summary.market_rows);
                println!("Region labels:  {}", summary.region_labels);
                println!("Type labels:    {}", summary.type_labels);
            }
        }
        Ok(())
    }
}

/// Dates subcommand
#[derive(Debug, Args)]
pub struct DatesCommand {}

impl DatesCommand {
    /// Print every completed date
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let store = SqliteMarketStore::connect(&cli.database_url).await?;
        let dates = store.completed_dates().await?;

        match cli.output_format {
            OutputFormat::Json => print_json(&dates)?,
            OutputFormat::Human => {
                for date in dates {
                    println!("{date}");
                }
            }
        }
        Ok(())
    }
}

/// Labels subcommand
#[derive(Debug, Args)]
pub struct LabelsCommand {
    /// Namespace to list: region or type
    #[arg(long)]
    pub kind: IdKind,
}

impl LabelsCommand {
    /// Print stored labels of one namespace
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let store = SqliteMarketStore::connect(&cli.database_url).await?;
        let labels = store.labels(self.kind).await?;

        match cli.output_format {
            OutputFormat::Json => {
                let entries: Vec<serde_json::Value> = labels
                    .iter()
                    .map(|(id, value)| serde_json::json!({ "id": id, "value": value }))
                    .collect();
                print_json(&entries)?;
            }
            OutputFormat::Human => {
                for (id, value) in labels {
                    println!("{id}\t{value}");
                }
            }
        }
        Ok(())
    }
}
