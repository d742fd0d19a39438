//! Series commands: prices, volume

use chrono::{NaiveDate, Utc};
use clap::Args;

use super::{print_json, Cli, CliError, OutputFormat};
use crate::dates::epoch;
use crate::store::{Granularity, LabelledId, MarketQuery, MarketStore, SqliteMarketStore, StoreError};
use crate::NumericId;

/// Selection shared by the series commands
#[derive(Debug, Args)]
pub struct SeriesArgs {
    /// Time bucket: daily, monthly or annual
    #[arg(long, default_value = "daily")]
    pub granularity: Granularity,

    /// Region ids (at most 5)
    #[arg(long = "region", required = true, value_delimiter = ',')]
    pub regions: Vec<NumericId>,

    /// Type ids (at most 5)
    #[arg(long = "type", required = true, value_delimiter = ',')]
    pub types: Vec<NumericId>,

    /// First day, inclusive (YYYY-MM-DD); defaults to the first published day
    #[arg(long)]
    pub from: Option<NaiveDate>,

    /// Last day, inclusive (YYYY-MM-DD); defaults to today (UTC)
    #[arg(long)]
    pub to: Option<NaiveDate>,

    /// Daily paging cursor printed by the previous page
    #[arg(long)]
    pub before: Option<NaiveDate>,
}

impl SeriesArgs {
    /// Build and validate the query before any database is opened
    fn query(&self) -> Result<MarketQuery, CliError> {
        let end = self.to.unwrap_or_else(|| Utc::now().date_naive());
        let query = MarketQuery::new(self.granularity, self.from.unwrap_or_else(epoch), end)
            .regions(self.regions.iter().copied())
            .types(self.types.iter().copied());
        let query = match self.before {
            Some(day) => query.before(day),
            None => query,
        };
        query.validate().map_err(StoreError::from)?;
        Ok(query)
    }
}

fn label(id: &LabelledId) -> String {
    match &id.name {
        Some(name) => format!("{name} ({})", id.id),
        None => id.id.to_string(),
    }
}

fn print_cursor(next_before: Option<NaiveDate>) {
    if let Some(day) = next_before {
        println!("More rows: rerun with --before {day}");
    }
}

/// Prices subcommand
#[derive(Debug, Args)]
pub struct PricesCommand {
    #[command(flatten)]
    pub series: SeriesArgs,
}

impl PricesCommand {
    /// Print average, highest and lowest prices
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let query = self.series.query()?;
        let store = SqliteMarketStore::connect(&cli.database_url).await?;
        let series = store.price_series(&query).await?;

        match cli.output_format {
            OutputFormat::Json => print_json(&series)?,
            OutputFormat::Human => {
                for row in &series.rows {
                    println!(
                        "{}\t{}\t{}\tavg {:.2}\thigh {:.2}\tlow {:.2}",
                        row.period,
                        label(&row.region),
                        label(&row.item_type),
                        row.average,
                        row.highest,
                        row.lowest
                    );
                }
                print_cursor(series.next_before);
            }
        }
        Ok(())
    }
}

/// Volume subcommand
#[derive(Debug, Args)]
pub struct VolumeCommand {
    #[command(flatten)]
    pub series: SeriesArgs,
}

impl VolumeCommand {
    /// Print traded volume and order counts
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let query = self.series.query()?;
        let store = SqliteMarketStore::connect(&cli.database_url).await?;
        let series = store.volume_series(&query).await?;

        match cli.output_format {
            OutputFormat::Json => print_json(&series)?,
            OutputFormat::Human => {
                for row in &series.rows {
                    println!(
                        "{}\t{}\t{}\tvolume {}\torders {}",
                        row.period,
                        label(&row.region),
                        label(&row.item_type),
                        row.volume,
                        row.order_count
                    );
                }
                print_cursor(series.next_before);
            }
        }
        Ok(())
    }
}
