//! Run command implementation

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

use super::{print_json, Cli, CliError, OutputFormat};
use crate::downloader::config::{DEFAULT_DOWNLOAD_RATE, DEFAULT_DOWNLOAD_WORKERS, DEFAULT_LOOKUP_RATE};
use crate::fetcher::archive::DEFAULT_ARCHIVE_BASE_URL;
use crate::identifier::lookup::{DEFAULT_LOOKUP_ENDPOINT, MAX_LOOKUP_BATCH};
use crate::pipeline::config::{DEFAULT_PARSE_WORKERS, DEFAULT_PERSIST_WORKERS, DEFAULT_QUEUE_CAPACITY};
use crate::pipeline::{IngestConfig, Pipeline, RunReport};
use crate::shutdown::ShutdownSignal;

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Concurrent archive downloads
    #[arg(long, default_value_t = DEFAULT_DOWNLOAD_WORKERS)]
    pub download_workers: usize,

    /// Concurrent archive parses
    #[arg(long, default_value_t = DEFAULT_PARSE_WORKERS)]
    pub parse_workers: usize,

    /// Concurrent day writes
    #[arg(long, default_value_t = DEFAULT_PERSIST_WORKERS)]
    pub persist_workers: usize,

    /// Capacity of each queue between stages
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// Archive requests per second
    #[arg(long, default_value_t = DEFAULT_DOWNLOAD_RATE)]
    pub download_rate: usize,

    /// Label lookups per second
    #[arg(long, default_value_t = DEFAULT_LOOKUP_RATE)]
    pub lookup_rate: usize,

    /// Ids per label lookup (1-1000)
    #[arg(long, default_value_t = MAX_LOOKUP_BATCH)]
    pub lookup_batch: usize,

    /// Archive host
    #[arg(long, default_value = DEFAULT_ARCHIVE_BASE_URL)]
    pub archive_base_url: String,

    /// Label lookup endpoint
    #[arg(long, default_value = DEFAULT_LOOKUP_ENDPOINT)]
    pub lookup_endpoint: String,

    /// HTTP request timeout in seconds
    #[arg(long, default_value_t = 60)]
    pub request_timeout_secs: u64,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9000)
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,

    /// Disable the progress spinner
    #[arg(long, default_value_t = false)]
    pub no_progress: bool,
}

impl RunArgs {
    /// Build the pipeline configuration from defaults and flags
    pub fn to_config(&self, cli: &Cli) -> IngestConfig {
        IngestConfig {
            download_workers: self.download_workers,
            parse_workers: self.parse_workers,
            persist_workers: self.persist_workers,
            queue_capacity: self.queue_capacity,
            download_rate: self.download_rate,
            lookup_rate: self.lookup_rate,
            lookup_max_batch: self.lookup_batch,
            archive_base_url: self.archive_base_url.clone(),
            lookup_endpoint: self.lookup_endpoint.clone(),
            database_url: cli.database_url.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            ..IngestConfig::default()
        }
    }

    /// Execute the run command
    pub async fn execute(&self, cli: &Cli, shutdown: ShutdownSignal) -> Result<(), CliError> {
        let config = self.to_config(cli);
        config
            .validate()
            .map_err(|e| CliError::ConfigurationError(e.to_string()))?;

        if let Some(addr) = self.metrics_addr {
            crate::metrics::init_metrics(addr).map_err(CliError::ConfigurationError)?;
        }

        let pipeline = Pipeline::connect(config).await?.with_shutdown(shutdown);

        let progress = if self.no_progress || cli.output_format == OutputFormat::Json {
            ProgressBar::hidden()
        } else {
            create_spinner()
        };

        let report = pipeline
            .run_with_progress(|date| {
                progress.inc(1);
                progress.set_message(format!("persisted {date}"));
            })
            .await?;
        progress.finish_and_clear();

        info!(persisted = report.persisted.len(), "Run complete");
        match cli.output_format {
            OutputFormat::Json => print_json(&report)?,
            OutputFormat::Human => output_human(&report),
        }
        Ok(())
    }
}

fn output_human(report: &RunReport) {
    let stats = &report.stats;
    println!("Run complete");
    println!("  Days persisted:    {}", report.persisted.len());
    if let (Some(first), Some(last)) = (report.persisted.first(), report.persisted.last()) {
        println!("  Range:             {first} .. {last}");
    }
    println!("  Already complete:  {}", stats.skipped);
    println!("  Download failures: {}", stats.download_failed);
    println!("  Parse failures:    {}", stats.parse_failed);
    println!("  Persist failures:  {}", stats.persist_failed);
}

fn create_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {pos} days {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(200));
    pb
}
