//! RTMS Ingest - apartment trade sync tool

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use rtms_common::logging::{init_logging, LogConfig, LogLevel};
use rtms_ingest::config::{split_list, IngestConfig, StoreConfig};
use rtms_ingest::enumerator::WorkEnumerator;
use rtms_ingest::fetcher::ApiFetcher;
use rtms_ingest::pipeline::IngestPipeline;
use rtms_ingest::regions::{load_region_codes, RegionList};
use rtms_ingest::store::open_store;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "rtms-ingest")]
#[command(author, version, about = "Apartment trade record sync tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch recent months and append new records to the store
    Sync {
        /// Fetch and reconcile without writing
        #[arg(long)]
        dry_run: bool,

        /// Number of months to fetch, ending at the current one
        #[arg(short, long)]
        months: Option<usize>,

        /// Comma-separated region codes to restrict the run to
        #[arg(short, long)]
        regions: Option<String>,

        /// Region list CSV
        #[arg(long)]
        region_file: Option<PathBuf>,

        /// Write to this CSV file instead of the configured store
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Units fetched concurrently within a month
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// API access credential
        #[arg(long, env = "RTMS_SERVICE_KEY", hide_env_values = true)]
        service_key: Option<String>,
    },

    /// Validate the region list and print a summary
    Regions {
        /// Region list CSV
        #[arg(long)]
        region_file: Option<PathBuf>,

        /// Comma-separated allow-list
        #[arg(short, long)]
        regions: Option<String>,
    },

    /// Print the month window a sync would fetch
    Months {
        #[arg(short, long)]
        months: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&log_config(cli.verbose)?)?;

    let mut config = IngestConfig::from_env()?;

    match cli.command {
        Command::Sync {
            dry_run,
            months,
            regions,
            region_file,
            csv,
            concurrency,
            service_key,
        } => {
            if let Some(key) = service_key {
                config.api.service_key = key;
            }
            if let Some(months) = months {
                config.months_to_fetch = months;
            }
            if let Some(regions) = regions {
                config.region_allow_list = Some(split_list(&regions));
            }
            if let Some(path) = region_file {
                config.region_file = path;
            }
            if let Some(path) = csv {
                config.store = StoreConfig::Csv { path };
            }
            if let Some(concurrency) = concurrency {
                config.concurrency = concurrency;
            }
            config.dry_run |= dry_run;

            sync(&config).await
        },
        Command::Regions {
            region_file,
            regions,
        } => {
            if let Some(path) = region_file {
                config.region_file = path;
            }
            if let Some(regions) = regions {
                config.region_allow_list = Some(split_list(&regions));
            }

            let list = regions_for(&config)?;
            println!(
                "{} region(s) usable; {} row(s) read, {} malformed, {} aggregate, {} duplicate, {} not allow-listed",
                list.codes.len(),
                list.rows,
                list.malformed,
                list.aggregate,
                list.duplicates,
                list.not_allowed
            );
            for code in &list.codes {
                println!("{code}");
            }
            Ok(())
        },
        Command::Months { months } => {
            if let Some(months) = months {
                config.months_to_fetch = months;
            }
            let enumerator = WorkEnumerator::new(config.utc_offset_hours, config.months_to_fetch)?;
            for month in enumerator.months_at(Utc::now()) {
                println!("{month}");
            }
            Ok(())
        },
    }
}

/// Logging settings from the environment, `.env` included
fn log_config(verbose: bool) -> Result<LogConfig> {
    dotenvy::dotenv().ok();

    let config = LogConfig::builder()
        .log_file_prefix("rtms-ingest")
        .build()
        .merge_env()?;
    Ok(if verbose {
        LogConfig {
            level: LogLevel::Debug,
            ..config
        }
    } else {
        config
    })
}

fn regions_for(config: &IngestConfig) -> Result<RegionList> {
    let mut list = load_region_codes(&config.region_file)?;
    if let Some(allow) = &config.region_allow_list {
        list.apply_allow_list(allow);
    }
    Ok(list)
}

async fn sync(config: &IngestConfig) -> Result<()> {
    config.validate()?;

    let regions = regions_for(config)?;
    let plan = WorkEnumerator::new(config.utc_offset_hours, config.months_to_fetch)?
        .plan(Utc::now(), regions.codes);

    let fetcher = ApiFetcher::new(&config.api)?;
    let store = open_store(&config.store, config.api.request_timeout())
        .context("Failed to open store")?;

    let mut pipeline = IngestPipeline::new(fetcher, store)
        .with_concurrency(config.concurrency)
        .with_dry_run(config.dry_run);
    let report = pipeline.run(&plan).await?;

    println!("{}", report.summary());

    if report.has_write_failures() {
        for month in report.months.iter().filter(|m| m.write_error.is_some()) {
            error!(month = %month.month, error = ?month.write_error, "Month not written");
        }
        bail!("{} month(s) failed to write", report.failed_months().len());
    }

    info!("Sync complete");
    Ok(())
}
