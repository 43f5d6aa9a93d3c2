//! RTMS Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Incremental sync of apartment trade records from the public real-transaction API into
//! an append-only tabular store.
//!
//! # Components
//!
//! - **Enumerator**: expands a region list and a month window into work units
//! - **Fetcher**: pages through the API for one unit, retrying transport failures
//! - **Parser**: turns response XML into records and a classified status
//! - **Reconciliation**: drops records whose identity the store already holds
//! - **Store**: CSV file and Google Sheets backends with header projection
//! - **Pipeline**: runs the above month by month and reports counts
//!
//! # Example
//!
//! ```no_run
//! use chrono::Utc;
//! use rtms_ingest::{
//!     config::IngestConfig, enumerator::WorkEnumerator, fetcher::ApiFetcher,
//!     pipeline::IngestPipeline, regions::load_region_codes, store::CsvFileStore,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::from_env()?;
//!     config.validate()?;
//!
//!     let regions = load_region_codes(&config.region_file)?;
//!     let plan = WorkEnumerator::new(config.utc_offset_hours, config.months_to_fetch)?
//!         .plan(Utc::now(), regions.codes);
//!
//!     let fetcher = ApiFetcher::new(&config.api)?;
//!     let mut pipeline = IngestPipeline::new(fetcher, CsvFileStore::new("transactions.csv"));
//!     let report = pipeline.run(&plan).await?;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod enumerator;
pub mod error;
pub mod fetcher;
pub mod identity;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod reconcile;
pub mod regions;
pub mod retry;
pub mod store;

pub use config::{IngestConfig, StoreConfig};
pub use error::{FetchError, IngestError, Result};
pub use models::{TransactionRecord, WorkUnit};
pub use pipeline::{IngestPipeline, RunReport};
