//! Transaction fetcher
//!
//! Resolves one [`WorkUnit`] to all of its records by walking pages until a page comes
//! back empty. Only transport failures are retried; a malformed payload or a hard API
//! error abandons the unit straight away.

use async_trait::async_trait;
use reqwest::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::config::ApiConfig;
use crate::error::{FetchError, IngestError, Result, TransportError};
use crate::models::{TransactionRecord, WorkUnit};
use crate::parser::{ResponseParser, ResponseStatus};
use crate::retry::RetryPolicy;

/// Anything that can resolve a work unit to records
#[async_trait]
pub trait TransactionSource: Send + Sync {
    async fn fetch(&self, unit: &WorkUnit) -> std::result::Result<Vec<TransactionRecord>, FetchError>;
}

/// Fetcher for the public transaction API
pub struct ApiFetcher {
    client: Client,
    base_url: Url,
    service_key: String,
    page_size: u32,
    request_delay: Duration,
    retry: RetryPolicy,
    parser: ResponseParser,
    /// Set once the first request has gone out; every later request is paced
    started: AtomicBool,
}

impl ApiFetcher {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            IngestError::config(format!("Invalid API base URL '{}': {}", config.base_url, e))
        })?;

        let mut builder = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.as_str());
        // Cipher security level still follows the system TLS library configuration
        if config.legacy_tls {
            builder = builder.min_tls_version(reqwest::tls::Version::TLS_1_0);
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            base_url,
            service_key: config.service_key.clone(),
            page_size: config.page_size,
            request_delay: config.request_delay(),
            retry: config.retry.clone(),
            parser: ResponseParser::new(config.result_codes.clone()),
            started: AtomicBool::new(false),
        })
    }

    async fn pace(&self) {
        if self.started.swap(true, Ordering::SeqCst) && !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }
    }

    /// One HTTP round trip for one page
    async fn request_page(
        &self,
        unit: &WorkUnit,
        page: u32,
    ) -> std::result::Result<String, TransportError> {
        self.pace().await;

        let month = unit.month.to_string();
        let page_no = page.to_string();
        let page_size = self.page_size.to_string();

        let response = self
            .client
            .get(self.base_url.clone())
            .query(&[
                ("serviceKey", self.service_key.as_str()),
                ("LAWD_CD", unit.region.as_str()),
                ("DEAL_YMD", month.as_str()),
                ("pageNo", page_no.as_str()),
                ("numOfRows", page_size.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        Ok(response.text().await?)
    }

    /// Fetch a page body, retrying transport failures under the configured policy
    async fn fetch_page(
        &self,
        unit: &WorkUnit,
        page: u32,
    ) -> std::result::Result<String, FetchError> {
        let context = format!("{unit} page {page}");
        self.retry
            .run(&context, |_| self.request_page(unit, page))
            .await
            .map_err(|exhausted| FetchError::Transport {
                attempts: exhausted.attempts,
                source: exhausted.last_error,
            })
    }

    /// Walk the unit's pages, returning the records and how many pages carried items
    async fn fetch_unit(
        &self,
        unit: &WorkUnit,
    ) -> std::result::Result<(Vec<TransactionRecord>, u32), FetchError> {
        let mut records = Vec::new();
        let mut page = 1u32;
        let mut pages = 0u32;

        loop {
            let body = self.fetch_page(unit, page).await?;
            let parsed = self.parser.parse(&body)?;

            match parsed.status {
                ResponseStatus::Success if parsed.records.is_empty() => break,
                ResponseStatus::Success => {
                    debug!(
                        region = %unit.region,
                        month = %unit.month,
                        page,
                        items = parsed.records.len(),
                        total_count = ?parsed.total_count,
                        "Fetched page"
                    );
                    records.extend(parsed.records);
                    pages += 1;
                    page += 1;
                },
                ResponseStatus::NoData => {
                    debug!(region = %unit.region, month = %unit.month, page, "No data for unit");
                    break;
                },
                ResponseStatus::ApiError {
                    code,
                    message,
                    class,
                } => {
                    return Err(FetchError::Api {
                        code,
                        message,
                        class,
                    });
                },
            }
        }

        Ok((records, pages))
    }
}

#[async_trait]
impl TransactionSource for ApiFetcher {
    async fn fetch(&self, unit: &WorkUnit) -> std::result::Result<Vec<TransactionRecord>, FetchError> {
        let (records, pages) = self.fetch_unit(unit).await?;
        info!(
            region = %unit.region,
            month = %unit.month,
            pages,
            records = records.len(),
            "Fetched unit"
        );
        Ok(records)
    }
}
