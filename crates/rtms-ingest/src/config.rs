//! Ingestion configuration
//!
//! Loaded from `RTMS_*` environment variables (a `.env` file is honoured) and threaded
//! explicitly through the pipeline. The CLI applies its flags on top of this.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{IngestError, Result};
use crate::parser::ResultCodePolicy;
use crate::retry::{Backoff, RetryPolicy};

// ============================================================================
// Defaults
// ============================================================================

/// Apartment trade endpoint of the public data portal
pub const DEFAULT_API_BASE_URL: &str =
    "https://apis.data.go.kr/1613000/RTMSDataSvcAptTrade/getRTMSDataSvcAptTrade";

/// Rows requested per page (the upstream maximum)
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

/// Per-request timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Pause between consecutive requests in milliseconds
pub const DEFAULT_REQUEST_DELAY_MS: u64 = 100;

/// Number of calendar months fetched per run
pub const DEFAULT_MONTHS_TO_FETCH: usize = 2;

/// Offset of the civil calendar used for the month window (KST)
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 9;

pub const DEFAULT_REGION_FILE: &str = "lawd_code.csv";

pub const DEFAULT_CSV_STORE_PATH: &str = "transactions.csv";

pub const DEFAULT_SHEETS_API_BASE_URL: &str = "https://sheets.googleapis.com";

pub const DEFAULT_SHEETS_RANGE: &str = "Sheet1";

/// The upstream rejects requests without a browser-like agent
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Upstream API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Access credential (`serviceKey`)
    pub service_key: String,
    pub base_url: String,
    pub page_size: u32,
    pub request_timeout_secs: u64,
    /// Pause inserted before every request after the first
    pub request_delay_ms: u64,
    pub user_agent: String,
    /// Accept TLS 1.0 and 1.1 for endpoints still serving older handshakes
    #[serde(default)]
    pub legacy_tls: bool,
    pub result_codes: ResultCodePolicy,
    pub retry: RetryPolicy,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            service_key: String::new(),
            base_url: DEFAULT_API_BASE_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            request_delay_ms: DEFAULT_REQUEST_DELAY_MS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            legacy_tls: false,
            result_codes: ResultCodePolicy::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

/// Where accumulated records live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreConfig {
    /// A local CSV file
    Csv { path: PathBuf },
    /// A Google Sheets range reached through the v4 REST API
    Sheets {
        spreadsheet_id: String,
        range: String,
        /// Already-acquired OAuth bearer token
        access_token: String,
        api_base_url: String,
    },
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Csv {
            path: PathBuf::from(DEFAULT_CSV_STORE_PATH),
        }
    }
}

/// Main ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub api: ApiConfig,
    pub store: StoreConfig,
    /// How many months, ending at the current one, to fetch
    pub months_to_fetch: usize,
    pub utc_offset_hours: i32,
    pub region_file: PathBuf,
    /// Restrict the run to these region codes when set
    pub region_allow_list: Option<Vec<String>>,
    /// Units fetched concurrently within a month; 1 means sequential
    pub concurrency: usize,
    /// Fetch and reconcile without appending
    pub dry_run: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            store: StoreConfig::default(),
            months_to_fetch: DEFAULT_MONTHS_TO_FETCH,
            utc_offset_hours: DEFAULT_UTC_OFFSET_HOURS,
            region_file: PathBuf::from(DEFAULT_REGION_FILE),
            region_allow_list: None,
            concurrency: 1,
            dry_run: false,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_list(key: &str) -> Option<Vec<String>> {
    std::env::var(key).ok().map(|raw| split_list(&raw))
}

/// Split a comma-separated list, dropping blanks
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl IngestConfig {
    /// Load configuration from environment variables
    ///
    /// Validation is left to [`IngestConfig::validate`] so CLI overrides can be applied first.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = IngestConfig::default();
        let default_codes = ResultCodePolicy::default();
        let default_retry = RetryPolicy::default();

        let backoff = match std::env::var("RTMS_RETRY_BACKOFF") {
            Ok(raw) => raw.parse::<Backoff>().map_err(IngestError::Configuration)?,
            Err(_) => default_retry.backoff,
        };

        let api = ApiConfig {
            service_key: std::env::var("RTMS_SERVICE_KEY")
                .or_else(|_| std::env::var("SERVICE_KEY"))
                .unwrap_or_default(),
            base_url: std::env::var("RTMS_API_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string()),
            page_size: env_parse("RTMS_PAGE_SIZE", DEFAULT_PAGE_SIZE),
            request_timeout_secs: env_parse(
                "RTMS_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            ),
            request_delay_ms: env_parse("RTMS_REQUEST_DELAY_MS", DEFAULT_REQUEST_DELAY_MS),
            user_agent: std::env::var("RTMS_USER_AGENT")
                .unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string()),
            legacy_tls: env_parse("RTMS_LEGACY_TLS", false),
            result_codes: ResultCodePolicy {
                success: env_list("RTMS_SUCCESS_CODES").unwrap_or(default_codes.success),
                no_data: env_list("RTMS_NO_DATA_CODES").unwrap_or(default_codes.no_data),
                credential: env_list("RTMS_CREDENTIAL_ERROR_CODES")
                    .unwrap_or(default_codes.credential),
            },
            retry: RetryPolicy {
                max_attempts: env_parse("RTMS_RETRY_MAX_ATTEMPTS", default_retry.max_attempts),
                base_delay_ms: env_parse("RTMS_RETRY_BASE_DELAY_MS", default_retry.base_delay_ms),
                max_delay_ms: env_parse("RTMS_RETRY_MAX_DELAY_MS", default_retry.max_delay_ms),
                backoff,
            },
        };

        let store = match std::env::var("RTMS_STORE")
            .unwrap_or_else(|_| "csv".to_string())
            .to_lowercase()
            .as_str()
        {
            "csv" => StoreConfig::Csv {
                path: std::env::var("RTMS_CSV_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_CSV_STORE_PATH)),
            },
            "sheets" => StoreConfig::Sheets {
                spreadsheet_id: std::env::var("RTMS_SHEETS_SPREADSHEET_ID").unwrap_or_default(),
                range: std::env::var("RTMS_SHEETS_RANGE")
                    .unwrap_or_else(|_| DEFAULT_SHEETS_RANGE.to_string()),
                access_token: std::env::var("RTMS_SHEETS_ACCESS_TOKEN").unwrap_or_default(),
                api_base_url: std::env::var("RTMS_SHEETS_API_BASE_URL")
                    .unwrap_or_else(|_| DEFAULT_SHEETS_API_BASE_URL.to_string()),
            },
            other => {
                return Err(IngestError::config(format!(
                    "Invalid RTMS_STORE: {other}. Must be 'csv' or 'sheets'"
                )));
            },
        };

        Ok(Self {
            api,
            store,
            months_to_fetch: env_parse("RTMS_MONTHS", defaults.months_to_fetch),
            utc_offset_hours: env_parse("RTMS_UTC_OFFSET_HOURS", defaults.utc_offset_hours),
            region_file: std::env::var("RTMS_REGION_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.region_file),
            region_allow_list: env_list("RTMS_REGIONS").filter(|codes| !codes.is_empty()),
            concurrency: env_parse("RTMS_CONCURRENCY", defaults.concurrency),
            dry_run: env_parse("RTMS_DRY_RUN", false),
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let api = &self.api;

        if api.service_key.trim().is_empty() {
            return Err(IngestError::config(
                "RTMS_SERVICE_KEY (or SERVICE_KEY) must be set",
            ));
        }
        url::Url::parse(&api.base_url).map_err(|e| {
            IngestError::config(format!("Invalid API base URL '{}': {}", api.base_url, e))
        })?;
        if api.page_size == 0 {
            return Err(IngestError::config("Page size must be greater than 0"));
        }
        if api.request_timeout_secs == 0 {
            return Err(IngestError::config("Request timeout must be greater than 0"));
        }
        if api.retry.max_attempts == 0 {
            return Err(IngestError::config("Retry max attempts must be greater than 0"));
        }
        if api.retry.base_delay_ms > api.retry.max_delay_ms {
            return Err(IngestError::config(format!(
                "Retry base delay ({}ms) cannot be greater than the cap ({}ms)",
                api.retry.base_delay_ms, api.retry.max_delay_ms
            )));
        }
        if api.result_codes.success.is_empty() {
            return Err(IngestError::config("At least one success result code is required"));
        }
        if let Some(code) = api
            .result_codes
            .success
            .iter()
            .find(|code| api.result_codes.no_data.contains(code))
        {
            return Err(IngestError::config(format!(
                "Result code '{code}' cannot mean both success and no data"
            )));
        }
        if self.months_to_fetch == 0 {
            return Err(IngestError::config("Months to fetch must be greater than 0"));
        }
        if !(-12..=14).contains(&self.utc_offset_hours) {
            return Err(IngestError::config(format!(
                "UTC offset {}h is outside -12..=14",
                self.utc_offset_hours
            )));
        }
        if self.concurrency == 0 {
            return Err(IngestError::config("Concurrency must be greater than 0"));
        }

        match &self.store {
            StoreConfig::Csv { path } => {
                if path.as_os_str().is_empty() {
                    return Err(IngestError::config("CSV store path cannot be empty"));
                }
            },
            StoreConfig::Sheets {
                spreadsheet_id,
                access_token,
                api_base_url,
                range,
            } => {
                if spreadsheet_id.is_empty() {
                    return Err(IngestError::config("RTMS_SHEETS_SPREADSHEET_ID must be set"));
                }
                if access_token.is_empty() {
                    return Err(IngestError::config("RTMS_SHEETS_ACCESS_TOKEN must be set"));
                }
                if range.is_empty() {
                    return Err(IngestError::config("Sheets range cannot be empty"));
                }
                url::Url::parse(api_base_url).map_err(|e| {
                    IngestError::config(format!("Invalid Sheets API URL '{api_base_url}': {e}"))
                })?;
            },
        }

        Ok(())
    }

    pub fn with_service_key(mut self, key: impl Into<String>) -> Self {
        self.api.service_key = key.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api.base_url = url.into();
        self
    }

    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    pub fn with_months(mut self, months: usize) -> Self {
        self.months_to_fetch = months;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }
}
