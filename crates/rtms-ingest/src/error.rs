//! Error types for the ingestion pipeline
//!
//! Unit-level failures ([`FetchError`]) are absorbed by the orchestrator and counted;
//! only [`IngestError`] is visible to callers of a run.

use rtms_common::{CommonError, YearMonth};
use thiserror::Error;

use crate::store::StoreError;

/// Result type alias for run-level operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// How a non-success result code is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    /// Invalid, expired or unauthorised credential
    Credential,
    /// A code the configured policy does not know
    Unknown,
}

/// Failure to move bytes between us and the upstream API
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("upstream answered HTTP {0}")]
    Status(u16),
}

/// Why a single work unit produced no records
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("transport failure after {attempts} attempt(s): {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("API error {code} ({class:?}): {message}")]
    Api {
        code: String,
        message: String,
        class: ApiErrorClass,
    },
}

/// Failures that are visible at run level
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    InvalidValue(#[from] CommonError),

    #[error("Region list error: {0}")]
    RegionList(String),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Failed to load existing records from {store}: {source}")]
    SnapshotLoad {
        store: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to write month {month} to {store}: {source}")]
    Write {
        month: YearMonth,
        store: String,
        #[source]
        source: StoreError,
    },
}

impl IngestError {
    pub fn config(message: impl Into<String>) -> Self {
        IngestError::Configuration(message.into())
    }
}
