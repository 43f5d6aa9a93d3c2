//! Error types shared across the RTMS workspace

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, CommonError>;

/// Validation errors raised by the shared value types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommonError {
    #[error("Invalid region code '{0}': expected five digits not ending in 000")]
    InvalidRegionCode(String),

    #[error("Invalid year-month '{0}': expected YYYYMM")]
    InvalidYearMonth(String),
}
