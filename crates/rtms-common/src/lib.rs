//! RTMS Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the RTMS sync workspace.
//!
//! # Overview
//!
//! - **Error Handling**: validation errors for the shared value types
//! - **Types**: region codes and calendar months used as API query parameters
//! - **Logging**: tracing subscriber setup shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use rtms_common::{RegionCode, YearMonth};
//!
//! fn first_unit() -> rtms_common::Result<(RegionCode, YearMonth)> {
//!     let region = RegionCode::parse("11110")?;
//!     let month = YearMonth::parse("202501")?;
//!     Ok((region, month))
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{CommonError, Result};
pub use types::{RegionCode, YearMonth};
