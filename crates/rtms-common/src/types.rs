//! Value types used as upstream query parameters

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CommonError, Result};

/// Suffix carried by aggregate (province-level) administrative codes
pub const AGGREGATE_SUFFIX: &str = "000";

/// Length of an administrative region code
pub const REGION_CODE_LEN: usize = 5;

/// A five-digit administrative region code (`LAWD_CD`)
///
/// Aggregate codes ending in `000` cover a whole province and are rejected:
/// the upstream API only serves district-level codes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RegionCode(String);

impl RegionCode {
    /// Parse and validate a region code, trimming surrounding whitespace
    pub fn parse(raw: &str) -> Result<Self> {
        let code = raw.trim();
        let well_formed =
            code.len() == REGION_CODE_LEN && code.bytes().all(|b| b.is_ascii_digit());

        if !well_formed || code.ends_with(AGGREGATE_SUFFIX) {
            return Err(CommonError::InvalidRegionCode(raw.to_string()));
        }

        Ok(Self(code.to_string()))
    }

    /// Whether a raw value is a well-formed code for an aggregate region
    pub fn is_aggregate(raw: &str) -> bool {
        let code = raw.trim();
        code.len() == REGION_CODE_LEN
            && code.bytes().all(|b| b.is_ascii_digit())
            && code.ends_with(AGGREGATE_SUFFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RegionCode {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RegionCode {
    type Error = CommonError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<RegionCode> for String {
    fn from(code: RegionCode) -> Self {
        code.0
    }
}

/// A calendar month rendered as `YYYYMM` (`DEAL_YMD`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) || !(0..=9999).contains(&year) {
            return Err(CommonError::InvalidYearMonth(format!("{year:04}{month:02}")));
        }
        Ok(Self { year, month })
    }

    /// Parse a six-digit `YYYYMM` string
    pub fn parse(raw: &str) -> Result<Self> {
        let value = raw.trim();
        if value.len() != 6 || !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CommonError::InvalidYearMonth(raw.to_string()));
        }

        let year = value[..4]
            .parse::<i32>()
            .map_err(|_| CommonError::InvalidYearMonth(raw.to_string()))?;
        let month = value[4..]
            .parse::<u32>()
            .map_err(|_| CommonError::InvalidYearMonth(raw.to_string()))?;

        Self::new(year, month).map_err(|_| CommonError::InvalidYearMonth(raw.to_string()))
    }

    /// The month containing the given civil date
    pub fn of<D: Datelike>(date: &D) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// The calendar month immediately before this one
    pub fn previous(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    /// `count` consecutive months ending at (and including) `reference`, most recent first
    pub fn window_ending_at(reference: Self, count: usize) -> Vec<Self> {
        let mut months = Vec::with_capacity(count);
        let mut current = reference;
        for _ in 0..count {
            months.push(current);
            current = current.previous();
        }
        months
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for YearMonth {
    type Error = CommonError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<YearMonth> for String {
    fn from(month: YearMonth) -> Self {
        month.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    #[test]
    fn test_region_code_accepts_district_codes() {
        let code = RegionCode::parse(" 11110 ").unwrap();
        assert_eq!(code.as_str(), "11110");
        assert_eq!(code.to_string(), "11110");
    }

    #[test]
    fn test_region_code_rejects_invalid_values() {
        assert!(RegionCode::parse("11000").is_err());
        assert!(RegionCode::parse("1111").is_err());
        assert!(RegionCode::parse("111100").is_err());
        assert!(RegionCode::parse("1111a").is_err());
        assert!(RegionCode::parse("").is_err());
    }

    #[test]
    fn test_region_code_aggregate_detection() {
        assert!(RegionCode::is_aggregate("11000"));
        assert!(!RegionCode::is_aggregate("11110"));
        assert!(!RegionCode::is_aggregate("abc00"));
    }

    #[test]
    fn test_year_month_parse_and_display() {
        let month = YearMonth::parse("202501").unwrap();
        assert_eq!(month.year(), 2025);
        assert_eq!(month.month(), 1);
        assert_eq!(month.to_string(), "202501");

        assert!(YearMonth::parse("202513").is_err());
        assert!(YearMonth::parse("202500").is_err());
        assert!(YearMonth::parse("2025-1").is_err());
    }

    #[test]
    fn test_previous_crosses_year_boundary() {
        let january = YearMonth::new(2025, 1).unwrap();
        assert_eq!(january.previous(), YearMonth::new(2024, 12).unwrap());
    }

    #[test]
    fn test_window_is_most_recent_first() {
        let reference = YearMonth::of(&NaiveDate::from_ymd_opt(2025, 2, 14).unwrap());
        let window = YearMonth::window_ending_at(reference, 3);
        let rendered: Vec<String> = window.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["202502", "202501", "202412"]);
    }

    #[test]
    fn test_window_of_zero_is_empty() {
        let reference = YearMonth::new(2025, 2).unwrap();
        assert!(YearMonth::window_ending_at(reference, 0).is_empty());
    }

    proptest! {
        #[test]
        fn test_window_months_are_consecutive(year in 1990i32..2100, month in 1u32..=12, count in 1usize..40) {
            let reference = YearMonth::new(year, month).unwrap();
            let window = YearMonth::window_ending_at(reference, count);
            prop_assert_eq!(window.len(), count);
            prop_assert_eq!(window[0], reference);
            for pair in window.windows(2) {
                prop_assert_eq!(pair[0].previous(), pair[1]);
                prop_assert!(pair[1] < pair[0]);
            }
        }
    }
}
