//! Work enumeration
//!
//! Units are ordered by month, most recent first, and by region list order within a month.

use chrono::{DateTime, FixedOffset, Utc};
use rtms_common::{RegionCode, YearMonth};

use crate::error::{IngestError, Result};
use crate::models::WorkUnit;

/// Months and regions of one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkPlan {
    pub months: Vec<YearMonth>,
    pub regions: Vec<RegionCode>,
}

impl WorkPlan {
    pub fn new(months: Vec<YearMonth>, regions: Vec<RegionCode>) -> Self {
        Self { months, regions }
    }

    /// Number of units the plan expands to
    pub fn len(&self) -> usize {
        self.months.len() * self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Units of one month, in region order
    pub fn units_for(&self, month: YearMonth) -> Vec<WorkUnit> {
        self.regions
            .iter()
            .map(|region| WorkUnit::new(region.clone(), month))
            .collect()
    }

    /// Every unit of the plan, month-major
    pub fn units(&self) -> impl Iterator<Item = WorkUnit> + '_ {
        self.months
            .iter()
            .flat_map(move |month| self.units_for(*month))
    }
}

/// Builds [`WorkPlan`]s from a region list and a month-window policy
#[derive(Debug, Clone)]
pub struct WorkEnumerator {
    offset: FixedOffset,
    months_to_fetch: usize,
}

impl WorkEnumerator {
    pub fn new(utc_offset_hours: i32, months_to_fetch: usize) -> Result<Self> {
        let offset = utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| IngestError::config(format!("Invalid UTC offset: {utc_offset_hours}h")))?;
        Ok(Self {
            offset,
            months_to_fetch,
        })
    }

    /// Month window ending at the civil month of `now`
    pub fn months_at(&self, now: DateTime<Utc>) -> Vec<YearMonth> {
        let local = now.with_timezone(&self.offset);
        YearMonth::window_ending_at(YearMonth::of(&local), self.months_to_fetch)
    }

    pub fn plan(&self, now: DateTime<Utc>, regions: Vec<RegionCode>) -> WorkPlan {
        WorkPlan::new(self.months_at(now), regions)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn regions(codes: &[&str]) -> Vec<RegionCode> {
        codes.iter().map(|c| RegionCode::parse(c).unwrap()).collect()
    }

    #[test]
    fn test_month_window_uses_civil_calendar() {
        // 2025-01-31 16:00 UTC is already February in KST
        let now = Utc.with_ymd_and_hms(2025, 1, 31, 16, 0, 0).unwrap();

        let kst = WorkEnumerator::new(9, 2).unwrap();
        let months: Vec<String> = kst.months_at(now).iter().map(|m| m.to_string()).collect();
        assert_eq!(months, vec!["202502", "202501"]);

        let utc = WorkEnumerator::new(0, 3).unwrap();
        let months: Vec<String> = utc.months_at(now).iter().map(|m| m.to_string()).collect();
        assert_eq!(months, vec!["202501", "202412", "202411"]);
    }

    #[test]
    fn test_units_are_month_major_in_region_order() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap();
        let plan = WorkEnumerator::new(9, 2)
            .unwrap()
            .plan(now, regions(&["26110", "11110"]));

        let units: Vec<String> = plan.units().map(|u| u.to_string()).collect();
        assert_eq!(
            units,
            vec!["26110@202503", "11110@202503", "26110@202502", "11110@202502"]
        );
        assert_eq!(plan.len(), 4);
    }

    #[test]
    fn test_empty_inputs_yield_no_work() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap();
        let plan = WorkEnumerator::new(9, 2).unwrap().plan(now, Vec::new());
        assert!(plan.is_empty());
        assert_eq!(plan.units().count(), 0);

        let plan = WorkEnumerator::new(9, 0).unwrap().plan(now, regions(&["11110"]));
        assert!(plan.is_empty());
    }

    #[test]
    fn test_invalid_offset() {
        assert!(WorkEnumerator::new(30, 2).is_err());
    }
}
