//! Data models for transaction ingestion
//!
//! A [`TransactionRecord`] is one `<item>` of the upstream response. The fields that take
//! part in deduplication are modelled explicitly; every other field is carried verbatim
//! in wire order so nothing the upstream reports is lost when rows are written out.

use rtms_common::{RegionCode, YearMonth};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fields with a fixed meaning across deployments
///
/// Each field is recognised under the current English wire tag and under the legacy
/// Korean tag emitted by the older deployment; existing stores may use either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownField {
    DealAmount,
    DealYear,
    DealMonth,
    DealDay,
    ExclusiveArea,
    Jibun,
    Floor,
    SggCode,
    UmdCode,
}

impl KnownField {
    /// All known fields, in identity-key order
    pub const ALL: [KnownField; 9] = [
        KnownField::DealAmount,
        KnownField::DealYear,
        KnownField::DealMonth,
        KnownField::DealDay,
        KnownField::ExclusiveArea,
        KnownField::Jibun,
        KnownField::Floor,
        KnownField::SggCode,
        KnownField::UmdCode,
    ];

    /// Column name used when this crate writes the field
    pub fn canonical(self) -> &'static str {
        self.aliases()[0]
    }

    /// Every tag this field is recognised under; the first entry is canonical
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            KnownField::DealAmount => &["dealAmount", "거래금액"],
            KnownField::DealYear => &["dealYear", "년"],
            KnownField::DealMonth => &["dealMonth", "월"],
            KnownField::DealDay => &["dealDay", "일"],
            KnownField::ExclusiveArea => &["excluUseAr", "전용면적"],
            KnownField::Jibun => &["jibun", "지번"],
            KnownField::Floor => &["floor", "층"],
            KnownField::SggCode => &["sggCd", "법정동시군구코드"],
            KnownField::UmdCode => &["umdCd", "법정동읍면동코드"],
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        let tag = tag.trim();
        Self::ALL
            .into_iter()
            .find(|field| field.aliases().contains(&tag))
    }
}

/// One upstream transaction
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub deal_amount: Option<String>,
    pub deal_year: Option<String>,
    pub deal_month: Option<String>,
    pub deal_day: Option<String>,
    pub exclusive_area: Option<String>,
    pub jibun: Option<String>,
    pub floor: Option<String>,
    pub sgg_code: Option<String>,
    pub umd_code: Option<String>,
    /// Unrecognised fields in the order they were first seen
    pub extra: Vec<(String, String)>,
}

impl TransactionRecord {
    /// Build a record from `(name, value)` pairs
    ///
    /// Names and values are trimmed. When a field appears twice (directly or through an
    /// alias) the first occurrence wins.
    pub fn from_fields<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut record = Self::default();
        for (name, value) in fields {
            record.insert(name.as_ref(), value.as_ref());
        }
        record
    }

    fn insert(&mut self, name: &str, value: &str) {
        let name = name.trim();
        let value = value.trim().to_string();

        match KnownField::from_tag(name) {
            Some(field) => {
                let slot = self.slot_mut(field);
                if slot.is_none() {
                    *slot = Some(value);
                }
            },
            None => {
                if !self.extra.iter().any(|(existing, _)| existing == name) {
                    self.extra.push((name.to_string(), value));
                }
            },
        }
    }

    pub fn get(&self, field: KnownField) -> Option<&str> {
        let slot = match field {
            KnownField::DealAmount => &self.deal_amount,
            KnownField::DealYear => &self.deal_year,
            KnownField::DealMonth => &self.deal_month,
            KnownField::DealDay => &self.deal_day,
            KnownField::ExclusiveArea => &self.exclusive_area,
            KnownField::Jibun => &self.jibun,
            KnownField::Floor => &self.floor,
            KnownField::SggCode => &self.sgg_code,
            KnownField::UmdCode => &self.umd_code,
        };
        slot.as_deref()
    }

    fn slot_mut(&mut self, field: KnownField) -> &mut Option<String> {
        match field {
            KnownField::DealAmount => &mut self.deal_amount,
            KnownField::DealYear => &mut self.deal_year,
            KnownField::DealMonth => &mut self.deal_month,
            KnownField::DealDay => &mut self.deal_day,
            KnownField::ExclusiveArea => &mut self.exclusive_area,
            KnownField::Jibun => &mut self.jibun,
            KnownField::Floor => &mut self.floor,
            KnownField::SggCode => &mut self.sgg_code,
            KnownField::UmdCode => &mut self.umd_code,
        }
    }

    /// Value stored under a column name, resolving known-field aliases
    pub fn value_for_column(&self, column: &str) -> Option<&str> {
        let column = column.trim();
        match KnownField::from_tag(column) {
            Some(field) => self.get(field),
            None => self
                .extra
                .iter()
                .find(|(name, _)| name == column)
                .map(|(_, value)| value.as_str()),
        }
    }

    /// Column names this record carries: present known fields first, then extras
    pub fn columns(&self) -> Vec<String> {
        KnownField::ALL
            .into_iter()
            .filter(|field| self.get(*field).is_some())
            .map(|field| field.canonical().to_string())
            .chain(self.extra.iter().map(|(name, _)| name.clone()))
            .collect()
    }
}

/// One fetchable slice of upstream data
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkUnit {
    pub region: RegionCode,
    pub month: YearMonth,
}

impl WorkUnit {
    pub fn new(region: RegionCode, month: YearMonth) -> Self {
        Self { region, month }
    }
}

impl fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.region, self.month)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_known_field_aliases() {
        assert_eq!(KnownField::from_tag("dealAmount"), Some(KnownField::DealAmount));
        assert_eq!(KnownField::from_tag("거래금액"), Some(KnownField::DealAmount));
        assert_eq!(KnownField::from_tag(" 층 "), Some(KnownField::Floor));
        assert_eq!(KnownField::from_tag("aptNm"), None);
        assert_eq!(KnownField::UmdCode.canonical(), "umdCd");
    }

    #[test]
    fn test_from_fields_trims_and_keeps_extras_in_order() {
        let record = TransactionRecord::from_fields([
            ("aptNm", " 래미안 "),
            ("dealAmount", "   50,000"),
            ("buildYear", "2008"),
            ("floor", "7 "),
        ]);

        assert_eq!(record.deal_amount.as_deref(), Some("50,000"));
        assert_eq!(record.floor.as_deref(), Some("7"));
        assert_eq!(
            record.extra,
            vec![
                ("aptNm".to_string(), "래미안".to_string()),
                ("buildYear".to_string(), "2008".to_string()),
            ]
        );
        assert_eq!(record.columns(), vec!["dealAmount", "floor", "aptNm", "buildYear"]);
    }

    #[test]
    fn test_first_occurrence_wins() {
        let record = TransactionRecord::from_fields([("dealYear", "2025"), ("년", "1999")]);
        assert_eq!(record.deal_year.as_deref(), Some("2025"));
    }

    #[test]
    fn test_value_for_column_resolves_aliases() {
        let record = TransactionRecord::from_fields([("dealAmount", "50,000"), ("aptNm", "A")]);
        assert_eq!(record.value_for_column("거래금액"), Some("50,000"));
        assert_eq!(record.value_for_column("aptNm"), Some("A"));
        assert_eq!(record.value_for_column("missing"), None);
    }

    #[test]
    fn test_work_unit_display() {
        let unit = WorkUnit::new(
            RegionCode::parse("11110").unwrap(),
            YearMonth::parse("202501").unwrap(),
        );
        assert_eq!(unit.to_string(), "11110@202501");
    }
}
