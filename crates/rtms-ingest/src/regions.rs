//! Region list loading
//!
//! The region file is a CSV with a `code` column holding one administrative code per row.
//! Malformed and aggregate codes are excluded and counted; repeats keep their first
//! position.

use rtms_common::RegionCode;
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

use crate::error::{IngestError, Result};

/// Name of the column holding region codes
pub const CODE_COLUMN: &str = "code";

/// Validated region codes plus what was excluded on the way
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionList {
    pub codes: Vec<RegionCode>,
    /// Data rows read from the file
    pub rows: usize,
    /// Non-numeric or wrong-length values
    pub malformed: usize,
    /// Province-level codes ending in `000`
    pub aggregate: usize,
    pub duplicates: usize,
    /// Valid codes dropped by the allow-list
    pub not_allowed: usize,
}

impl RegionList {
    pub fn excluded(&self) -> usize {
        self.malformed + self.aggregate + self.duplicates + self.not_allowed
    }

    /// Keep only codes named in `allow`, preserving file order
    pub fn apply_allow_list(&mut self, allow: &[String]) {
        let allowed: HashSet<&str> = allow.iter().map(|code| code.trim()).collect();

        for code in &allowed {
            if !self.codes.iter().any(|c| c.as_str() == *code) {
                warn!(code, "Allow-listed region is not in the region file");
            }
        }

        let before = self.codes.len();
        self.codes.retain(|code| allowed.contains(code.as_str()));
        self.not_allowed += before - self.codes.len();
    }
}

/// Load the region list from a CSV file
pub fn load_region_codes(path: &Path) -> Result<RegionList> {
    let file = std::fs::File::open(path).map_err(|e| {
        IngestError::config(format!("Cannot read region file {}: {}", path.display(), e))
    })?;
    let list = parse_region_codes(file)?;

    info!(
        path = %path.display(),
        loaded = list.codes.len(),
        malformed = list.malformed,
        aggregate = list.aggregate,
        duplicates = list.duplicates,
        "Loaded region codes"
    );
    Ok(list)
}

/// Parse region codes from CSV text
pub fn parse_region_codes<R: Read>(reader: R) -> Result<RegionList> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| IngestError::RegionList(e.to_string()))?
        .clone();
    let column = headers
        .iter()
        .position(|name| name.trim_start_matches('\u{feff}').eq_ignore_ascii_case(CODE_COLUMN))
        .ok_or_else(|| {
            IngestError::config(format!("Region file has no '{CODE_COLUMN}' column"))
        })?;

    let mut list = RegionList::default();
    let mut seen = HashSet::new();

    for row in reader.records() {
        let row = row.map_err(|e| IngestError::RegionList(e.to_string()))?;
        list.rows += 1;
        let raw = row.get(column).unwrap_or("");

        match RegionCode::parse(raw) {
            Ok(code) => {
                if seen.insert(code.clone()) {
                    list.codes.push(code);
                } else {
                    list.duplicates += 1;
                }
            },
            Err(_) if RegionCode::is_aggregate(raw) => list.aggregate += 1,
            Err(_) => list.malformed += 1,
        }
    }

    if list.excluded() > 0 {
        warn!(
            malformed = list.malformed,
            aggregate = list.aggregate,
            duplicates = list.duplicates,
            "Excluded region codes"
        );
    }
    Ok(list)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = "name,code\n서울특별시,11000\n종로구,11110\n중구, 11140 \n잘못된,11a10\n짧은,1111\n종로구,11110\n";

    #[test]
    fn test_parse_excludes_and_counts() {
        let list = parse_region_codes(SAMPLE.as_bytes()).unwrap();
        let codes: Vec<&str> = list.codes.iter().map(RegionCode::as_str).collect();

        assert_eq!(codes, vec!["11110", "11140"]);
        assert_eq!(list.rows, 6);
        assert_eq!(list.aggregate, 1);
        assert_eq!(list.malformed, 2);
        assert_eq!(list.duplicates, 1);
        assert_eq!(list.excluded(), 4);
    }

    #[test]
    fn test_missing_code_column_is_configuration_error() {
        let err = parse_region_codes("name,lawd\n종로구,11110\n".as_bytes()).unwrap_err();
        assert!(matches!(err, IngestError::Configuration(_)));
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let err = load_region_codes(Path::new("/nonexistent/lawd_code.csv")).unwrap_err();
        assert!(matches!(err, IngestError::Configuration(_)));
    }

    #[test]
    fn test_allow_list_keeps_file_order() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "code\n26110\n11110\n11140\n").unwrap();

        let mut list = load_region_codes(file.path()).unwrap();
        list.apply_allow_list(&["11140".to_string(), " 26110".to_string(), "99999".to_string()]);

        let codes: Vec<&str> = list.codes.iter().map(RegionCode::as_str).collect();
        assert_eq!(codes, vec!["26110", "11140"]);
        assert_eq!(list.not_allowed, 1);
    }
}
