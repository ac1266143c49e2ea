//! A sheet as read from the sheet service, before interpretation.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::metadata::{SheetMetadata, SheetSource};
use crate::record::ExtractedRecord;
use crate::verification::{NextVerificationDate, scan_next_verification_dates};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSheet {
    pub source: SheetSource,
    /// The metadata rows.
    pub header: Vec<Vec<String>>,
    /// The body rows addressed by the metadata range.
    pub rows: Vec<Vec<String>>,
    /// The verification-date column over the body rows, when declared.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verification_cells: Vec<String>,
}

impl RawSheet {
    pub fn metadata(&self) -> Result<SheetMetadata, CoreError> {
        SheetMetadata::from_header(self.source.clone(), &self.header)
    }

    pub fn extract(&self) -> Result<Vec<ExtractedRecord>, CoreError> {
        crate::extract::extract(&self.metadata()?, &self.rows)
    }

    pub fn next_verification_dates(&self) -> Result<Vec<NextVerificationDate>, CoreError> {
        Ok(scan_next_verification_dates(&self.metadata()?, &self.verification_cells))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn extracts_from_header_and_body() {
        let sheet = RawSheet {
            source: SheetSource::new("ss", "Courts", "0", "Sheet1"),
            header: strings(&[
                &["format", "start_row", "end_row", "category"],
                &["standard-institution", "3", "4", "Judiciary"],
            ]),
            rows: strings(&[&["Name", "Answer"], &["Acme Court", "Yes"]]),
            verification_cells: vec![],
        };
        let records = sheet.extract().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].institution_name(), "Acme Court");
        assert!(sheet.next_verification_dates().unwrap().is_empty());
    }

    #[test]
    fn snapshot_json_omits_empty_verification_cells() {
        let sheet = RawSheet {
            source: SheetSource::new("ss", "Courts", "0", "Sheet1"),
            header: vec![],
            rows: vec![],
            verification_cells: vec![],
        };
        let json = serde_json::to_value(&sheet).unwrap();
        assert!(json.get("verification_cells").is_none());
        let back: RawSheet = serde_json::from_value(json).unwrap();
        assert_eq!(back, sheet);
    }
}
