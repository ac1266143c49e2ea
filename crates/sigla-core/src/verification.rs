//! Next update-and-verify dates.
//!
//! Sheets may declare a column holding the date each row is next due for
//! review. Scanning that column against a date window tells which rows need
//! attention.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::metadata::SheetMetadata;
use crate::range::column_name;

/// Inclusive date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl VerificationWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, CoreError> {
        if start > end {
            return Err(CoreError::InvalidDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Parse two ISO-8601 dates (`YYYY-MM-DD`).
    pub fn parse(start: &str, end: &str) -> Result<Self, CoreError> {
        Self::new(parse_date(start)?, parse_date(end)?)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

fn parse_date(text: &str) -> Result<NaiveDate, CoreError> {
    text.trim()
        .parse::<NaiveDate>()
        .map_err(|e| CoreError::InvalidWorkflowInputs(format!("'{text}' is not a YYYY-MM-DD date: {e}")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    RequiresVerification,
    IncorrectDateFormat,
    Irrelevant,
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RequiresVerification => "Requires update and verify",
            Self::IncorrectDateFormat => "Incorrect date format",
            Self::Irrelevant => "Irrelevant",
        })
    }
}

/// One non-empty cell of a verification-date column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextVerificationDate {
    pub spreadsheet_title: String,
    pub sheet_title: String,
    pub column: String,
    /// 1-based sheet row.
    pub row: u32,
    pub value: String,
}

impl NextVerificationDate {
    pub fn check(&self, window: &VerificationWindow) -> CheckedVerificationDate {
        let status = match self.value.trim().parse::<NaiveDate>() {
            Ok(date) if window.contains(date) => VerificationStatus::RequiresVerification,
            Ok(_) => VerificationStatus::Irrelevant,
            Err(_) => VerificationStatus::IncorrectDateFormat,
        };
        CheckedVerificationDate {
            status,
            date: self.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckedVerificationDate {
    pub status: VerificationStatus,
    pub date: NextVerificationDate,
}

/// Collect the dates of a verification column.
///
/// `cells` is the column read over the body rows of `metadata.range`, first
/// cell first. Empty cells and heading cells (anything mentioning "date")
/// are skipped. Sheets without a verification column yield nothing.
pub fn scan_next_verification_dates(
    metadata: &SheetMetadata,
    cells: &[String],
) -> Vec<NextVerificationDate> {
    let Some(column) = metadata.date_of_next_verification_column else {
        return Vec::new();
    };
    let column = column_name(column);
    let dates: Vec<NextVerificationDate> = cells
        .iter()
        .enumerate()
        .filter_map(|(offset, cell)| {
            let value = cell.trim();
            if value.is_empty() || value.to_lowercase().contains("date") {
                return None;
            }
            Some(NextVerificationDate {
                spreadsheet_title: metadata.source.spreadsheet_title.clone(),
                sheet_title: metadata.source.sheet_title.clone(),
                column: column.clone(),
                row: metadata.range.sheet_row_number(offset),
                value: value.to_string(),
            })
        })
        .collect();
    tracing::debug!(
        sheet = %metadata.source.sheet_title,
        count = dates.len(),
        "scanned verification dates"
    );
    dates
}
