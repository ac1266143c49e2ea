//! Rectangular cell ranges and the column-name codec.
//!
//! Rows and columns are 0-based. Column names use the spreadsheet convention,
//! which is bijective base 26: there is no zero digit, so "A" = 0, "Z" = 25,
//! "AA" = 26, "AZ" = 51, "BA" = 52 and "XFD" = 16383.
//!
//! A [`RangeAddress`] renders as A1 notation (`'Sheet1'!A1:B2`) with 1-based
//! rows, which is what the sheet service expects.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Convert a 0-based column index to its column name.
pub fn column_name(index: u32) -> String {
    let mut n = u64::from(index) + 1;
    let mut letters = Vec::new();
    while n > 0 {
        n -= 1;
        letters.push(char::from(b'A' + (n % 26) as u8));
        n /= 26;
    }
    letters.iter().rev().collect()
}

/// Convert a column name to its 0-based index.
///
/// Returns `None` for anything that is not a non-empty run of `A`-`Z`, or
/// that would not fit in a `u32`.
pub fn column_index(name: &str) -> Option<u32> {
    if name.is_empty() {
        return None;
    }
    let mut n: u64 = 0;
    for b in name.bytes() {
        if !b.is_ascii_uppercase() {
            return None;
        }
        n = n.checked_mul(26)?.checked_add(u64::from(b - b'A') + 1)?;
        if n > u64::from(u32::MAX) + 1 {
            return None;
        }
    }
    u32::try_from(n - 1).ok()
}

/// A column bound as a caller supplies it: an index or a column name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Column {
    Index(u32),
    Name(String),
}

impl Column {
    /// Parse user-entered text: digits are a 0-based index, letters a column
    /// name (case-insensitive).
    pub fn from_cell(text: &str) -> Self {
        let text = text.trim();
        match text.parse::<u32>() {
            Ok(index) => Self::Index(index),
            Err(_) => Self::Name(text.to_ascii_uppercase()),
        }
    }

    fn resolve(&self, sheet_title: &str) -> Result<u32, CoreError> {
        match self {
            Self::Index(index) => Ok(*index),
            Self::Name(name) => {
                column_index(name).ok_or_else(|| CoreError::InvalidColumnName {
                    sheet_title: sheet_title.to_string(),
                    column: name.clone(),
                })
            }
        }
    }
}

impl From<u32> for Column {
    fn from(index: u32) -> Self {
        Self::Index(index)
    }
}

impl From<&str> for Column {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for Column {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "{index}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

/// A validated rectangular region of one sheet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RangeAddress {
    pub sheet_id: String,
    pub sheet_title: String,
    pub start_row: Option<u32>,
    pub end_row: Option<u32>,
    pub start_column: Option<u32>,
    pub end_column: Option<u32>,
}

impl RangeAddress {
    /// Build and validate a range.
    ///
    /// Column bounds are checked for completeness before anything else, so a
    /// lone column bound always reports `IncompleteColumnRange`.
    pub fn parse(
        sheet_id: impl Into<String>,
        sheet_title: impl Into<String>,
        start_row: Option<u32>,
        end_row: Option<u32>,
        start_column: Option<Column>,
        end_column: Option<Column>,
    ) -> Result<Self, CoreError> {
        let sheet_title = sheet_title.into();
        let (start_column, end_column) = match (start_column, end_column) {
            (Some(start), Some(end)) => (
                Some(start.resolve(&sheet_title)?),
                Some(end.resolve(&sheet_title)?),
            ),
            (None, None) => (None, None),
            (start, end) => {
                return Err(CoreError::IncompleteColumnRange {
                    sheet_title,
                    start: start.map(|c| c.to_string()),
                    end: end.map(|c| c.to_string()),
                });
            }
        };

        let range = Self {
            sheet_id: sheet_id.into(),
            sheet_title,
            start_row,
            end_row,
            start_column,
            end_column,
        };
        range.raise_for_validity()?;
        Ok(range)
    }

    /// The two metadata rows at the top of a sheet.
    pub fn header(sheet_id: impl Into<String>, sheet_title: impl Into<String>) -> Self {
        Self {
            sheet_id: sheet_id.into(),
            sheet_title: sheet_title.into(),
            start_row: Some(0),
            end_row: Some(1),
            start_column: None,
            end_column: None,
        }
    }

    /// Re-check the range invariants. Has no side effects.
    pub fn raise_for_validity(&self) -> Result<(), CoreError> {
        match (self.start_column, self.end_column) {
            (Some(start), Some(end)) if start > end => {
                return Err(CoreError::InvalidRange {
                    sheet_title: self.sheet_title.clone(),
                    start: column_name(start),
                    end: column_name(end),
                });
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(CoreError::IncompleteColumnRange {
                    sheet_title: self.sheet_title.clone(),
                    start: self.start_column.map(column_name),
                    end: self.end_column.map(column_name),
                });
            }
            _ => {}
        }

        match (self.start_row, self.end_row) {
            (Some(start), Some(end)) if start > end => Err(CoreError::InvalidRange {
                sheet_title: self.sheet_title.clone(),
                start: (u64::from(start) + 1).to_string(),
                end: (u64::from(end) + 1).to_string(),
            }),
            (Some(_), None) | (None, Some(_)) => Err(CoreError::IncompleteRowRange {
                sheet_title: self.sheet_title.clone(),
                start: self.start_row,
                end: self.end_row,
            }),
            _ => Ok(()),
        }
    }

    /// Number of columns covered, when the columns are bounded.
    pub fn column_count(&self) -> Option<usize> {
        match (self.start_column, self.end_column) {
            (Some(start), Some(end)) => Some((end - start) as usize + 1),
            _ => None,
        }
    }

    /// Number of rows covered, when the rows are bounded.
    pub fn row_count(&self) -> Option<usize> {
        match (self.start_row, self.end_row) {
            (Some(start), Some(end)) => Some((end - start) as usize + 1),
            _ => None,
        }
    }

    /// Sheet row number (1-based) of the `offset`-th row inside this range.
    pub fn sheet_row_number(&self, offset: usize) -> u32 {
        let first = self.start_row.unwrap_or(0);
        first.saturating_add(offset as u32).saturating_add(1)
    }
}

fn quoted_title(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

impl fmt::Display for RangeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = quoted_title(&self.sheet_title);
        let rows = self
            .start_row
            .zip(self.end_row)
            .map(|(s, e)| (u64::from(s) + 1, u64::from(e) + 1));
        let columns = self
            .start_column
            .zip(self.end_column)
            .map(|(s, e)| (column_name(s), column_name(e)));

        match (columns, rows) {
            (Some((sc, ec)), Some((sr, er))) => write!(f, "{title}!{sc}{sr}:{ec}{er}"),
            (Some((sc, ec)), None) => write!(f, "{title}!{sc}:{ec}"),
            (None, Some((sr, er))) => write!(f, "{title}!{sr}:{er}"),
            (None, None) => f.write_str(&title),
        }
    }
}
