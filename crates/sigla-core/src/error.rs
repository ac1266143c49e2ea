use chrono::NaiveDate;
use thiserror::Error;

use crate::schema::SchemaViolation;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error(
        "sheet '{sheet_title}': missing either the start column or the end column \
         (start: {start:?}, end: {end:?}); both must be present or absent together"
    )]
    IncompleteColumnRange {
        sheet_title: String,
        start: Option<String>,
        end: Option<String>,
    },

    #[error(
        "sheet '{sheet_title}': missing either the start row or the end row \
         (start: {start:?}, end: {end:?}); both must be present or absent together"
    )]
    IncompleteRowRange {
        sheet_title: String,
        start: Option<u32>,
        end: Option<u32>,
    },

    #[error("sheet '{sheet_title}': invalid range, start {start} is after end {end}")]
    InvalidRange {
        sheet_title: String,
        start: String,
        end: String,
    },

    #[error("sheet '{sheet_title}': '{column}' is not a column name")]
    InvalidColumnName { sheet_title: String, column: String },

    #[error("sheet '{sheet_title}': unrecognized sheet format '{format}'")]
    UnrecognizedFormat { sheet_title: String, format: String },

    #[error("sheet '{sheet_title}': unable to create formatted sheet data: {fault}")]
    UnableToCreateFormattedSheetData {
        sheet_title: String,
        fault: FormatFault,
    },

    #[error("invalid date range: start {start} is after end {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("invalid workflow inputs: {0}")]
    InvalidWorkflowInputs(String),

    #[error(transparent)]
    Schema(#[from] SchemaViolation),
}

impl CoreError {
    pub(crate) fn format_fault(sheet_title: &str, fault: FormatFault) -> Self {
        Self::UnableToCreateFormattedSheetData {
            sheet_title: sheet_title.to_string(),
            fault,
        }
    }
}

/// Why a sheet body could not be turned into records.
///
/// Row numbers are the 1-based rows a person sees in the sheet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatFault {
    #[error("no header row in the declared range")]
    MissingHeaderRow,

    #[error("required column '{0}' not found in header")]
    MissingHeading(String),

    #[error("heading '{0}' appears more than once")]
    DuplicateHeading(String),

    #[error("column {column} has no heading")]
    BlankHeading { column: String },

    #[error("row {row}: expected {expected} cells to match the headings, found {found}")]
    RowAlignment {
        row: u32,
        expected: usize,
        found: usize,
    },

    #[error("row {row}: empty cell under '{heading}'")]
    EmptyCell { row: u32, heading: String },

    #[error("row {row}: '{value}' under '{heading}' is not {expected}")]
    MalformedCell {
        row: u32,
        heading: String,
        value: String,
        expected: &'static str,
    },

    #[error("'{0}' column has no variable column before it")]
    OrphanAnnotation(String),

    #[error("answer column {column} of '{heading}' has no answer key")]
    MissingAnswerKey { heading: String, column: String },

    #[error("variable '{variable}' lists constituent '{constituent}' which is not an earlier heading")]
    MissingConstituent {
        variable: String,
        constituent: String,
    },

    #[error("row {row}: standard variable '{heading}' may not list constituents")]
    UnexpectedConstituents { row: u32, heading: String },

    #[error("row {row}: aggregate variable '{heading}' has an authored answer")]
    AuthoredAggregateAnswer { row: u32, heading: String },

    #[error("metadata field '{0}' is missing")]
    MissingMetadataField(&'static str),

    #[error("metadata field '{field}' has malformed value '{value}'")]
    MalformedMetadata { field: &'static str, value: String },

    #[error("metadata field '{0}' appears more than once")]
    DuplicateMetadataField(String),
}
