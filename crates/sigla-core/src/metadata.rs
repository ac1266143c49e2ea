//! Sheet identity and the metadata header block.
//!
//! The first two rows of every sheet describe the rest of it: row 1 holds
//! keys, row 2 the value under each key.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, FormatFault};
use crate::range::{Column, RangeAddress};
use crate::record::split_sub_categories;

/// Header keys understood by [`SheetMetadata::from_header`].
pub mod field {
    pub const FORMAT: &str = "format";
    pub const DATA_TYPE: &str = "data_type";
    pub const START_ROW: &str = "start_row";
    pub const END_ROW: &str = "end_row";
    pub const START_COLUMN: &str = "start_column";
    pub const END_COLUMN: &str = "end_column";
    pub const VARIABLE_HEADING: &str = "variable_heading";
    pub const VARIABLE_NAME: &str = "variable_name";
    pub const DATE_OF_NEXT_UV_COLUMN: &str = "date_of_next_uv_column";
    pub const INSTITUTION: &str = "institution";
    pub const CATEGORY: &str = "category";
    pub const SUB_CATEGORY: &str = "sub_category";
    pub const COUNTRY: &str = "country";
}

// ── Sheet identity ──

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SheetSource {
    pub spreadsheet_id: String,
    pub spreadsheet_title: String,
    pub sheet_id: String,
    pub sheet_title: String,
}

impl SheetSource {
    pub fn new(
        spreadsheet_id: impl Into<String>,
        spreadsheet_title: impl Into<String>,
        sheet_id: impl Into<String>,
        sheet_title: impl Into<String>,
    ) -> Self {
        Self {
            spreadsheet_id: spreadsheet_id.into(),
            spreadsheet_title: spreadsheet_title.into(),
            sheet_id: sheet_id.into(),
            sheet_title: sheet_title.into(),
        }
    }
}

impl fmt::Display for SheetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.spreadsheet_title, self.sheet_title)
    }
}

// ── Format ──

/// The closed set of sheet layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SheetFormat {
    StandardInstitution,
    InstitutionAndCompositeVariable,
    CompositeVariable,
    MultipleSiglaAnswerVariable,
}

impl SheetFormat {
    pub const ALL: [SheetFormat; 4] = [
        Self::StandardInstitution,
        Self::InstitutionAndCompositeVariable,
        Self::CompositeVariable,
        Self::MultipleSiglaAnswerVariable,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            Self::StandardInstitution => "standard-institution",
            Self::InstitutionAndCompositeVariable => "institution-and-composite-variable",
            Self::CompositeVariable => "composite-variable",
            Self::MultipleSiglaAnswerVariable => "multiple-sigla-answer-variable",
        }
    }

    /// Classify a declared format tag. Matching is exact after trimming.
    pub fn parse(tag: &str, sheet_title: &str) -> Result<Self, CoreError> {
        let tag = tag.trim();
        Self::ALL
            .into_iter()
            .find(|format| format.tag() == tag)
            .ok_or_else(|| CoreError::UnrecognizedFormat {
                sheet_title: sheet_title.to_string(),
                format: tag.to_string(),
            })
    }

    /// Number of header rows at the top of the body.
    pub fn header_rows(&self) -> usize {
        match self {
            Self::MultipleSiglaAnswerVariable => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for SheetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

// ── Metadata ──

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetMetadata {
    pub source: SheetSource,
    pub format: SheetFormat,
    pub data_type: Option<String>,
    pub variable_heading: Option<String>,
    pub variable_name: Option<String>,
    /// 0-based column holding the next verification date, if the sheet has one.
    pub date_of_next_verification_column: Option<u32>,
    /// Body of the sheet: header row(s) plus data rows.
    pub range: RangeAddress,
    pub institution: Option<String>,
    pub category: Option<String>,
    pub sub_categories: Vec<String>,
    pub country: Option<String>,
}

impl SheetMetadata {
    /// Parse the metadata block read from [`RangeAddress::header`].
    pub fn from_header(source: SheetSource, header: &[Vec<String>]) -> Result<Self, CoreError> {
        let title = source.sheet_title.clone();
        let fault = |f: FormatFault| CoreError::format_fault(&title, f);

        let (keys, values) = match header {
            [keys, values, ..] => (keys.as_slice(), values.as_slice()),
            [keys] => (keys.as_slice(), &[][..]),
            [] => return Err(fault(FormatFault::MissingHeaderRow)),
        };

        let mut pairs: Vec<(String, String)> = Vec::new();
        for (i, key) in keys.iter().enumerate() {
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            if pairs.iter().any(|(k, _)| k == key) {
                return Err(fault(FormatFault::DuplicateMetadataField(key.to_string())));
            }
            let value = values.get(i).map(|v| v.trim()).unwrap_or_default();
            pairs.push((key.to_string(), value.to_string()));
        }

        let get = |name: &str| -> Option<String> {
            pairs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
                .filter(|v| !v.is_empty())
        };

        let format_tag =
            get(field::FORMAT).ok_or_else(|| fault(FormatFault::MissingMetadataField(field::FORMAT)))?;
        let format = SheetFormat::parse(&format_tag, &title)?;

        let row = |name: &'static str| -> Result<u32, CoreError> {
            let value = get(name).ok_or_else(|| fault(FormatFault::MissingMetadataField(name)))?;
            match value.parse::<u32>() {
                Ok(n) if n >= 1 => Ok(n - 1),
                _ => Err(fault(FormatFault::MalformedMetadata { field: name, value })),
            }
        };
        let start_row = row(field::START_ROW)?;
        let end_row = row(field::END_ROW)?;

        let range = RangeAddress::parse(
            source.sheet_id.clone(),
            title.clone(),
            Some(start_row),
            Some(end_row),
            get(field::START_COLUMN).map(|c| Column::from_cell(&c)),
            get(field::END_COLUMN).map(|c| Column::from_cell(&c)),
        )?;

        let date_of_next_verification_column = match get(field::DATE_OF_NEXT_UV_COLUMN) {
            None => None,
            Some(value) => {
                let column = RangeAddress::parse(
                    source.sheet_id.clone(),
                    title.clone(),
                    None,
                    None,
                    Some(Column::from_cell(&value)),
                    Some(Column::from_cell(&value)),
                )
                .map_err(|_| {
                    fault(FormatFault::MalformedMetadata {
                        field: field::DATE_OF_NEXT_UV_COLUMN,
                        value,
                    })
                })?;
                column.start_column
            }
        };

        let metadata = Self {
            format,
            data_type: get(field::DATA_TYPE),
            variable_heading: get(field::VARIABLE_HEADING),
            variable_name: get(field::VARIABLE_NAME),
            date_of_next_verification_column,
            range,
            institution: get(field::INSTITUTION),
            category: get(field::CATEGORY),
            sub_categories: get(field::SUB_CATEGORY)
                .map(|s| split_sub_categories(&s))
                .unwrap_or_default(),
            country: get(field::COUNTRY),
            source,
        };
        tracing::debug!(
            sheet = %metadata.source.sheet_title,
            format = %metadata.format,
            range = %metadata.range,
            "parsed sheet metadata"
        );
        Ok(metadata)
    }
}
