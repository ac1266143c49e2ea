//! The sheet service seam and sheet fetching.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sigla_core::{Column, RangeAddress, RawSheet, SheetMetadata, SheetSource};
use tracing::{debug, info};

use crate::{RetryPolicy, SyncError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetInfo {
    pub sheet_id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpreadsheetInfo {
    pub spreadsheet_id: String,
    pub title: String,
    pub sheets: Vec<SheetInfo>,
}

impl SpreadsheetInfo {
    pub fn source(&self, sheet: &SheetInfo) -> SheetSource {
        SheetSource::new(
            self.spreadsheet_id.clone(),
            self.title.clone(),
            sheet.sheet_id.clone(),
            sheet.title.clone(),
        )
    }
}

/// Read access to a spreadsheet service.
///
/// Cells come back as strings, row-major. Like the services this models, a
/// reader may omit trailing empty cells of a row and trailing empty rows.
#[async_trait]
pub trait SheetReader: Send + Sync {
    async fn spreadsheet(&self, spreadsheet_id: &str) -> Result<SpreadsheetInfo, SyncError>;

    async fn read(
        &self,
        spreadsheet_id: &str,
        range: &RangeAddress,
    ) -> Result<Vec<Vec<String>>, SyncError>;
}

/// Spreadsheet info, retrying on quota errors.
pub async fn fetch_spreadsheet(
    reader: &dyn SheetReader,
    policy: &RetryPolicy,
    spreadsheet_id: &str,
) -> Result<SpreadsheetInfo, SyncError> {
    policy
        .run("spreadsheet", move || reader.spreadsheet(spreadsheet_id))
        .await
}

async fn read_range(
    reader: &dyn SheetReader,
    policy: &RetryPolicy,
    spreadsheet_id: &str,
    range: &RangeAddress,
) -> Result<Vec<Vec<String>>, SyncError> {
    policy
        .run("range", move || reader.read(spreadsheet_id, range))
        .await
}

/// Read one sheet: its metadata rows, the body they declare and, when
/// declared, the verification-date column.
///
/// Body rows are padded with empty cells to the declared column width, or
/// to the width of the header rows when the sheet declares no columns.
pub async fn fetch_sheet(
    reader: &dyn SheetReader,
    policy: &RetryPolicy,
    spreadsheet: &SpreadsheetInfo,
    sheet: &SheetInfo,
) -> Result<RawSheet, SyncError> {
    let id = spreadsheet.spreadsheet_id.as_str();
    let source = spreadsheet.source(sheet);

    let header_range = RangeAddress::header(sheet.sheet_id.clone(), sheet.title.clone());
    let header = read_range(reader, policy, id, &header_range).await?;
    let metadata = SheetMetadata::from_header(source.clone(), &header)?;

    let mut rows = read_range(reader, policy, id, &metadata.range).await?;
    let width = metadata.range.column_count().unwrap_or_else(|| {
        rows.iter()
            .take(metadata.format.header_rows())
            .map(Vec::len)
            .max()
            .unwrap_or_default()
    });
    for row in &mut rows {
        if row.len() < width {
            row.resize(width, String::new());
        }
    }

    let verification_cells = match metadata.date_of_next_verification_column {
        Some(column) => {
            let range = RangeAddress::parse(
                sheet.sheet_id.clone(),
                sheet.title.clone(),
                metadata.range.start_row,
                metadata.range.end_row,
                Some(Column::Index(column)),
                Some(Column::Index(column)),
            )?;
            read_range(reader, policy, id, &range)
                .await?
                .into_iter()
                .map(|row| row.into_iter().next().unwrap_or_default())
                .collect()
        }
        None => Vec::new(),
    };

    debug!(
        spreadsheet = %spreadsheet.title,
        sheet = %sheet.title,
        rows = rows.len(),
        "fetched sheet"
    );
    Ok(RawSheet {
        source,
        header,
        rows,
        verification_cells,
    })
}

/// Spreadsheet ids listed in the first column of a master spreadsheet's first
/// sheet body.
pub async fn spreadsheet_ids_from_master(
    reader: &dyn SheetReader,
    policy: &RetryPolicy,
    master_spreadsheet_id: &str,
) -> Result<Vec<String>, SyncError> {
    let spreadsheet = fetch_spreadsheet(reader, policy, master_spreadsheet_id).await?;
    let first = spreadsheet
        .sheets
        .first()
        .ok_or_else(|| SyncError::UnableToAccessSpreadsheet {
            spreadsheet_id: master_spreadsheet_id.to_string(),
            reason: "master spreadsheet has no sheets".into(),
        })?;
    let sheet = fetch_sheet(reader, policy, &spreadsheet, first).await?;
    let ids: Vec<String> = sheet
        .rows
        .iter()
        .filter_map(|row| row.first())
        .map(|cell| cell.trim())
        .filter(|cell| !cell.is_empty())
        .map(str::to_string)
        .collect();
    info!(
        count = ids.len(),
        master = master_spreadsheet_id,
        "found spreadsheets in master spreadsheet"
    );
    Ok(ids)
}
