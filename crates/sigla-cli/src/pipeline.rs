//! Extraction and load pipelines over whole spreadsheets.

use std::time::Instant;

use anyhow::Context;
use futures::StreamExt;
use futures::stream;
use sigla_core::{
    CheckedVerificationDate, ExtractedRecord, PipelineConfig, VerificationStatus,
    VerificationWindow,
};
use sigla_store::{DocumentStore, LoadSummary, replace_spreadsheet};
use sigla_sync::{RetryPolicy, SheetReader, SyncError, fetch_sheet, fetch_spreadsheet};
use tracing::{info, warn};

/// Every record extracted from one spreadsheet, plus the sheets that failed.
pub struct SpreadsheetExtract {
    pub spreadsheet_id: String,
    pub title: String,
    pub records: Vec<ExtractedRecord>,
    pub failures: Vec<SheetFailure>,
}

pub struct SheetFailure {
    pub sheet_title: String,
    pub error: String,
}

impl SpreadsheetExtract {
    /// Whether loading this spreadsheet needs institutions owned by others.
    fn has_variable_records(&self) -> bool {
        self.records
            .iter()
            .any(|r| matches!(r, ExtractedRecord::Variable(_)))
    }
}

/// Fetch and extract every sheet of a spreadsheet, at most
/// `config.max_workers` sheets at a time. Records keep sheet order.
pub async fn extract_spreadsheet(
    reader: &dyn SheetReader,
    config: &PipelineConfig,
    spreadsheet_id: &str,
) -> anyhow::Result<SpreadsheetExtract> {
    let policy = RetryPolicy::from(config);
    let spreadsheet = fetch_spreadsheet(reader, &policy, spreadsheet_id)
        .await
        .with_context(|| format!("reading spreadsheet {spreadsheet_id}"))?;

    let spreadsheet = &spreadsheet;
    let policy = &policy;
    let mut results: Vec<(usize, String, Result<Vec<ExtractedRecord>, SyncError>)> =
        stream::iter(spreadsheet.sheets.iter().enumerate())
            .map(|(position, sheet)| async move {
                let records = fetch_sheet(reader, policy, spreadsheet, sheet)
                    .await
                    .and_then(|raw| raw.extract().map_err(SyncError::from));
                (position, sheet.title.clone(), records)
            })
            .buffer_unordered(config.max_workers.max(1))
            .collect()
            .await;
    results.sort_by_key(|(position, _, _)| *position);

    let mut extract = SpreadsheetExtract {
        spreadsheet_id: spreadsheet.spreadsheet_id.clone(),
        title: spreadsheet.title.clone(),
        records: Vec::new(),
        failures: Vec::new(),
    };
    for (_, sheet_title, result) in results {
        match result {
            Ok(records) => extract.records.extend(records),
            Err(err) => {
                warn!(spreadsheet = %extract.title, sheet = %sheet_title, error = %err, "sheet not extracted");
                extract.failures.push(SheetFailure {
                    sheet_title,
                    error: err.to_string(),
                });
            }
        }
    }
    info!(
        spreadsheet = %extract.title,
        records = extract.records.len(),
        failed_sheets = extract.failures.len(),
        "extracted spreadsheet"
    );
    Ok(extract)
}

pub struct LoadStats {
    pub loaded: Vec<LoadSummary>,
    /// Spreadsheets left untouched in the store, with the reason.
    pub skipped: Vec<(String, String)>,
    pub elapsed_secs: f64,
}

/// Extract spreadsheets and replace their documents in the store.
///
/// Spreadsheets holding only institutions load before those whose variables
/// name institutions, so a variable sheet can refer to an institution
/// defined by another spreadsheet in the same run. A spreadsheet with any
/// failed sheet is not loaded at all, since loading replaces the whole
/// spreadsheet.
pub async fn run_load(
    reader: &dyn SheetReader,
    store: &dyn DocumentStore,
    config: &PipelineConfig,
    spreadsheet_ids: &[String],
) -> anyhow::Result<LoadStats> {
    let start = Instant::now();
    let mut extracts = Vec::with_capacity(spreadsheet_ids.len());
    let mut skipped = Vec::new();
    for id in spreadsheet_ids {
        match extract_spreadsheet(reader, config, id).await {
            Ok(extract) if extract.failures.is_empty() => extracts.push(extract),
            Ok(extract) => {
                let sheets: Vec<&str> = extract.failures.iter().map(|f| f.sheet_title.as_str()).collect();
                skipped.push((
                    extract.spreadsheet_id,
                    format!("sheets failed to extract: {}", sheets.join(", ")),
                ));
            }
            Err(err) => {
                warn!(spreadsheet_id = %id, error = %err, "spreadsheet not extracted");
                skipped.push((id.clone(), format!("{err:#}")));
            }
        }
    }
    extracts.sort_by_key(SpreadsheetExtract::has_variable_records);

    let mut loaded = Vec::with_capacity(extracts.len());
    for extract in &extracts {
        eprintln!("  Loading {} ({} records)", extract.title, extract.records.len());
        match replace_spreadsheet(store, &extract.spreadsheet_id, &extract.records).await {
            Ok(summary) => loaded.push(summary),
            Err(err) => {
                warn!(spreadsheet = %extract.title, error = %err, "spreadsheet not loaded");
                skipped.push((extract.spreadsheet_id.clone(), err.to_string()));
            }
        }
    }

    Ok(LoadStats {
        loaded,
        skipped,
        elapsed_secs: start.elapsed().as_secs_f64(),
    })
}

/// Verification dates in every sheet of the given spreadsheets that are due
/// in `window` or cannot be read as dates, ordered by spreadsheet, sheet and
/// row.
pub async fn due_dates(
    reader: &dyn SheetReader,
    config: &PipelineConfig,
    spreadsheet_ids: &[String],
    window: &VerificationWindow,
) -> anyhow::Result<Vec<CheckedVerificationDate>> {
    let policy = RetryPolicy::from(config);
    let mut checked = Vec::new();
    for id in spreadsheet_ids {
        let spreadsheet = fetch_spreadsheet(reader, &policy, id)
            .await
            .with_context(|| format!("reading spreadsheet {id}"))?;
        for sheet in &spreadsheet.sheets {
            let dates = match fetch_sheet(reader, &policy, &spreadsheet, sheet).await {
                Ok(raw) => raw.next_verification_dates()?,
                Err(err) => {
                    warn!(spreadsheet = %spreadsheet.title, sheet = %sheet.title, error = %err, "sheet not read");
                    continue;
                }
            };
            checked.extend(
                dates
                    .iter()
                    .map(|d| d.check(window))
                    .filter(|c| c.status != VerificationStatus::Irrelevant),
            );
        }
    }
    checked.sort_by(|a, b| {
        (&a.date.spreadsheet_title, &a.date.sheet_title, a.date.row).cmp(&(
            &b.date.spreadsheet_title,
            &b.date.sheet_title,
            b.date.row,
        ))
    });
    Ok(checked)
}
