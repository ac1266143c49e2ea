//! Sheet reader over in-memory cell grids, loadable from JSON snapshots.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sigla_core::RangeAddress;
use tracing::info;

use crate::{SheetInfo, SheetReader, SpreadsheetInfo, SyncError};

/// One sheet's full cell grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetSnapshot {
    pub sheet_id: String,
    pub title: String,
    pub cells: Vec<Vec<String>>,
}

/// A whole spreadsheet, as stored in a snapshot file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpreadsheetSnapshot {
    pub spreadsheet_id: String,
    pub title: String,
    pub sheets: Vec<SheetSnapshot>,
}

/// Reader serving snapshots, trimming results the way the sheet service
/// does: trailing empty cells and trailing empty rows are dropped.
#[derive(Default)]
pub struct MemoryReader {
    spreadsheets: BTreeMap<String, SpreadsheetSnapshot>,
    quota_failures: AtomicU32,
}

impl MemoryReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, snapshot: SpreadsheetSnapshot) {
        self.spreadsheets
            .insert(snapshot.spreadsheet_id.clone(), snapshot);
    }

    /// Load every `*.json` spreadsheet snapshot in `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self, SyncError> {
        let mut reader = Self::new();
        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();
        for path in paths {
            let text = std::fs::read_to_string(&path)?;
            reader.insert(serde_json::from_str(&text)?);
        }
        info!(
            count = reader.spreadsheets.len(),
            dir = %dir.display(),
            "loaded spreadsheet snapshots"
        );
        Ok(reader)
    }

    /// Make the next `n` reads fail with a quota error carrying a zero
    /// `Retry-After`.
    pub fn fail_with_quota(&self, n: u32) {
        self.quota_failures.store(n, Ordering::SeqCst);
    }

    fn take_quota_failure(&self) -> bool {
        self.quota_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn get(&self, spreadsheet_id: &str) -> Result<&SpreadsheetSnapshot, SyncError> {
        self.spreadsheets
            .get(spreadsheet_id)
            .ok_or_else(|| SyncError::UnableToAccessSpreadsheet {
                spreadsheet_id: spreadsheet_id.to_string(),
                reason: "no such spreadsheet".into(),
            })
    }
}

fn slice(cells: &[Vec<String>], range: &RangeAddress) -> Vec<Vec<String>> {
    let rows = match (range.start_row, range.end_row) {
        (Some(start), Some(end)) => {
            let end = (end as usize + 1).min(cells.len());
            cells.get(start as usize..end).unwrap_or_default()
        }
        _ => cells,
    };
    let mut out: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            let mut row: Vec<String> = match (range.start_column, range.end_column) {
                (Some(start), Some(end)) => {
                    let end = (end as usize + 1).min(row.len());
                    row.get(start as usize..end).unwrap_or_default().to_vec()
                }
                _ => row.clone(),
            };
            while row.last().is_some_and(|c| c.is_empty()) {
                row.pop();
            }
            row
        })
        .collect();
    while out.last().is_some_and(Vec::is_empty) {
        out.pop();
    }
    out
}

#[async_trait]
impl SheetReader for MemoryReader {
    async fn spreadsheet(&self, spreadsheet_id: &str) -> Result<SpreadsheetInfo, SyncError> {
        let snapshot = self.get(spreadsheet_id)?;
        Ok(SpreadsheetInfo {
            spreadsheet_id: snapshot.spreadsheet_id.clone(),
            title: snapshot.title.clone(),
            sheets: snapshot
                .sheets
                .iter()
                .map(|s| SheetInfo {
                    sheet_id: s.sheet_id.clone(),
                    title: s.title.clone(),
                })
                .collect(),
        })
    }

    async fn read(
        &self,
        spreadsheet_id: &str,
        range: &RangeAddress,
    ) -> Result<Vec<Vec<String>>, SyncError> {
        if self.take_quota_failure() {
            return Err(SyncError::QuotaExceeded {
                retry_after: Some(Duration::ZERO),
            });
        }
        let snapshot = self.get(spreadsheet_id)?;
        let sheet = snapshot
            .sheets
            .iter()
            .find(|s| s.sheet_id == range.sheet_id)
            .ok_or_else(|| SyncError::UnableToAccessSpreadsheet {
                spreadsheet_id: spreadsheet_id.to_string(),
                reason: format!("no sheet {}", range),
            })?;
        Ok(slice(&sheet.cells, range))
    }
}
