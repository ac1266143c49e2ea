use std::time::Duration;

use sigla_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("unable to access spreadsheet {spreadsheet_id}: {reason}")]
    UnableToAccessSpreadsheet {
        spreadsheet_id: String,
        reason: String,
    },

    #[error("sheet service quota exceeded")]
    QuotaExceeded { retry_after: Option<Duration> },

    #[error("sheet service quota still exceeded after {attempts} attempts")]
    QuotaExhausted { attempts: u32 },

    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error(transparent)]
    Sheet(#[from] CoreError),

    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}
