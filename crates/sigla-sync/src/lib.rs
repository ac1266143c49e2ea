//! Sheet service layer: the reader seam, quota retries, a snapshot reader
//! and (feature `http`) a Sheets-v4 client.

mod error;
mod memory;
mod reader;
mod retry;

#[cfg(feature = "http")]
pub mod http;

pub use error::SyncError;
pub use memory::{MemoryReader, SheetSnapshot, SpreadsheetSnapshot};
pub use reader::{
    SheetInfo, SheetReader, SpreadsheetInfo, fetch_sheet, fetch_spreadsheet,
    spreadsheet_ids_from_master,
};
pub use retry::RetryPolicy;

#[cfg(feature = "http")]
pub use http::SheetsClient;
