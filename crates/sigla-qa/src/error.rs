use sigla_store::StoreError;
use sigla_sync::SyncError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QaError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
