use sigla_core::{Collection, CoreError};
use thiserror::Error;

use crate::DocumentId;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unable to find document matching {filter}")]
    UnableToFindDocument { filter: String },

    #[error("{count} documents match {filter}, expected one")]
    AmbiguousDocument { filter: String, count: usize },

    #[error("document id {0} already exists")]
    DuplicateId(DocumentId),

    #[error("{collection}.{field} refers to missing document {id}")]
    DanglingReference {
        collection: Collection,
        field: &'static str,
        id: DocumentId,
    },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}
