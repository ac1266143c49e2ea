use async_trait::async_trait;

use crate::{Filter, StoreError, StoredRecord};

/// A document database holding the SIGLA collections.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Every document matching `filter`, in insertion order.
    async fn find(&self, filter: &Filter) -> Result<Vec<StoredRecord>, StoreError>;

    /// Delete every document matching `filter`. Returns how many went.
    async fn delete_many(&self, filter: &Filter) -> Result<usize, StoreError>;

    /// Insert documents. The batch is rejected whole if any id is taken or
    /// any reference points at a document that is neither stored nor in the
    /// batch.
    async fn load(&self, records: Vec<StoredRecord>) -> Result<usize, StoreError>;

    /// The first document matching `filter`.
    async fn find_one(&self, filter: &Filter) -> Result<StoredRecord, StoreError> {
        self.find(filter)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::UnableToFindDocument {
                filter: filter.to_string(),
            })
    }
}
