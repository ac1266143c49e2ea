//! In-process document store with optional JSON persistence.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::{DocumentId, DocumentStore, Filter, StoreError, StoredRecord};

/// Document store kept in memory.
///
/// Use [`open`](Self::open) for an ephemeral store and
/// [`open_persistent`](Self::open_persistent) for one backed by a JSON file
/// that is rewritten after every change.
pub struct MemoryStore {
    records: Mutex<Vec<StoredRecord>>,
    path: Option<PathBuf>,
}

impl MemoryStore {
    pub fn open() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            path: None,
        }
    }

    /// Open or create a store persisted at `path`.
    pub fn open_persistent(path: &Path) -> Result<Self, StoreError> {
        let records: Vec<StoredRecord> = if path.exists() {
            let text = std::fs::read_to_string(path)?;
            if text.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&text)?
            }
        } else {
            Vec::new()
        };
        info!(count = records.len(), path = %path.display(), "opened document store");
        Ok(Self {
            records: Mutex::new(records),
            path: Some(path.to_path_buf()),
        })
    }

    /// Number of stored documents across all collections.
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.lock()?.is_empty())
    }

    /// Copy of every stored document.
    pub fn snapshot(&self) -> Result<Vec<StoredRecord>, StoreError> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<StoredRecord>>, StoreError> {
        self.records
            .lock()
            .map_err(|_| StoreError::Other("document store lock poisoned".into()))
    }

    /// Write the documents to a temporary file beside the target, then
    /// rename it over the target.
    fn flush(&self, records: &[StoredRecord]) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut file, records)?;
        file.write_all(b"\n")?;
        file.persist(path).map_err(|e| StoreError::Io(e.error))?;
        debug!(count = records.len(), path = %path.display(), "flushed document store");
        Ok(())
    }
}

fn check_batch(stored: &[StoredRecord], batch: &[StoredRecord]) -> Result<(), StoreError> {
    let mut ids: HashSet<&DocumentId> = stored.iter().map(StoredRecord::id).collect();
    for record in batch {
        if !ids.insert(record.id()) {
            return Err(StoreError::DuplicateId(record.id().clone()));
        }
    }

    let exists = |collection, id: &DocumentId| {
        stored
            .iter()
            .chain(batch)
            .any(|r| r.collection() == collection && r.id() == id)
    };
    for record in batch {
        for (field, target, id) in record.references() {
            if !exists(target, id) {
                return Err(StoreError::DanglingReference {
                    collection: record.collection(),
                    field,
                    id: id.clone(),
                });
            }
        }
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(&self, filter: &Filter) -> Result<Vec<StoredRecord>, StoreError> {
        let records = self.lock()?;
        Ok(records.iter().filter(|r| filter.matches(r)).cloned().collect())
    }

    async fn delete_many(&self, filter: &Filter) -> Result<usize, StoreError> {
        let mut records = self.lock()?;
        let before = records.len();
        records.retain(|r| !filter.matches(r));
        let deleted = before - records.len();
        if deleted > 0 {
            self.flush(&records)?;
        }
        debug!(deleted, %filter, "deleted documents");
        Ok(deleted)
    }

    async fn load(&self, batch: Vec<StoredRecord>) -> Result<usize, StoreError> {
        let mut records = self.lock()?;
        check_batch(&records, &batch)?;
        let count = batch.len();
        records.extend(batch);
        self.flush(&records)?;
        debug!(count, "loaded documents");
        Ok(count)
    }
}
