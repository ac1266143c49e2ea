//! Storage layer: document model, the store seam, an in-memory store and the
//! replace-load step.

mod document;
mod error;
mod load;
mod memory;
mod store;

pub use document::{DocumentId, Filter, StoredEntry, StoredInstitution, StoredRecord, StoredVariable};
pub use error::StoreError;
pub use load::{LoadSummary, find_institution_elsewhere, replace_spreadsheet};
pub use memory::MemoryStore;
pub use store::DocumentStore;
