//! Reconciliation of spreadsheets against the document store.

pub mod compare;
pub mod engine;
mod error;
pub mod report;
pub mod runner;

pub use compare::{ComparisonNode, FieldClass, FieldComparison, NodeKind, Outcome};
pub use engine::{compare_answers, compare_institution, compare_variables};
pub use error::QaError;
pub use report::{GroupComparison, QaReport, QaSummary, ReportTable, UnitFailure};
pub use runner::{QaRunner, reconcile_records};
