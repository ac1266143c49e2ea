pub mod answers;
pub mod config;
pub mod error;
pub mod extract;
pub mod metadata;
pub mod range;
pub mod record;
pub mod schema;
pub mod sheet;
pub mod verification;

pub use answers::{AnswerMap, DEFAULT_ANSWER_KEY};
pub use config::{Environment, PipelineConfig, parse_spreadsheet_ids};
pub use error::{CoreError, FormatFault};
pub use extract::extract;
pub use metadata::{SheetFormat, SheetMetadata, SheetSource};
pub use range::{Column, RangeAddress, column_index, column_name};
pub use record::{
    ConstituentRef, ExtractedRecord, Institution, Variable, VariableRecord, VariableType,
    derive_aggregate_answers,
};
pub use schema::{Collection, SchemaViolation};
pub use sheet::RawSheet;
pub use verification::{
    CheckedVerificationDate, NextVerificationDate, VerificationStatus, VerificationWindow,
};
