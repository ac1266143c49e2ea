//! Document schema shared by extraction, the store and QA.
//!
//! Field names here are the persisted vocabulary. Filters, stored records and
//! comparison reports all use these constants so a renamed field only changes
//! in one place.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::{ExtractedRecord, Institution, Variable, VariableType, derive_aggregate_answers};

/// Persisted field names.
pub mod field {
    pub const ID: &str = "_id";

    pub const SPREADSHEET_ID: &str = "spreadsheet_id";
    pub const SPREADSHEET_TITLE: &str = "spreadsheet_title";
    pub const SHEET_ID: &str = "sheet_id";
    pub const SHEET_TITLE: &str = "sheet_title";

    pub const NAME: &str = "name";
    pub const CATEGORY: &str = "category";
    pub const SUB_CATEGORIES: &str = "sub_categories";
    pub const COUNTRY: &str = "country";

    pub const INSTITUTION: &str = "institution";
    pub const TYPE: &str = "type";
    pub const INDEX: &str = "index";
    pub const HEADING: &str = "heading";
    pub const SOURCE: &str = "source";
    pub const ORIGINAL_TEXT: &str = "orig_text";
    pub const HYPERLINK: &str = "hyperlink";
    pub const ANSWERS: &str = "sigla_answers";
    pub const CONSTITUENTS: &str = "constituents";

    pub const VARIABLE: &str = "variable";
    pub const LAW: &str = "law";
}

/// Fields describing where a document came from rather than what it says.
pub const META_FIELDS: [&str; 4] = [
    field::SPREADSHEET_ID,
    field::SPREADSHEET_TITLE,
    field::SHEET_ID,
    field::SHEET_TITLE,
];

pub fn is_meta_field(name: &str) -> bool {
    META_FIELDS.contains(&name)
}

// ── Collections ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Institutions,
    Variables,
    Rights,
    Amendments,
    BodyOfLaw,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Self::Institutions,
        Self::Variables,
        Self::Rights,
        Self::Amendments,
        Self::BodyOfLaw,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Institutions => "institutions",
            Self::Variables => "variables",
            Self::Rights => "rights",
            Self::Amendments => "amendments",
            Self::BodyOfLaw => "body_of_law",
        }
    }

    pub fn primary_key(&self) -> &'static str {
        field::ID
    }

    /// Fields that identify a document across reloads.
    pub fn natural_key(&self) -> &'static [&'static str] {
        match self {
            Self::Institutions => &[field::SPREADSHEET_ID, field::NAME],
            Self::Variables => &[
                field::INSTITUTION,
                field::SPREADSHEET_ID,
                field::SHEET_ID,
                field::INDEX,
            ],
            Self::Rights | Self::Amendments | Self::BodyOfLaw => &[field::VARIABLE, field::INDEX],
        }
    }

    /// Fields holding ids of documents in other collections.
    pub fn references(&self) -> &'static [(&'static str, Collection)] {
        match self {
            Self::Institutions => &[],
            Self::Variables => &[
                (field::INSTITUTION, Collection::Institutions),
                (field::CONSTITUENTS, Collection::Variables),
            ],
            Self::Rights | Self::Amendments => &[
                (field::VARIABLE, Collection::Variables),
                (field::LAW, Collection::BodyOfLaw),
            ],
            Self::BodyOfLaw => &[(field::VARIABLE, Collection::Variables)],
        }
    }

    /// Every persisted field, primary key first.
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            Self::Institutions => &[
                field::ID,
                field::NAME,
                field::CATEGORY,
                field::SUB_CATEGORIES,
                field::COUNTRY,
                field::SPREADSHEET_ID,
                field::SPREADSHEET_TITLE,
                field::SHEET_ID,
                field::SHEET_TITLE,
            ],
            Self::Variables => &[
                field::ID,
                field::INSTITUTION,
                field::TYPE,
                field::INDEX,
                field::HEADING,
                field::SOURCE,
                field::ORIGINAL_TEXT,
                field::HYPERLINK,
                field::ANSWERS,
                field::CONSTITUENTS,
                field::SPREADSHEET_ID,
                field::SPREADSHEET_TITLE,
                field::SHEET_ID,
                field::SHEET_TITLE,
            ],
            Self::Rights | Self::Amendments | Self::BodyOfLaw => &[
                field::ID,
                field::VARIABLE,
                field::INDEX,
                field::ANSWERS,
                field::LAW,
            ],
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Validation ──

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaViolation {
    #[error("{collection} document '{owner}' is missing required field '{field}'")]
    MissingField {
        collection: Collection,
        owner: String,
        field: &'static str,
    },

    #[error("spreadsheet {spreadsheet_id} defines institution '{name}' more than once")]
    DuplicateInstitution { spreadsheet_id: String, name: String },

    #[error("'{owner}' has more than one variable at index {index}")]
    DuplicateIndex { owner: String, index: usize },

    #[error("variable '{variable}' refers to constituent '{heading}' at index {index}, which is not an earlier variable")]
    UnresolvedConstituent {
        variable: String,
        heading: String,
        index: usize,
    },

    #[error("standard variable '{0}' lists constituents")]
    UnexpectedConstituents(String),

    #[error("aggregate variable '{0}' has no constituents")]
    EmptyAggregate(String),

    #[error("aggregate variable '{0}' answers differ from the answers derived from its constituents")]
    AuthoredAggregate(String),
}

/// Shape checks for one record, run before it is persisted.
pub fn validate(record: &ExtractedRecord) -> Result<(), SchemaViolation> {
    match record {
        ExtractedRecord::Institution(institution) => validate_institution(institution),
        ExtractedRecord::Variable(record) => {
            require(Collection::Variables, &record.variable.heading, field::INSTITUTION, &record.institution)?;
            require(
                Collection::Variables,
                &record.variable.heading,
                field::SPREADSHEET_ID,
                &record.source.spreadsheet_id,
            )?;
            validate_variable_shape(&record.variable)
        }
    }
}

/// Validate a batch of records, including references between variable
/// records that share an institution and sheet.
///
/// An institution may be defined once per spreadsheet. Variable groups are
/// checked in (institution, spreadsheet, sheet) order.
pub fn validate_all(records: &[ExtractedRecord]) -> Result<(), SchemaViolation> {
    let mut institutions = BTreeSet::new();
    let mut siblings: BTreeMap<(&str, &str, &str), Vec<Variable>> = BTreeMap::new();
    for record in records {
        validate(record)?;
        if let ExtractedRecord::Institution(institution) = record {
            let key = (
                institution.source.spreadsheet_id.as_str(),
                institution.name.as_str(),
            );
            if !institutions.insert(key) {
                return Err(SchemaViolation::DuplicateInstitution {
                    spreadsheet_id: key.0.to_string(),
                    name: key.1.to_string(),
                });
            }
        }
        if let ExtractedRecord::Variable(v) = record {
            siblings
                .entry((
                    v.institution.as_str(),
                    v.source.spreadsheet_id.as_str(),
                    v.source.sheet_id.as_str(),
                ))
                .or_default()
                .push(v.variable.clone());
        }
    }
    for ((institution, _, _), variables) in &siblings {
        validate_variables(institution, variables)?;
    }
    Ok(())
}

fn validate_institution(institution: &Institution) -> Result<(), SchemaViolation> {
    let owner = &institution.name;
    require(Collection::Institutions, owner, field::NAME, &institution.name)?;
    require(Collection::Institutions, owner, field::CATEGORY, &institution.category)?;
    require(
        Collection::Institutions,
        owner,
        field::SPREADSHEET_ID,
        &institution.source.spreadsheet_id,
    )?;
    for variable in &institution.variables {
        validate_variable_shape(variable)?;
    }
    validate_variables(owner, &institution.variables)
}

fn validate_variable_shape(variable: &Variable) -> Result<(), SchemaViolation> {
    require(Collection::Variables, &variable.heading, field::HEADING, &variable.heading)?;
    match variable.variable_type {
        VariableType::Standard if !variable.constituents.is_empty() => {
            Err(SchemaViolation::UnexpectedConstituents(variable.heading.clone()))
        }
        VariableType::Aggregate if variable.constituents.is_empty() => {
            Err(SchemaViolation::EmptyAggregate(variable.heading.clone()))
        }
        _ => Ok(()),
    }
}

/// Checks across the variables of one owner: unique indices, constituents
/// that resolve to earlier variables, and derived aggregate answers.
fn validate_variables(owner: &str, variables: &[Variable]) -> Result<(), SchemaViolation> {
    let mut seen = BTreeSet::new();
    for variable in variables {
        if !seen.insert(variable.index) {
            return Err(SchemaViolation::DuplicateIndex {
                owner: owner.to_string(),
                index: variable.index,
            });
        }
    }

    let by_index: HashMap<usize, &Variable> = variables.iter().map(|v| (v.index, v)).collect();
    for variable in variables {
        let mut resolved = Vec::with_capacity(variable.constituents.len());
        for constituent in &variable.constituents {
            match by_index.get(&constituent.index) {
                Some(target)
                    if target.index < variable.index && target.heading == constituent.heading =>
                {
                    resolved.push(*target);
                }
                _ => {
                    return Err(SchemaViolation::UnresolvedConstituent {
                        variable: variable.heading.clone(),
                        heading: constituent.heading.clone(),
                        index: constituent.index,
                    });
                }
            }
        }
        if variable.variable_type == VariableType::Aggregate
            && derive_aggregate_answers(resolved) != variable.answers
        {
            return Err(SchemaViolation::AuthoredAggregate(variable.heading.clone()));
        }
    }
    Ok(())
}

fn require(
    collection: Collection,
    owner: &str,
    field: &'static str,
    value: &str,
) -> Result<(), SchemaViolation> {
    if value.trim().is_empty() {
        return Err(SchemaViolation::MissingField {
            collection,
            owner: owner.to_string(),
            field,
        });
    }
    Ok(())
}
