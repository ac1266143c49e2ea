//! Records produced by extraction.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::answers::{AnswerMap, DEFAULT_ANSWER_KEY};
use crate::metadata::SheetSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableType {
    Standard,
    Composite,
    Aggregate,
}

impl VariableType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Composite => "composite",
            Self::Aggregate => "aggregate",
        }
    }

    /// Composite and aggregate variables are built from other variables.
    pub fn has_constituents(&self) -> bool {
        !matches!(self, Self::Standard)
    }
}

impl fmt::Display for VariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VariableType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "composite" => Ok(Self::Composite),
            "aggregate" => Ok(Self::Aggregate),
            _ => Err(()),
        }
    }
}

/// Reference from a composite or aggregate variable to another variable of
/// the same sheet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConstituentRef {
    pub index: usize,
    pub heading: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    #[serde(rename = "type")]
    pub variable_type: VariableType,
    pub index: usize,
    pub heading: String,
    pub source: String,
    pub original_text: String,
    pub hyperlink: Option<String>,
    pub answers: AnswerMap,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constituents: Vec<ConstituentRef>,
}

impl Variable {
    pub fn standard(index: usize, heading: impl Into<String>) -> Self {
        Self {
            variable_type: VariableType::Standard,
            index,
            heading: heading.into(),
            source: String::new(),
            original_text: String::new(),
            hyperlink: None,
            answers: AnswerMap::new(),
            constituents: Vec::new(),
        }
    }
}

/// Answers of an aggregate variable, derived from its constituents.
///
/// A constituent's default answer is keyed by the constituent heading; any
/// other key becomes `"<heading>: <key>"`. Constituents are visited in order.
pub fn derive_aggregate_answers<'a>(constituents: impl IntoIterator<Item = &'a Variable>) -> AnswerMap {
    let mut derived = AnswerMap::new();
    for constituent in constituents {
        let mut part = AnswerMap::new();
        for (key, value) in constituent.answers.iter() {
            let key = if key == DEFAULT_ANSWER_KEY {
                constituent.heading.clone()
            } else {
                format!("{}: {key}", constituent.heading)
            };
            part.insert(key, value);
        }
        derived.merge(&part);
    }
    derived
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Institution {
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub sub_categories: Vec<String>,
    pub country: Option<String>,
    pub source: SheetSource,
    pub variables: Vec<Variable>,
}

/// A variable extracted from a sheet that does not itself define the
/// institution owning it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableRecord {
    pub institution: String,
    pub source: SheetSource,
    pub variable: Variable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractedRecord {
    Institution(Institution),
    Variable(VariableRecord),
}

impl ExtractedRecord {
    pub fn institution_name(&self) -> &str {
        match self {
            Self::Institution(institution) => &institution.name,
            Self::Variable(record) => &record.institution,
        }
    }

    pub fn source(&self) -> &SheetSource {
        match self {
            Self::Institution(institution) => &institution.source,
            Self::Variable(record) => &record.source,
        }
    }
}

/// Split a delimited sub-category cell. Both `;` and `,` separate entries.
pub fn split_sub_categories(raw: &str) -> Vec<String> {
    raw.split([';', ','])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_type_parses_loosely() {
        assert_eq!(" Composite ".parse(), Ok(VariableType::Composite));
        assert_eq!("AGGREGATE".parse(), Ok(VariableType::Aggregate));
        assert!("sum".parse::<VariableType>().is_err());
    }

    #[test]
    fn sub_categories_split_on_either_delimiter() {
        assert_eq!(
            split_sub_categories("Supreme; Appeals ,Lower;;"),
            ["Supreme", "Appeals", "Lower"]
        );
        assert!(split_sub_categories("  ").is_empty());
    }

    #[test]
    fn aggregate_answers_follow_constituent_order() {
        let mut first = Variable::standard(0, "Elected");
        first.answers = AnswerMap::single("Yes");
        let mut second = Variable::standard(1, "Term");
        second.answers = [("min", "4"), ("max", "6")].into_iter().collect();

        let derived = derive_aggregate_answers([&first, &second]);
        let entries: Vec<(&str, &str)> = derived.iter().collect();
        assert_eq!(
            entries,
            [("Elected", "Yes"), ("Term: min", "4"), ("Term: max", "6")]
        );
    }

    #[test]
    fn extracted_record_json_is_tagged() {
        let record = ExtractedRecord::Variable(VariableRecord {
            institution: "Acme Court".into(),
            source: SheetSource::new("ss", "Courts", "0", "Sheet1"),
            variable: Variable::standard(0, "Tenure"),
        });
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "variable");
        assert_eq!(json["variable"]["type"], "standard");
        assert!(json["variable"].get("constituents").is_none());
    }
}
