//! Persisted documents and the filters that select them.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sigla_core::schema::field;
use sigla_core::{AnswerMap, Collection, SheetSource, VariableType};
use uuid::Uuid;

/// Primary key of a stored document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Documents ──

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredInstitution {
    #[serde(rename = "_id")]
    pub id: DocumentId,
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub sub_categories: Vec<String>,
    pub country: Option<String>,
    #[serde(flatten)]
    pub source: SheetSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredVariable {
    #[serde(rename = "_id")]
    pub id: DocumentId,
    pub institution: DocumentId,
    #[serde(rename = "type")]
    pub variable_type: VariableType,
    pub index: usize,
    pub heading: String,
    pub source: String,
    #[serde(rename = "orig_text")]
    pub original_text: String,
    pub hyperlink: Option<String>,
    #[serde(rename = "sigla_answers")]
    pub answers: AnswerMap,
    #[serde(default)]
    pub constituents: Vec<DocumentId>,
    #[serde(flatten)]
    pub sheet: SheetSource,
}

/// A row of the rights, amendments or body-of-law collections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntry {
    #[serde(rename = "_id")]
    pub id: DocumentId,
    pub variable: DocumentId,
    pub index: usize,
    #[serde(rename = "sigla_answers")]
    pub answers: AnswerMap,
    pub law: Option<DocumentId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "collection")]
pub enum StoredRecord {
    #[serde(rename = "institutions")]
    Institution(StoredInstitution),
    #[serde(rename = "variables")]
    Variable(StoredVariable),
    #[serde(rename = "rights")]
    Right(StoredEntry),
    #[serde(rename = "amendments")]
    Amendment(StoredEntry),
    #[serde(rename = "body_of_law")]
    Law(StoredEntry),
}

impl StoredRecord {
    pub fn id(&self) -> &DocumentId {
        match self {
            Self::Institution(i) => &i.id,
            Self::Variable(v) => &v.id,
            Self::Right(e) | Self::Amendment(e) | Self::Law(e) => &e.id,
        }
    }

    pub fn collection(&self) -> Collection {
        match self {
            Self::Institution(_) => Collection::Institutions,
            Self::Variable(_) => Collection::Variables,
            Self::Right(_) => Collection::Rights,
            Self::Amendment(_) => Collection::Amendments,
            Self::Law(_) => Collection::BodyOfLaw,
        }
    }

    /// Value of a persisted field, by its schema name.
    pub fn field(&self, name: &str) -> Option<Value> {
        let value = serde_json::to_value(self).ok()?;
        value.get(name).filter(|v| !v.is_null()).cloned()
    }

    /// Ids this document refers to, with the field holding each.
    pub fn references(&self) -> Vec<(&'static str, Collection, &DocumentId)> {
        match self {
            Self::Institution(_) => Vec::new(),
            Self::Variable(v) => std::iter::once((field::INSTITUTION, Collection::Institutions, &v.institution))
                .chain(
                    v.constituents
                        .iter()
                        .map(|c| (field::CONSTITUENTS, Collection::Variables, c)),
                )
                .collect(),
            Self::Right(e) | Self::Amendment(e) | Self::Law(e) => {
                let mut refs = vec![(field::VARIABLE, Collection::Variables, &e.variable)];
                if let Some(law) = &e.law {
                    refs.push((field::LAW, Collection::BodyOfLaw, law));
                }
                refs
            }
        }
    }

    pub fn as_institution(&self) -> Option<&StoredInstitution> {
        match self {
            Self::Institution(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_variable(&self) -> Option<&StoredVariable> {
        match self {
            Self::Variable(v) => Some(v),
            _ => None,
        }
    }
}

// ── Filters ──

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Eq(Value),
    In(Vec<Value>),
}

/// Equality filter over one collection. All conditions must hold.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    collection: Collection,
    conditions: Vec<(&'static str, Condition)>,
}

impl Filter {
    pub fn new(collection: Collection) -> Self {
        Self {
            collection,
            conditions: Vec::new(),
        }
    }

    pub fn with(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.conditions.push((field, Condition::Eq(value.into())));
        self
    }

    /// The field equals any of `values`.
    pub fn with_any<V: Into<Value>>(mut self, field: &'static str, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.conditions.push((field, Condition::In(values)));
        self
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    pub fn matches(&self, record: &StoredRecord) -> bool {
        if record.collection() != self.collection {
            return false;
        }
        let Ok(Value::Object(fields)) = serde_json::to_value(record) else {
            return false;
        };
        self.conditions.iter().all(|(name, condition)| {
            let value = fields.get(*name).unwrap_or(&Value::Null);
            match condition {
                Condition::Eq(expected) => value == expected,
                Condition::In(options) => options.contains(value),
            }
        })
    }
}

impl From<&DocumentId> for Value {
    fn from(id: &DocumentId) -> Self {
        Value::String(id.0.clone())
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{", self.collection)?;
        for (i, (name, condition)) in self.conditions.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            match condition {
                Condition::Eq(value) => write!(f, " {name}: {value}")?,
                Condition::In(values) => {
                    write!(f, " {name} in {}", Value::Array(values.clone()))?
                }
            }
        }
        f.write_str(" }")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn institution(id: &str, name: &str) -> StoredRecord {
        StoredRecord::Institution(StoredInstitution {
            id: id.into(),
            name: name.into(),
            category: "Judiciary".into(),
            sub_categories: vec![],
            country: None,
            source: SheetSource::new("ss-1", "Courts", "0", "Sheet1"),
        })
    }

    #[test]
    fn json_uses_schema_field_names() {
        let record = StoredRecord::Variable(StoredVariable {
            id: "v1".into(),
            institution: "i1".into(),
            variable_type: VariableType::Composite,
            index: 0,
            heading: "Rights".into(),
            source: String::new(),
            original_text: "text".into(),
            hyperlink: None,
            answers: AnswerMap::single("Yes"),
            constituents: vec!["v0".into()],
            sheet: SheetSource::new("ss-1", "Courts", "0", "Sheet1"),
        });
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["collection"], "variables");
        assert_eq!(json["_id"], "v1");
        assert_eq!(json["orig_text"], "text");
        assert_eq!(json["sigla_answers"]["default"], "Yes");
        assert_eq!(json["sheet_title"], "Sheet1");

        let back: StoredRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.references().len(), 2);
    }

    #[test]
    fn filter_matches_on_fields() {
        let acme = institution("i1", "Acme");
        let filter = Filter::new(Collection::Institutions)
            .with(field::SPREADSHEET_ID, "ss-1")
            .with(field::NAME, "Acme");
        assert!(filter.matches(&acme));
        assert!(!filter.matches(&institution("i2", "Other")));
        assert!(!Filter::new(Collection::Variables).matches(&acme));

        let any = Filter::new(Collection::Institutions).with_any(field::ID, ["i9", "i1"]);
        assert!(any.matches(&acme));
        assert_eq!(acme.field(field::NAME), Some(Value::from("Acme")));
        assert_eq!(acme.field(field::COUNTRY), None);
    }

    #[test]
    fn filter_display_names_conditions() {
        let filter = Filter::new(Collection::Institutions)
            .with(field::SPREADSHEET_ID, "ss-1")
            .with(field::NAME, "Acme");
        assert_eq!(
            filter.to_string(),
            r#"institutions { spreadsheet_id: "ss-1", name: "Acme" }"#
        );
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(DocumentId::generate(), DocumentId::generate());
    }
}
