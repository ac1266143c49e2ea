//! The comparison tree.
//!
//! Outcomes and error flags are computed from the current values on every
//! call, so editing a field before the report is written is always
//! reflected.

use std::fmt;

use serde::{Deserialize, Serialize};
use sigla_core::schema::is_meta_field;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Match,
    Mismatch,
    MissingInStore,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Match => "match",
            Self::Mismatch => "mismatch",
            Self::MissingInStore => "missing in store",
        })
    }
}

/// Meta fields say where a document came from; data fields say what it
/// holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldClass {
    Meta,
    Data,
}

impl fmt::Display for FieldClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Meta => "meta",
            Self::Data => "data",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldComparison {
    pub name: String,
    pub class: FieldClass,
    /// `None` when the sheet side has no such field.
    pub sheet: Option<String>,
    /// `None` when the store side has no such field.
    pub store: Option<String>,
}

impl FieldComparison {
    /// A field classed by its schema name.
    pub fn new(name: impl Into<String>, sheet: Option<String>, store: Option<String>) -> Self {
        let name = name.into();
        let class = if is_meta_field(&name) {
            FieldClass::Meta
        } else {
            FieldClass::Data
        };
        Self {
            name,
            class,
            sheet,
            store,
        }
    }

    pub fn outcome(&self) -> Outcome {
        match (&self.sheet, &self.store) {
            (Some(sheet), Some(store)) if sheet.trim() == store.trim() => Outcome::Match,
            (None, None) => Outcome::Match,
            (Some(_), None) => Outcome::MissingInStore,
            _ => Outcome::Mismatch,
        }
    }

    pub fn is_error(&self) -> bool {
        self.outcome() != Outcome::Match
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Institution,
    Variable,
    Answers,
}

/// One compared object: its own fields plus nested objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonNode {
    pub kind: NodeKind,
    pub label: String,
    pub fields: Vec<FieldComparison>,
    pub children: Vec<ComparisonNode>,
}

impl ComparisonNode {
    pub fn new(kind: NodeKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            fields: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn push(&mut self, field: FieldComparison) {
        self.fields.push(field);
    }

    /// Field by name, on this node only.
    pub fn field(&self, name: &str) -> Option<&FieldComparison> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut FieldComparison> {
        self.fields.iter_mut().find(|f| f.name == name)
    }

    pub fn has_error(&self) -> bool {
        self.any_error(|_| true)
    }

    pub fn has_meta_error(&self) -> bool {
        self.any_error(|f| f.class == FieldClass::Meta)
    }

    pub fn has_data_error(&self) -> bool {
        self.any_error(|f| f.class == FieldClass::Data)
    }

    fn any_error(&self, select: impl Fn(&FieldComparison) -> bool + Copy) -> bool {
        self.fields.iter().any(|f| select(f) && f.is_error())
            || self.children.iter().any(|c| c.any_error(select))
    }

    /// Every field in the tree with the path of labels leading to it.
    pub fn walk(&self) -> Vec<(String, &FieldComparison)> {
        let mut out = Vec::new();
        self.walk_into(&self.label, &mut out);
        out
    }

    fn walk_into<'a>(&'a self, path: &str, out: &mut Vec<(String, &'a FieldComparison)>) {
        for field in &self.fields {
            out.push((path.to_string(), field));
        }
        for child in &self.children {
            let child_path = format!("{path} / {}", child.label);
            child.walk_into(&child_path, out);
        }
    }
}
