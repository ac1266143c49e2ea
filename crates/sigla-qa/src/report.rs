//! Per-spreadsheet QA reports and their tabular renderings.

use std::io;

use serde::{Deserialize, Serialize};

use crate::QaError;
use crate::compare::ComparisonNode;

/// Comparison of one institution (or one institution's variables) on one
/// sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupComparison {
    pub spreadsheet_id: String,
    pub spreadsheet_title: String,
    pub sheet_title: String,
    pub institution: String,
    pub node: ComparisonNode,
}

/// A unit that could not be compared, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitFailure {
    pub spreadsheet_id: String,
    pub spreadsheet_title: String,
    pub sheet_title: String,
    pub institution: Option<String>,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QaSummary {
    pub groups: usize,
    pub groups_with_errors: usize,
    pub groups_with_meta_errors: usize,
    pub groups_with_data_errors: usize,
    pub failures: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaReport {
    pub spreadsheet_id: String,
    pub spreadsheet_title: String,
    pub groups: Vec<GroupComparison>,
    pub failures: Vec<UnitFailure>,
}

const FIELD_HEADERS: [&str; 9] = [
    "spreadsheet",
    "sheet",
    "institution",
    "path",
    "field",
    "class",
    "outcome",
    "sheet_value",
    "store_value",
];

const FAILURE_HEADERS: [&str; 4] = ["spreadsheet", "sheet", "institution", "error"];

impl QaReport {
    pub fn new(spreadsheet_id: impl Into<String>, spreadsheet_title: impl Into<String>) -> Self {
        Self {
            spreadsheet_id: spreadsheet_id.into(),
            spreadsheet_title: spreadsheet_title.into(),
            groups: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Order groups and failures by spreadsheet, sheet and institution.
    pub fn sort(&mut self) {
        self.groups.sort_by(|a, b| {
            (&a.spreadsheet_title, &a.spreadsheet_id, &a.sheet_title, &a.institution).cmp(&(
                &b.spreadsheet_title,
                &b.spreadsheet_id,
                &b.sheet_title,
                &b.institution,
            ))
        });
        self.failures.sort_by(|a, b| {
            (
                &a.spreadsheet_title,
                &a.spreadsheet_id,
                &a.sheet_title,
                &a.institution,
                &a.error,
            )
                .cmp(&(
                    &b.spreadsheet_title,
                    &b.spreadsheet_id,
                    &b.sheet_title,
                    &b.institution,
                    &b.error,
                ))
        });
    }

    /// Whether any group disagrees with the store or any unit failed.
    pub fn has_error(&self) -> bool {
        !self.failures.is_empty() || self.groups.iter().any(|g| g.node.has_error())
    }

    pub fn summary(&self) -> QaSummary {
        QaSummary {
            groups: self.groups.len(),
            groups_with_errors: self.groups.iter().filter(|g| g.node.has_error()).count(),
            groups_with_meta_errors: self
                .groups
                .iter()
                .filter(|g| g.node.has_meta_error())
                .count(),
            groups_with_data_errors: self
                .groups
                .iter()
                .filter(|g| g.node.has_data_error())
                .count(),
            failures: self.failures.len(),
        }
    }

    /// Every compared field.
    pub fn table(&self) -> ReportTable {
        self.field_table(format!("{} comparison", self.spreadsheet_title), false)
    }

    /// Only the fields that do not match.
    pub fn error_table(&self) -> ReportTable {
        self.field_table(format!("{} errors", self.spreadsheet_title), true)
    }

    pub fn failure_table(&self) -> ReportTable {
        ReportTable {
            name: format!("{} failures", self.spreadsheet_title),
            headers: FAILURE_HEADERS.iter().map(|h| h.to_string()).collect(),
            rows: self
                .failures
                .iter()
                .map(|f| {
                    vec![
                        f.spreadsheet_title.clone(),
                        f.sheet_title.clone(),
                        f.institution.clone().unwrap_or_default(),
                        f.error.clone(),
                    ]
                })
                .collect(),
        }
    }

    fn field_table(&self, name: String, errors_only: bool) -> ReportTable {
        let mut rows = Vec::new();
        for group in &self.groups {
            for (path, field) in group.node.walk() {
                if errors_only && !field.is_error() {
                    continue;
                }
                rows.push(vec![
                    group.spreadsheet_title.clone(),
                    group.sheet_title.clone(),
                    group.institution.clone(),
                    path,
                    field.name.clone(),
                    field.class.to_string(),
                    field.outcome().to_string(),
                    field.sheet.clone().unwrap_or_default(),
                    field.store.clone().unwrap_or_default(),
                ]);
            }
        }
        ReportTable {
            name,
            headers: FIELD_HEADERS.iter().map(|h| h.to_string()).collect(),
            rows,
        }
    }
}

/// A rendered table: a header row plus string rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportTable {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ReportTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<(), QaError> {
        self.write_delimited(writer, b',')
    }

    pub fn write_delimited<W: io::Write>(&self, writer: W, delimiter: u8) -> Result<(), QaError> {
        let mut out = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_writer(writer);
        out.write_record(&self.headers)?;
        for row in &self.rows {
            out.write_record(row)?;
        }
        out.flush()?;
        Ok(())
    }

    pub fn to_csv(&self) -> Result<String, QaError> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::{FieldComparison, NodeKind};

    fn group(sheet: &str, institution: &str, store_name: &str) -> GroupComparison {
        let mut node = ComparisonNode::new(NodeKind::Institution, institution);
        node.push(FieldComparison::new(
            "name",
            Some(institution.to_string()),
            Some(store_name.to_string()),
        ));
        GroupComparison {
            spreadsheet_id: "ss-1".into(),
            spreadsheet_title: "Courts".into(),
            sheet_title: sheet.into(),
            institution: institution.into(),
            node,
        }
    }

    fn report() -> QaReport {
        let mut report = QaReport::new("ss-1", "Courts");
        report.groups.push(group("Sheet2", "Acme", "Acme"));
        report.groups.push(group("Sheet1", "Zeta", "Zeta, Inc"));
        report.groups.push(group("Sheet1", "Beta", "Beta"));
        report.failures.push(UnitFailure {
            spreadsheet_id: "ss-1".into(),
            spreadsheet_title: "Courts".into(),
            sheet_title: "Notes".into(),
            institution: None,
            error: "unrecognized format".into(),
        });
        report.sort();
        report
    }

    #[test]
    fn groups_sort_by_sheet_then_institution() {
        let report = report();
        let order: Vec<(&str, &str)> = report
            .groups
            .iter()
            .map(|g| (g.sheet_title.as_str(), g.institution.as_str()))
            .collect();
        assert_eq!(order, [("Sheet1", "Beta"), ("Sheet1", "Zeta"), ("Sheet2", "Acme")]);
    }

    #[test]
    fn summary_counts() {
        let report = report();
        assert!(report.has_error());
        let summary = report.summary();
        assert_eq!(summary.groups, 3);
        assert_eq!(summary.groups_with_errors, 1);
        assert_eq!(summary.groups_with_data_errors, 1);
        assert_eq!(summary.groups_with_meta_errors, 0);
        assert_eq!(summary.failures, 1);
    }

    #[test]
    fn error_table_keeps_mismatches_only() {
        let report = report();
        assert_eq!(report.table().rows.len(), 3);
        let errors = report.error_table();
        assert_eq!(errors.rows.len(), 1);
        assert_eq!(errors.rows[0][2], "Zeta");
        assert_eq!(errors.rows[0][6], "mismatch");
    }

    #[test]
    fn csv_quotes_where_needed() {
        let csv = report().error_table().to_csv().unwrap();
        assert_eq!(
            csv,
            "spreadsheet,sheet,institution,path,field,class,outcome,sheet_value,store_value\n\
             Courts,Sheet1,Zeta,Zeta,name,data,mismatch,Zeta,\"Zeta, Inc\"\n"
        );
        let failures = report().failure_table().to_csv().unwrap();
        assert!(failures.ends_with("Courts,Notes,,unrecognized format\n"));
    }
}
