//! Field-level comparison of extracted records with stored documents.

use std::collections::{BTreeSet, HashMap};

use sigla_core::schema::{META_FIELDS, field};
use sigla_core::{AnswerMap, Institution, SheetSource, Variable};
use sigla_store::{DocumentId, StoredInstitution, StoredVariable};

use crate::compare::{ComparisonNode, FieldComparison, NodeKind};

const LIST_SEPARATOR: &str = "; ";

fn some(value: &str) -> Option<String> {
    Some(value.to_string())
}

/// Meta field values, in `META_FIELDS` order.
fn meta_values(source: &SheetSource) -> [&str; 4] {
    [
        source.spreadsheet_id.as_str(),
        source.spreadsheet_title.as_str(),
        source.sheet_id.as_str(),
        source.sheet_title.as_str(),
    ]
}

fn push_meta(node: &mut ComparisonNode, sheet: Option<&SheetSource>, store: Option<&SheetSource>) {
    let sheet = sheet.map(meta_values);
    let store = store.map(meta_values);
    for (i, name) in META_FIELDS.iter().enumerate() {
        node.push(FieldComparison::new(
            *name,
            sheet.map(|values| values[i].to_string()),
            store.map(|values| values[i].to_string()),
        ));
    }
}

/// Compare an institution and its variables with their stored counterparts.
///
/// `stored_variables` are the stored variables of this institution and sheet.
pub fn compare_institution(
    sheet: &Institution,
    stored: &StoredInstitution,
    stored_variables: &[StoredVariable],
) -> ComparisonNode {
    let mut node = ComparisonNode::new(NodeKind::Institution, sheet.name.clone());
    node.push(FieldComparison::new(field::NAME, some(&sheet.name), some(&stored.name)));
    node.push(FieldComparison::new(
        field::CATEGORY,
        some(&sheet.category),
        some(&stored.category),
    ));
    node.push(FieldComparison::new(
        field::SUB_CATEGORIES,
        Some(sheet.sub_categories.join(LIST_SEPARATOR)),
        Some(stored.sub_categories.join(LIST_SEPARATOR)),
    ));
    node.push(FieldComparison::new(
        field::COUNTRY,
        sheet.country.clone(),
        stored.country.clone(),
    ));
    push_meta(&mut node, Some(&sheet.source), Some(&stored.source));
    node.children = compare_variables(&sheet.variables, &sheet.source, stored_variables);
    node
}

/// Pair variables by index and compare each pair.
///
/// A sheet variable with no stored counterpart compares as missing in the
/// store; a stored variable with no sheet counterpart compares as a
/// mismatch.
pub fn compare_variables(
    sheet: &[Variable],
    source: &SheetSource,
    stored: &[StoredVariable],
) -> Vec<ComparisonNode> {
    let headings: HashMap<&DocumentId, &str> =
        stored.iter().map(|v| (&v.id, v.heading.as_str())).collect();
    let indices: BTreeSet<usize> = sheet
        .iter()
        .map(|v| v.index)
        .chain(stored.iter().map(|v| v.index))
        .collect();

    indices
        .into_iter()
        .map(|index| {
            let sheet_variable = sheet.iter().find(|v| v.index == index);
            let stored_variable = stored.iter().find(|v| v.index == index);
            compare_variable(index, sheet_variable, source, stored_variable, &headings)
        })
        .collect()
}

fn compare_variable(
    index: usize,
    sheet: Option<&Variable>,
    source: &SheetSource,
    stored: Option<&StoredVariable>,
    headings: &HashMap<&DocumentId, &str>,
) -> ComparisonNode {
    let heading = sheet
        .map(|v| v.heading.as_str())
        .or(stored.map(|v| v.heading.as_str()))
        .unwrap_or_default();
    let mut node = ComparisonNode::new(NodeKind::Variable, format!("{heading} [{index}]"));

    node.push(FieldComparison::new(
        field::TYPE,
        sheet.map(|v| v.variable_type.to_string()),
        stored.map(|v| v.variable_type.to_string()),
    ));
    node.push(FieldComparison::new(
        field::INDEX,
        sheet.map(|v| v.index.to_string()),
        stored.map(|v| v.index.to_string()),
    ));
    node.push(FieldComparison::new(
        field::HEADING,
        sheet.map(|v| v.heading.clone()),
        stored.map(|v| v.heading.clone()),
    ));
    node.push(FieldComparison::new(
        field::SOURCE,
        sheet.map(|v| v.source.clone()),
        stored.map(|v| v.source.clone()),
    ));
    node.push(FieldComparison::new(
        field::ORIGINAL_TEXT,
        sheet.map(|v| v.original_text.clone()),
        stored.map(|v| v.original_text.clone()),
    ));
    node.push(FieldComparison::new(
        field::HYPERLINK,
        sheet.and_then(|v| v.hyperlink.clone()),
        stored.and_then(|v| v.hyperlink.clone()),
    ));
    node.push(FieldComparison::new(
        field::CONSTITUENTS,
        sheet.map(|v| {
            v.constituents
                .iter()
                .map(|c| c.heading.as_str())
                .collect::<Vec<_>>()
                .join(LIST_SEPARATOR)
        }),
        stored.map(|v| {
            v.constituents
                .iter()
                .map(|id| headings.get(id).copied().unwrap_or(id.as_str()))
                .collect::<Vec<_>>()
                .join(LIST_SEPARATOR)
        }),
    ));
    push_meta(&mut node, sheet.map(|_| source), stored.map(|v| &v.sheet));
    node.children.push(compare_answers(
        sheet.map(|v| &v.answers),
        stored.map(|v| &v.answers),
    ));
    node
}

/// One field per answer key: the sheet's keys in order, then keys only the
/// store has.
pub fn compare_answers(sheet: Option<&AnswerMap>, store: Option<&AnswerMap>) -> ComparisonNode {
    let mut node = ComparisonNode::new(NodeKind::Answers, field::ANSWERS);
    let mut keys: Vec<&str> = sheet.map(|a| a.keys().collect()).unwrap_or_default();
    if let Some(store) = store {
        for key in store.keys() {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
    }
    for key in keys {
        node.push(FieldComparison::new(
            key,
            sheet.and_then(|a| a.get(key)).map(str::to_string),
            store.and_then(|a| a.get(key)).map(str::to_string),
        ));
    }
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::{FieldClass, Outcome};
    use sigla_core::{ConstituentRef, VariableType};

    fn source(sheet_title: &str) -> SheetSource {
        SheetSource::new("ss-1", "Courts", "0", sheet_title)
    }

    fn answered(index: usize, heading: &str, answer: &str) -> Variable {
        let mut v = Variable::standard(index, heading);
        v.answers = AnswerMap::single(answer);
        v
    }

    fn stored_from(v: &Variable, id: &str, constituents: &[&str], sheet_title: &str) -> StoredVariable {
        StoredVariable {
            id: id.into(),
            institution: "i1".into(),
            variable_type: v.variable_type,
            index: v.index,
            heading: v.heading.clone(),
            source: v.source.clone(),
            original_text: v.original_text.clone(),
            hyperlink: v.hyperlink.clone(),
            answers: v.answers.clone(),
            constituents: constituents.iter().map(|c| DocumentId::from(*c)).collect(),
            sheet: source(sheet_title),
        }
    }

    fn fixture() -> (Institution, StoredInstitution, Vec<StoredVariable>) {
        let elected = answered(0, "Elected", "Yes");
        let mut rights = answered(1, "Rights", "Partial");
        rights.variable_type = VariableType::Composite;
        rights.constituents = vec![ConstituentRef {
            index: 0,
            heading: "Elected".into(),
        }];
        let stored_variables = vec![
            stored_from(&elected, "v0", &[], "Sheet1"),
            stored_from(&rights, "v1", &["v0"], "Sheet1"),
        ];
        let institution = Institution {
            name: "Acme Court".into(),
            category: "Judiciary".into(),
            sub_categories: vec!["Apex".into(), "Federal".into()],
            country: Some("Peru".into()),
            source: source("Sheet1"),
            variables: vec![elected, rights],
        };
        let stored = StoredInstitution {
            id: "i1".into(),
            name: "Acme Court".into(),
            category: "Judiciary".into(),
            sub_categories: vec!["Apex".into(), "Federal".into()],
            country: Some("Peru".into()),
            source: source("Sheet1"),
        };
        (institution, stored, stored_variables)
    }

    #[test]
    fn identical_records_have_no_error() {
        let (institution, stored, variables) = fixture();
        let node = compare_institution(&institution, &stored, &variables);
        assert!(!node.has_error());
        assert_eq!(node.children.len(), 2);
        let constituents = node.children[1].field(field::CONSTITUENTS).unwrap();
        assert_eq!(constituents.store.as_deref(), Some("Elected"));
    }

    #[test]
    fn single_data_change_marks_every_ancestor() {
        let (institution, stored, mut variables) = fixture();
        variables[0].answers = AnswerMap::single("No");
        let node = compare_institution(&institution, &stored, &variables);
        assert!(node.has_error());
        assert!(node.children[0].has_error());
        assert!(node.children[0].children[0].has_error());
        assert!(!node.children[1].has_error());
        assert!(!node.has_meta_error());
    }

    #[test]
    fn sheet_title_change_is_a_meta_error_only() {
        let (institution, mut stored, mut variables) = fixture();
        stored.source.sheet_title = "Sheet2".into();
        for v in &mut variables {
            v.sheet.sheet_title = "Sheet2".into();
        }
        let node = compare_institution(&institution, &stored, &variables);
        assert!(node.has_meta_error());
        assert!(!node.has_data_error());
        let title = node.field(field::SHEET_TITLE).unwrap();
        assert_eq!(title.class, FieldClass::Meta);
        assert_eq!(title.outcome(), Outcome::Mismatch);
    }

    #[test]
    fn unpaired_variables() {
        let (mut institution, stored, mut variables) = fixture();
        institution.variables.push(answered(2, "Term", "6"));
        variables.remove(0);
        let node = compare_institution(&institution, &stored, &variables);
        assert_eq!(node.children.len(), 3);

        let sheet_only = &node.children[2];
        assert_eq!(sheet_only.label, "Term [2]");
        assert_eq!(sheet_only.field(field::HEADING).unwrap().outcome(), Outcome::MissingInStore);

        let missing_index_zero = &node.children[0];
        assert_eq!(
            missing_index_zero.field(field::HEADING).unwrap().outcome(),
            Outcome::MissingInStore
        );
        // The stored composite still points at the deleted variable's id.
        let constituents = node.children[1].field(field::CONSTITUENTS).unwrap();
        assert_eq!(constituents.store.as_deref(), Some("v0"));
        assert!(node.children[1].has_error());
    }

    #[test]
    fn answer_keys_on_one_side_only() {
        let sheet: AnswerMap = [("min", "4"), ("max", "6")].into_iter().collect();
        let store: AnswerMap = [("max", "6"), ("avg", "5")].into_iter().collect();
        let node = compare_answers(Some(&sheet), Some(&store));
        let outcomes: Vec<(&str, Outcome)> = node
            .fields
            .iter()
            .map(|f| (f.name.as_str(), f.outcome()))
            .collect();
        assert_eq!(
            outcomes,
            [
                ("min", Outcome::MissingInStore),
                ("max", Outcome::Match),
                ("avg", Outcome::Mismatch),
            ]
        );
    }
}
