//! Replacing the stored documents of one spreadsheet.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use serde_json::Value;
use sigla_core::schema::{self, field};
use sigla_core::{Collection, CoreError, ExtractedRecord, Institution, SheetSource, Variable};
use tracing::{debug, info};

use crate::{
    DocumentId, DocumentStore, Filter, StoreError, StoredInstitution, StoredRecord,
    StoredVariable,
};

/// Counts from one [`replace_spreadsheet`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub spreadsheet_id: String,
    pub institutions_deleted: usize,
    pub variables_deleted: usize,
    pub entries_deleted: usize,
    pub institutions_loaded: usize,
    pub variables_loaded: usize,
}

type VariableKey = (DocumentId, String, usize);

/// Ids already assigned to the documents of a spreadsheet, by natural key.
struct ExistingIds {
    institutions: HashMap<String, DocumentId>,
    variables: HashMap<VariableKey, DocumentId>,
}

impl ExistingIds {
    async fn fetch(store: &dyn DocumentStore, spreadsheet_id: &str) -> Result<Self, StoreError> {
        let institutions = store
            .find(&Filter::new(Collection::Institutions).with(field::SPREADSHEET_ID, spreadsheet_id))
            .await?
            .iter()
            .filter_map(StoredRecord::as_institution)
            .map(|i| (i.name.clone(), i.id.clone()))
            .collect();
        let variables = store
            .find(&Filter::new(Collection::Variables).with(field::SPREADSHEET_ID, spreadsheet_id))
            .await?
            .iter()
            .filter_map(StoredRecord::as_variable)
            .map(|v| ((v.institution.clone(), v.sheet.sheet_id.clone(), v.index), v.id.clone()))
            .collect();
        Ok(Self {
            institutions,
            variables,
        })
    }

    fn institution(&self, name: &str) -> DocumentId {
        self.institutions
            .get(name)
            .cloned()
            .unwrap_or_else(DocumentId::generate)
    }

    fn variable(&self, key: &VariableKey) -> DocumentId {
        self.variables
            .get(key)
            .cloned()
            .unwrap_or_else(DocumentId::generate)
    }
}

/// Convert the variables of one sheet, resolving constituent indices to ids.
fn stored_variables(
    ids: &ExistingIds,
    institution: &DocumentId,
    sheet: &SheetSource,
    variables: &[Variable],
) -> Vec<StoredRecord> {
    let assigned: HashMap<usize, DocumentId> = variables
        .iter()
        .map(|v| {
            let key = (institution.clone(), sheet.sheet_id.clone(), v.index);
            (v.index, ids.variable(&key))
        })
        .collect();

    variables
        .iter()
        .filter_map(|v| {
            let id = assigned.get(&v.index)?.clone();
            let constituents = v
                .constituents
                .iter()
                .filter_map(|c| assigned.get(&c.index).cloned())
                .collect();
            Some(StoredRecord::Variable(StoredVariable {
                id,
                institution: institution.clone(),
                variable_type: v.variable_type,
                index: v.index,
                heading: v.heading.clone(),
                source: v.source.clone(),
                original_text: v.original_text.clone(),
                hyperlink: v.hyperlink.clone(),
                answers: v.answers.clone(),
                constituents,
                sheet: sheet.clone(),
            }))
        })
        .collect()
}

fn stored_institution(id: DocumentId, institution: &Institution) -> StoredRecord {
    StoredRecord::Institution(StoredInstitution {
        id,
        name: institution.name.clone(),
        category: institution.category.clone(),
        sub_categories: institution.sub_categories.clone(),
        country: institution.country.clone(),
        source: institution.source.clone(),
    })
}

/// Replace every document loaded from `spreadsheet_id` with `records`.
///
/// All records are validated, and ids assigned and checked, before anything
/// is deleted. Institutions keep
/// their id when their name is unchanged and variables keep theirs when
/// their institution, sheet and index are unchanged, so loading the same
/// records twice leaves the store exactly as after the first load.
pub async fn replace_spreadsheet(
    store: &dyn DocumentStore,
    spreadsheet_id: &str,
    records: &[ExtractedRecord],
) -> Result<LoadSummary, StoreError> {
    schema::validate_all(records).map_err(CoreError::from)?;
    if let Some(stray) = records
        .iter()
        .find(|r| r.source().spreadsheet_id != spreadsheet_id)
    {
        return Err(StoreError::Other(format!(
            "record for '{}' comes from spreadsheet {}, not {spreadsheet_id}",
            stray.institution_name(),
            stray.source().spreadsheet_id
        )));
    }

    let ids = ExistingIds::fetch(store, spreadsheet_id).await?;
    let mut institution_ids: HashMap<String, DocumentId> = HashMap::new();
    let mut institutions = Vec::new();
    let mut variables = Vec::new();

    for record in records {
        if let ExtractedRecord::Institution(institution) = record {
            let id = ids.institution(&institution.name);
            institution_ids.insert(institution.name.clone(), id.clone());
            variables.extend(stored_variables(
                &ids,
                &id,
                &institution.source,
                &institution.variables,
            ));
            institutions.push(stored_institution(id, institution));
        }
    }

    // Variable records name an institution defined by this spreadsheet or
    // by an earlier one.
    let mut grouped: Vec<((DocumentId, SheetSource), Vec<Variable>)> = Vec::new();
    for record in records {
        let ExtractedRecord::Variable(record) = record else {
            continue;
        };
        let owner = match institution_ids.get(&record.institution) {
            Some(id) => id.clone(),
            None => {
                let id = find_institution_elsewhere(store, &record.institution, spreadsheet_id)
                    .await?
                    .id;
                institution_ids.insert(record.institution.clone(), id.clone());
                id
            }
        };
        let key = (owner, record.source.clone());
        match grouped.iter_mut().find(|(k, _)| *k == key) {
            Some((_, group)) => group.push(record.variable.clone()),
            None => grouped.push((key, vec![record.variable.clone()])),
        }
    }
    for ((owner, sheet), group) in &grouped {
        variables.extend(stored_variables(&ids, owner, sheet, group));
    }

    let mut batch = institutions;
    let institutions_loaded = batch.len();
    batch.extend(variables);
    check_unique_ids(&batch)?;

    let mut summary = LoadSummary {
        spreadsheet_id: spreadsheet_id.to_string(),
        institutions_loaded,
        variables_loaded: batch.len() - institutions_loaded,
        ..LoadSummary::default()
    };
    summary.entries_deleted = delete_entries(store, spreadsheet_id).await?;
    summary.variables_deleted = store
        .delete_many(&Filter::new(Collection::Variables).with(field::SPREADSHEET_ID, spreadsheet_id))
        .await?;
    summary.institutions_deleted = store
        .delete_many(&Filter::new(Collection::Institutions).with(field::SPREADSHEET_ID, spreadsheet_id))
        .await?;

    store.load(batch).await?;

    info!(
        spreadsheet_id,
        institutions = summary.institutions_loaded,
        variables = summary.variables_loaded,
        "replaced spreadsheet documents"
    );
    Ok(summary)
}

fn check_unique_ids(batch: &[StoredRecord]) -> Result<(), StoreError> {
    let mut seen = HashSet::new();
    match batch.iter().find(|r| !seen.insert(r.id())) {
        Some(duplicate) => Err(StoreError::DuplicateId(duplicate.id().clone())),
        None => Ok(()),
    }
}

/// The one institution named `name` that belongs to a spreadsheet other than
/// `spreadsheet_id`.
///
/// More than one match is [`StoreError::AmbiguousDocument`]: an institution
/// name shared by two spreadsheets cannot own variables defined elsewhere.
pub async fn find_institution_elsewhere(
    store: &dyn DocumentStore,
    name: &str,
    spreadsheet_id: &str,
) -> Result<StoredInstitution, StoreError> {
    let filter = Filter::new(Collection::Institutions).with(field::NAME, name);
    let mut found: Vec<StoredInstitution> = store
        .find(&filter)
        .await?
        .into_iter()
        .filter_map(|r| match r {
            StoredRecord::Institution(i) if i.source.spreadsheet_id != spreadsheet_id => Some(i),
            _ => None,
        })
        .collect();
    match found.len() {
        0 => Err(StoreError::UnableToFindDocument {
            filter: filter.to_string(),
        }),
        1 => Ok(found.remove(0)),
        count => Err(StoreError::AmbiguousDocument {
            filter: filter.to_string(),
            count,
        }),
    }
}

/// Delete rights, amendments and body-of-law rows that hang off the
/// spreadsheet's variables.
async fn delete_entries(store: &dyn DocumentStore, spreadsheet_id: &str) -> Result<usize, StoreError> {
    let variable_ids: Vec<Value> = store
        .find(&Filter::new(Collection::Variables).with(field::SPREADSHEET_ID, spreadsheet_id))
        .await?
        .iter()
        .map(|v| Value::from(v.id()))
        .collect();
    if variable_ids.is_empty() {
        return Ok(0);
    }
    let mut deleted = 0;
    for collection in [Collection::Rights, Collection::Amendments, Collection::BodyOfLaw] {
        let filter = Filter::new(collection).with_any(field::VARIABLE, variable_ids.clone());
        deleted += store.delete_many(&filter).await?;
    }
    debug!(spreadsheet_id, deleted, "deleted dependent entries");
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryStore, StoredEntry};
    use sigla_core::schema::SchemaViolation;
    use sigla_core::{AnswerMap, ConstituentRef, VariableRecord, VariableType};

    fn source(sheet: &str) -> SheetSource {
        SheetSource::new("ss-1", "Courts", sheet, format!("Sheet {sheet}"))
    }

    fn answered(index: usize, heading: &str, answer: &str) -> Variable {
        let mut v = Variable::standard(index, heading);
        v.answers = AnswerMap::single(answer);
        v
    }

    fn courts() -> Vec<ExtractedRecord> {
        let mut rights = answered(1, "Rights", "Partial");
        rights.variable_type = VariableType::Composite;
        rights.constituents = vec![ConstituentRef {
            index: 0,
            heading: "Elected".into(),
        }];
        vec![
            ExtractedRecord::Institution(Institution {
                name: "Acme Court".into(),
                category: "Judiciary".into(),
                sub_categories: vec!["Apex".into()],
                country: None,
                source: source("0"),
                variables: vec![answered(0, "Elected", "Yes"), rights],
            }),
            ExtractedRecord::Variable(VariableRecord {
                institution: "Acme Court".into(),
                source: source("1"),
                variable: answered(0, "Tenure", "Life"),
            }),
        ]
    }

    #[tokio::test]
    async fn replace_is_idempotent() {
        let store = MemoryStore::open();
        let first = replace_spreadsheet(&store, "ss-1", &courts()).await.unwrap();
        assert_eq!(first.institutions_loaded, 1);
        assert_eq!(first.variables_loaded, 3);
        assert_eq!(first.institutions_deleted, 0);
        let before = store.snapshot().unwrap();

        let second = replace_spreadsheet(&store, "ss-1", &courts()).await.unwrap();
        assert_eq!(second.institutions_deleted, 1);
        assert_eq!(second.variables_deleted, 3);
        assert_eq!(store.snapshot().unwrap(), before);
    }

    #[tokio::test]
    async fn constituents_become_ids() {
        let store = MemoryStore::open();
        replace_spreadsheet(&store, "ss-1", &courts()).await.unwrap();
        let variables = store
            .find(&Filter::new(Collection::Variables).with(field::SHEET_ID, "0"))
            .await
            .unwrap();
        let elected = variables[0].as_variable().unwrap();
        let rights = variables[1].as_variable().unwrap();
        assert_eq!(rights.constituents, vec![elected.id.clone()]);
        assert_eq!(rights.institution, elected.institution);
    }

    #[tokio::test]
    async fn invalid_records_leave_store_untouched() {
        let store = MemoryStore::open();
        replace_spreadsheet(&store, "ss-1", &courts()).await.unwrap();
        let before = store.snapshot().unwrap();

        let mut broken = courts();
        if let ExtractedRecord::Institution(i) = &mut broken[0] {
            i.variables[1].constituents[0].index = 7;
        }
        let err = replace_spreadsheet(&store, "ss-1", &broken).await.unwrap_err();
        assert!(matches!(err, StoreError::Core(CoreError::Schema(_))));
        assert_eq!(store.snapshot().unwrap(), before);
    }

    #[tokio::test]
    async fn unknown_institution_is_reported() {
        let store = MemoryStore::open();
        let records = vec![ExtractedRecord::Variable(VariableRecord {
            institution: "Nowhere".into(),
            source: source("1"),
            variable: answered(0, "Tenure", "Life"),
        })];
        let err = replace_spreadsheet(&store, "ss-1", &records).await.unwrap_err();
        assert!(matches!(err, StoreError::UnableToFindDocument { .. }));
    }

    #[tokio::test]
    async fn institution_defined_twice_is_rejected_before_deleting() {
        let store = MemoryStore::open();
        replace_spreadsheet(&store, "ss-1", &courts()).await.unwrap();
        let before = store.snapshot().unwrap();

        let mut records = courts();
        records.push(ExtractedRecord::Institution(Institution {
            name: "Acme Court".into(),
            category: "Judiciary".into(),
            sub_categories: vec![],
            country: None,
            source: source("2"),
            variables: vec![answered(0, "Elected", "No")],
        }));
        for _ in 0..2 {
            let err = replace_spreadsheet(&store, "ss-1", &records).await.unwrap_err();
            assert!(matches!(
                err,
                StoreError::Core(CoreError::Schema(SchemaViolation::DuplicateInstitution { .. }))
            ));
            assert_eq!(store.snapshot().unwrap(), before);
        }
    }

    #[test]
    fn duplicate_ids_in_a_batch_are_caught() {
        let entry = |id: &str| {
            StoredRecord::Right(StoredEntry {
                id: id.into(),
                variable: "v".into(),
                index: 0,
                answers: AnswerMap::single("Speech"),
                law: None,
            })
        };
        assert!(check_unique_ids(&[entry("a"), entry("b")]).is_ok());
        let err = check_unique_ids(&[entry("a"), entry("b"), entry("a")]).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId(id) if id.as_str() == "a"));
    }

    fn supreme_court(spreadsheet_id: &str) -> ExtractedRecord {
        ExtractedRecord::Institution(Institution {
            name: "Supreme Court".into(),
            category: "Judiciary".into(),
            sub_categories: vec![],
            country: None,
            source: SheetSource::new(spreadsheet_id, spreadsheet_id, "0", "Sheet1"),
            variables: vec![],
        })
    }

    #[tokio::test]
    async fn institution_named_by_two_spreadsheets_is_ambiguous() {
        let store = MemoryStore::open();
        replace_spreadsheet(&store, "peru", &[supreme_court("peru")]).await.unwrap();
        let tenure = vec![ExtractedRecord::Variable(VariableRecord {
            institution: "Supreme Court".into(),
            source: source("1"),
            variable: answered(0, "Tenure", "Life"),
        })];
        replace_spreadsheet(&store, "ss-1", &tenure).await.unwrap();

        replace_spreadsheet(&store, "chile", &[supreme_court("chile")]).await.unwrap();
        let before = store.snapshot().unwrap();
        let err = replace_spreadsheet(&store, "ss-1", &tenure).await.unwrap_err();
        assert!(matches!(err, StoreError::AmbiguousDocument { count: 2, .. }));
        assert_eq!(store.snapshot().unwrap(), before);
    }

    #[tokio::test]
    async fn dependent_entries_are_removed() {
        let store = MemoryStore::open();
        replace_spreadsheet(&store, "ss-1", &courts()).await.unwrap();
        let rights_variable = store
            .find_one(&Filter::new(Collection::Variables).with(field::HEADING, "Rights"))
            .await
            .unwrap();
        store
            .load(vec![StoredRecord::Right(StoredEntry {
                id: DocumentId::generate(),
                variable: rights_variable.id().clone(),
                index: 0,
                answers: AnswerMap::single("Speech"),
                law: None,
            })])
            .await
            .unwrap();

        let summary = replace_spreadsheet(&store, "ss-1", &courts()).await.unwrap();
        assert_eq!(summary.entries_deleted, 1);
        assert!(store.find(&Filter::new(Collection::Rights)).await.unwrap().is_empty());
    }
}
