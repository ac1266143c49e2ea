//! Running a QA pass over one spreadsheet.

use futures::StreamExt;
use futures::stream;
use sigla_core::schema::field;
use sigla_core::{Collection, ExtractedRecord, PipelineConfig, SheetSource, Variable};
use sigla_store::{
    DocumentId, DocumentStore, Filter, StoreError, StoredInstitution, StoredRecord, StoredVariable,
    find_institution_elsewhere,
};
use sigla_sync::{RetryPolicy, SheetReader, SyncError, fetch_sheet, fetch_spreadsheet};
use tracing::{debug, info, warn};

use crate::QaError;
use crate::compare::{ComparisonNode, NodeKind};
use crate::engine::{compare_institution, compare_variables};
use crate::report::{GroupComparison, QaReport, UnitFailure};

/// Compares spreadsheets with the document store. Read-only on both sides.
pub struct QaRunner<'a> {
    reader: &'a dyn SheetReader,
    store: &'a dyn DocumentStore,
    policy: RetryPolicy,
    max_workers: usize,
}

impl<'a> QaRunner<'a> {
    pub fn new(
        reader: &'a dyn SheetReader,
        store: &'a dyn DocumentStore,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            reader,
            store,
            policy: RetryPolicy::from(config),
            max_workers: config.max_workers.max(1),
        }
    }

    /// Fetch and extract every sheet of `spreadsheet_id`, at most
    /// `max_workers` at a time, and compare the records with the store.
    ///
    /// A sheet that cannot be fetched or extracted, and an institution the
    /// store does not hold, become [`UnitFailure`]s; the rest of the
    /// spreadsheet is still compared.
    pub async fn run(&self, spreadsheet_id: &str) -> Result<QaReport, QaError> {
        let spreadsheet = fetch_spreadsheet(self.reader, &self.policy, spreadsheet_id).await?;
        let mut report = QaReport::new(&spreadsheet.spreadsheet_id, &spreadsheet.title);

        let spreadsheet = &spreadsheet;
        let extracted: Vec<_> = stream::iter(&spreadsheet.sheets)
            .map(|sheet| async move {
                let records = fetch_sheet(self.reader, &self.policy, spreadsheet, sheet)
                    .await
                    .and_then(|raw| raw.extract().map_err(SyncError::from));
                (sheet, records)
            })
            .buffer_unordered(self.max_workers)
            .collect()
            .await;

        for (sheet, records) in extracted {
            match records {
                Ok(records) => {
                    debug!(sheet = %sheet.title, records = records.len(), "extracted sheet");
                    let (groups, failures) = reconcile_records(self.store, &records).await?;
                    report.groups.extend(groups);
                    report.failures.extend(failures);
                }
                Err(err) => {
                    warn!(sheet = %sheet.title, error = %err, "skipping sheet");
                    report.failures.push(UnitFailure {
                        spreadsheet_id: spreadsheet.spreadsheet_id.clone(),
                        spreadsheet_title: spreadsheet.title.clone(),
                        sheet_title: sheet.title.clone(),
                        institution: None,
                        error: err.to_string(),
                    });
                }
            }
        }

        report.sort();
        let summary = report.summary();
        info!(
            spreadsheet = %report.spreadsheet_title,
            groups = summary.groups,
            with_errors = summary.groups_with_errors,
            failures = summary.failures,
            "QA pass complete"
        );
        Ok(report)
    }
}

/// Compare extracted records with the store.
///
/// Each institution record is one unit; variable records form one unit per
/// institution and sheet. Stored variables are selected by their owner and
/// the stored sheet they were loaded from, so a sheet that moved only shows
/// up in the meta fields. A unit whose institution is missing or ambiguous
/// becomes a failure. Other store errors abort the pass.
pub async fn reconcile_records(
    store: &dyn DocumentStore,
    records: &[ExtractedRecord],
) -> Result<(Vec<GroupComparison>, Vec<UnitFailure>), StoreError> {
    let mut groups = Vec::new();
    let mut failures = Vec::new();

    let mut variable_units: Vec<((&str, &SheetSource), Vec<Variable>)> = Vec::new();
    for record in records {
        match record {
            ExtractedRecord::Institution(institution) => {
                let source = &institution.source;
                let stored = match own_institution(store, &institution.name, &source.spreadsheet_id).await {
                    Ok(stored) => stored,
                    Err(err) if is_unit_failure(&err) => {
                        failures.push(unit_failure(source, &institution.name, &err));
                        continue;
                    }
                    Err(err) => return Err(err),
                };
                let variables: Vec<StoredVariable> =
                    institution_variables(store, &stored.id, &stored.source.spreadsheet_id)
                        .await?
                        .into_iter()
                        .filter(|v| v.sheet.sheet_id == stored.source.sheet_id)
                        .collect();
                let node = compare_institution(institution, &stored, &variables);
                groups.push(group(source, &institution.name, node));
            }
            ExtractedRecord::Variable(record) => {
                let key = (record.institution.as_str(), &record.source);
                match variable_units.iter_mut().find(|(k, _)| *k == key) {
                    Some((_, unit)) => unit.push(record.variable.clone()),
                    None => variable_units.push((key, vec![record.variable.clone()])),
                }
            }
        }
    }

    for ((name, source), variables) in variable_units {
        let owner = match owning_institution(store, name, &source.spreadsheet_id).await {
            Ok(owner) => owner,
            Err(err) if is_unit_failure(&err) => {
                failures.push(unit_failure(source, name, &err));
                continue;
            }
            Err(err) => return Err(err),
        };
        let candidates: Vec<StoredVariable> =
            institution_variables(store, &owner.id, &source.spreadsheet_id)
                .await?
                .into_iter()
                .filter(|v| {
                    owner.source.spreadsheet_id != source.spreadsheet_id
                        || v.sheet.sheet_id != owner.source.sheet_id
                })
                .collect();
        let stored_vars = sheet_variables(candidates, source);
        let mut node = ComparisonNode::new(NodeKind::Institution, name);
        node.children = compare_variables(&variables, source, &stored_vars);
        groups.push(group(source, name, node));
    }

    Ok((groups, failures))
}

/// The institution `name` as loaded from `spreadsheet_id`.
async fn own_institution(
    store: &dyn DocumentStore,
    name: &str,
    spreadsheet_id: &str,
) -> Result<StoredInstitution, StoreError> {
    let filter = Filter::new(Collection::Institutions)
        .with(field::SPREADSHEET_ID, spreadsheet_id)
        .with(field::NAME, name);
    match store.find_one(&filter).await? {
        StoredRecord::Institution(stored) => Ok(stored),
        _ => Err(StoreError::UnableToFindDocument {
            filter: filter.to_string(),
        }),
    }
}

/// The owner of a variable sheet: the institution of the same spreadsheet,
/// else the single institution of that name loaded from another one.
async fn owning_institution(
    store: &dyn DocumentStore,
    name: &str,
    spreadsheet_id: &str,
) -> Result<StoredInstitution, StoreError> {
    match own_institution(store, name, spreadsheet_id).await {
        Err(StoreError::UnableToFindDocument { .. }) => {
            find_institution_elsewhere(store, name, spreadsheet_id).await
        }
        found => found,
    }
}

/// Variables of `institution` loaded from `spreadsheet_id`, by index.
async fn institution_variables(
    store: &dyn DocumentStore,
    institution: &DocumentId,
    spreadsheet_id: &str,
) -> Result<Vec<StoredVariable>, StoreError> {
    let filter = Filter::new(Collection::Variables)
        .with(field::INSTITUTION, institution)
        .with(field::SPREADSHEET_ID, spreadsheet_id);
    let mut variables: Vec<StoredVariable> = store
        .find(&filter)
        .await?
        .into_iter()
        .filter_map(|r| match r {
            StoredRecord::Variable(v) => Some(v),
            _ => None,
        })
        .collect();
    variables.sort_by_key(|v| v.index);
    Ok(variables)
}

/// The stored variables of the sheet `source` was loaded as: same sheet id,
/// else same sheet title.
fn sheet_variables(candidates: Vec<StoredVariable>, source: &SheetSource) -> Vec<StoredVariable> {
    let sheet_id = candidates
        .iter()
        .find(|v| v.sheet.sheet_id == source.sheet_id)
        .or_else(|| candidates.iter().find(|v| v.sheet.sheet_title == source.sheet_title))
        .map(|v| v.sheet.sheet_id.clone());
    match sheet_id {
        Some(sheet_id) => candidates
            .into_iter()
            .filter(|v| v.sheet.sheet_id == sheet_id)
            .collect(),
        None => Vec::new(),
    }
}

fn is_unit_failure(err: &StoreError) -> bool {
    matches!(
        err,
        StoreError::UnableToFindDocument { .. } | StoreError::AmbiguousDocument { .. }
    )
}

fn group(source: &SheetSource, institution: &str, node: ComparisonNode) -> GroupComparison {
    GroupComparison {
        spreadsheet_id: source.spreadsheet_id.clone(),
        spreadsheet_title: source.spreadsheet_title.clone(),
        sheet_title: source.sheet_title.clone(),
        institution: institution.to_string(),
        node,
    }
}

fn unit_failure(source: &SheetSource, institution: &str, error: &StoreError) -> UnitFailure {
    warn!(institution, error = %error, "no stored counterpart");
    UnitFailure {
        spreadsheet_id: source.spreadsheet_id.clone(),
        spreadsheet_title: source.spreadsheet_title.clone(),
        sheet_title: source.sheet_title.clone(),
        institution: Some(institution.to_string()),
        error: error.to_string(),
    }
}
