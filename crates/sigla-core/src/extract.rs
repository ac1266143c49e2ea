//! Turning a sheet body into records.
//!
//! The body is the range declared by the sheet metadata: header row(s)
//! first, then data rows. Dispatch is an exhaustive match over
//! [`SheetFormat`]; each layout is a plain function of the metadata and the
//! rows, with no I/O.

use crate::answers::{AnswerMap, DEFAULT_ANSWER_KEY};
use crate::error::{CoreError, FormatFault};
use crate::metadata::{SheetFormat, SheetMetadata, field};
use crate::range::column_name;
use crate::record::{
    ConstituentRef, ExtractedRecord, Institution, Variable, VariableRecord, VariableType,
    derive_aggregate_answers, split_sub_categories,
};

/// Column headings recognized in sheet bodies.
pub mod heading {
    pub const NAME: &str = "Name";
    pub const CATEGORY: &str = "Category";
    pub const SUB_CATEGORY: &str = "Sub-Category";
    pub const COUNTRY: &str = "Country";

    pub const SOURCE: &str = "Source";
    pub const ORIGINAL_TEXT: &str = "Original Text";
    pub const HYPERLINK: &str = "Hyperlink";

    pub const HEADING: &str = "Heading";
    pub const TYPE: &str = "Type";
    pub const CONSTITUENTS: &str = "Constituents";
    pub const ANSWER: &str = "Answer";
}

const OPTIONAL_SUFFIX: &str = "(optional)";
const CONSTITUENT_SEPARATOR: char = ';';

/// Extract every record from a sheet body.
pub fn extract(
    metadata: &SheetMetadata,
    rows: &[Vec<String>],
) -> Result<Vec<ExtractedRecord>, CoreError> {
    let records = match metadata.format {
        SheetFormat::StandardInstitution => institutions(metadata, rows, false),
        SheetFormat::MultipleSiglaAnswerVariable => institutions(metadata, rows, true),
        SheetFormat::CompositeVariable => composite_variable_records(metadata, rows),
        SheetFormat::InstitutionAndCompositeVariable => institution_with_composites(metadata, rows),
    }
    .map_err(|fault| CoreError::format_fault(&metadata.source.sheet_title, fault))?;

    tracing::info!(
        sheet = %metadata.source.sheet_title,
        format = %metadata.format,
        count = records.len(),
        "extracted records"
    );
    Ok(records)
}

// ── Body helpers ──

struct Heading {
    text: String,
    optional: bool,
}

impl Heading {
    fn parse(raw: &str) -> Self {
        let text = raw.trim();
        let lower = text.to_ascii_lowercase();
        match lower.strip_suffix(OPTIONAL_SUFFIX) {
            Some(rest) => Self {
                text: text[..rest.len()].trim_end().to_string(),
                optional: true,
            },
            None => Self {
                text: text.to_string(),
                optional: false,
            },
        }
    }
}

struct DataRow<'a> {
    number: u32,
    cells: &'a [String],
}

impl<'a> DataRow<'a> {
    fn cell(&self, column: usize) -> &'a str {
        self.cells.get(column).map(|c| c.trim()).unwrap_or_default()
    }

    fn optional(&self, column: Option<usize>) -> Option<&'a str> {
        column.map(|c| self.cell(c)).filter(|c| !c.is_empty())
    }

    fn required(&self, column: usize, heading: &str) -> Result<&'a str, FormatFault> {
        let value = self.cell(column);
        if value.is_empty() {
            return Err(FormatFault::EmptyCell {
                row: self.number,
                heading: heading.to_string(),
            });
        }
        Ok(value)
    }
}

/// Split the body into header rows and aligned, non-blank data rows.
fn split_body<'a>(
    metadata: &SheetMetadata,
    rows: &'a [Vec<String>],
) -> Result<(&'a [Vec<String>], Vec<DataRow<'a>>), FormatFault> {
    let header_rows = metadata.format.header_rows();
    if rows.len() < header_rows || rows[0].iter().all(|c| c.trim().is_empty()) {
        return Err(FormatFault::MissingHeaderRow);
    }
    let (header, body) = rows.split_at(header_rows);
    let width = header[0].len();

    for (offset, row) in header.iter().enumerate().skip(1) {
        check_alignment(metadata, offset, row, width)?;
    }

    let mut data = Vec::with_capacity(body.len());
    for (i, row) in body.iter().enumerate() {
        let offset = header_rows + i;
        if row.iter().all(|c| c.trim().is_empty()) {
            tracing::debug!(row = metadata.range.sheet_row_number(offset), "skipping blank row");
            continue;
        }
        check_alignment(metadata, offset, row, width)?;
        data.push(DataRow {
            number: metadata.range.sheet_row_number(offset),
            cells: row,
        });
    }
    Ok((header, data))
}

fn check_alignment(
    metadata: &SheetMetadata,
    offset: usize,
    row: &[String],
    width: usize,
) -> Result<(), FormatFault> {
    if row.len() != width {
        return Err(FormatFault::RowAlignment {
            row: metadata.range.sheet_row_number(offset),
            expected: width,
            found: row.len(),
        });
    }
    Ok(())
}

fn column_label(metadata: &SheetMetadata, column: usize) -> String {
    let first = metadata.range.start_column.unwrap_or(0);
    column_name(first.saturating_add(column as u32))
}

fn set_once(slot: &mut Option<usize>, column: usize, heading: &str) -> Result<(), FormatFault> {
    if slot.replace(column).is_some() {
        return Err(FormatFault::DuplicateHeading(heading.to_string()));
    }
    Ok(())
}

#[derive(Default)]
struct Annotations {
    source: Option<usize>,
    original_text: Option<usize>,
    hyperlink: Option<usize>,
}

impl Annotations {
    /// Claim `column` if `text` is an annotation heading.
    fn claim(&mut self, text: &str, column: usize, owner: &str) -> Option<Result<(), FormatFault>> {
        let slot = match text {
            heading::SOURCE => &mut self.source,
            heading::ORIGINAL_TEXT => &mut self.original_text,
            heading::HYPERLINK => &mut self.hyperlink,
            _ => return None,
        };
        let qualified = if owner.is_empty() {
            text.to_string()
        } else {
            format!("{owner}: {text}")
        };
        Some(set_once(slot, column, &qualified))
    }

    fn apply(&self, row: &DataRow<'_>, variable: &mut Variable) {
        variable.source = row.optional(self.source).unwrap_or_default().to_string();
        variable.original_text = row.optional(self.original_text).unwrap_or_default().to_string();
        variable.hyperlink = row.optional(self.hyperlink).map(str::to_string);
    }
}

fn is_annotation(text: &str) -> bool {
    matches!(text, heading::SOURCE | heading::ORIGINAL_TEXT | heading::HYPERLINK)
}

// ── Institution layouts ──

struct AnswerColumn {
    key: String,
    column: usize,
}

struct VariableColumns {
    heading: String,
    optional: bool,
    answers: Vec<AnswerColumn>,
    annotations: Annotations,
}

impl VariableColumns {
    fn read(&self, index: usize, row: &DataRow<'_>) -> Result<Variable, FormatFault> {
        let mut variable = Variable::standard(index, self.heading.clone());
        for answer in &self.answers {
            let value = row.cell(answer.column);
            if value.is_empty() {
                if self.optional {
                    continue;
                }
                return Err(FormatFault::EmptyCell {
                    row: row.number,
                    heading: self.heading.clone(),
                });
            }
            variable.answers.insert(answer.key.clone(), value);
        }
        self.annotations.apply(row, &mut variable);
        Ok(variable)
    }
}

#[derive(Default)]
struct InstitutionColumns {
    name: Option<usize>,
    category: Option<usize>,
    sub_category: Option<usize>,
    country: Option<usize>,
    variables: Vec<VariableColumns>,
}

/// Classify the header row of an institution layout.
///
/// With `keys`, a blank heading continues the previous variable and the key
/// row names each answer column.
fn institution_columns(
    metadata: &SheetMetadata,
    header: &[String],
    keys: Option<&[String]>,
) -> Result<InstitutionColumns, FormatFault> {
    let mut columns = InstitutionColumns::default();
    let mut continues = false;

    for (i, raw) in header.iter().enumerate() {
        let Heading { text, optional } = Heading::parse(raw);

        if text.is_empty() {
            match columns.variables.last_mut() {
                Some(variable) if keys.is_some() && continues => {
                    variable.answers.push(AnswerColumn {
                        key: String::new(),
                        column: i,
                    });
                    continue;
                }
                _ => {
                    return Err(FormatFault::BlankHeading {
                        column: column_label(metadata, i),
                    });
                }
            }
        }

        continues = false;
        match text.as_str() {
            heading::NAME => set_once(&mut columns.name, i, heading::NAME)?,
            heading::CATEGORY => set_once(&mut columns.category, i, heading::CATEGORY)?,
            heading::SUB_CATEGORY => set_once(&mut columns.sub_category, i, heading::SUB_CATEGORY)?,
            heading::COUNTRY => set_once(&mut columns.country, i, heading::COUNTRY)?,
            _ if is_annotation(&text) => {
                let variable = columns
                    .variables
                    .last_mut()
                    .ok_or_else(|| FormatFault::OrphanAnnotation(text.clone()))?;
                if let Some(claimed) = variable.annotations.claim(&text, i, &variable.heading) {
                    claimed?;
                }
            }
            _ => {
                if columns.variables.iter().any(|v| v.heading == text) {
                    return Err(FormatFault::DuplicateHeading(text));
                }
                columns.variables.push(VariableColumns {
                    heading: text,
                    optional,
                    answers: vec![AnswerColumn {
                        key: String::new(),
                        column: i,
                    }],
                    annotations: Annotations::default(),
                });
                continues = true;
            }
        }
    }

    if columns.name.is_none() {
        return Err(FormatFault::MissingHeading(heading::NAME.to_string()));
    }
    if columns.category.is_none() && metadata.category.is_none() {
        return Err(FormatFault::MissingHeading(heading::CATEGORY.to_string()));
    }

    for variable in &mut columns.variables {
        let single = variable.answers.len() == 1;
        let mut seen: Vec<String> = Vec::with_capacity(variable.answers.len());
        for answer in &mut variable.answers {
            let key = keys
                .and_then(|k| k.get(answer.column))
                .map(|k| k.trim())
                .unwrap_or_default();
            answer.key = match (key.is_empty(), single) {
                (false, _) => key.to_string(),
                (true, true) => DEFAULT_ANSWER_KEY.to_string(),
                (true, false) => {
                    return Err(FormatFault::MissingAnswerKey {
                        heading: variable.heading.clone(),
                        column: column_label(metadata, answer.column),
                    });
                }
            };
            if seen.contains(&answer.key) {
                return Err(FormatFault::DuplicateHeading(format!(
                    "{}: {}",
                    variable.heading, answer.key
                )));
            }
            seen.push(answer.key.clone());
        }
    }

    Ok(columns)
}

fn institutions(
    metadata: &SheetMetadata,
    rows: &[Vec<String>],
    keyed: bool,
) -> Result<Vec<ExtractedRecord>, FormatFault> {
    let (header, data) = split_body(metadata, rows)?;
    let keys = if keyed { header.get(1).map(Vec::as_slice) } else { None };
    let columns = institution_columns(metadata, &header[0], keys)?;
    let name_column = columns
        .name
        .ok_or_else(|| FormatFault::MissingHeading(heading::NAME.to_string()))?;

    let mut records = Vec::with_capacity(data.len());
    for row in &data {
        let name = row.required(name_column, heading::NAME)?;
        let category = match row.optional(columns.category) {
            Some(category) => category.to_string(),
            None => metadata.category.clone().ok_or_else(|| FormatFault::EmptyCell {
                row: row.number,
                heading: heading::CATEGORY.to_string(),
            })?,
        };
        let sub_categories = match row.optional(columns.sub_category) {
            Some(raw) => split_sub_categories(raw),
            None => metadata.sub_categories.clone(),
        };
        let country = row
            .optional(columns.country)
            .map(str::to_string)
            .or_else(|| metadata.country.clone());

        let variables = columns
            .variables
            .iter()
            .enumerate()
            .map(|(index, v)| v.read(index, row))
            .collect::<Result<Vec<_>, _>>()?;

        records.push(ExtractedRecord::Institution(Institution {
            name: name.to_string(),
            category,
            sub_categories,
            country,
            source: metadata.source.clone(),
            variables,
        }));
    }
    Ok(records)
}

// ── Composite layouts ──

struct ExtraAnswer {
    key: String,
    column: usize,
    optional: bool,
}

#[derive(Default)]
struct CompositeColumns {
    heading: Option<usize>,
    variable_type: Option<usize>,
    constituents: Option<usize>,
    answer: Option<usize>,
    answer_optional: bool,
    annotations: Annotations,
    extra: Vec<ExtraAnswer>,
}

fn composite_columns(
    metadata: &SheetMetadata,
    header: &[String],
) -> Result<CompositeColumns, FormatFault> {
    let mut columns = CompositeColumns::default();
    for (i, raw) in header.iter().enumerate() {
        let Heading { text, optional } = Heading::parse(raw);
        match text.as_str() {
            "" => {
                return Err(FormatFault::BlankHeading {
                    column: column_label(metadata, i),
                });
            }
            heading::HEADING => set_once(&mut columns.heading, i, heading::HEADING)?,
            heading::TYPE => set_once(&mut columns.variable_type, i, heading::TYPE)?,
            heading::CONSTITUENTS => set_once(&mut columns.constituents, i, heading::CONSTITUENTS)?,
            heading::ANSWER => {
                set_once(&mut columns.answer, i, heading::ANSWER)?;
                columns.answer_optional = optional;
            }
            _ => {
                if let Some(claimed) = columns.annotations.claim(&text, i, "") {
                    claimed?;
                    continue;
                }
                if text == DEFAULT_ANSWER_KEY || columns.extra.iter().any(|e| e.key == text) {
                    return Err(FormatFault::DuplicateHeading(text));
                }
                columns.extra.push(ExtraAnswer {
                    key: text,
                    column: i,
                    optional,
                });
            }
        }
    }
    for (slot, name) in [
        (columns.heading, heading::HEADING),
        (columns.variable_type, heading::TYPE),
        (columns.answer, heading::ANSWER),
    ] {
        if slot.is_none() {
            return Err(FormatFault::MissingHeading(name.to_string()));
        }
    }
    Ok(columns)
}

/// Variables of a composite body, one per data row.
fn composite_variables(
    metadata: &SheetMetadata,
    rows: &[Vec<String>],
) -> Result<Vec<Variable>, FormatFault> {
    let (header, data) = split_body(metadata, rows)?;
    let columns = composite_columns(metadata, &header[0])?;
    let (Some(heading_column), Some(type_column), Some(answer_column)) =
        (columns.heading, columns.variable_type, columns.answer)
    else {
        return Err(FormatFault::MissingHeaderRow);
    };

    let mut variables: Vec<Variable> = Vec::with_capacity(data.len());
    for row in &data {
        let heading = row.required(heading_column, heading::HEADING)?;
        if variables.iter().any(|v| v.heading == heading) {
            return Err(FormatFault::DuplicateHeading(heading.to_string()));
        }

        let type_cell = row.required(type_column, heading::TYPE)?;
        let variable_type =
            type_cell
                .parse::<VariableType>()
                .map_err(|()| FormatFault::MalformedCell {
                    row: row.number,
                    heading: heading::TYPE.to_string(),
                    value: type_cell.to_string(),
                    expected: "one of standard, composite or aggregate",
                })?;

        let names: Vec<&str> = row
            .optional(columns.constituents)
            .map(|cell| {
                cell.split(CONSTITUENT_SEPARATOR)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        match variable_type {
            VariableType::Standard if !names.is_empty() => {
                return Err(FormatFault::UnexpectedConstituents {
                    row: row.number,
                    heading: heading.to_string(),
                });
            }
            VariableType::Aggregate if names.is_empty() => {
                return Err(FormatFault::EmptyCell {
                    row: row.number,
                    heading: heading::CONSTITUENTS.to_string(),
                });
            }
            _ => {}
        }

        let constituents = names
            .iter()
            .map(|name| {
                variables
                    .iter()
                    .find(|v| v.heading == *name)
                    .map(|v| ConstituentRef {
                        index: v.index,
                        heading: v.heading.clone(),
                    })
                    .ok_or_else(|| FormatFault::MissingConstituent {
                        variable: heading.to_string(),
                        constituent: name.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let answers = if variable_type == VariableType::Aggregate {
            let authored = std::iter::once(answer_column)
                .chain(columns.extra.iter().map(|e| e.column))
                .any(|c| !row.cell(c).is_empty());
            if authored {
                return Err(FormatFault::AuthoredAggregateAnswer {
                    row: row.number,
                    heading: heading.to_string(),
                });
            }
            derive_aggregate_answers(constituents.iter().map(|c| &variables[c.index]))
        } else {
            let mut answers = AnswerMap::new();
            let cells = std::iter::once((DEFAULT_ANSWER_KEY, answer_column, columns.answer_optional))
                .chain(columns.extra.iter().map(|e| (e.key.as_str(), e.column, e.optional)));
            for (key, column, optional) in cells {
                match row.cell(column) {
                    "" if optional => {}
                    "" => {
                        return Err(FormatFault::EmptyCell {
                            row: row.number,
                            heading: if key == DEFAULT_ANSWER_KEY {
                                heading::ANSWER.to_string()
                            } else {
                                key.to_string()
                            },
                        });
                    }
                    value => {
                        answers.insert(key, value);
                    }
                }
            }
            answers
        };

        let mut variable = Variable {
            variable_type,
            index: variables.len(),
            heading: heading.to_string(),
            source: String::new(),
            original_text: String::new(),
            hyperlink: None,
            answers,
            constituents,
        };
        columns.annotations.apply(row, &mut variable);
        variables.push(variable);
    }
    Ok(variables)
}

fn composite_variable_records(
    metadata: &SheetMetadata,
    rows: &[Vec<String>],
) -> Result<Vec<ExtractedRecord>, FormatFault> {
    let institution = metadata
        .institution
        .clone()
        .ok_or(FormatFault::MissingMetadataField(field::INSTITUTION))?;
    let variables = composite_variables(metadata, rows)?;
    Ok(variables
        .into_iter()
        .map(|variable| {
            ExtractedRecord::Variable(VariableRecord {
                institution: institution.clone(),
                source: metadata.source.clone(),
                variable,
            })
        })
        .collect())
}

fn institution_with_composites(
    metadata: &SheetMetadata,
    rows: &[Vec<String>],
) -> Result<Vec<ExtractedRecord>, FormatFault> {
    let name = metadata
        .institution
        .clone()
        .ok_or(FormatFault::MissingMetadataField(field::INSTITUTION))?;
    let category = metadata
        .category
        .clone()
        .ok_or(FormatFault::MissingMetadataField(field::CATEGORY))?;
    let variables = composite_variables(metadata, rows)?;
    Ok(vec![ExtractedRecord::Institution(Institution {
        name,
        category,
        sub_categories: metadata.sub_categories.clone(),
        country: metadata.country.clone(),
        source: metadata.source.clone(),
        variables,
    })])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::SheetSource;
    use crate::range::RangeAddress;

    fn metadata(format: SheetFormat) -> SheetMetadata {
        SheetMetadata {
            source: SheetSource::new("ss", "Courts", "0", "Sheet1"),
            format,
            data_type: None,
            variable_heading: None,
            variable_name: None,
            date_of_next_verification_column: None,
            range: RangeAddress::parse("0", "Sheet1", Some(2), Some(20), None, None).unwrap(),
            institution: None,
            category: None,
            sub_categories: vec![],
            country: None,
        }
    }

    fn rows(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    fn fault(err: CoreError) -> FormatFault {
        match err {
            CoreError::UnableToCreateFormattedSheetData { fault, .. } => fault,
            other => panic!("expected a format fault, got {other:?}"),
        }
    }

    fn institution(record: &ExtractedRecord) -> &Institution {
        match record {
            ExtractedRecord::Institution(i) => i,
            other => panic!("expected an institution, got {other:?}"),
        }
    }

    #[test]
    fn optional_suffix_is_stripped() {
        let h = Heading::parse("  Term Length (Optional) ");
        assert_eq!(h.text, "Term Length");
        assert!(h.optional);
        let h = Heading::parse("Answer");
        assert!(!h.optional);
    }

    // ── standard-institution ──

    #[test]
    fn standard_institution_single_row() {
        let meta = metadata(SheetFormat::StandardInstitution);
        let records = extract(
            &meta,
            &rows(&[&["Name", "Category", "Answer"], &["Acme Court", "Judiciary", "Yes"]]),
        )
        .unwrap();
        assert_eq!(records.len(), 1);
        let acme = institution(&records[0]);
        assert_eq!(acme.name, "Acme Court");
        assert_eq!(acme.category, "Judiciary");
        assert_eq!(acme.variables.len(), 1);
        assert_eq!(acme.variables[0].variable_type, VariableType::Standard);
        assert_eq!(acme.variables[0].heading, "Answer");
        assert_eq!(acme.variables[0].answers, AnswerMap::single("Yes"));
    }

    #[test]
    fn annotations_attach_to_preceding_variable() {
        let meta = metadata(SheetFormat::StandardInstitution);
        let records = extract(
            &meta,
            &rows(&[
                &["Name", "Category", "Sub-Category", "Elected", "Source", "Hyperlink", "Term", "Source"],
                &["A", "Judiciary", "Apex, Federal", "Yes", "Art. 4", "", "6", "Art. 9"],
                &["", "", "", "", "", "", "", ""],
                &["B", "Judiciary", "", "No", "", "http://b", "4", ""],
            ]),
        )
        .unwrap();
        assert_eq!(records.len(), 2);
        let a = institution(&records[0]);
        assert_eq!(a.sub_categories, ["Apex", "Federal"]);
        assert_eq!(a.variables[0].source, "Art. 4");
        assert_eq!(a.variables[0].hyperlink, None);
        assert_eq!(a.variables[1].heading, "Term");
        assert_eq!(a.variables[1].index, 1);
        assert_eq!(a.variables[1].source, "Art. 9");
        let b = institution(&records[1]);
        assert_eq!(b.variables[0].hyperlink.as_deref(), Some("http://b"));
    }

    #[test]
    fn metadata_category_fills_missing_column() {
        let mut meta = metadata(SheetFormat::StandardInstitution);
        meta.category = Some("Executive".into());
        meta.country = Some("Peru".into());
        let records = extract(&meta, &rows(&[&["Name", "Answer"], &["Cabinet", "Yes"]])).unwrap();
        let cabinet = institution(&records[0]);
        assert_eq!(cabinet.category, "Executive");
        assert_eq!(cabinet.country.as_deref(), Some("Peru"));

        let meta = metadata(SheetFormat::StandardInstitution);
        let err = extract(&meta, &rows(&[&["Name", "Answer"], &["Cabinet", "Yes"]])).unwrap_err();
        assert_eq!(fault(err), FormatFault::MissingHeading("Category".into()));
    }

    #[test]
    fn misaligned_row_is_rejected() {
        let meta = metadata(SheetFormat::StandardInstitution);
        let err = extract(
            &meta,
            &rows(&[&["Name", "Category", "Answer"], &["Acme", "Judiciary"]]),
        )
        .unwrap_err();
        assert_eq!(
            fault(err),
            FormatFault::RowAlignment {
                row: 4,
                expected: 3,
                found: 2
            }
        );
    }

    #[test]
    fn empty_cells_respect_optional_headings() {
        let meta = metadata(SheetFormat::StandardInstitution);
        let err = extract(
            &meta,
            &rows(&[&["Name", "Category", "Answer"], &["Acme", "Judiciary", ""]]),
        )
        .unwrap_err();
        assert_eq!(
            fault(err),
            FormatFault::EmptyCell {
                row: 4,
                heading: "Answer".into()
            }
        );

        let records = extract(
            &meta,
            &rows(&[&["Name", "Category", "Answer (optional)"], &["Acme", "Judiciary", ""]]),
        )
        .unwrap();
        assert!(institution(&records[0]).variables[0].answers.is_empty());
    }

    #[test]
    fn header_faults() {
        let meta = metadata(SheetFormat::StandardInstitution);
        assert_eq!(fault(extract(&meta, &[]).unwrap_err()), FormatFault::MissingHeaderRow);
        assert_eq!(
            fault(extract(&meta, &rows(&[&["Source", "Name", "Category"]])).unwrap_err()),
            FormatFault::OrphanAnnotation("Source".into())
        );
        assert_eq!(
            fault(extract(&meta, &rows(&[&["Name", "Category", "X", "X"]])).unwrap_err()),
            FormatFault::DuplicateHeading("X".into())
        );
        assert_eq!(
            fault(extract(&meta, &rows(&[&["Name", "Category", ""]])).unwrap_err()),
            FormatFault::BlankHeading { column: "C".into() }
        );
        assert_eq!(
            fault(extract(&meta, &rows(&[&["Category", "X"]])).unwrap_err()),
            FormatFault::MissingHeading("Name".into())
        );
    }

    // ── multiple-sigla-answer-variable ──

    #[test]
    fn multiple_answers_share_one_map() {
        let meta = metadata(SheetFormat::MultipleSiglaAnswerVariable);
        let records = extract(
            &meta,
            &rows(&[
                &["Name", "Category", "Term", "", "Source", "Elected"],
                &["", "", "min", "max", "", ""],
                &["Acme", "Judiciary", "4", "6", "Art. 1", "Yes"],
            ]),
        )
        .unwrap();
        let acme = institution(&records[0]);
        let term: Vec<(&str, &str)> = acme.variables[0].answers.iter().collect();
        assert_eq!(term, [("min", "4"), ("max", "6")]);
        assert_eq!(acme.variables[0].source, "Art. 1");
        assert_eq!(acme.variables[1].answers, AnswerMap::single("Yes"));
    }

    #[test]
    fn multiple_answers_need_keys() {
        let meta = metadata(SheetFormat::MultipleSiglaAnswerVariable);
        let err = extract(
            &meta,
            &rows(&[
                &["Name", "Category", "Term", ""],
                &["", "", "min", ""],
                &["Acme", "Judiciary", "4", "6"],
            ]),
        )
        .unwrap_err();
        assert_eq!(
            fault(err),
            FormatFault::MissingAnswerKey {
                heading: "Term".into(),
                column: "D".into()
            }
        );

        let err = extract(&meta, &rows(&[&["Name", "Category", "Term", ""]])).unwrap_err();
        assert_eq!(fault(err), FormatFault::MissingHeaderRow);
    }

    // ── composite layouts ──

    fn composite_body(extra: &[&[&str]]) -> Vec<Vec<String>> {
        let mut body = rows(&[
            &["Heading", "Type", "Constituents", "Answer", "Source"],
            &["VarA", "standard", "", "Yes", "Art. 1"],
            &["VarB", "standard", "", "No", ""],
        ]);
        body.extend(rows(extra));
        body
    }

    #[test]
    fn composite_variable_records_name_their_institution() {
        let mut meta = metadata(SheetFormat::CompositeVariable);
        meta.institution = Some("Congress".into());
        let records = extract(
            &meta,
            &composite_body(&[&["Rights", "composite", "VarA; VarB", "Partial", ""]]),
        )
        .unwrap();
        assert_eq!(records.len(), 3);
        let ExtractedRecord::Variable(rights) = &records[2] else {
            panic!("expected a variable record");
        };
        assert_eq!(rights.institution, "Congress");
        assert_eq!(rights.variable.variable_type, VariableType::Composite);
        assert_eq!(rights.variable.index, 2);
        assert_eq!(
            rights.variable.constituents,
            [
                ConstituentRef { index: 0, heading: "VarA".into() },
                ConstituentRef { index: 1, heading: "VarB".into() },
            ]
        );
    }

    #[test]
    fn composite_without_institution_is_a_fault() {
        let meta = metadata(SheetFormat::CompositeVariable);
        let err = extract(&meta, &composite_body(&[])).unwrap_err();
        assert_eq!(fault(err), FormatFault::MissingMetadataField("institution"));
    }

    #[test]
    fn constituent_must_be_an_earlier_heading() {
        let mut meta = metadata(SheetFormat::CompositeVariable);
        meta.institution = Some("Congress".into());
        let body = rows(&[
            &["Heading", "Type", "Constituents", "Answer"],
            &["VarA", "standard", "", "Yes"],
            &["Both", "composite", "VarA; VarB", "Partial"],
            &["VarB", "standard", "", "No"],
        ]);
        let err = extract(&meta, &body).unwrap_err();
        assert!(matches!(err, CoreError::UnableToCreateFormattedSheetData { .. }));
        assert_eq!(
            fault(err),
            FormatFault::MissingConstituent {
                variable: "Both".into(),
                constituent: "VarB".into()
            }
        );
    }

    #[test]
    fn aggregate_answers_are_derived() {
        let mut meta = metadata(SheetFormat::InstitutionAndCompositeVariable);
        meta.institution = Some("Constitution".into());
        meta.category = Some("Constitutional".into());
        let records = extract(
            &meta,
            &composite_body(&[&["Summary", "Aggregate", "VarA;VarB", "", ""]]),
        )
        .unwrap();
        assert_eq!(records.len(), 1);
        let constitution = institution(&records[0]);
        assert_eq!(constitution.name, "Constitution");
        let summary = &constitution.variables[2];
        assert_eq!(summary.variable_type, VariableType::Aggregate);
        let answers: Vec<(&str, &str)> = summary.answers.iter().collect();
        assert_eq!(answers, [("VarA", "Yes"), ("VarB", "No")]);
        assert_eq!(crate::schema::validate(&records[0]), Ok(()));
    }

    #[test]
    fn aggregate_rules() {
        let mut meta = metadata(SheetFormat::InstitutionAndCompositeVariable);
        meta.institution = Some("Constitution".into());
        meta.category = Some("Constitutional".into());

        let err = extract(&meta, &composite_body(&[&["Sum", "aggregate", "VarA", "typed", ""]]))
            .unwrap_err();
        assert_eq!(
            fault(err),
            FormatFault::AuthoredAggregateAnswer {
                row: 6,
                heading: "Sum".into()
            }
        );

        let err = extract(&meta, &composite_body(&[&["Sum", "aggregate", "", "", ""]])).unwrap_err();
        assert_eq!(
            fault(err),
            FormatFault::EmptyCell {
                row: 6,
                heading: "Constituents".into()
            }
        );

        let err = extract(&meta, &composite_body(&[&["Sum", "standard", "VarA", "x", ""]]))
            .unwrap_err();
        assert_eq!(
            fault(err),
            FormatFault::UnexpectedConstituents {
                row: 6,
                heading: "Sum".into()
            }
        );

        let err = extract(&meta, &composite_body(&[&["Sum", "mean", "", "x", ""]])).unwrap_err();
        assert!(matches!(fault(err), FormatFault::MalformedCell { .. }));
    }

    #[test]
    fn institution_and_composite_requires_category() {
        let mut meta = metadata(SheetFormat::InstitutionAndCompositeVariable);
        meta.institution = Some("Constitution".into());
        let err = extract(&meta, &composite_body(&[])).unwrap_err();
        assert_eq!(fault(err), FormatFault::MissingMetadataField("category"));
    }

    #[test]
    fn extraction_is_deterministic() {
        let mut meta = metadata(SheetFormat::CompositeVariable);
        meta.institution = Some("Congress".into());
        let body = composite_body(&[&["Rights", "composite", "VarA", "Partial", ""]]);
        assert_eq!(extract(&meta, &body).unwrap(), extract(&meta, &body).unwrap());
    }
}
