//! Terminal summaries for load, QA and verification-date runs.

use sigla_core::CheckedVerificationDate;
use sigla_qa::{QaReport, ReportTable};

use crate::pipeline::LoadStats;

const MAX_ERROR_ROWS: usize = 20;

// ── Load ──

pub fn print_load_stats(stats: &LoadStats) {
    println!("=== Load ===");
    for summary in &stats.loaded {
        println!(
            "  {:<24} -{} institutions, -{} variables, -{} entries; +{} institutions, +{} variables",
            summary.spreadsheet_id,
            summary.institutions_deleted,
            summary.variables_deleted,
            summary.entries_deleted,
            summary.institutions_loaded,
            summary.variables_loaded,
        );
    }
    if !stats.skipped.is_empty() {
        println!();
        println!("  Skipped:");
        for (id, reason) in &stats.skipped {
            println!("    {id}: {reason}");
        }
    }
    println!();
    println!(
        "  {} loaded, {} skipped in {:.1}s",
        stats.loaded.len(),
        stats.skipped.len(),
        stats.elapsed_secs
    );
}

// ── QA ──

pub fn print_qa_report(report: &QaReport) {
    let summary = report.summary();
    println!("=== {} ===", report.spreadsheet_title);
    println!("  {:<22} {}", "spreadsheet_id", report.spreadsheet_id);
    println!("  {:<22} {}", "groups", summary.groups);
    println!("  {:<22} {}", "with errors", summary.groups_with_errors);
    println!("  {:<22} {}", "with meta errors", summary.groups_with_meta_errors);
    println!("  {:<22} {}", "with data errors", summary.groups_with_data_errors);
    println!("  {:<22} {}", "failed units", summary.failures);

    let errors = report.error_table();
    if !errors.is_empty() {
        println!();
        print_rows(&errors, &[3, 4, 6, 7, 8]);
    }
    for failure in &report.failures {
        let institution = failure.institution.as_deref().unwrap_or("-");
        println!("  ! {} / {}: {}", failure.sheet_title, institution, failure.error);
    }
    println!();
}

/// Print selected columns of a table, at most [`MAX_ERROR_ROWS`] rows.
fn print_rows(table: &ReportTable, columns: &[usize]) {
    let header: Vec<&str> = columns.iter().map(|&i| cell(table.headers.as_slice(), i)).collect();
    println!("  {}", header.join(" | "));
    for row in table.rows.iter().take(MAX_ERROR_ROWS) {
        let values: Vec<&str> = columns.iter().map(|&i| cell(row.as_slice(), i)).collect();
        println!("  {}", values.join(" | "));
    }
    if table.rows.len() > MAX_ERROR_ROWS {
        println!("  ... and {} more", table.rows.len() - MAX_ERROR_ROWS);
    }
}

fn cell(row: &[String], i: usize) -> &str {
    row.get(i).map(String::as_str).unwrap_or("")
}

// ── Verification dates ──

pub fn due_table(dates: &[CheckedVerificationDate]) -> ReportTable {
    ReportTable {
        name: "next verification dates".into(),
        headers: ["spreadsheet_title", "sheet_title", "cell", "status"]
            .iter()
            .map(|h| h.to_string())
            .collect(),
        rows: dates
            .iter()
            .map(|c| {
                vec![
                    c.date.spreadsheet_title.clone(),
                    c.date.sheet_title.clone(),
                    format!("{}{}", c.date.column, c.date.row),
                    c.status.to_string(),
                ]
            })
            .collect(),
    }
}

pub fn print_due(dates: &[CheckedVerificationDate]) {
    println!("=== Next verification dates ===");
    if dates.is_empty() {
        println!("  (none due)");
        return;
    }
    for c in dates {
        println!(
            "  {} / {} {}{}: {} ({})",
            c.date.spreadsheet_title, c.date.sheet_title, c.date.column, c.date.row, c.status, c.date.value
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigla_core::{NextVerificationDate, VerificationWindow};

    #[test]
    fn due_table_names_cells() {
        let window = VerificationWindow::parse("2024-01-01", "2024-12-31").unwrap();
        let checked = NextVerificationDate {
            spreadsheet_title: "Courts".into(),
            sheet_title: "Sheet1".into(),
            column: "E".into(),
            row: 4,
            value: "2024-02-01".into(),
        }
        .check(&window);
        let table = due_table(&[checked]);
        assert_eq!(table.rows, [vec!["Courts", "Sheet1", "E4", "Requires update and verify"]]);
    }
}
