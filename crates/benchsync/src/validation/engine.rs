//! Validation engine: structural schema pass followed by semantic checks.

use std::collections::HashMap;

use crate::input::DataTable;
use crate::schema::SchemaDoc;

use super::checks::{RowCheck, RowContext};
use super::report::{Issue, ValidationReport};

/// Row number of the first data row; the header counts as row 1.
const FIRST_DATA_ROW: usize = 2;

/// Validate a table against a schema and a set of semantic row checks.
///
/// Structural findings (headers, types, required values, row limits, blank
/// and duplicate rows) are collected first. Semantic checks then run on every
/// row not already flagged as blank or duplicate, so one bad row produces
/// one coherent set of findings rather than cascading noise.
pub fn validate(
    table: &DataTable,
    schema: &SchemaDoc,
    checks: &[Box<dyn RowCheck>],
) -> ValidationReport {
    let mut issues = Vec::new();

    check_headers(table, schema, &mut issues);
    check_row_limit(table, schema, &mut issues);
    let skip_rows = check_rows(table, schema, &mut issues);
    run_semantic_checks(table, checks, &skip_rows, &mut issues);

    issues.sort_by_key(|issue| (issue.row_number, issue.column_number));
    ValidationReport::from_issues(issues, table.row_count())
}

fn check_headers(table: &DataTable, schema: &SchemaDoc, issues: &mut Vec<Issue>) {
    for (position, field) in schema.fields.iter().enumerate() {
        if table.column_index(&field.name).is_none() {
            issues.push(Issue::table(
                "missing-header",
                format!(
                    "Header \"{}\" expected in column {} is missing",
                    field.name,
                    position + 1
                ),
            ));
        }
    }
    for (index, header) in table.headers.iter().enumerate() {
        if schema.field(header).is_none() {
            issues.push(Issue::table(
                "extra-header",
                format!(
                    "There is an extra header \"{header}\" in column {}",
                    index + 1
                ),
            ));
        }
    }
}

fn check_row_limit(table: &DataTable, schema: &SchemaDoc, issues: &mut Vec<Issue>) {
    if let Some(max_rows) = schema.max_rows {
        if table.row_count() > max_rows {
            issues.push(Issue::table(
                "maximum-rows",
                format!(
                    "The number of rows ({}) does not conform to the maximum of {max_rows}",
                    table.row_count()
                ),
            ));
        }
    }
}

/// Per-row structural pass. Returns the indices of blank and duplicate rows
/// so the semantic pass can skip them.
fn check_rows(table: &DataTable, schema: &SchemaDoc, issues: &mut Vec<Issue>) -> Vec<bool> {
    let mut skip = vec![false; table.row_count()];
    let mut seen: HashMap<&[String], usize> = HashMap::new();

    for (index, row) in table.rows.iter().enumerate() {
        let row_number = index + FIRST_DATA_ROW;

        if row.iter().all(|value| DataTable::is_null_value(value)) {
            issues.push(Issue::row(
                "blank-row",
                format!("Row {row_number} is completely blank"),
                row_number,
            ));
            skip[index] = true;
            continue;
        }

        if let Some(&original) = seen.get(row.as_slice()) {
            issues.push(Issue::row(
                "duplicate-row",
                format!("Row {row_number} is a duplicate of row {original}"),
                row_number,
            ));
            skip[index] = true;
            continue;
        }
        seen.insert(row.as_slice(), row_number);

        for (column_index, header) in table.headers.iter().enumerate() {
            let Some(field) = schema.field(header) else {
                continue;
            };
            let column_number = column_index + 1;
            let value = row.get(column_index).map(String::as_str).unwrap_or("");

            if DataTable::is_null_value(value) {
                if field.constraints.required {
                    issues.push(Issue::cell(
                        "required-constraint",
                        format!(
                            "Column \"{header}\" is a required field, but row {row_number} \
                             has no value"
                        ),
                        row_number,
                        column_number,
                    ));
                }
                continue;
            }

            if !field.field_type.accepts(value) {
                issues.push(Issue::cell(
                    "type-or-format-error",
                    format!(
                        "Row {row_number} has a type error in column {column_number}: \
                         value \"{value}\" is not of type {:?}",
                        field.field_type
                    ),
                    row_number,
                    column_number,
                ));
            }
        }
    }
    skip
}

fn run_semantic_checks(
    table: &DataTable,
    checks: &[Box<dyn RowCheck>],
    skip_rows: &[bool],
    issues: &mut Vec<Issue>,
) {
    for (index, row) in table.rows.iter().enumerate() {
        if skip_rows.get(index).copied().unwrap_or(false) {
            continue;
        }
        let context = RowContext {
            row_number: index + FIRST_DATA_ROW,
            headers: &table.headers,
            cells: row,
        };
        for check in checks {
            match check.inspect(&context) {
                Ok(found) => issues.extend(found),
                Err(err) => issues.push(Issue::row(
                    "check-error",
                    format!("Row {} could not be checked: {err}", context.row_number),
                    context.row_number,
                )),
            }
        }
    }
}
