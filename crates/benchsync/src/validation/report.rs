//! Structured validation report.
//!
//! The report serializes with kebab-case keys (`error-count`, `row-number`,
//! `column-number`) so downstream consumers can render it unchanged.

use serde::Serialize;

/// A single validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    /// Machine-readable code, e.g. `required-constraint` or `blank-row`.
    pub code: String,
    /// Human-readable message. Semantic check messages are stable; callers
    /// dispatch on their content.
    pub message: String,
    /// One-based row number counting the header as row 1; data rows start
    /// at 2. Absent for table-level findings.
    #[serde(rename = "row-number", skip_serializing_if = "Option::is_none")]
    pub row_number: Option<usize>,
    /// One-based column number. Absent for row- and table-level findings.
    #[serde(rename = "column-number", skip_serializing_if = "Option::is_none")]
    pub column_number: Option<usize>,
}

impl Issue {
    /// A finding not tied to any row or column.
    pub fn table(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            row_number: None,
            column_number: None,
        }
    }

    /// A finding tied to a whole row.
    pub fn row(code: impl Into<String>, message: impl Into<String>, row_number: usize) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            row_number: Some(row_number),
            column_number: None,
        }
    }

    /// A finding tied to a single cell.
    pub fn cell(
        code: impl Into<String>,
        message: impl Into<String>,
        row_number: usize,
        column_number: usize,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            row_number: Some(row_number),
            column_number: Some(column_number),
        }
    }
}

/// Findings for one validated table.
#[derive(Debug, Clone, Serialize)]
pub struct TableReport {
    /// Whether this table passed.
    pub valid: bool,
    /// Number of data rows inspected.
    #[serde(rename = "row-count")]
    pub row_count: usize,
    /// All findings, in row order.
    pub errors: Vec<Issue>,
}

/// Outcome of validating an upload, covering one table per file.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    /// True exactly when `error_count` is zero.
    pub valid: bool,
    /// Total findings across all tables.
    #[serde(rename = "error-count")]
    pub error_count: usize,
    /// Per-table findings.
    pub tables: Vec<TableReport>,
}

impl ValidationReport {
    /// Build a report from the findings of a single table.
    pub fn from_issues(issues: Vec<Issue>, row_count: usize) -> Self {
        let error_count = issues.len();
        Self {
            valid: error_count == 0,
            error_count,
            tables: vec![TableReport {
                valid: error_count == 0,
                row_count,
                errors: issues,
            }],
        }
    }

    /// An invalid report describing a file that could not be parsed at all.
    /// The message must start with `failed to parse csv file` so consumers
    /// can distinguish parse failures from schema violations.
    pub fn parse_failure(message: impl Into<String>) -> Self {
        Self::from_issues(vec![Issue::table("source-error", message)], 0)
    }

    /// All messages joined for display, in report order.
    pub fn summary(&self) -> String {
        let messages: Vec<&str> = self
            .tables
            .iter()
            .flat_map(|table| table.errors.iter().map(|issue| issue.message.as_str()))
            .collect();
        messages.join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_report_has_zero_errors() {
        let report = ValidationReport::from_issues(vec![], 3);
        assert!(report.valid);
        assert_eq!(report.error_count, 0);
        assert!(report.tables[0].valid);
        assert_eq!(report.tables[0].row_count, 3);
    }

    #[test]
    fn test_invalid_report_counts_issues() {
        let issues = vec![
            Issue::row("blank-row", "Row 2 is completely blank", 2),
            Issue::cell("required-constraint", "missing value", 3, 1),
        ];
        let report = ValidationReport::from_issues(issues, 2);
        assert!(!report.valid);
        assert_eq!(report.error_count, 2);
        assert_eq!(report.summary(), "Row 2 is completely blank; missing value");
    }

    #[test]
    fn test_serialization_uses_kebab_keys() {
        let report = ValidationReport::from_issues(
            vec![Issue::cell("type-or-format-error", "bad value", 2, 4)],
            1,
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["error-count"], 1);
        assert_eq!(json["tables"][0]["errors"][0]["row-number"], 2);
        assert_eq!(json["tables"][0]["errors"][0]["column-number"], 4);
    }

    #[test]
    fn test_parse_failure() {
        let report = ValidationReport::parse_failure("failed to parse csv file: bad quoting");
        assert!(!report.valid);
        assert!(report.summary().starts_with("failed to parse csv file"));
        assert!(report.tables[0].errors[0].row_number.is_none());
    }
}
