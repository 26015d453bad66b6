//! CSV parser over already-decoded byte content.

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::error::{BenchsyncError, Result};
use crate::schema::SchemaDoc;
use crate::validation::{validate, RowCheck, ValidationReport};

use super::table::{DataTable, SourceMetadata};

/// Parser configuration.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Field delimiter. Upload content is normalized CSV.
    pub delimiter: u8,
    /// Quote character.
    pub quote: u8,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
        }
    }
}

/// Parses tabular byte content.
pub struct Parser {
    config: ParserConfig,
}

impl Parser {
    /// Create a new parser with default configuration.
    pub fn new() -> Self {
        Self {
            config: ParserConfig::default(),
        }
    }

    /// Create a parser with custom configuration.
    pub fn with_config(config: ParserConfig) -> Self {
        Self { config }
    }

    /// Parse byte content and return the table plus provenance metadata.
    pub fn parse_content(&self, content: &[u8]) -> Result<(DataTable, SourceMetadata)> {
        let mut hasher = Sha256::new();
        hasher.update(content);
        let hash = format!("sha256:{:x}", hasher.finalize());

        let table = self.parse_bytes(content)?;

        let metadata = SourceMetadata {
            hash,
            size_bytes: content.len() as u64,
            row_count: table.row_count(),
            column_count: table.column_count(),
            parsed_at: Utc::now(),
        };

        Ok((table, metadata))
    }

    /// Parse bytes directly.
    pub fn parse_bytes(&self, content: &[u8]) -> Result<DataTable> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.config.delimiter)
            .has_headers(true)
            .quote(self.config.quote)
            .flexible(true)
            .from_reader(content);

        let headers: Vec<String> = reader.headers()?.iter().map(|s| s.trim().to_string()).collect();
        if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
            return Err(BenchsyncError::Validation(ValidationReport::parse_failure(
                "failed to parse csv file: no header row found",
            )));
        }

        let expected_cols = headers.len();
        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            let mut row: Vec<String> = record.iter().map(|s| s.to_string()).collect();

            // Pad short rows, truncate long ones.
            while row.len() < expected_cols {
                row.push(String::new());
            }
            row.truncate(expected_cols);

            rows.push(row);
        }

        Ok(DataTable::new(headers, rows))
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse and validate byte content against a schema document.
///
/// The schema is taken as an already-materialized document so callers can
/// pass a dynamically derived schema (the physiology table gains one numeric
/// field per discovered sample id before validation runs).
///
/// CSV-level failures surface as an invalid [`ValidationReport`] whose single
/// message contains `failed to parse csv file`; callers dispatch on that
/// substring.
pub fn load_table(
    content: &[u8],
    schema: &SchemaDoc,
    checks: &[Box<dyn RowCheck>],
) -> Result<DataTable> {
    let parser = Parser::new();
    let table = match parser.parse_bytes(content) {
        Ok(table) => table,
        Err(BenchsyncError::Csv(err)) => {
            return Err(BenchsyncError::Validation(ValidationReport::parse_failure(
                format!("failed to parse csv file: {err}"),
            )));
        }
        Err(err) => return Err(err),
    };

    let report = validate(&table, schema, checks);
    if !report.valid {
        return Err(BenchsyncError::Validation(report));
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_csv() {
        let parser = Parser::new();
        let data = b"medium,compound_name,concentration\nM9,glucose,2.0\nM9,kanamycin,0.05";
        let table = parser.parse_bytes(data).unwrap();

        assert_eq!(table.headers, vec!["medium", "compound_name", "concentration"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.get(0, 1), Some("glucose"));
    }

    #[test]
    fn test_parse_pads_short_rows() {
        let parser = Parser::new();
        let data = b"a,b,c\n1,2\n";
        let table = parser.parse_bytes(data).unwrap();
        assert_eq!(table.rows[0], vec!["1", "2", ""]);
    }

    #[test]
    fn test_parse_content_hashes() {
        let parser = Parser::new();
        let data = b"a,b\n1,2\n";
        let (_, metadata) = parser.parse_content(data).unwrap();
        assert!(metadata.hash.starts_with("sha256:"));
        assert_eq!(metadata.row_count, 1);
        assert_eq!(metadata.column_count, 2);
    }

    #[test]
    fn test_empty_content_is_a_parse_failure() {
        let parser = Parser::new();
        let err = parser.parse_bytes(b"").unwrap_err();
        match err {
            BenchsyncError::Validation(report) => {
                assert!(!report.valid);
                assert!(report.summary().contains("failed to parse csv file"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
