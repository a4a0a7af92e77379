//! Row validation and ingestion stamping
//!
//! A row is accepted only when every checked column has a non-blank value.
//! Rejected rows are collected with their line numbers; they never fail the run.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::error::IngestError;
use crate::services::row_parser::RawRecord;
use crate::types::{AcceptedRow, Row};

/// Text format of the `create_at` stamp (UTC, microsecond precision)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// A data line dropped because of a blank value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRow {
    pub line: u64,
    pub blank_columns: Vec<String>,
    pub row: Row,
}

#[derive(Debug, Default)]
pub struct ValidationOutcome {
    pub accepted: Vec<AcceptedRow>,
    pub skipped: Vec<SkippedRow>,
}

impl ValidationOutcome {
    pub fn rows_read(&self) -> usize {
        self.accepted.len() + self.skipped.len()
    }
}

pub struct RowValidator {
    exempt_columns: HashSet<String>,
}

impl RowValidator {
    /// `exempt_columns` may be blank without rejecting the row.
    pub fn new<I, S>(exempt_columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            exempt_columns: exempt_columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Columns of `row` that are required but blank
    pub fn blank_columns(&self, row: &Row) -> Vec<String> {
        row.iter()
            .filter(|(name, value)| value.trim().is_empty() && !self.exempt_columns.contains(*name))
            .map(|(name, _)| name.to_string())
            .collect()
    }

    /// Consume `records`, keeping complete rows stamped with `created_at`.
    ///
    /// A parse error stops validation and is returned as-is.
    pub fn validate<I>(&self, records: I, created_at: &str) -> Result<ValidationOutcome, IngestError>
    where
        I: IntoIterator<Item = Result<RawRecord, IngestError>>,
    {
        let mut outcome = ValidationOutcome::default();

        for record in records {
            let RawRecord { line, row } = record?;
            let blank_columns = self.blank_columns(&row);

            if blank_columns.is_empty() {
                outcome.accepted.push(AcceptedRow::stamp(row, created_at));
            } else {
                outcome.skipped.push(SkippedRow {
                    line,
                    blank_columns,
                    row,
                });
            }
        }

        Ok(outcome)
    }
}

impl Default for RowValidator {
    fn default() -> Self {
        Self::new(Vec::<String>::new())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(line: u64, fields: &[(&str, &str)]) -> Result<RawRecord, IngestError> {
        Ok(RawRecord {
            line,
            row: fields.iter().copied().collect(),
        })
    }

    const TS: &str = "2026-10-16T08:30:00.000000";

    #[test]
    fn accepts_complete_rows_in_order() {
        let outcome = RowValidator::default()
            .validate(
                vec![
                    record(2, &[("id", "1"), ("email", "a@x.com")]),
                    record(3, &[("id", "2"), ("email", "b@x.com")]),
                ],
                TS,
            )
            .unwrap();

        assert_eq!(outcome.accepted.len(), 2);
        assert_eq!(outcome.accepted[0].get("id"), Some("1"));
        assert_eq!(outcome.accepted[1].get("id"), Some("2"));
        assert!(outcome.skipped.is_empty());
    }

    #[test]
    fn skips_row_with_whitespace_only_value() {
        let outcome = RowValidator::default()
            .validate(
                vec![
                    record(2, &[("id", "1"), ("email", "   ")]),
                    record(3, &[("id", "2"), ("email", "b@x.com")]),
                ],
                TS,
            )
            .unwrap();

        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].line, 2);
        assert_eq!(outcome.skipped[0].blank_columns, vec!["email".to_string()]);
        assert_eq!(outcome.rows_read(), 2);
    }

    #[test]
    fn stamp_overrides_supplied_create_at() {
        let outcome = RowValidator::default()
            .validate(vec![record(2, &[("id", "1"), ("create_at", "yesterday")])], TS)
            .unwrap();

        assert_eq!(outcome.accepted[0].created_at(), TS);
    }

    #[test]
    fn every_accepted_row_gets_the_same_stamp() {
        let records = (0..5).map(|i| record(i + 2, &[("id", "x")]));
        let outcome = RowValidator::default().validate(records, TS).unwrap();
        assert!(outcome.accepted.iter().all(|r| r.created_at() == TS));
    }

    #[test]
    fn blank_create_at_in_file_still_rejects_row() {
        let outcome = RowValidator::default()
            .validate(vec![record(2, &[("id", "1"), ("create_at", "")])], TS)
            .unwrap();
        assert!(outcome.accepted.is_empty());
    }

    #[test]
    fn exempt_columns_may_be_blank() {
        let validator = RowValidator::new(["send_flg"]);
        let outcome = validator
            .validate(
                vec![
                    record(2, &[("email", "c@x.com"), ("send_flg", ""), ("content", "yo")]),
                    record(3, &[("email", ""), ("send_flg", ""), ("content", "yo")]),
                ],
                TS,
            )
            .unwrap();

        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(outcome.skipped[0].blank_columns, vec!["email".to_string()]);
    }

    #[test]
    fn parse_error_propagates() {
        let bad = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader("a,b\n1\n".as_bytes())
            .records()
            .filter_map(Result::err)
            .next()
            .unwrap();

        let result = RowValidator::default().validate(
            vec![
                record(2, &[("id", "1")]),
                Err(IngestError::Parse { line: 3, source: bad }),
            ],
            TS,
        );
        assert!(matches!(result, Err(IngestError::Parse { line: 3, .. })));
    }

    #[test]
    fn timestamp_has_fixed_microsecond_format() {
        let at = Utc.with_ymd_and_hms(2026, 10, 16, 8, 30, 0).unwrap();
        assert_eq!(format_timestamp(at), "2026-10-16T08:30:00.000000");
    }
}
