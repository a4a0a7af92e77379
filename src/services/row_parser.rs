//! Delimited-text parser for uploaded files
//!
//! The first record is the header; every following record becomes a `Row`
//! keyed by header name. Records are read lazily from the decoded buffer.
//!
//! Lines with a different field count than the header are kept: missing
//! trailing fields are padded with `""` (so validation rejects them) and
//! surplus fields are dropped.

use std::io::Cursor;
use std::str::FromStr;

use tracing::debug;

use crate::error::IngestError;
use crate::types::Row;

const UTF8_BOM: char = '\u{feff}';

/// How undecodable bytes in the upload are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodingPolicy {
    /// Replace invalid sequences with U+FFFD and keep going
    #[default]
    Lenient,
    /// Reject the whole file
    Strict,
}

impl FromStr for DecodingPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lenient" | "replace" => Ok(Self::Lenient),
            "strict" => Ok(Self::Strict),
            other => anyhow::bail!("unknown decoding policy '{}'", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParserOptions {
    pub decoding: DecodingPolicy,
    pub delimiter: u8,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            decoding: DecodingPolicy::Lenient,
            delimiter: b',',
        }
    }
}

/// One data record with its 1-based line number in the file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub line: u64,
    pub row: Row,
}

/// Decode file bytes according to `policy`, dropping a leading BOM.
pub fn decode(bytes: &[u8], policy: DecodingPolicy) -> Result<String, IngestError> {
    let text = match policy {
        DecodingPolicy::Lenient => String::from_utf8_lossy(bytes).into_owned(),
        DecodingPolicy::Strict => std::str::from_utf8(bytes)
            .map_err(|e| IngestError::Decode { offset: e.valid_up_to() })?
            .to_string(),
    };

    Ok(match text.strip_prefix(UTF8_BOM) {
        Some(stripped) => stripped.to_string(),
        None => text,
    })
}

/// Lazy, single-pass iterator over the data records of one file
pub struct RowReader {
    header: Vec<String>,
    records: csv::StringRecordsIntoIter<Cursor<Vec<u8>>>,
}

impl RowReader {
    pub fn new(bytes: &[u8], options: &ParserOptions) -> Result<Self, IngestError> {
        let text = decode(bytes, options.decoding)?;

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(options.delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(Cursor::new(text.into_bytes()));

        let header: Vec<String> = reader
            .headers()
            .map_err(|source| IngestError::Parse { line: 1, source })?
            .iter()
            .map(str::to_string)
            .collect();

        Ok(Self {
            header,
            records: reader.into_records(),
        })
    }

    #[cfg(test)]
    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.header.iter().any(|name| name == column)
    }

    fn to_row(&self, record: &csv::StringRecord, line: u64) -> Row {
        if record.len() != self.header.len() {
            debug!(
                line,
                expected = self.header.len(),
                found = record.len(),
                "Field count differs from header, padding/truncating"
            );
        }

        self.header
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), record.get(i).unwrap_or("")))
            .collect()
    }
}

impl Iterator for RowReader {
    type Item = Result<RawRecord, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        let result = self.records.next()?;
        Some(match result {
            Ok(record) => {
                let line = record.position().map(|p| p.line()).unwrap_or_default();
                Ok(RawRecord {
                    line,
                    row: self.to_row(&record, line),
                })
            }
            Err(source) => {
                let line = source.position().map(|p| p.line()).unwrap_or_default();
                Err(IngestError::Parse { line, source })
            }
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
