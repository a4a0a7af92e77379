//! Row types flowing through the ingest pipeline
//!
//! A `Row` keeps its columns in file order so the warehouse receives fields
//! in the same order as the uploaded header.

use serde::ser::{Serialize, SerializeMap, Serializer};

/// Column added to every accepted row
pub const CREATED_AT_COLUMN: &str = "create_at";

/// Insertion-ordered column -> value mapping for one data line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    fields: Vec<(String, String)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `column` to `value`. An existing column keeps its position and
    /// takes the new value.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        let column = column.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| *name == column) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    /// Trimmed value of `column`, empty when the column is absent
    pub fn trimmed(&self, column: &str) -> &str {
        self.get(column).map(str::trim).unwrap_or("")
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[cfg(test)]
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.fields.len()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (k, v) in iter {
            row.insert(k, v);
        }
        row
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// A row that passed validation and carries the ingestion timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedRow {
    row: Row,
}

impl AcceptedRow {
    /// Stamp `row` with `created_at`, replacing any value the file supplied.
    pub fn stamp(mut row: Row, created_at: &str) -> Self {
        row.insert(CREATED_AT_COLUMN, created_at);
        Self { row }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.row.get(column)
    }

    pub fn trimmed(&self, column: &str) -> &str {
        self.row.trimmed(column)
    }

    pub fn created_at(&self) -> &str {
        self.row.get(CREATED_AT_COLUMN).unwrap_or_default()
    }
}

impl Serialize for AcceptedRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.row.serialize(serializer)
    }
}
