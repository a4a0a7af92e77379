//! Outcome types reported by a pipeline run

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Single error reported by the warehouse for a write batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertError {
    /// Index into the write batch, `None` for batch-level errors
    pub row_index: Option<usize>,
    pub message: String,
}

impl InsertError {
    pub fn row(row_index: usize, message: impl Into<String>) -> Self {
        Self {
            row_index: Some(row_index),
            message: message.into(),
        }
    }

    pub fn batch(message: impl Into<String>) -> Self {
        Self {
            row_index: None,
            message: message.into(),
        }
    }
}

/// Result of submitting the write batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum WriteOutcome {
    /// Every row was accepted by the warehouse
    Written { rows: usize },
    /// The warehouse reported errors; some rows may still have been stored
    Failed { errors: Vec<InsertError> },
    /// Nothing to write
    Skipped,
}

impl WriteOutcome {
    #[cfg(test)]
    pub fn is_success(&self) -> bool {
        matches!(self, WriteOutcome::Written { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryFailure {
    pub recipient: String,
    pub error: String,
}

/// Per-recipient delivery results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    pub sent: Vec<String>,
    pub failed: Vec<DeliveryFailure>,
}

impl DispatchReport {
    #[cfg(test)]
    pub fn attempted(&self) -> usize {
        self.sent.len() + self.failed.len()
    }
}

/// Summary of one pipeline invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: Uuid,
    pub bucket: String,
    pub object: String,
    pub ingested_at: String,
    pub rows_read: usize,
    pub rows_accepted: usize,
    pub rows_skipped: usize,
    pub write: WriteOutcome,
    pub notifications_suppressed: bool,
    pub recipients: usize,
    pub dispatch: DispatchReport,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_outcome_serializes_with_status_tag() {
        let json = serde_json::to_string(&WriteOutcome::Failed {
            errors: vec![InsertError::row(3, "invalid")],
        })
        .unwrap();
        assert!(json.contains(r#""status":"failed""#));
        assert!(json.contains(r#""rowIndex":3"#));
    }

    #[test]
    fn only_written_counts_as_success() {
        assert!(WriteOutcome::Written { rows: 1 }.is_success());
        assert!(!WriteOutcome::Skipped.is_success());
        assert!(!WriteOutcome::Failed { errors: vec![] }.is_success());
    }
}
