//! Upload ingest pipeline
//!
//! One invocation per uploaded file:
//! fetch → parse → validate/stamp → write → gate → resolve → dispatch.
//!
//! Row problems, write errors and delivery failures are recovered here and
//! show up in the `RunReport`. Only fetch/decode/parse errors abort the run.
//! Runs share nothing mutable, so any number may execute concurrently.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::IngestError;
use crate::services::email_sender::EmailSender;
use crate::services::notification_dispatcher::NotificationDispatcher;
use crate::services::object_store::ObjectStore;
use crate::services::recipient_resolver::{ContentMode, RecipientResolver, CONTENT_COLUMN};
use crate::services::row_parser::{ParserOptions, RowReader};
use crate::services::row_validator::{format_timestamp, RowValidator};
use crate::services::warehouse::{TableRef, Warehouse};
use crate::types::{AcceptedRow, DispatchReport, InsertError, RunReport, UploadEvent, WriteOutcome};

/// What a write error means for notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotifyGate {
    /// Any write error suppresses every notification of the run
    #[default]
    AllOrNothing,
    /// Only rows named by a row-level error lose their notification;
    /// a batch-level error still suppresses everything
    SkipFailedRows,
}

impl FromStr for NotifyGate {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all_or_nothing" | "all-or-nothing" | "strict" => Ok(Self::AllOrNothing),
            "skip_failed_rows" | "skip-failed-rows" | "partial" => Ok(Self::SkipFailedRows),
            other => anyhow::bail!("unknown notify gate '{}'", other),
        }
    }
}

/// Per-process pipeline settings
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub table: TableRef,
    pub parser: ParserOptions,
    pub exempt_columns: Vec<String>,
    pub content_mode: ContentMode,
    pub notify_gate: NotifyGate,
    pub static_recipient: Option<String>,
    pub locale: String,
    pub dispatch_concurrency: usize,
}

/// Rows allowed to produce notifications after the write, `None` when the
/// run's notifications are suppressed.
pub fn notifiable_rows<'a>(
    gate: NotifyGate,
    write: &WriteOutcome,
    rows: &'a [AcceptedRow],
) -> Option<Vec<&'a AcceptedRow>> {
    match write {
        WriteOutcome::Written { .. } => Some(rows.iter().collect()),
        WriteOutcome::Skipped => None,
        WriteOutcome::Failed { .. } if gate == NotifyGate::AllOrNothing => None,
        WriteOutcome::Failed { errors } => {
            let mut failed = HashSet::new();
            for e in errors {
                failed.insert(e.row_index?);
            }
            Some(
                rows.iter()
                    .enumerate()
                    .filter(|(i, _)| !failed.contains(i))
                    .map(|(_, row)| row)
                    .collect(),
            )
        }
    }
}

pub struct IngestPipeline {
    store: Arc<dyn ObjectStore>,
    warehouse: Arc<dyn Warehouse>,
    dispatcher: NotificationDispatcher,
    validator: RowValidator,
    resolver: RecipientResolver,
    settings: PipelineSettings,
}

impl IngestPipeline {
    pub fn new(
        settings: PipelineSettings,
        store: Arc<dyn ObjectStore>,
        warehouse: Arc<dyn Warehouse>,
        sender: Arc<dyn EmailSender>,
    ) -> Self {
        Self {
            dispatcher: NotificationDispatcher::new(sender, settings.dispatch_concurrency),
            validator: RowValidator::new(settings.exempt_columns.iter().cloned()),
            resolver: RecipientResolver::new(
                settings.content_mode,
                settings.static_recipient.clone(),
                settings.locale.clone(),
            ),
            store,
            warehouse,
            settings,
        }
    }

    /// Process one upload, stamping rows with the current time.
    pub async fn run(&self, event: &UploadEvent) -> Result<RunReport, IngestError> {
        self.run_at(event, Utc::now()).await
    }

    pub async fn run_at(&self, event: &UploadEvent, now: DateTime<Utc>) -> Result<RunReport, IngestError> {
        let start_time = Instant::now();
        let run_id = Uuid::new_v4();
        info!(%run_id, bucket = %event.bucket, file = %event.name, "Upload event received");

        let bytes = self
            .store
            .fetch(&event.bucket, &event.name)
            .await
            .map_err(|source| IngestError::Fetch {
                bucket: event.bucket.clone(),
                object: event.name.clone(),
                source: source.into(),
            })?;
        info!(%run_id, bytes = bytes.len(), "Object staged for processing");

        let reader = RowReader::new(&bytes, &self.settings.parser)?;
        let has_content_column = reader.has_column(CONTENT_COLUMN);

        let ingested_at = format_timestamp(now);
        let validation = self.validator.validate(reader, &ingested_at)?;
        let rows_read = validation.rows_read();
        let rows_skipped = validation.skipped.len();
        for skipped in &validation.skipped {
            warn!(
                %run_id,
                line = skipped.line,
                blank = ?skipped.blank_columns,
                row = ?skipped.row,
                "Skipping row with blank values"
            );
        }
        if rows_skipped > 0 {
            warn!(%run_id, skipped = rows_skipped, read = rows_read, "Rows skipped due to blank values");
        }

        let accepted = validation.accepted;
        let write = self.write(run_id, &accepted).await;

        let (notifications_suppressed, recipients, dispatch) =
            match notifiable_rows(self.settings.notify_gate, &write, &accepted) {
                Some(rows) => {
                    let recipients = self.resolver.resolve(rows, has_content_column, &event.name);
                    let count = recipients.len();
                    info!(%run_id, recipients = count, "Dispatching notifications");
                    let dispatch = self.dispatcher.dispatch(recipients.into_messages()).await;
                    (false, count, dispatch)
                }
                None => {
                    info!(%run_id, "Notifications suppressed for this run");
                    (true, 0, DispatchReport::default())
                }
            };

        info!(
            %run_id,
            accepted = accepted.len(),
            skipped = rows_skipped,
            sent = dispatch.sent.len(),
            failed = dispatch.failed.len(),
            duration_ms = start_time.elapsed().as_millis() as u64,
            "Upload processed"
        );

        Ok(RunReport {
            run_id,
            bucket: event.bucket.clone(),
            object: event.name.clone(),
            ingested_at,
            rows_read,
            rows_accepted: accepted.len(),
            rows_skipped,
            write,
            notifications_suppressed,
            recipients,
            dispatch,
        })
    }

    async fn write(&self, run_id: Uuid, rows: &[AcceptedRow]) -> WriteOutcome {
        let table = &self.settings.table;

        if rows.is_empty() {
            info!(%run_id, table = %table, "No rows accepted, nothing to write");
            return WriteOutcome::Skipped;
        }

        match self.warehouse.insert_rows(table, rows).await {
            Ok(errors) if errors.is_empty() => {
                info!(%run_id, table = %table, rows = rows.len(), "Rows written");
                WriteOutcome::Written { rows: rows.len() }
            }
            Ok(errors) => {
                warn!(
                    %run_id,
                    table = %table,
                    rows = rows.len(),
                    errors = errors.len(),
                    details = ?errors,
                    "Warehouse reported insert errors"
                );
                WriteOutcome::Failed { errors }
            }
            Err(e) => {
                error!(%run_id, table = %table, rows = rows.len(), error = %e, "Warehouse write failed");
                WriteOutcome::Failed {
                    errors: vec![InsertError::batch(e.to_string())],
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
