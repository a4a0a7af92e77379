//! Upload event handler

use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subscriber};
use futures::StreamExt;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

use crate::services::pipeline::IngestPipeline;
use crate::types::{ErrorResponse, SuccessResponse, UploadEvent};

/// Run the pipeline for one raw event payload and build the reply body.
pub async fn process_upload_event(pipeline: &IngestPipeline, payload: &[u8]) -> Result<Vec<u8>> {
    let event = match UploadEvent::from_payload(payload) {
        Ok(event) => event,
        Err(e) => {
            error!("Failed to parse upload event: {}", e);
            let error = ErrorResponse::new("INVALID_EVENT", e.to_string());
            return Ok(serde_json::to_vec(&error)?);
        }
    };

    match pipeline.run(&event).await {
        Ok(report) => Ok(serde_json::to_vec(&SuccessResponse::new(report))?),
        Err(e) => {
            error!(bucket = %event.bucket, file = %event.name, "Upload processing failed: {}", e);
            let error = ErrorResponse::new(e.code(), e.to_string());
            Ok(serde_json::to_vec(&error)?)
        }
    }
}

/// Handle upload events; each event runs on its own task, registered with
/// `tracker` so shutdown can wait for it.
pub async fn handle_upload_events(
    client: Client,
    mut subscriber: Subscriber,
    pipeline: Arc<IngestPipeline>,
    tracker: TaskTracker,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received upload event on {}", msg.subject);

        let client = client.clone();
        let pipeline = Arc::clone(&pipeline);

        tracker.spawn(async move {
            let body = match process_upload_event(&pipeline, &msg.payload).await {
                Ok(body) => body,
                Err(e) => {
                    error!("Failed to encode upload reply: {}", e);
                    return;
                }
            };

            if let Some(reply) = msg.reply {
                if let Err(e) = client.publish(reply, body.into()).await {
                    warn!("Failed to publish upload reply: {}", e);
                }
            }
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::email_sender::FakeEmailSender;
    use crate::services::object_store::MemoryObjectStore;
    use crate::services::pipeline::{NotifyGate, PipelineSettings};
    use crate::services::recipient_resolver::ContentMode;
    use crate::services::row_parser::ParserOptions;
    use crate::services::warehouse::{FakeWarehouse, TableRef};

    fn pipeline(sender: Arc<FakeEmailSender>) -> IngestPipeline {
        let settings = PipelineSettings {
            table: TableRef {
                project: "acme".into(),
                dataset: "exam_dataset".into(),
                table: "csv_test".into(),
            },
            parser: ParserOptions::default(),
            exempt_columns: vec![],
            content_mode: ContentMode::Auto,
            notify_gate: NotifyGate::AllOrNothing,
            static_recipient: None,
            locale: "en".into(),
            dispatch_concurrency: 1,
        };
        let store = MemoryObjectStore::new().with_object(
            "uploads",
            "users.csv",
            "email,send_flg,content\na@x.com,1,hi\n",
        );
        IngestPipeline::new(settings, Arc::new(store), Arc::new(FakeWarehouse::new()), sender)
    }

    #[tokio::test]
    async fn valid_event_replies_with_run_report() {
        let sender = Arc::new(FakeEmailSender::new());
        let body = process_upload_event(&pipeline(sender.clone()), br#"{"bucket":"uploads","name":"users.csv"}"#)
            .await
            .unwrap();

        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["payload"]["rowsAccepted"], 1);
        assert_eq!(json["payload"]["write"]["status"], "written");
        assert_eq!(sender.sent_messages().len(), 1);
    }

    #[tokio::test]
    async fn malformed_event_replies_with_error() {
        let sender = Arc::new(FakeEmailSender::new());
        let body = process_upload_event(&pipeline(sender.clone()), b"not json").await.unwrap();

        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], "INVALID_EVENT");
        assert!(sender.attempted().is_empty());
    }

    #[tokio::test]
    async fn missing_object_replies_with_fetch_error() {
        let sender = Arc::new(FakeEmailSender::new());
        let body = process_upload_event(&pipeline(sender), br#"{"bucket":"uploads","name":"gone.csv"}"#)
            .await
            .unwrap();

        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], "FETCH_ERROR");
    }
}
