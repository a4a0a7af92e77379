//! NATS message handlers

pub mod upload;

use std::sync::Arc;
use anyhow::Result;
use async_nats::Client;
use tokio::select;
use tokio_util::task::TaskTracker;
use tracing::{error, info};

use crate::config::Config;
use crate::services::pipeline::IngestPipeline;

/// Subscribe to the trigger subject and process events until the
/// subscription ends or the process is interrupted. Runs already started
/// are always allowed to finish before this returns.
pub async fn start_handlers(client: Client, pipeline: Arc<IngestPipeline>, config: &Config) -> Result<()> {
    info!("Starting message handlers...");

    let upload_sub = client.subscribe(config.trigger_subject.clone()).await?;
    info!("Listening for upload events on '{}'", config.trigger_subject);

    let tracker = TaskTracker::new();

    // Leaving the select drops the subscriber, which unsubscribes.
    let result = select! {
        result = upload::handle_upload_events(client.clone(), upload_sub, pipeline, tracker.clone()) => {
            if let Err(e) = &result {
                error!("Upload handler error: {}", e);
            }
            result
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            Ok(())
        }
    };

    drain_in_flight(&tracker).await;
    client.flush().await.ok();
    result
}

/// Stop accepting new runs and wait for every tracked run to complete.
pub async fn drain_in_flight(tracker: &TaskTracker) {
    tracker.close();
    if !tracker.is_empty() {
        info!(in_flight = tracker.len(), "Waiting for in-flight uploads to finish");
    }
    tracker.wait().await;
    info!("All uploads finished");
}
