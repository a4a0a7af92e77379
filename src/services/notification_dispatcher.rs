//! Delivers resolved notifications, one attempt per recipient.
//!
//! A failed delivery is logged and recorded; it never stops the remaining
//! deliveries. Nothing is retried.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{error, info};

use crate::services::email_sender::{EmailMessage, EmailSender};
use crate::types::{DeliveryFailure, DispatchReport};

pub struct NotificationDispatcher {
    sender: Arc<dyn EmailSender>,
    concurrency: usize,
}

impl NotificationDispatcher {
    /// `concurrency` of 0 or 1 sends sequentially.
    pub fn new(sender: Arc<dyn EmailSender>, concurrency: usize) -> Self {
        Self {
            sender,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn dispatch<I>(&self, messages: I) -> DispatchReport
    where
        I: IntoIterator<Item = EmailMessage>,
    {
        let mut report = DispatchReport::default();

        let mut results = stream::iter(messages)
            .map(|msg| self.deliver(msg))
            .buffered(self.concurrency);

        while let Some((to, result)) = results.next().await {
            match result {
                Ok(()) => report.sent.push(to),
                Err(error) => report.failed.push(DeliveryFailure { recipient: to, error }),
            }
        }

        report
    }

    async fn deliver(&self, msg: EmailMessage) -> (String, Result<(), String>) {
        let to = msg.to.clone();
        match self.sender.send(msg).await {
            Ok(()) => {
                info!(recipient = %to, "Notification sent");
                (to, Ok(()))
            }
            Err(e) => {
                error!(recipient = %to, error = %e, "Notification delivery failed");
                (to, Err(e.to_string()))
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
