//! Transactional email sending abstraction.
//!
//! `EmailSender` is the core trait - `SendGridEmailSender` or `ResendEmailSender`
//! in production, `LogEmailSender` in dev/staging (logs to tracing),
//! `FakeEmailSender` in tests.
//!
//! The trait is object-safe so callers can hold `Arc<dyn EmailSender>`.
//! Sender identity and API keys are fixed at construction; `send` only takes
//! the message.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tracing::info;

use crate::config::{EmailConfig, EmailProvider};

// =============================================================================
// Core trait
// =============================================================================

/// Represents a rendered plain-text email ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
}

/// Abstraction over an email transport.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, msg: EmailMessage) -> Result<()>;

    fn name(&self) -> &'static str;
}

/// Build the sender selected by `config.provider`.
pub fn create_email_sender(config: &EmailConfig) -> Result<Arc<dyn EmailSender>> {
    let sender: Arc<dyn EmailSender> = match config.provider {
        EmailProvider::SendGrid => {
            let api_key = config
                .sendgrid_api_key
                .clone()
                .ok_or_else(|| anyhow::anyhow!("SENDGRID_API_KEY must be set for the sendgrid provider"))?;
            Arc::new(SendGridEmailSender::new(api_key, &config.from_email))
        }
        EmailProvider::Resend => {
            let api_key = config
                .resend_api_key
                .clone()
                .ok_or_else(|| anyhow::anyhow!("RESEND_API_KEY must be set for the resend provider"))?;
            Arc::new(ResendEmailSender::new(api_key, &config.from_email))
        }
        EmailProvider::Log => Arc::new(LogEmailSender),
    };
    info!("Email sender initialized: {}", sender.name());
    Ok(sender)
}

// =============================================================================
// LogEmailSender - writes to tracing (dev / staging)
// =============================================================================

pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, msg: EmailMessage) -> Result<()> {
        info!(
            to = %msg.to,
            subject = %msg.subject,
            "[LogEmailSender] Would send email\n---TEXT---\n{}",
            msg.text,
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

// =============================================================================
// FakeEmailSender - captures sent messages in a Vec (tests)
// =============================================================================

/// Collects sent messages in memory for assertion in tests.
///
/// Addresses registered with `fail_for` are rejected without being recorded.
#[derive(Default)]
pub struct FakeEmailSender {
    sent: Mutex<Vec<EmailMessage>>,
    attempts: Mutex<Vec<String>>,
    failing: HashSet<String>,
    delay: Option<Duration>,
}

impl FakeEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            failing: addresses.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Hold every send for `delay` before recording it
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn sent_messages(&self) -> Vec<EmailMessage> {
        self.sent.lock().clone()
    }

    /// Every address `send` was called with, successful or not
    pub fn attempted(&self) -> Vec<String> {
        self.attempts.lock().clone()
    }
}

#[async_trait]
impl EmailSender for FakeEmailSender {
    async fn send(&self, msg: EmailMessage) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.attempts.lock().push(msg.to.clone());
        if self.failing.contains(&msg.to) {
            anyhow::bail!("mailbox unavailable: {}", msg.to);
        }
        self.sent.lock().push(msg);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

// =============================================================================
// SendGridEmailSender - live SendGrid v3 API
// =============================================================================

const SENDGRID_URL: &str = "https://api.sendgrid.com/v3/mail/send";

pub struct SendGridEmailSender {
    client: reqwest::Client,
    api_key: String,
    from: String,
}

impl SendGridEmailSender {
    pub fn new(api_key: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            from: from.into(),
        }
    }

    fn payload(&self, msg: &EmailMessage) -> serde_json::Value {
        json!({
            "personalizations": [{ "to": [{ "email": msg.to }] }],
            "from": { "email": self.from },
            "subject": msg.subject,
            "content": [{ "type": "text/plain", "value": msg.text }],
        })
    }
}

#[async_trait]
impl EmailSender for SendGridEmailSender {
    async fn send(&self, msg: EmailMessage) -> Result<()> {
        let response = self
            .client
            .post(SENDGRID_URL)
            .bearer_auth(&self.api_key)
            .json(&self.payload(&msg))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("SendGrid API error {}: {}", status, body));
        }

        info!(to = %msg.to, subject = %msg.subject, "Email sent via SendGrid");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "sendgrid"
    }
}

// =============================================================================
// ResendEmailSender - live Resend.com API
// =============================================================================

pub struct ResendEmailSender {
    client: reqwest::Client,
    api_key: String,
    from: String,
}

impl ResendEmailSender {
    pub fn new(api_key: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            from: from.into(),
        }
    }
}

#[async_trait]
impl EmailSender for ResendEmailSender {
    async fn send(&self, msg: EmailMessage) -> Result<()> {
        let mut body = HashMap::new();
        body.insert("from", self.from.as_str());
        body.insert("to", msg.to.as_str());
        body.insert("subject", msg.subject.as_str());
        body.insert("text", msg.text.as_str());

        let response = self
            .client
            .post("https://api.resend.com/emails")
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Resend API error {}: {}", status, body));
        }

        info!(to = %msg.to, subject = %msg.subject, "Email sent via Resend");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "resend"
    }
}

// =============================================================================
// Tests
// =============================================================================
