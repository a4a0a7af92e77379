//! Configuration management

use std::str::FromStr;

use anyhow::{self, Context, Result};

use crate::services::pipeline::{NotifyGate, PipelineSettings};
use crate::services::recipient_resolver::ContentMode;
use crate::services::row_parser::{DecodingPolicy, ParserOptions};
use crate::services::warehouse::TableRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectStoreBackend {
    Gcs,
    Local,
}

impl FromStr for ObjectStoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "gcs" => Ok(Self::Gcs),
            "local" => Ok(Self::Local),
            other => anyhow::bail!("unknown OBJECT_STORE '{}' (expected gcs or local)", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarehouseBackend {
    BigQuery,
    Log,
}

impl FromStr for WarehouseBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "bigquery" | "bq" => Ok(Self::BigQuery),
            "log" => Ok(Self::Log),
            other => anyhow::bail!("unknown WAREHOUSE '{}' (expected bigquery or log)", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailProvider {
    SendGrid,
    Resend,
    Log,
}

impl FromStr for EmailProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sendgrid" => Ok(Self::SendGrid),
            "resend" => Ok(Self::Resend),
            "log" => Ok(Self::Log),
            other => anyhow::bail!("unknown EMAIL_PROVIDER '{}' (expected sendgrid, resend or log)", other),
        }
    }
}

/// Where uploaded files are read from
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: ObjectStoreBackend,
    pub local_root: String,
}

/// Destination table and how to reach it
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    pub backend: WarehouseBackend,
    pub table: TableRef,
}

/// Process-wide email transport settings
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub provider: EmailProvider,
    pub from_email: String,
    pub sendgrid_api_key: Option<String>,
    pub resend_api_key: Option<String>,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// NATS server URL
    pub nats_url: String,

    /// Optional NATS credentials
    pub nats_user: Option<String>,
    pub nats_password: Option<String>,

    /// Subject carrying upload events
    pub trigger_subject: String,

    pub storage: StorageConfig,
    pub warehouse: WarehouseConfig,
    pub email: EmailConfig,
    pub pipeline: PipelineSettings,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup. Empty values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let nats_url = get_or("NATS_URL", "nats://localhost:4222");
        let nats_user = get("NATS_USER");
        let nats_password = get("NATS_PASSWORD");
        let trigger_subject = get_or("TRIGGER_SUBJECT", "ingest.uploads");

        let storage = StorageConfig {
            backend: get_or("OBJECT_STORE", "gcs").parse()?,
            local_root: get_or("LOCAL_STORE_ROOT", "./data"),
        };

        let warehouse_backend: WarehouseBackend = get_or("WAREHOUSE", "bigquery").parse()?;
        let project = match warehouse_backend {
            WarehouseBackend::BigQuery => get("BQ_PROJECT").context("BQ_PROJECT must be set for the bigquery warehouse")?,
            WarehouseBackend::Log => get_or("BQ_PROJECT", "local"),
        };
        let warehouse = WarehouseConfig {
            backend: warehouse_backend,
            table: TableRef {
                project,
                dataset: get_or("BQ_DATASET", "exam_dataset"),
                table: get_or("BQ_TABLE", "csv_test"),
            },
        };

        let sendgrid_api_key = get("SENDGRID_API_KEY");
        let provider = match get("EMAIL_PROVIDER") {
            Some(p) => p.parse()?,
            None if sendgrid_api_key.is_some() => EmailProvider::SendGrid,
            None => EmailProvider::Log,
        };
        let email = EmailConfig {
            provider,
            from_email: get_or("FROM_EMAIL", "noreply@example.com"),
            sendgrid_api_key,
            resend_api_key: get("RESEND_API_KEY"),
        };

        let delimiter = match get("CSV_DELIMITER") {
            Some(d) => parse_delimiter(&d)?,
            None => b',',
        };
        let dispatch_concurrency = match get("DISPATCH_CONCURRENCY") {
            Some(n) => n
                .trim()
                .parse()
                .with_context(|| format!("DISPATCH_CONCURRENCY must be a number, got '{}'", n))?,
            None => 1,
        };

        let pipeline = PipelineSettings {
            table: warehouse.table.clone(),
            parser: ParserOptions {
                decoding: get_or("DECODING", "lenient").parse::<DecodingPolicy>()?,
                delimiter,
            },
            exempt_columns: get("EXEMPT_COLUMNS")
                .map(|list| {
                    list.split(',')
                        .map(str::trim)
                        .filter(|c| !c.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            content_mode: get_or("CONTENT_MODE", "auto").parse::<ContentMode>()?,
            notify_gate: get_or("NOTIFY_GATE", "all_or_nothing").parse::<NotifyGate>()?,
            static_recipient: get("TO_EMAIL"),
            locale: get_or("NOTIFY_LOCALE", "en"),
            dispatch_concurrency,
        };

        Ok(Self {
            nats_url,
            nats_user,
            nats_password,
            trigger_subject,
            storage,
            warehouse,
            email,
            pipeline,
        })
    }
}

fn parse_delimiter(value: &str) -> Result<u8> {
    match value {
        "\\t" | "tab" => Ok(b'\t'),
        v if v.len() == 1 && v.is_ascii() => Ok(v.as_bytes()[0]),
        v => anyhow::bail!("CSV_DELIMITER must be a single ASCII character, got '{}'", v),
    }
}
