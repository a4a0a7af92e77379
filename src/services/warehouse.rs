//! Destination table write abstraction
//!
//! Configuration via WAREHOUSE env variable:
//! - "bigquery" → BigQueryWarehouse (streaming `insertAll`, Application Default Credentials)
//! - "log" → LogWarehouse (accepts everything, logs the batch)
//!
//! `FakeWarehouse` records batches for tests and returns scripted errors.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use google_cloud_bigquery::client::{Client, ClientConfig};
use google_cloud_bigquery::http::tabledata::insert_all::{InsertAllRequest, InsertAllResponse, Row as InsertRow};
#[cfg(test)]
use parking_lot::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{WarehouseBackend, WarehouseConfig};
use crate::types::{AcceptedRow, InsertError};

/// Fully qualified destination table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Write `rows` as one batch. An empty list means every row was stored;
    /// otherwise some or all rows were rejected.
    async fn insert_rows(&self, table: &TableRef, rows: &[AcceptedRow]) -> Result<Vec<InsertError>>;

    fn name(&self) -> &'static str;
}

pub async fn create_warehouse(config: &WarehouseConfig) -> Result<Arc<dyn Warehouse>> {
    let warehouse: Arc<dyn Warehouse> = match config.backend {
        WarehouseBackend::BigQuery => Arc::new(BigQueryWarehouse::connect().await?),
        WarehouseBackend::Log => Arc::new(LogWarehouse),
    };
    info!("Warehouse initialized: {}", warehouse.name());
    Ok(warehouse)
}

// =============================================================================
// BigQueryWarehouse
// =============================================================================

pub struct BigQueryWarehouse {
    client: Client,
}

impl BigQueryWarehouse {
    /// Authenticate with Application Default Credentials. The client
    /// refreshes its access token on its own.
    pub async fn connect() -> Result<Self> {
        let (config, _project) = ClientConfig::new_with_auth()
            .await
            .context("authenticating BigQuery client")?;
        let client = Client::new(config).await.context("creating BigQuery client")?;
        Ok(Self { client })
    }

    /// Request body; each row gets a fresh `insertId` for best-effort dedup.
    fn insert_request(rows: &[AcceptedRow]) -> Result<InsertAllRequest<serde_json::Value>> {
        let rows = rows
            .iter()
            .map(|row| -> Result<InsertRow<serde_json::Value>> {
                Ok(InsertRow {
                    insert_id: Some(Uuid::new_v4().to_string()),
                    json: serde_json::to_value(row)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(InsertAllRequest {
            rows,
            ..Default::default()
        })
    }

    /// Row-level `insertErrors`, reasons joined per row
    fn row_errors(response: InsertAllResponse) -> Vec<InsertError> {
        response
            .insert_errors
            .unwrap_or_default()
            .into_iter()
            .map(|row| {
                let message = row
                    .errors
                    .iter()
                    .map(|e| {
                        if e.location.is_empty() {
                            format!("{}: {}", e.reason, e.message)
                        } else {
                            format!("{} at {}: {}", e.reason, e.location, e.message)
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("; ");
                InsertError::row(row.index as usize, message)
            })
            .collect()
    }
}

#[async_trait]
impl Warehouse for BigQueryWarehouse {
    async fn insert_rows(&self, table: &TableRef, rows: &[AcceptedRow]) -> Result<Vec<InsertError>> {
        let request = Self::insert_request(rows)?;
        let response = self
            .client
            .tabledata()
            .insert(&table.project, &table.dataset, &table.table, &request)
            .await
            .with_context(|| format!("BigQuery insertAll into {} failed", table))?;
        Ok(Self::row_errors(response))
    }

    fn name(&self) -> &'static str {
        "bigquery"
    }
}

// =============================================================================
// LogWarehouse - writes to tracing (dev / staging)
// =============================================================================

pub struct LogWarehouse;

#[async_trait]
impl Warehouse for LogWarehouse {
    async fn insert_rows(&self, table: &TableRef, rows: &[AcceptedRow]) -> Result<Vec<InsertError>> {
        info!(table = %table, rows = rows.len(), "[LogWarehouse] Would insert rows");
        for row in rows {
            debug!("{}", serde_json::to_string(row)?);
        }
        Ok(Vec::new())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

// =============================================================================
// FakeWarehouse - records batches in memory (tests)
// =============================================================================

#[cfg(test)]
#[derive(Default)]
pub struct FakeWarehouse {
    batches: Mutex<Vec<(TableRef, Vec<AcceptedRow>)>>,
    errors: Vec<InsertError>,
    unavailable: bool,
}

#[cfg(test)]
impl FakeWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `errors` for every batch (rows are still recorded)
    pub fn with_errors(errors: Vec<InsertError>) -> Self {
        Self {
            errors,
            ..Self::default()
        }
    }

    /// Fail every call at the transport level
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn batches(&self) -> Vec<(TableRef, Vec<AcceptedRow>)> {
        self.batches.lock().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Warehouse for FakeWarehouse {
    async fn insert_rows(&self, table: &TableRef, rows: &[AcceptedRow]) -> Result<Vec<InsertError>> {
        if self.unavailable {
            anyhow::bail!("warehouse unavailable");
        }
        self.batches.lock().push((table.clone(), rows.to_vec()));
        Ok(self.errors.clone())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

// =============================================================================
// Tests
// =============================================================================
