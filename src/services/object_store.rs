//! Object-store read abstraction
//!
//! Configuration via OBJECT_STORE env variable:
//! - "gcs" → GcsObjectStore (Cloud Storage, Application Default Credentials)
//! - "local" → LocalObjectStore (`{root}/{bucket}/{object}` on disk)
//!
//! `MemoryObjectStore` backs the tests.

#[cfg(test)]
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use google_cloud_storage::client::{Client, ClientConfig};
use google_cloud_storage::http::objects::download::Range;
use google_cloud_storage::http::objects::get::GetObjectRequest;
use tracing::info;

use crate::config::{ObjectStoreBackend, StorageConfig};

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Full content of `object` in `bucket`
    async fn fetch(&self, bucket: &str, object: &str) -> Result<Vec<u8>>;

    fn name(&self) -> &'static str;
}

pub async fn create_object_store(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    let store: Arc<dyn ObjectStore> = match config.backend {
        ObjectStoreBackend::Gcs => Arc::new(GcsObjectStore::connect().await?),
        ObjectStoreBackend::Local => Arc::new(LocalObjectStore::new(&config.local_root)),
    };
    info!("Object store initialized: {}", store.name());
    Ok(store)
}

// =============================================================================
// GcsObjectStore
// =============================================================================

pub struct GcsObjectStore {
    client: Client,
}

impl GcsObjectStore {
    /// Authenticate with Application Default Credentials. The client
    /// refreshes its access token on its own.
    pub async fn connect() -> Result<Self> {
        let config = ClientConfig::default()
            .with_auth()
            .await
            .context("authenticating to GCS")?;
        Ok(Self {
            client: Client::new(config),
        })
    }

    fn object_request(bucket: &str, object: &str) -> GetObjectRequest {
        GetObjectRequest {
            bucket: bucket.to_string(),
            object: object.to_string(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    async fn fetch(&self, bucket: &str, object: &str) -> Result<Vec<u8>> {
        self.client
            .download_object(&Self::object_request(bucket, object), &Range::default())
            .await
            .with_context(|| format!("GCS download of gs://{}/{} failed", bucket, object))
    }

    fn name(&self) -> &'static str {
        "gcs"
    }
}

// =============================================================================
// LocalObjectStore
// =============================================================================

pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the on-disk path, refusing names that climb out of the root.
    fn object_path(&self, bucket: &str, object: &str) -> Result<PathBuf> {
        let relative = Path::new(bucket).join(object);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            anyhow::bail!("Invalid object path '{}/{}'", bucket, object);
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn fetch(&self, bucket: &str, object: &str) -> Result<Vec<u8>> {
        let path = self.object_path(bucket, object)?;
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

// =============================================================================
// MemoryObjectStore (tests)
// =============================================================================

#[cfg(test)]
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: HashMap<(String, String), Vec<u8>>,
}

#[cfg(test)]
impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(mut self, bucket: &str, object: &str, content: impl Into<Vec<u8>>) -> Self {
        self.objects
            .insert((bucket.to_string(), object.to_string()), content.into());
        self
    }
}

#[cfg(test)]
#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn fetch(&self, bucket: &str, object: &str) -> Result<Vec<u8>> {
        self.objects
            .get(&(bucket.to_string(), object.to_string()))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("No such object: {}/{}", bucket, object))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

// =============================================================================
// Tests
// =============================================================================
