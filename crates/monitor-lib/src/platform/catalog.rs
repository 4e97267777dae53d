//! Resource and container catalog

use super::PlatformClient;
use crate::models::{Container, ContainerStatus, Resource, ResourceUpdate};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

/// One catalog page; records that could not be decoded are counted, not returned
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub skipped: usize,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items, skipped: 0 }
    }

    /// Records the server returned, decodable or not
    pub fn len(&self) -> usize {
        self.items.len() + self.skipped
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decode each record on its own so one malformed entry cannot sink the page
    pub fn decode(records: Vec<Value>, kind: &str) -> Self
    where
        T: DeserializeOwned,
    {
        let mut items = Vec::with_capacity(records.len());
        let mut skipped = 0;

        for record in records {
            let id = record
                .get("_id")
                .or_else(|| record.get("id"))
                .and_then(Value::as_str)
                .unwrap_or("<unknown>")
                .to_string();
            match serde_json::from_value(record) {
                Ok(item) => items.push(item),
                Err(e) => {
                    warn!(kind = kind, id = %id, error = %e, "Skipping malformed catalog record");
                    skipped += 1;
                }
            }
        }

        Self { items, skipped }
    }
}

/// Paginated access to the persisted resources and containers
///
/// Pages are zero-based. A page shorter than `size` is the last one.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn resources_page(&self, page: u32, size: u32) -> Result<Page<Resource>>;

    async fn update_resource(&self, id: &str, update: &ResourceUpdate) -> Result<()>;

    async fn containers_page(&self, page: u32, size: u32) -> Result<Page<Container>>;

    async fn update_container_status(&self, id: &str, status: &ContainerStatus) -> Result<()>;
}

/// Catalog served by the platform API
#[derive(Clone)]
pub struct HttpCatalog {
    client: PlatformClient,
}

impl HttpCatalog {
    pub fn new(client: PlatformClient) -> Self {
        Self { client }
    }
}

fn page_query(page: u32, size: u32) -> [(&'static str, String); 2] {
    [("page", page.to_string()), ("size", size.to_string())]
}

#[async_trait]
impl Catalog for HttpCatalog {
    async fn resources_page(&self, page: u32, size: u32) -> Result<Page<Resource>> {
        let records: Vec<Value> = self
            .client
            .get("v1/internal/resources", &page_query(page, size))
            .await
            .with_context(|| format!("Failed to fetch resource page {page}"))?;
        Ok(Page::decode(records, "resource"))
    }

    async fn update_resource(&self, id: &str, update: &ResourceUpdate) -> Result<()> {
        self.client
            .patch(&format!("v1/internal/resources/{id}"), update)
            .await
            .with_context(|| format!("Failed to update resource {id}"))
    }

    async fn containers_page(&self, page: u32, size: u32) -> Result<Page<Container>> {
        let records: Vec<Value> = self
            .client
            .get("v1/internal/containers", &page_query(page, size))
            .await
            .with_context(|| format!("Failed to fetch container page {page}"))?;
        Ok(Page::decode(records, "container"))
    }

    async fn update_container_status(&self, id: &str, status: &ContainerStatus) -> Result<()> {
        self.client
            .patch(&format!("v1/internal/containers/{id}/status"), status)
            .await
            .with_context(|| format!("Failed to update status of container {id}"))
    }
}
