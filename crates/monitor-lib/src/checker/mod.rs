//! Resource status checking
//!
//! This module provides:
//! - [`ResourceChecker`], which decrypts access settings and dispatches to a probe
//! - [`StatusCache`], which collapses duplicate checks within one cycle
//! - The [`Decryptor`] seam and the recursive access tree walk

mod cache;
mod decrypt;

#[cfg(test)]
mod tests;

pub use cache::{CacheKey, StatusCache};
pub use decrypt::{decrypt_access, Decryptor};

use crate::error::ProbeError;
use crate::models::{CheckOutcome, Resource, ResourceInstance, WorkloadKind};
use crate::observability::MonitorMetrics;
use crate::probe::{
    probe_kafka, probe_mongodb, probe_mysql, probe_nats, probe_object_store, probe_postgres,
    probe_rabbitmq, probe_redis, probe_tcp, probe_workload, Access, ObjectStoreKind, ProbeResult,
};
use crate::workload::WorkloadApi;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const SQL_SERVER_PORT: u16 = 1433;

/// Configuration for resource checks
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// Upper bound for a single probe
    pub probe_timeout: Duration,
    /// Namespace holding platform-managed workloads
    pub platform_namespace: String,
    /// Deployment backing `Scheduler` resources
    pub scheduler_name: String,
    /// Deployment backing `Realtime` resources
    pub realtime_name: String,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(10),
            platform_namespace: "default".to_string(),
            scheduler_name: "engine-scheduler".to_string(),
            realtime_name: "engine-realtime".to_string(),
        }
    }
}

/// Normalizes heterogeneous backend checks into a [`CheckOutcome`]
///
/// No probe failure escapes: every error becomes an Error outcome.
pub struct ResourceChecker {
    config: CheckerConfig,
    workloads: Arc<dyn WorkloadApi>,
    decryptor: Arc<dyn Decryptor>,
    http: reqwest::Client,
    metrics: MonitorMetrics,
}

impl ResourceChecker {
    /// Fails only when the HTTP client for object store checks cannot be built
    pub fn new(
        config: CheckerConfig,
        workloads: Arc<dyn WorkloadApi>,
        decryptor: Arc<dyn Decryptor>,
    ) -> Result<Self, ProbeError> {
        let http = reqwest::Client::builder()
            .timeout(config.probe_timeout)
            .build()?;

        Ok(Self {
            config,
            workloads,
            decryptor,
            http,
            metrics: MonitorMetrics::new(),
        })
    }

    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    /// Check a resource, reusing any outcome already computed this cycle
    ///
    /// `None` means the resource is not observable right now.
    pub async fn check(&self, resource: &Resource, cache: &mut StatusCache) -> Option<CheckOutcome> {
        if let Some(cached) = cache.get(resource) {
            debug!(
                resource_id = %resource.id,
                instance = resource.instance.as_str(),
                "Using cached outcome"
            );
            return cached;
        }

        let outcome = self.check_uncached(resource).await;
        cache.set(resource, outcome.clone());
        outcome
    }

    async fn check_uncached(&self, resource: &Resource) -> Option<CheckOutcome> {
        let instance = resource.instance;
        if instance == ResourceInstance::Unrecognized {
            debug!(resource_id = %resource.id, "Skipping resource with unrecognized instance");
            return None;
        }

        let access = match decrypt_access(self.decryptor.as_ref(), &resource.access).await {
            Ok(access) => access,
            Err(e) => {
                warn!(
                    resource_id = %resource.id,
                    instance = instance.as_str(),
                    error = %e,
                    "Failed to decrypt access settings"
                );
                self.metrics.inc_probe_failures(instance.as_str());
                return Some(CheckOutcome::error(
                    None,
                    format!("Cannot decrypt access settings: {e}"),
                ));
            }
        };

        let result = match tokio::time::timeout(
            self.config.probe_timeout,
            self.dispatch(instance, &access),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout(self.config.probe_timeout)),
        };

        match result {
            Ok(Some(metrics)) => Some(CheckOutcome::ok(metrics, healthy_message(instance))),
            Ok(None) => {
                debug!(resource_id = %resource.id, "Workload scaled to zero, not observable");
                None
            }
            Err(e) => {
                debug!(
                    resource_id = %resource.id,
                    instance = instance.as_str(),
                    error = %e,
                    "Probe failed"
                );
                self.metrics.inc_probe_failures(instance.as_str());
                Some(CheckOutcome::error(e.metrics(), e.to_string()))
            }
        }
    }

    async fn dispatch(&self, instance: ResourceInstance, access: &Value) -> ProbeResult {
        match instance {
            ResourceInstance::PostgreSql => probe_postgres(access).await,
            ResourceInstance::MySql => probe_mysql(access).await,
            ResourceInstance::SqlServer => probe_tcp(access, SQL_SERVER_PORT).await,
            ResourceInstance::MongoDb => probe_mongodb(access).await,
            ResourceInstance::Redis => probe_redis(access).await,
            ResourceInstance::RabbitMq => probe_rabbitmq(access).await,
            ResourceInstance::Kafka => probe_kafka(access).await,
            ResourceInstance::Nats => probe_nats(access).await,
            ResourceInstance::AwsS3 => {
                probe_object_store(&self.http, ObjectStoreKind::AwsS3, access).await
            }
            ResourceInstance::GcpStorage => {
                probe_object_store(&self.http, ObjectStoreKind::GcpStorage, access).await
            }
            ResourceInstance::AzureBlob => {
                probe_object_store(&self.http, ObjectStoreKind::AzureBlob, access).await
            }
            ResourceInstance::MinIo => {
                probe_object_store(&self.http, ObjectStoreKind::MinIo, access).await
            }
            ResourceInstance::ApiServer => {
                let access = Access::new(access);
                let name = access.required_str("name")?;
                let namespace = access
                    .str("namespace")
                    .unwrap_or(&self.config.platform_namespace);
                self.probe_deployment(name, namespace).await
            }
            ResourceInstance::Scheduler => {
                self.probe_deployment(&self.config.scheduler_name, &self.config.platform_namespace)
                    .await
            }
            ResourceInstance::Realtime => {
                self.probe_deployment(&self.config.realtime_name, &self.config.platform_namespace)
                    .await
            }
            ResourceInstance::Unrecognized => Ok(None),
        }
    }

    async fn probe_deployment(&self, name: &str, namespace: &str) -> ProbeResult {
        probe_workload(
            self.workloads.as_ref(),
            WorkloadKind::Deployment,
            name,
            namespace,
        )
        .await
    }
}

fn healthy_message(instance: ResourceInstance) -> String {
    if instance.is_compute_service() || instance.is_singleton() {
        "Service is running".to_string()
    } else {
        "Connection established".to_string()
    }
}
