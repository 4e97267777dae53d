//! Kubernetes workload status
//!
//! This module provides:
//! - Plain snapshots of the workload data the monitor reads
//! - The [`WorkloadApi`] read interface and its `kube` implementation
//! - Pure derivation of composite lifecycle states
//! - [`WorkloadStatusDeriver`], which joins the two and absorbs read errors

mod derive;
mod kube_api;

pub use derive::{
    classify_pod, derive_cron_status, derive_replica_status, derive_serverless_status,
    PodBucket, PodBuckets,
};
pub use kube_api::KubeWorkloadApi;

use crate::models::{ContainerStatus, StatusDetail, WorkloadKind};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::warn;

/// Replica counts and pod selector of a deployment or stateful set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplicaSnapshot {
    pub desired: i32,
    pub ready: i32,
    pub updated: i32,
    pub available: i32,
    pub unavailable: i32,
    pub selector: BTreeMap<String, String>,
}

/// Pod lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    pub fn parse(phase: Option<&str>) -> Self {
        match phase {
            Some("Pending") => PodPhase::Pending,
            Some("Running") => PodPhase::Running,
            Some("Succeeded") => PodPhase::Succeeded,
            Some("Failed") => PodPhase::Failed,
            _ => PodPhase::Unknown,
        }
    }
}

/// Readiness of one container inside a pod
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerReadiness {
    pub ready: bool,
    /// Exit code when the container is in the terminated state
    pub terminated_exit_code: Option<i32>,
}

/// Phase and container readiness of one pod
#[derive(Debug, Clone, PartialEq)]
pub struct PodSnapshot {
    pub name: String,
    pub phase: PodPhase,
    pub containers: Vec<ContainerReadiness>,
}

/// Status fields of a cron job
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CronJobSnapshot {
    pub last_schedule_time: Option<DateTime<Utc>>,
    pub last_successful_time: Option<DateTime<Utc>>,
    pub active: i32,
}

/// One job owned by a cron job
#[derive(Debug, Clone, PartialEq)]
pub struct JobSnapshot {
    pub name: String,
    pub start_time: Option<DateTime<Utc>>,
    pub active: i32,
    pub succeeded: i32,
    pub failed: i32,
}

/// A `type`/`status` condition pair; `status` is `None` for "Unknown"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub kind: String,
    pub status: Option<bool>,
}

/// Status of a serverless service
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceSnapshot {
    pub conditions: Vec<Condition>,
    pub latest_created_revision: Option<String>,
    pub latest_ready_revision: Option<String>,
}

impl ServiceSnapshot {
    pub fn condition(&self, kind: &str) -> Option<bool> {
        self.conditions
            .iter()
            .find(|c| c.kind == kind)
            .and_then(|c| c.status)
    }
}

/// A cluster event about a build execution object
#[derive(Debug, Clone, PartialEq)]
pub struct BuildEvent {
    pub reason: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub object_kind: String,
    pub object_name: String,
    pub namespace: String,
}

/// Event subscription; each item is a batch delivered by one watch update
pub type EventStream = Pin<Box<dyn Stream<Item = Result<Vec<BuildEvent>>> + Send>>;

/// Read interface over the cluster's workload state
#[async_trait]
pub trait WorkloadApi: Send + Sync {
    /// Read a deployment or stateful set
    async fn read_replicas(
        &self,
        kind: WorkloadKind,
        name: &str,
        namespace: &str,
    ) -> Result<ReplicaSnapshot>;

    /// List pods matching a label selector (`k=v,k2=v2`)
    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<PodSnapshot>>;

    async fn read_cron_job(&self, name: &str, namespace: &str) -> Result<CronJobSnapshot>;

    /// List jobs owned by the named cron job
    async fn list_owned_jobs(&self, cron_job: &str, namespace: &str) -> Result<Vec<JobSnapshot>>;

    async fn read_serverless_service(&self, name: &str, namespace: &str)
        -> Result<ServiceSnapshot>;

    /// Labels of a build execution object
    async fn read_execution_labels(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<BTreeMap<String, String>>;

    /// Subscribe to namespace events matching a field selector
    async fn watch_events(&self, namespace: &str, field_selector: &str) -> Result<EventStream>;
}

/// Render a label map as a selector string
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Label Knative puts on every pod of a service
const SERVERLESS_SERVICE_LABEL: &str = "serving.knative.dev/service";

/// Computes container statuses from the workload API
///
/// Read failures are logged and reported as `None` (not observable this cycle).
pub struct WorkloadStatusDeriver {
    api: Arc<dyn WorkloadApi>,
}

impl WorkloadStatusDeriver {
    pub fn new(api: Arc<dyn WorkloadApi>) -> Self {
        Self { api }
    }

    /// Derive the status of a workload
    pub async fn derive(
        &self,
        kind: WorkloadKind,
        name: &str,
        namespace: &str,
    ) -> Option<ContainerStatus> {
        let result = match kind {
            WorkloadKind::Deployment | WorkloadKind::StatefulSet => {
                self.derive_replicated(kind, name, namespace).await
            }
            WorkloadKind::CronJob => self.derive_cron_job(name, namespace).await,
            WorkloadKind::ServerlessService => self.derive_serverless(name, namespace).await,
        };

        match result {
            Ok(status) => Some(status),
            Err(e) => {
                warn!(
                    kind = kind.as_str(),
                    name = %name,
                    namespace = %namespace,
                    error = %e,
                    "Failed to read workload status"
                );
                None
            }
        }
    }

    async fn derive_replicated(
        &self,
        kind: WorkloadKind,
        name: &str,
        namespace: &str,
    ) -> Result<ContainerStatus> {
        let replicas = self.api.read_replicas(kind, name, namespace).await?;
        let pods = if replicas.selector.is_empty() {
            Vec::new()
        } else {
            self.api
                .list_pods(namespace, &label_selector(&replicas.selector))
                .await?
        };

        Ok(ContainerStatus {
            state: derive_replica_status(&replicas, &pods),
            detail: StatusDetail::Replicas {
                desired_replicas: replicas.desired,
                ready_replicas: replicas.ready,
                updated_replicas: replicas.updated,
                available_replicas: replicas.available,
            },
        })
    }

    async fn derive_cron_job(&self, name: &str, namespace: &str) -> Result<ContainerStatus> {
        let cron = self.api.read_cron_job(name, namespace).await?;
        let jobs = self.api.list_owned_jobs(name, namespace).await?;

        Ok(ContainerStatus {
            state: derive_cron_status(&jobs),
            detail: StatusDetail::CronJob {
                last_schedule_time: cron.last_schedule_time,
                last_successful_time: cron.last_successful_time,
                active_jobs: cron.active,
            },
        })
    }

    async fn derive_serverless(&self, name: &str, namespace: &str) -> Result<ContainerStatus> {
        let service = self.api.read_serverless_service(name, namespace).await?;
        let pods = self
            .api
            .list_pods(namespace, &format!("{SERVERLESS_SERVICE_LABEL}={name}"))
            .await?;

        let (state, buckets) = derive_serverless_status(&service, &pods);
        Ok(ContainerStatus {
            state,
            detail: StatusDetail::Serverless {
                active_replicas: buckets.active,
                error_replicas: buckets.error,
                creating_replicas: buckets.creating,
                updating_replicas: buckets.updating,
                pending_replicas: buckets.pending,
            },
        })
    }
}
