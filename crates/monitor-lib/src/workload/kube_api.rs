//! [`WorkloadApi`] backed by the Kubernetes API server

use super::{
    BuildEvent, Condition, ContainerReadiness, CronJobSnapshot, EventStream, JobSnapshot,
    PodPhase, PodSnapshot, ReplicaSnapshot, ServiceSnapshot, WorkloadApi,
};
use crate::models::WorkloadKind;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{Event as CoreEvent, Pod};
use kube::api::{Api, ApiResource, DynamicObject, GroupVersionKind, ListParams};
use kube::runtime::watcher;
use kube::Client;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio_stream::StreamExt;

/// Kubernetes-backed workload reads
#[derive(Clone)]
pub struct KubeWorkloadApi {
    client: Client,
    serverless: ApiResource,
    execution: ApiResource,
}

impl KubeWorkloadApi {
    /// Create with Knative services and Tekton pipeline runs
    pub fn new(client: Client) -> Self {
        Self::with_execution_kind(client, GroupVersionKind::gvk("tekton.dev", "v1", "PipelineRun"))
    }

    /// Create with a custom build execution object kind
    pub fn with_execution_kind(client: Client, execution: GroupVersionKind) -> Self {
        Self {
            client,
            serverless: ApiResource::from_gvk(&GroupVersionKind::gvk(
                "serving.knative.dev",
                "v1",
                "Service",
            )),
            execution: ApiResource::from_gvk(&execution),
        }
    }

    async fn read_deployment(&self, name: &str, namespace: &str) -> Result<ReplicaSnapshot> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let deployment = api
            .get(name)
            .await
            .with_context(|| format!("Failed to read deployment {namespace}/{name}"))?;

        let spec = deployment.spec.unwrap_or_default();
        let status = deployment.status.unwrap_or_default();
        Ok(ReplicaSnapshot {
            desired: spec.replicas.unwrap_or(1),
            ready: status.ready_replicas.unwrap_or(0),
            updated: status.updated_replicas.unwrap_or(0),
            available: status.available_replicas.unwrap_or(0),
            unavailable: status.unavailable_replicas.unwrap_or(0),
            selector: spec.selector.match_labels.unwrap_or_default(),
        })
    }

    async fn read_stateful_set(&self, name: &str, namespace: &str) -> Result<ReplicaSnapshot> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
        let set = api
            .get(name)
            .await
            .with_context(|| format!("Failed to read stateful set {namespace}/{name}"))?;

        let spec = set.spec.unwrap_or_default();
        let status = set.status.unwrap_or_default();
        let desired = spec.replicas.unwrap_or(1);
        let available = status.available_replicas.unwrap_or(0);
        Ok(ReplicaSnapshot {
            desired,
            ready: status.ready_replicas.unwrap_or(0),
            updated: status.updated_replicas.unwrap_or(0),
            available,
            unavailable: (desired - available).max(0),
            selector: spec.selector.match_labels.unwrap_or_default(),
        })
    }
}

#[async_trait]
impl WorkloadApi for KubeWorkloadApi {
    async fn read_replicas(
        &self,
        kind: WorkloadKind,
        name: &str,
        namespace: &str,
    ) -> Result<ReplicaSnapshot> {
        match kind {
            WorkloadKind::Deployment => self.read_deployment(name, namespace).await,
            WorkloadKind::StatefulSet => self.read_stateful_set(name, namespace).await,
            other => bail!("{} has no replica status", other.as_str()),
        }
    }

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<PodSnapshot>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pods = api
            .list(&ListParams::default().labels(selector))
            .await
            .with_context(|| format!("Failed to list pods in {namespace} matching {selector}"))?;

        Ok(pods.items.into_iter().map(pod_snapshot).collect())
    }

    async fn read_cron_job(&self, name: &str, namespace: &str) -> Result<CronJobSnapshot> {
        let api: Api<CronJob> = Api::namespaced(self.client.clone(), namespace);
        let cron = api
            .get(name)
            .await
            .with_context(|| format!("Failed to read cron job {namespace}/{name}"))?;

        let status = cron.status.unwrap_or_default();
        Ok(CronJobSnapshot {
            last_schedule_time: status.last_schedule_time.map(|t| t.0),
            last_successful_time: status.last_successful_time.map(|t| t.0),
            active: status.active.map(|a| a.len() as i32).unwrap_or(0),
        })
    }

    async fn list_owned_jobs(&self, cron_job: &str, namespace: &str) -> Result<Vec<JobSnapshot>> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        let jobs = api
            .list(&ListParams::default())
            .await
            .with_context(|| format!("Failed to list jobs in {namespace}"))?;

        Ok(jobs
            .items
            .into_iter()
            .filter(|job| {
                job.metadata
                    .owner_references
                    .as_ref()
                    .map(|owners| {
                        owners
                            .iter()
                            .any(|o| o.kind == "CronJob" && o.name == cron_job)
                    })
                    .unwrap_or(false)
            })
            .map(|job| {
                let status = job.status.unwrap_or_default();
                JobSnapshot {
                    name: job.metadata.name.unwrap_or_default(),
                    start_time: status.start_time.map(|t| t.0),
                    active: status.active.unwrap_or(0),
                    succeeded: status.succeeded.unwrap_or(0),
                    failed: status.failed.unwrap_or(0),
                }
            })
            .collect())
    }

    async fn read_serverless_service(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<ServiceSnapshot> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &self.serverless);
        let service = api
            .get(name)
            .await
            .with_context(|| format!("Failed to read serverless service {namespace}/{name}"))?;

        Ok(service_snapshot(&service.data))
    }

    async fn read_execution_labels(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<BTreeMap<String, String>> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &self.execution);
        let execution = api.get(name).await.with_context(|| {
            format!("Failed to read {} {namespace}/{name}", self.execution.kind)
        })?;

        Ok(execution.metadata.labels.unwrap_or_default())
    }

    async fn watch_events(&self, namespace: &str, field_selector: &str) -> Result<EventStream> {
        let api: Api<CoreEvent> = Api::namespaced(self.client.clone(), namespace);
        let config = watcher::Config::default().fields(field_selector);

        let stream = watcher(api, config).map(|item| match item {
            Ok(watcher::Event::Applied(event)) => Ok(build_event(event).into_iter().collect()),
            Ok(watcher::Event::Restarted(events)) => {
                Ok(events.into_iter().filter_map(build_event).collect())
            }
            Ok(watcher::Event::Deleted(_)) => Ok(Vec::new()),
            Err(e) => Err(anyhow::Error::new(e).context("Event watch failed")),
        });

        Ok(Box::pin(stream))
    }
}

fn pod_snapshot(pod: Pod) -> PodSnapshot {
    let status = pod.status.unwrap_or_default();
    let containers = status
        .container_statuses
        .unwrap_or_default()
        .into_iter()
        .map(|c| ContainerReadiness {
            ready: c.ready,
            terminated_exit_code: c
                .state
                .and_then(|s| s.terminated)
                .map(|t| t.exit_code),
        })
        .collect();

    PodSnapshot {
        name: pod.metadata.name.unwrap_or_default(),
        phase: PodPhase::parse(status.phase.as_deref()),
        containers,
    }
}

fn service_snapshot(data: &Value) -> ServiceSnapshot {
    let status = &data["status"];
    let conditions = status["conditions"]
        .as_array()
        .map(|conditions| {
            conditions
                .iter()
                .filter_map(|c| {
                    let kind = c["type"].as_str()?.to_string();
                    let status = match c["status"].as_str() {
                        Some("True") => Some(true),
                        Some("False") => Some(false),
                        _ => None,
                    };
                    Some(Condition { kind, status })
                })
                .collect()
        })
        .unwrap_or_default();

    ServiceSnapshot {
        conditions,
        latest_created_revision: status["latestCreatedRevisionName"]
            .as_str()
            .map(str::to_string),
        latest_ready_revision: status["latestReadyRevisionName"]
            .as_str()
            .map(str::to_string),
    }
}

fn build_event(event: CoreEvent) -> Option<BuildEvent> {
    let timestamp = event
        .last_timestamp
        .map(|t| t.0)
        .or_else(|| event.event_time.map(|t| t.0))
        .or_else(|| event.first_timestamp.map(|t| t.0))
        .or_else(|| event.metadata.creation_timestamp.map(|t| t.0));

    let object = event.involved_object;
    Some(BuildEvent {
        reason: event.reason?,
        timestamp,
        object_kind: object.kind.unwrap_or_default(),
        object_name: object.name?,
        namespace: object
            .namespace
            .or(event.metadata.namespace)
            .unwrap_or_default(),
    })
}
