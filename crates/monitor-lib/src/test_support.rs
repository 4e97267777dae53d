//! Hand-written fakes shared by unit tests

use crate::checker::Decryptor;
use crate::error::{DecryptError, PlatformError};
use crate::models::{
    Container, ContainerStatus, Environment, LogChange, Resource, ResourceInstance,
    ResourceStatus, ResourceUpdate, WorkloadKind,
};
use crate::platform::{Catalog, Page};
use crate::telemetry::{TelemetryDelta, TelemetryTransport};
use crate::workload::{
    BuildEvent, CronJobSnapshot, EventStream, JobSnapshot, PodSnapshot, ReplicaSnapshot,
    ServiceSnapshot, WorkloadApi,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub fn resource(id: &str, instance: ResourceInstance) -> Resource {
    Resource {
        id: id.to_string(),
        name: id.to_string(),
        instance,
        access: serde_json::Value::Null,
        status: ResourceStatus::Ok,
        available_replicas: None,
        unavailable_replicas: None,
        created_at: Utc.timestamp_opt(0, 0).unwrap(),
        updated_at: Utc.timestamp_opt(0, 0).unwrap(),
        logs: Vec::new(),
    }
}

pub fn container(id: &str, kind: WorkloadKind, status: Option<ContainerStatus>) -> Container {
    Container {
        id: id.to_string(),
        name: id.to_string(),
        kind,
        environment: Environment {
            id: "env".to_string(),
            namespace: "tenant".to_string(),
        },
        status,
    }
}

impl Resource {
    /// Apply a persisted update the way the catalog does
    pub fn apply(&mut self, update: &ResourceUpdate) {
        self.status = update.status;
        if update.available_replicas.is_some() {
            self.available_replicas = update.available_replicas;
        }
        if update.unavailable_replicas.is_some() {
            self.unavailable_replicas = update.unavailable_replicas;
        }
        self.updated_at = update.updated_at;

        match &update.log {
            LogChange::Prepend(entry) => self.logs.insert(0, entry.clone()),
            LogChange::ReplaceLatest(entry) => match self.logs.first_mut() {
                Some(latest) => *latest = entry.clone(),
                None => self.logs.push(entry.clone()),
            },
        }
    }
}

/// Reverses every string; optionally rejects one ciphertext
#[derive(Default)]
pub struct ReverseDecryptor {
    fail_on: Option<String>,
    pub calls: AtomicUsize,
}

impl ReverseDecryptor {
    pub fn failing_on(value: &str) -> Self {
        Self {
            fail_on: Some(value.to_string()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Decryptor for ReverseDecryptor {
    async fn decrypt(&self, value: &str) -> Result<String, DecryptError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on.as_deref() == Some(value) {
            return Err(DecryptError::Rejected(format!("cannot decrypt {value}")));
        }
        Ok(value.chars().rev().collect())
    }
}

/// Scripted workload API with call counters
#[derive(Default)]
pub struct FakeWorkloadApi {
    pub replicas: Mutex<HashMap<String, ReplicaSnapshot>>,
    pub pods: Mutex<Vec<PodSnapshot>>,
    pub cron_job: Mutex<Option<CronJobSnapshot>>,
    pub jobs: Mutex<Vec<JobSnapshot>>,
    pub service: Mutex<Option<ServiceSnapshot>>,
    pub labels: Mutex<HashMap<String, BTreeMap<String, String>>>,
    /// One script per `watch_events` call; an exhausted script list yields a silent stream
    pub streams: Mutex<VecDeque<Vec<Result<Vec<BuildEvent>>>>>,
    pub replica_reads: AtomicUsize,
    pub watch_calls: AtomicUsize,
}

impl FakeWorkloadApi {
    pub fn with_deployment(self, name: &str, snapshot: ReplicaSnapshot) -> Self {
        self.replicas
            .lock()
            .unwrap()
            .insert(name.to_string(), snapshot);
        self
    }

    pub fn with_labels(self, execution: &str, labels: &[(&str, &str)]) -> Self {
        self.labels.lock().unwrap().insert(
            execution.to_string(),
            labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        self
    }

    pub fn with_stream(self, script: Vec<Result<Vec<BuildEvent>>>) -> Self {
        self.streams.lock().unwrap().push_back(script);
        self
    }
}

#[async_trait]
impl WorkloadApi for FakeWorkloadApi {
    async fn read_replicas(
        &self,
        _kind: WorkloadKind,
        name: &str,
        _namespace: &str,
    ) -> Result<ReplicaSnapshot> {
        self.replica_reads.fetch_add(1, Ordering::SeqCst);
        self.replicas
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("deployments.apps \"{name}\" not found"))
    }

    async fn list_pods(&self, _namespace: &str, _selector: &str) -> Result<Vec<PodSnapshot>> {
        Ok(self.pods.lock().unwrap().clone())
    }

    async fn read_cron_job(&self, name: &str, _namespace: &str) -> Result<CronJobSnapshot> {
        self.cron_job
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow!("cronjobs.batch \"{name}\" not found"))
    }

    async fn list_owned_jobs(&self, _cron_job: &str, _namespace: &str) -> Result<Vec<JobSnapshot>> {
        Ok(self.jobs.lock().unwrap().clone())
    }

    async fn read_serverless_service(
        &self,
        name: &str,
        _namespace: &str,
    ) -> Result<ServiceSnapshot> {
        self.service
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow!("services.serving.knative.dev \"{name}\" not found"))
    }

    async fn read_execution_labels(
        &self,
        name: &str,
        _namespace: &str,
    ) -> Result<BTreeMap<String, String>> {
        self.labels
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("pipelineruns.tekton.dev \"{name}\" not found"))
    }

    async fn watch_events(&self, _namespace: &str, _field_selector: &str) -> Result<EventStream> {
        self.watch_calls.fetch_add(1, Ordering::SeqCst);
        match self.streams.lock().unwrap().pop_front() {
            Some(script) => Ok(Box::pin(tokio_stream::iter(script))),
            None => Ok(Box::pin(tokio_stream::pending())),
        }
    }
}

/// In-memory catalog recording every write
#[derive(Default)]
pub struct FakeCatalog {
    pub resources: Mutex<Vec<Resource>>,
    pub containers: Mutex<Vec<Container>>,
    pub resource_updates: Mutex<Vec<(String, ResourceUpdate)>>,
    pub container_updates: Mutex<Vec<(String, ContainerStatus)>>,
    pub page_reads: AtomicUsize,
    pub fail_pages: bool,
    /// Unreadable records reported on the first page
    pub skipped_on_first_page: usize,
}

impl FakeCatalog {
    pub fn with_resources(resources: Vec<Resource>) -> Self {
        Self {
            resources: Mutex::new(resources),
            ..Default::default()
        }
    }

    pub fn with_containers(containers: Vec<Container>) -> Self {
        Self {
            containers: Mutex::new(containers),
            ..Default::default()
        }
    }
}

impl FakeCatalog {
    fn page_of<T: Clone>(&self, items: &[T], page: u32, size: u32) -> Page<T> {
        let skipped = if page == 0 {
            self.skipped_on_first_page.min(size as usize)
        } else {
            0
        };
        let items = items
            .iter()
            .skip((page * size) as usize)
            .take(size as usize - skipped)
            .cloned()
            .collect();
        Page { items, skipped }
    }
}

#[async_trait]
impl Catalog for FakeCatalog {
    async fn resources_page(&self, page: u32, size: u32) -> Result<Page<Resource>> {
        self.page_reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_pages {
            return Err(anyhow!("catalog unavailable"));
        }
        Ok(self.page_of(&self.resources.lock().unwrap(), page, size))
    }

    async fn update_resource(&self, id: &str, update: &ResourceUpdate) -> Result<()> {
        self.resource_updates
            .lock()
            .unwrap()
            .push((id.to_string(), update.clone()));
        Ok(())
    }

    async fn containers_page(&self, page: u32, size: u32) -> Result<Page<Container>> {
        self.page_reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_pages {
            return Err(anyhow!("catalog unavailable"));
        }
        Ok(self.page_of(&self.containers.lock().unwrap(), page, size))
    }

    async fn update_container_status(&self, id: &str, status: &ContainerStatus) -> Result<()> {
        self.container_updates
            .lock()
            .unwrap()
            .push((id.to_string(), status.clone()));
        Ok(())
    }
}

/// Transport that records deliveries, or fails every one
#[derive(Default)]
pub struct RecordingTransport {
    fail: bool,
    attempts: AtomicUsize,
    delivered: Mutex<Vec<TelemetryDelta>>,
}

impl RecordingTransport {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn delivered(&self) -> Vec<TelemetryDelta> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl TelemetryTransport for RecordingTransport {
    async fn deliver(&self, delta: &TelemetryDelta) -> Result<(), PlatformError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PlatformError::Status {
                status: 502,
                body: "bad gateway".to_string(),
            });
        }
        self.delivered.lock().unwrap().push(delta.clone());
        Ok(())
    }
}
