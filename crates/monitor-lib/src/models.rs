//! Core data models for the status monitor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a registered resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceStatus {
    #[serde(rename = "OK")]
    Ok,
    Error,
    Updating,
    Creating,
    Deleting,
    Restarting,
    Idle,
    Unknown,
}

impl ResourceStatus {
    /// Returns true for statuses that describe an operation still in flight
    pub fn is_transitional(&self) -> bool {
        matches!(
            self,
            ResourceStatus::Creating
                | ResourceStatus::Updating
                | ResourceStatus::Deleting
                | ResourceStatus::Restarting
        )
    }
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResourceStatus::Ok => "OK",
            ResourceStatus::Error => "Error",
            ResourceStatus::Updating => "Updating",
            ResourceStatus::Creating => "Creating",
            ResourceStatus::Deleting => "Deleting",
            ResourceStatus::Restarting => "Restarting",
            ResourceStatus::Idle => "Idle",
            ResourceStatus::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Backend type of a resource, carried on the wire as the `instance` tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceInstance {
    #[serde(rename = "PostgreSQL")]
    PostgreSql,
    #[serde(rename = "MySQL")]
    MySql,
    #[serde(rename = "SQL Server")]
    SqlServer,
    #[serde(rename = "MongoDB")]
    MongoDb,
    Redis,
    #[serde(rename = "RabbitMQ")]
    RabbitMq,
    Kafka,
    #[serde(rename = "NATS")]
    Nats,
    #[serde(rename = "AWS S3")]
    AwsS3,
    #[serde(rename = "GCP Cloud Storage")]
    GcpStorage,
    #[serde(rename = "Azure Blob Storage")]
    AzureBlob,
    #[serde(rename = "MinIO")]
    MinIo,
    #[serde(rename = "API Server")]
    ApiServer,
    Scheduler,
    Realtime,
    #[serde(other)]
    Unrecognized,
}

impl ResourceInstance {
    /// Cluster-wide singletons shared by every tenant record that references them
    pub fn is_singleton(&self) -> bool {
        matches!(self, ResourceInstance::Scheduler | ResourceInstance::Realtime)
    }

    /// Compute services carry replica counts on the resource record
    pub fn is_compute_service(&self) -> bool {
        matches!(self, ResourceInstance::ApiServer)
    }

    /// Label used for metrics and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceInstance::PostgreSql => "postgresql",
            ResourceInstance::MySql => "mysql",
            ResourceInstance::SqlServer => "sqlserver",
            ResourceInstance::MongoDb => "mongodb",
            ResourceInstance::Redis => "redis",
            ResourceInstance::RabbitMq => "rabbitmq",
            ResourceInstance::Kafka => "kafka",
            ResourceInstance::Nats => "nats",
            ResourceInstance::AwsS3 => "aws_s3",
            ResourceInstance::GcpStorage => "gcp_storage",
            ResourceInstance::AzureBlob => "azure_blob",
            ResourceInstance::MinIo => "minio",
            ResourceInstance::ApiServer => "api_server",
            ResourceInstance::Scheduler => "scheduler",
            ResourceInstance::Realtime => "realtime",
            ResourceInstance::Unrecognized => "unrecognized",
        }
    }
}

/// One entry in a resource's status log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub started_at: DateTime<Utc>,
    pub status: ResourceStatus,
    pub message: String,
}

impl LogEntry {
    pub fn new(status: ResourceStatus, message: impl Into<String>) -> Self {
        Self {
            started_at: Utc::now(),
            status,
            message: message.into(),
        }
    }
}

/// A registered external dependency tracked by the control plane
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub instance: ResourceInstance,
    /// Encrypted access settings; string leaves are ciphertext
    #[serde(default)]
    pub access: serde_json::Value,
    pub status: ResourceStatus,
    #[serde(default)]
    pub available_replicas: Option<i32>,
    #[serde(default)]
    pub unavailable_replicas: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Most recent first
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

/// How a new log entry lands in a resource's log list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "entry", rename_all = "camelCase")]
pub enum LogChange {
    Prepend(LogEntry),
    ReplaceLatest(LogEntry),
}

/// Changes written back to the catalog for a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUpdate {
    pub status: ResourceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_replicas: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unavailable_replicas: Option<i32>,
    pub updated_at: DateTime<Utc>,
    pub log: LogChange,
}

/// Metrics gathered by a successful or failed probe
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_replicas: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unavailable_replicas: Option<i32>,
}

/// Normalized result of checking one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckOutcome {
    pub status: ResourceStatus,
    pub metrics: Option<ProbeMetrics>,
    pub log_entries: Vec<LogEntry>,
}

impl CheckOutcome {
    pub fn ok(metrics: ProbeMetrics, message: impl Into<String>) -> Self {
        Self {
            status: ResourceStatus::Ok,
            metrics: Some(metrics),
            log_entries: vec![LogEntry::new(ResourceStatus::Ok, message)],
        }
    }

    pub fn error(metrics: Option<ProbeMetrics>, message: impl Into<String>) -> Self {
        Self {
            status: ResourceStatus::Error,
            metrics,
            log_entries: vec![LogEntry::new(ResourceStatus::Error, message)],
        }
    }

    /// The entry that lands in the resource log when this outcome is persisted
    pub fn latest_entry(&self) -> LogEntry {
        self.log_entries
            .first()
            .cloned()
            .unwrap_or_else(|| LogEntry::new(self.status, String::new()))
    }

    /// Replica counts reported by a compute probe, if any
    pub fn replicas(&self) -> (Option<i32>, Option<i32>) {
        match &self.metrics {
            Some(m) => (m.available_replicas, m.unavailable_replicas),
            None => (None, None),
        }
    }
}

/// Kind of user workload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
    CronJob,
    ServerlessService,
}

impl WorkloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Deployment => "deployment",
            WorkloadKind::StatefulSet => "stateful-set",
            WorkloadKind::CronJob => "cron-job",
            WorkloadKind::ServerlessService => "serverless-service",
        }
    }
}

/// Environment that owns a container; embedded in catalog pages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    /// Kubernetes namespace the environment deploys into
    #[serde(alias = "iid")]
    pub namespace: String,
}

/// A user-deployed workload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    /// Kubernetes object name
    #[serde(alias = "iid")]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: WorkloadKind,
    pub environment: Environment,
    #[serde(default)]
    pub status: Option<ContainerStatus>,
}

/// Composite lifecycle state of a workload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerState {
    Creating,
    Updating,
    Running,
    Warning,
    Error,
    Scheduled,
    Successful,
    Failed,
    Unknown,
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Status snapshot persisted on a container record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStatus {
    pub state: ContainerState,
    pub detail: StatusDetail,
}

/// Kind-specific counts behind a composite state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StatusDetail {
    #[serde(rename_all = "camelCase")]
    Replicas {
        desired_replicas: i32,
        ready_replicas: i32,
        updated_replicas: i32,
        available_replicas: i32,
    },
    #[serde(rename_all = "camelCase")]
    CronJob {
        last_schedule_time: Option<DateTime<Utc>>,
        last_successful_time: Option<DateTime<Utc>>,
        active_jobs: i32,
    },
    #[serde(rename_all = "camelCase")]
    Serverless {
        active_replicas: i32,
        error_replicas: i32,
        creating_replicas: i32,
        updating_replicas: i32,
        pending_replicas: i32,
    },
}

/// Normalized build pipeline status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildStatus {
    Started,
    Running,
    Succeeded,
    Failed,
    Error,
    Cancelled,
    Timeout,
    ImagePullFailed,
}

impl BuildStatus {
    /// Map a cluster event reason; reasons outside the tracked set return `None`
    pub fn from_reason(reason: &str) -> Option<Self> {
        match reason {
            "Started" => Some(BuildStatus::Started),
            "Running" => Some(BuildStatus::Running),
            "Succeeded" => Some(BuildStatus::Succeeded),
            "Failed" => Some(BuildStatus::Failed),
            "Error" => Some(BuildStatus::Error),
            "Cancelled" => Some(BuildStatus::Cancelled),
            "Timeout" => Some(BuildStatus::Timeout),
            "ImagePullFailed" => Some(BuildStatus::ImagePullFailed),
            _ => None,
        }
    }
}
