//! Telemetry publication with a bounded queue
//!
//! This module provides non-blocking publication of state deltas:
//! - [`TelemetryPublisher`] enqueues with `try_send` and drops when the queue is full
//! - [`TelemetryWorker`] drains the queue and delivers each delta once
//! - [`HttpTransport`] posts deltas to the platform API
//!
//! Delivery failures are logged and counted, never retried.

use crate::error::PlatformError;
use crate::health::{components, HealthRegistry};
use crate::models::{BuildStatus, ContainerStatus, ResourceStatus};
use crate::observability::MonitorMetrics;
use crate::platform::PlatformClient;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// Configuration for telemetry publication
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Queue capacity; deltas beyond it are dropped
    pub queue_size: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { queue_size: 1000 }
    }
}

/// A state change reported upstream
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TelemetryDelta {
    #[serde(rename_all = "camelCase")]
    ResourceStatus {
        resource_id: String,
        status: ResourceStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        available_replicas: Option<i32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        unavailable_replicas: Option<i32>,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    ContainerStatus {
        container_id: String,
        status: ContainerStatus,
    },
    #[serde(rename_all = "camelCase")]
    BuildStatus {
        container_id: String,
        status: BuildStatus,
    },
}

impl TelemetryDelta {
    /// Label used in metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            TelemetryDelta::ResourceStatus { .. } => "resource-status",
            TelemetryDelta::ContainerStatus { .. } => "container-status",
            TelemetryDelta::BuildStatus { .. } => "build-status",
        }
    }

    fn path(&self) -> String {
        format!("v1/telemetry/{}", self.kind())
    }
}

/// Counters shared by the publisher and worker
#[derive(Debug, Default)]
pub struct TelemetryStats {
    pub published: AtomicU64,
    pub dropped: AtomicU64,
    pub delivered: AtomicU64,
    pub failures: AtomicU64,
}

/// Delivers one delta to its destination
#[async_trait]
pub trait TelemetryTransport: Send + Sync {
    async fn deliver(&self, delta: &TelemetryDelta) -> Result<(), PlatformError>;
}

/// Posts deltas to the platform telemetry endpoints
#[derive(Clone)]
pub struct HttpTransport {
    client: PlatformClient,
}

impl HttpTransport {
    pub fn new(client: PlatformClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TelemetryTransport for HttpTransport {
    async fn deliver(&self, delta: &TelemetryDelta) -> Result<(), PlatformError> {
        self.client.post_unit(&delta.path(), delta).await
    }
}

/// Cheap, cloneable handle for enqueueing deltas
#[derive(Clone)]
pub struct TelemetryPublisher {
    sender: mpsc::Sender<TelemetryDelta>,
    stats: Arc<TelemetryStats>,
    metrics: MonitorMetrics,
}

impl TelemetryPublisher {
    /// Create a publisher and the receiving end for its worker
    pub fn new(config: TelemetryConfig) -> (Self, mpsc::Receiver<TelemetryDelta>) {
        let (sender, receiver) = mpsc::channel(config.queue_size.max(1));
        let publisher = Self {
            sender,
            stats: Arc::new(TelemetryStats::default()),
            metrics: MonitorMetrics::new(),
        };
        (publisher, receiver)
    }

    /// Enqueue a delta without blocking; returns false when it was dropped
    pub fn publish(&self, delta: TelemetryDelta) -> bool {
        let kind = delta.kind();
        match self.sender.try_send(delta) {
            Ok(()) => {
                self.stats.published.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(kind = kind, "Telemetry queue full, dropping delta");
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                self.metrics.inc_telemetry_dropped(kind);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(kind = kind, "Telemetry worker stopped, dropping delta");
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                self.metrics.inc_telemetry_dropped(kind);
                false
            }
        }
    }

    pub fn stats(&self) -> Arc<TelemetryStats> {
        Arc::clone(&self.stats)
    }
}

/// Background delivery worker
pub struct TelemetryWorker {
    receiver: mpsc::Receiver<TelemetryDelta>,
    transport: Arc<dyn TelemetryTransport>,
    stats: Arc<TelemetryStats>,
    health: Option<HealthRegistry>,
    metrics: MonitorMetrics,
    last_delivery_failed: bool,
}

impl TelemetryWorker {
    pub fn new(
        receiver: mpsc::Receiver<TelemetryDelta>,
        transport: Arc<dyn TelemetryTransport>,
        stats: Arc<TelemetryStats>,
    ) -> Self {
        Self {
            receiver,
            transport,
            stats,
            health: None,
            metrics: MonitorMetrics::new(),
            last_delivery_failed: false,
        }
    }

    /// Report delivery health to the registry
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Drain the queue until shutdown or until every publisher is dropped
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!("Starting telemetry worker");

        loop {
            tokio::select! {
                delta = self.receiver.recv() => match delta {
                    Some(delta) => self.deliver(delta).await,
                    None => break,
                },
                _ = shutdown.recv() => {
                    info!("Telemetry worker received shutdown signal");
                    break;
                }
            }
        }

        info!(
            delivered = self.stats.delivered.load(Ordering::Relaxed),
            failures = self.stats.failures.load(Ordering::Relaxed),
            "Telemetry worker stopped"
        );
    }

    async fn deliver(&mut self, delta: TelemetryDelta) {
        match self.transport.deliver(&delta).await {
            Ok(()) => {
                debug!(kind = delta.kind(), "Telemetry delta delivered");
                self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                if self.last_delivery_failed {
                    self.last_delivery_failed = false;
                    if let Some(health) = &self.health {
                        health.set_healthy(components::TELEMETRY).await;
                    }
                }
            }
            Err(e) => {
                warn!(kind = delta.kind(), error = %e, "Failed to deliver telemetry delta");
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                self.metrics.inc_telemetry_failures(delta.kind());
                if !self.last_delivery_failed {
                    self.last_delivery_failed = true;
                    if let Some(health) = &self.health {
                        health
                            .set_degraded(components::TELEMETRY, format!("Delivery failing: {e}"))
                            .await;
                    }
                }
            }
        }
    }
}
