//! Build event watcher
//!
//! Follows cluster events about build executions and publishes the build
//! status of the owning container. The subscription is reopened after a
//! fixed delay whenever the stream fails or ends.
//!
//! ```text
//! Idle --start()--> Watching --event--> Dispatching --> Watching
//!                      |  ^
//!        error or end  v  |  delay
//!                   Reconnecting
//! ```
//!
//! `stop()` returns to Idle from any state.
//!
//! A reopened subscription lists events it already delivered. [`ReplayFilter`]
//! keeps the last dispatched timestamp and reasons per execution so those are
//! not published twice.


use crate::health::{components, HealthRegistry};
use crate::models::BuildStatus;
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::telemetry::{TelemetryDelta, TelemetryPublisher};
use crate::workload::{BuildEvent, WorkloadApi};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Observable watcher state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Idle,
    Watching,
    Dispatching,
    Reconnecting,
}

/// When and how often to reopen a failed subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub delay: Duration,
    /// Consecutive failures tolerated; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
            max_attempts: None,
        }
    }
}

/// Configuration for the build event watcher
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Namespace whose events are watched
    pub namespace: String,
    /// Field selector applied to the event subscription
    pub field_selector: String,
    /// Label on the execution object holding the container id
    pub container_label: String,
    pub reconnect: ReconnectPolicy,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            field_selector: "involvedObject.kind=PipelineRun".to_string(),
            container_label: "containerId".to_string(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Build status carried by `event`, if it is a tracked reason observed after `started_at`
///
/// Events without a timestamp cannot be told apart from replays and are dropped.
pub fn qualifying_status(event: &BuildEvent, started_at: DateTime<Utc>) -> Option<BuildStatus> {
    let status = BuildStatus::from_reason(&event.reason)?;
    match event.timestamp {
        Some(ts) if ts >= started_at => Some(status),
        _ => None,
    }
}

/// High-water mark per build execution, kept across reconnects of one watch
#[derive(Debug)]
pub struct ReplayFilter {
    floor: DateTime<Utc>,
    retention: chrono::Duration,
    /// `namespace/execution` -> latest dispatched timestamp and the reasons seen at it
    seen: HashMap<String, (DateTime<Utc>, HashSet<String>)>,
}

impl ReplayFilter {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            floor: started_at,
            retention: chrono::Duration::hours(1),
            seen: HashMap::new(),
        }
    }

    /// Status to dispatch for `event`, or `None` when it is untracked, stale or already dispatched
    pub fn admit(&mut self, event: &BuildEvent) -> Option<BuildStatus> {
        let status = qualifying_status(event, self.floor)?;
        let timestamp = event.timestamp?;
        let key = format!("{}/{}", event.namespace, event.object_name);

        match self.seen.get_mut(&key) {
            Some((last, reasons)) => {
                if timestamp < *last {
                    return None;
                }
                if timestamp > *last {
                    *last = timestamp;
                    reasons.clear();
                }
                if !reasons.insert(event.reason.clone()) {
                    return None;
                }
            }
            None => {
                self.seen
                    .insert(key, (timestamp, HashSet::from([event.reason.clone()])));
            }
        }

        Some(status)
    }

    /// Forget executions quiet for longer than the retention window
    ///
    /// The floor rises with it, so a forgotten execution cannot replay either.
    pub fn prune(&mut self, now: DateTime<Utc>) {
        let floor = now - self.retention;
        if floor > self.floor {
            self.floor = floor;
            self.seen.retain(|_, (last, _)| *last >= floor);
        }
    }

    pub fn tracked(&self) -> usize {
        self.seen.len()
    }
}

/// Owned handle to the watch task
pub struct BuildEventWatcher {
    api: Arc<dyn WorkloadApi>,
    config: WatcherConfig,
    publisher: TelemetryPublisher,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
    state: Arc<watch::Sender<WatcherState>>,
    cancel: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

impl BuildEventWatcher {
    pub fn new(
        api: Arc<dyn WorkloadApi>,
        config: WatcherConfig,
        publisher: TelemetryPublisher,
        logger: StructuredLogger,
    ) -> Self {
        let (state, _) = watch::channel(WatcherState::Idle);
        Self {
            api,
            config,
            publisher,
            logger,
            health: None,
            state: Arc::new(state),
            cancel: None,
            handle: None,
        }
    }

    /// Report subscription health to the registry
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn state(&self) -> WatcherState {
        *self.state.borrow()
    }

    /// Follow state changes
    pub fn subscribe(&self) -> watch::Receiver<WatcherState> {
        self.state.subscribe()
    }

    /// True while the watch task is alive
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Start watching; returns false when already watching
    ///
    /// Only events stamped at or after this call are dispatched.
    pub fn start(&mut self) -> bool {
        if self.is_running() {
            debug!("Build event watcher already running");
            return false;
        }

        let cancel = CancellationToken::new();
        let task = WatchTask {
            api: Arc::clone(&self.api),
            config: self.config.clone(),
            publisher: self.publisher.clone(),
            logger: self.logger.clone(),
            health: self.health.clone(),
            state: Arc::clone(&self.state),
            cancel: cancel.clone(),
            replay: ReplayFilter::new(Utc::now()),
            consecutive_failures: 0,
            metrics: MonitorMetrics::new(),
        };

        info!(
            namespace = %self.config.namespace,
            field_selector = %self.config.field_selector,
            "Starting build event watcher"
        );
        self.state.send_replace(WatcherState::Watching);
        self.handle = Some(tokio::spawn(task.run()));
        self.cancel = Some(cancel);
        true
    }

    /// Cancel the subscription and wait for the task; a later `start()` works again
    pub async fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Build event watcher task failed");
            }
        }
        self.state.send_replace(WatcherState::Idle);
        info!("Build event watcher stopped");
    }
}

struct WatchTask {
    api: Arc<dyn WorkloadApi>,
    config: WatcherConfig,
    publisher: TelemetryPublisher,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
    state: Arc<watch::Sender<WatcherState>>,
    cancel: CancellationToken,
    replay: ReplayFilter,
    consecutive_failures: u32,
    metrics: MonitorMetrics,
}

impl WatchTask {
    async fn run(mut self) {
        let cancel = self.cancel.clone();

        loop {
            self.set_state(WatcherState::Watching);
            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.watch_once() => result,
            };

            match result {
                Ok(()) => info!("Build event stream ended"),
                Err(e) => warn!(error = %format!("{e:#}"), "Build event stream failed"),
            }

            self.consecutive_failures += 1;
            if let Some(max) = self.config.reconnect.max_attempts {
                if self.consecutive_failures > max {
                    error!(
                        attempts = self.consecutive_failures,
                        "Build event watcher giving up after repeated failures"
                    );
                    if let Some(health) = &self.health {
                        health
                            .set_unhealthy(components::BUILD_WATCHER, "Reconnect attempts exhausted")
                            .await;
                    }
                    break;
                }
            }

            self.set_state(WatcherState::Reconnecting);
            self.metrics.inc_watcher_reconnects();
            if let Some(health) = &self.health {
                health
                    .set_degraded(components::BUILD_WATCHER, "Reconnecting to event stream")
                    .await;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.reconnect.delay) => {}
            }
        }

        self.set_state(WatcherState::Idle);
    }

    async fn watch_once(&mut self) -> Result<()> {
        self.replay.prune(Utc::now());
        let mut stream = self
            .api
            .watch_events(&self.config.namespace, &self.config.field_selector)
            .await
            .context("Failed to open build event stream")?;

        while let Some(batch) = stream.next().await {
            let mut events = batch?;
            if self.consecutive_failures > 0 {
                self.consecutive_failures = 0;
                if let Some(health) = &self.health {
                    health.set_healthy(components::BUILD_WATCHER).await;
                }
            }

            events.sort_by_key(|event| event.timestamp);
            for event in events {
                if let Some(status) = self.replay.admit(&event) {
                    self.set_state(WatcherState::Dispatching);
                    self.dispatch(&event, status).await;
                    self.set_state(WatcherState::Watching);
                }
            }
        }

        Ok(())
    }

    /// Resolve the container behind an execution and publish its build status
    async fn dispatch(&self, event: &BuildEvent, status: BuildStatus) {
        let namespace = if event.namespace.is_empty() {
            &self.config.namespace
        } else {
            &event.namespace
        };

        let labels = match self
            .api
            .read_execution_labels(&event.object_name, namespace)
            .await
        {
            Ok(labels) => labels,
            Err(e) => {
                warn!(
                    execution = %event.object_name,
                    error = %format!("{e:#}"),
                    "Failed to resolve build execution"
                );
                return;
            }
        };

        let Some(container_id) = labels.get(&self.config.container_label) else {
            warn!(
                execution = %event.object_name,
                label = %self.config.container_label,
                "Build execution has no container label"
            );
            return;
        };

        self.logger
            .log_build_status(container_id, &event.object_name, status);
        self.metrics.inc_build_events_dispatched(status);
        self.publisher.publish(TelemetryDelta::BuildStatus {
            container_id: container_id.clone(),
            status,
        });
    }

    fn set_state(&self, state: WatcherState) {
        self.state.send_replace(state);
    }
}
