//! Observability infrastructure for the status monitor
//!
//! Provides:
//! - Prometheus metrics (cycle latency, skipped cycles, probe failures, decisions, telemetry)
//! - Structured JSON logging with tracing

use crate::models::{BuildStatus, ContainerState, ResourceStatus};
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge_vec,
    HistogramVec, IntCounter, IntCounterVec, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for reconciliation cycles (in seconds)
const CYCLE_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<MonitorMetricsInner> = OnceLock::new();

struct MonitorMetricsInner {
    cycle_latency_seconds: HistogramVec,
    cycles_skipped: IntCounterVec,
    entities_checked: IntGaugeVec,
    probe_failures: IntCounterVec,
    policy_decisions: IntCounterVec,
    telemetry_failures: IntCounterVec,
    telemetry_dropped: IntCounterVec,
    watcher_reconnects: IntCounter,
    build_events_dispatched: IntCounterVec,
}

impl MonitorMetricsInner {
    fn new() -> Self {
        Self {
            cycle_latency_seconds: register_histogram_vec!(
                "status_monitor_cycle_latency_seconds",
                "Duration of one reconciliation cycle",
                &["sweep"],
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_latency_seconds"),

            cycles_skipped: register_int_counter_vec!(
                "status_monitor_cycles_skipped_total",
                "Ticks skipped because the previous cycle was still running",
                &["sweep"]
            )
            .expect("Failed to register cycles_skipped"),

            entities_checked: register_int_gauge_vec!(
                "status_monitor_entities_checked",
                "Entities visited by the last completed cycle",
                &["sweep"]
            )
            .expect("Failed to register entities_checked"),

            probe_failures: register_int_counter_vec!(
                "status_monitor_probe_failures_total",
                "Backend probes that produced an Error outcome",
                &["instance"]
            )
            .expect("Failed to register probe_failures"),

            policy_decisions: register_int_counter_vec!(
                "status_monitor_policy_decisions_total",
                "Transition policy decisions",
                &["decision"]
            )
            .expect("Failed to register policy_decisions"),

            telemetry_failures: register_int_counter_vec!(
                "status_monitor_telemetry_failures_total",
                "Telemetry deltas whose delivery failed",
                &["kind"]
            )
            .expect("Failed to register telemetry_failures"),

            telemetry_dropped: register_int_counter_vec!(
                "status_monitor_telemetry_dropped_total",
                "Telemetry deltas dropped because the queue was full",
                &["kind"]
            )
            .expect("Failed to register telemetry_dropped"),

            watcher_reconnects: register_int_counter!(
                "status_monitor_watcher_reconnects_total",
                "Build event stream reconnect attempts"
            )
            .expect("Failed to register watcher_reconnects"),

            build_events_dispatched: register_int_counter_vec!(
                "status_monitor_build_events_dispatched_total",
                "Build status changes published",
                &["status"]
            )
            .expect("Failed to register build_events_dispatched"),
        }
    }
}

/// Monitor metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the same metrics.
#[derive(Clone)]
pub struct MonitorMetrics {
    _private: (),
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &MonitorMetricsInner {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new)
    }

    pub fn observe_cycle_latency(&self, sweep: &str, duration_secs: f64) {
        self.inner()
            .cycle_latency_seconds
            .with_label_values(&[sweep])
            .observe(duration_secs);
    }

    pub fn inc_cycles_skipped(&self, sweep: &str) {
        self.inner().cycles_skipped.with_label_values(&[sweep]).inc();
    }

    pub fn set_entities_checked(&self, sweep: &str, count: i64) {
        self.inner()
            .entities_checked
            .with_label_values(&[sweep])
            .set(count);
    }

    pub fn inc_probe_failures(&self, instance: &str) {
        self.inner()
            .probe_failures
            .with_label_values(&[instance])
            .inc();
    }

    pub fn inc_policy_decision(&self, decision: &str) {
        self.inner()
            .policy_decisions
            .with_label_values(&[decision])
            .inc();
    }

    pub fn inc_telemetry_failures(&self, kind: &str) {
        self.inner()
            .telemetry_failures
            .with_label_values(&[kind])
            .inc();
    }

    pub fn inc_telemetry_dropped(&self, kind: &str) {
        self.inner()
            .telemetry_dropped
            .with_label_values(&[kind])
            .inc();
    }

    pub fn inc_watcher_reconnects(&self) {
        self.inner().watcher_reconnects.inc();
    }

    pub fn inc_build_events_dispatched(&self, status: BuildStatus) {
        self.inner()
            .build_events_dispatched
            .with_label_values(&[&format!("{status:?}")])
            .inc();
    }
}

/// Structured logger for monitor events
///
/// Emits one record per significant state change with a stable `event` field.
#[derive(Clone)]
pub struct StructuredLogger {
    namespace: String,
}

impl StructuredLogger {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Log a persisted resource status change
    pub fn log_resource_transition(
        &self,
        resource_id: &str,
        instance: &str,
        from: ResourceStatus,
        to: ResourceStatus,
        message: &str,
    ) {
        if to == ResourceStatus::Error {
            warn!(
                event = "resource_transition",
                namespace = %self.namespace,
                resource_id = %resource_id,
                instance = %instance,
                from = %from,
                to = %to,
                message = %message,
                "Resource entered error state"
            );
        } else {
            info!(
                event = "resource_transition",
                namespace = %self.namespace,
                resource_id = %resource_id,
                instance = %instance,
                from = %from,
                to = %to,
                message = %message,
                "Resource status changed"
            );
        }
    }

    /// Log a persisted container status change
    pub fn log_container_transition(
        &self,
        container_id: &str,
        workload_namespace: &str,
        from: Option<ContainerState>,
        to: ContainerState,
    ) {
        info!(
            event = "container_transition",
            namespace = %self.namespace,
            container_id = %container_id,
            workload_namespace = %workload_namespace,
            from = ?from,
            to = %to,
            "Container status changed"
        );
    }

    /// Log a published build status
    pub fn log_build_status(&self, container_id: &str, execution: &str, status: BuildStatus) {
        info!(
            event = "build_status",
            namespace = %self.namespace,
            container_id = %container_id,
            execution = %execution,
            status = ?status,
            "Build status observed"
        );
    }

    /// Log monitor startup
    pub fn log_startup(&self, version: &str, platform_url: &str) {
        info!(
            event = "monitor_started",
            namespace = %self.namespace,
            monitor_version = %version,
            platform_url = %platform_url,
            "Status monitor started"
        );
    }

    /// Log monitor shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "monitor_shutdown",
            namespace = %self.namespace,
            reason = %reason,
            "Status monitor shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_metrics_handles_share_registry() {
        let metrics = MonitorMetrics::new();
        metrics.observe_cycle_latency("resource", 0.4);
        metrics.inc_cycles_skipped("resource");
        metrics.inc_probe_failures("redis");
        metrics.inc_policy_decision("update_status");
        metrics.set_entities_checked("container", 12);
        metrics.inc_build_events_dispatched(BuildStatus::Succeeded);

        let other = MonitorMetrics::new();
        other.inc_cycles_skipped("resource");

        let families = prometheus::gather();
        let skipped = families
            .iter()
            .find(|f| f.get_name() == "status_monitor_cycles_skipped_total")
            .unwrap();
        let value = skipped
            .get_metric()
            .iter()
            .find(|m| m.get_label().iter().any(|l| l.get_value() == "resource"))
            .map(|m| m.get_counter().get_value())
            .unwrap();
        assert!(value >= 2.0);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("platform");
        assert_eq!(logger.namespace, "platform");
        logger.log_resource_transition(
            "r1",
            "redis",
            ResourceStatus::Ok,
            ResourceStatus::Error,
            "connection refused",
        );
    }
}
