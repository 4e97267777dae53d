//! Resource reconciliation cycle

use super::{CycleReport, Sweep};
use crate::checker::{ResourceChecker, StatusCache};
use crate::health::components;
use crate::models::Resource;
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::platform::Catalog;
use crate::policy::{build_update, decide, Decision, PolicyConfig};
use crate::telemetry::{TelemetryDelta, TelemetryPublisher};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

/// Checks every resource in the catalog, page by page and one at a time
pub struct ResourceSweep {
    catalog: Arc<dyn Catalog>,
    checker: ResourceChecker,
    policy: PolicyConfig,
    page_size: u32,
    publisher: TelemetryPublisher,
    logger: StructuredLogger,
    metrics: MonitorMetrics,
}

impl ResourceSweep {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        checker: ResourceChecker,
        policy: PolicyConfig,
        page_size: u32,
        publisher: TelemetryPublisher,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            catalog,
            checker,
            policy,
            page_size: page_size.max(1),
            publisher,
            logger,
            metrics: MonitorMetrics::new(),
        }
    }

    async fn reconcile(&self, resource: &Resource, cache: &mut StatusCache, report: &mut CycleReport) {
        report.checked += 1;

        let outcome = self.checker.check(resource, cache).await;
        let now = Utc::now();
        let decision = decide(resource, outcome.as_ref(), now, &self.policy);
        self.metrics.inc_policy_decision(decision.as_str());

        let Some(outcome) = outcome else {
            return;
        };
        let Some(update) = build_update(resource, &outcome, decision, now) else {
            debug!(resource_id = %resource.id, status = %outcome.status, "No change to record");
            return;
        };

        if let Err(e) = self.catalog.update_resource(&resource.id, &update).await {
            warn!(resource_id = %resource.id, error = %format!("{e:#}"), "Failed to persist resource update");
            report.errors += 1;
            return;
        }
        report.updated += 1;

        let entry = outcome.latest_entry();
        if decision == Decision::UpdateStatus {
            self.logger.log_resource_transition(
                &resource.id,
                resource.instance.as_str(),
                resource.status,
                update.status,
                &entry.message,
            );
        }

        self.publisher.publish(TelemetryDelta::ResourceStatus {
            resource_id: resource.id.clone(),
            status: update.status,
            available_replicas: update.available_replicas,
            unavailable_replicas: update.unavailable_replicas,
            message: entry.message,
        });
    }
}

#[async_trait]
impl Sweep for ResourceSweep {
    fn name(&self) -> &'static str {
        components::RESOURCE_SWEEP
    }

    async fn run_cycle(&self) -> Result<CycleReport> {
        let mut cache = StatusCache::new();
        let mut report = CycleReport::default();
        let mut page = 0;

        loop {
            let resources = self
                .catalog
                .resources_page(page, self.page_size)
                .await
                .context("Resource cycle aborted")?;

            report.skipped += resources.skipped;
            for resource in &resources.items {
                self.reconcile(resource, &mut cache, &mut report).await;
            }

            if resources.len() < self.page_size as usize {
                break;
            }
            page += 1;
        }

        Ok(report)
    }
}
