//! Container reconciliation cycle

use super::{CycleReport, Sweep};
use crate::health::components;
use crate::models::Container;
use crate::observability::StructuredLogger;
use crate::platform::Catalog;
use crate::telemetry::{TelemetryDelta, TelemetryPublisher};
use crate::workload::WorkloadStatusDeriver;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Derives the state of every container workload and persists changes
pub struct ContainerSweep {
    catalog: Arc<dyn Catalog>,
    deriver: WorkloadStatusDeriver,
    page_size: u32,
    publisher: TelemetryPublisher,
    logger: StructuredLogger,
}

impl ContainerSweep {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        deriver: WorkloadStatusDeriver,
        page_size: u32,
        publisher: TelemetryPublisher,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            catalog,
            deriver,
            page_size: page_size.max(1),
            publisher,
            logger,
        }
    }

    async fn reconcile(&self, container: &Container, report: &mut CycleReport) {
        report.checked += 1;

        let namespace = &container.environment.namespace;
        let Some(status) = self
            .deriver
            .derive(container.kind, &container.name, namespace)
            .await
        else {
            return;
        };

        if container.status.as_ref() == Some(&status) {
            debug!(container_id = %container.id, state = %status.state, "Container unchanged");
            return;
        }

        if let Err(e) = self
            .catalog
            .update_container_status(&container.id, &status)
            .await
        {
            warn!(container_id = %container.id, error = %format!("{e:#}"), "Failed to persist container status");
            report.errors += 1;
            return;
        }
        report.updated += 1;

        let previous = container.status.as_ref().map(|s| s.state);
        if previous != Some(status.state) {
            self.logger
                .log_container_transition(&container.id, namespace, previous, status.state);
        }

        self.publisher.publish(TelemetryDelta::ContainerStatus {
            container_id: container.id.clone(),
            status,
        });
    }
}

#[async_trait]
impl Sweep for ContainerSweep {
    fn name(&self) -> &'static str {
        components::CONTAINER_SWEEP
    }

    async fn run_cycle(&self) -> Result<CycleReport> {
        let mut report = CycleReport::default();
        let mut page = 0;

        loop {
            let containers = self
                .catalog
                .containers_page(page, self.page_size)
                .await
                .context("Container cycle aborted")?;

            report.skipped += containers.skipped;
            for container in &containers.items {
                self.reconcile(container, &mut report).await;
            }

            if containers.len() < self.page_size as usize {
                break;
            }
            page += 1;
        }

        Ok(report)
    }
}
