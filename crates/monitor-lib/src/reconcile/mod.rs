//! Periodic reconciliation
//!
//! This module provides:
//! - [`SweepLoop`], a timer that runs one cycle at a time and skips overrun ticks
//! - [`ResourceSweep`], which checks every catalog resource and applies the transition policy
//! - [`ContainerSweep`], which derives and persists container workload states

mod container;
mod resource;


pub use container::ContainerSweep;
pub use resource::ResourceSweep;

use crate::health::HealthRegistry;
use crate::observability::MonitorMetrics;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Totals for one completed cycle
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Entities visited
    pub checked: usize,
    /// Entities whose catalog record was written
    pub updated: usize,
    /// Catalog writes that failed
    pub errors: usize,
    /// Catalog records that could not be decoded
    pub skipped: usize,
}

/// One reconciliation pass over a catalog
#[async_trait]
pub trait Sweep: Send + Sync + 'static {
    /// Health component and metrics label for this sweep
    fn name(&self) -> &'static str;

    async fn run_cycle(&self) -> Result<CycleReport>;
}

/// Single-flight guard; at most one [`InFlight`] exists at a time
#[derive(Debug, Clone, Default)]
pub struct CycleGuard {
    running: Arc<AtomicBool>,
}

impl CycleGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the guard, or `None` when a cycle is already running
    pub fn try_acquire(&self) -> Option<InFlight> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight {
                running: Arc::clone(&self.running),
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Releases the guard when dropped
#[derive(Debug)]
pub struct InFlight {
    running: Arc<AtomicBool>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Timer driving one [`Sweep`]
pub struct SweepLoop {
    sweep: Arc<dyn Sweep>,
    period: Duration,
    guard: CycleGuard,
    health: Option<HealthRegistry>,
    metrics: MonitorMetrics,
}

impl SweepLoop {
    pub fn new(sweep: Arc<dyn Sweep>, period: Duration) -> Self {
        Self {
            sweep,
            period,
            guard: CycleGuard::new(),
            health: None,
            metrics: MonitorMetrics::new(),
        }
    }

    /// Report cycle results to the registry
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn guard(&self) -> &CycleGuard {
        &self.guard
    }

    /// Tick until shutdown, then wait for the cycle in flight
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            sweep = self.sweep.name(),
            interval_secs = self.period.as_secs(),
            "Starting reconciliation loop"
        );

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut current: Option<JoinHandle<()>> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(handle) = self.on_tick() {
                        current = Some(handle);
                    }
                }
                _ = shutdown.recv() => {
                    info!(sweep = self.sweep.name(), "Shutting down reconciliation loop");
                    break;
                }
            }
        }

        if let Some(handle) = current {
            if let Err(e) = handle.await {
                warn!(sweep = self.sweep.name(), error = %e, "Cycle task failed");
            }
        }
    }

    /// Start a cycle unless one is running; returns its task when started
    fn on_tick(&self) -> Option<JoinHandle<()>> {
        match self.guard.try_acquire() {
            Some(in_flight) => Some(tokio::spawn(run_cycle(
                Arc::clone(&self.sweep),
                self.health.clone(),
                self.metrics.clone(),
                in_flight,
            ))),
            None => {
                debug!(sweep = self.sweep.name(), "Previous cycle still running, skipping tick");
                self.metrics.inc_cycles_skipped(self.sweep.name());
                None
            }
        }
    }
}

async fn run_cycle(
    sweep: Arc<dyn Sweep>,
    health: Option<HealthRegistry>,
    metrics: MonitorMetrics,
    _in_flight: InFlight,
) {
    let name = sweep.name();
    let start = Instant::now();

    match sweep.run_cycle().await {
        Ok(report) => {
            let elapsed = start.elapsed();
            metrics.observe_cycle_latency(name, elapsed.as_secs_f64());
            metrics.set_entities_checked(name, report.checked as i64);
            debug!(
                sweep = name,
                checked = report.checked,
                updated = report.updated,
                errors = report.errors,
                skipped = report.skipped,
                elapsed_ms = elapsed.as_millis(),
                "Reconciliation cycle complete"
            );
            if let Some(health) = &health {
                if report.errors > 0 {
                    health
                        .set_degraded(name, format!("{} catalog writes failed", report.errors))
                        .await;
                } else if report.skipped > 0 {
                    health
                        .set_degraded(name, format!("{} catalog records unreadable", report.skipped))
                        .await;
                } else {
                    health.set_healthy(name).await;
                }
            }
        }
        Err(e) => {
            warn!(sweep = name, error = %format!("{e:#}"), "Reconciliation cycle failed");
            if let Some(health) = &health {
                health.set_degraded(name, format!("{e:#}")).await;
            }
        }
    }
}
