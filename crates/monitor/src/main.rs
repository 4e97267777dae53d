//! Status Monitor - health reconciliation for the platform control plane
//!
//! Periodically checks every managed resource and every user container,
//! persists significant state changes to the platform catalog and follows
//! build events from the cluster.

use anyhow::{Context, Result};
use monitor_lib::{
    checker::ResourceChecker,
    health::{components, HealthRegistry},
    observability::{MonitorMetrics, StructuredLogger},
    platform::{Catalog, HttpCatalog, HttpDecryptor, PlatformClient},
    reconcile::{ContainerSweep, ResourceSweep, SweepLoop},
    telemetry::{HttpTransport, TelemetryPublisher, TelemetryWorker},
    watcher::BuildEventWatcher,
    workload::{KubeWorkloadApi, WorkloadStatusDeriver},
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const MONITOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting status-monitor");

    let config = config::MonitorConfig::load()?;
    info!(namespace = %config.namespace, platform_url = %config.platform_url, "Monitor configured");

    let logger = StructuredLogger::new(&config.namespace);
    logger.log_startup(MONITOR_VERSION, &config.platform_url);

    // Platform and cluster clients
    let platform = PlatformClient::new(&config.platform_url, config.access_token.clone())
        .context("Invalid platform URL")?;
    let catalog: Arc<dyn Catalog> = Arc::new(HttpCatalog::new(platform.clone()));
    let decryptor = Arc::new(HttpDecryptor::new(platform.clone()));
    let kube_client = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let workloads = Arc::new(KubeWorkloadApi::new(kube_client));

    // The catalog must be reachable before any cycle runs
    catalog
        .resources_page(0, 1)
        .await
        .context("Platform catalog unreachable at startup")?;

    let health_registry = HealthRegistry::new();
    for component in components::ALL {
        health_registry.register(component).await;
    }
    let metrics = MonitorMetrics::new();

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Telemetry queue and delivery worker
    let (publisher, receiver) = TelemetryPublisher::new(config.telemetry());
    let worker = TelemetryWorker::new(
        receiver,
        Arc::new(HttpTransport::new(platform)),
        publisher.stats(),
    )
    .with_health(health_registry.clone());
    let telemetry_handle = tokio::spawn(worker.run(shutdown_tx.subscribe()));

    // Reconciliation sweeps
    let checker = ResourceChecker::new(config.checker(), workloads.clone(), decryptor)
        .context("Failed to build resource checker")?;
    let resource_sweep = ResourceSweep::new(
        catalog.clone(),
        checker,
        config.policy(),
        config.page_size,
        publisher.clone(),
        logger.clone(),
    );
    let resource_loop = SweepLoop::new(Arc::new(resource_sweep), config.resource_interval())
        .with_health(health_registry.clone());
    let resource_handle = tokio::spawn(resource_loop.run(shutdown_tx.subscribe()));

    let container_sweep = ContainerSweep::new(
        catalog,
        WorkloadStatusDeriver::new(workloads.clone()),
        config.page_size,
        publisher.clone(),
        logger.clone(),
    );
    let container_loop = SweepLoop::new(Arc::new(container_sweep), config.container_interval())
        .with_health(health_registry.clone());
    let container_handle = tokio::spawn(container_loop.run(shutdown_tx.subscribe()));

    // Build event watcher
    let mut watcher = BuildEventWatcher::new(workloads, config.watcher(), publisher, logger.clone())
        .with_health(health_registry.clone());
    watcher.start();

    // Health and metrics server
    let app_state = Arc::new(api::AppState::new(health_registry.clone(), metrics));
    let api_handle = tokio::spawn(api::serve(
        config.api_port,
        app_state,
        shutdown_tx.subscribe(),
    ));

    health_registry.set_ready(true).await;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false).await;

    watcher.stop().await;
    let _ = shutdown_tx.send(());

    for (name, handle) in [
        ("resource_sweep", resource_handle),
        ("container_sweep", container_handle),
        ("telemetry", telemetry_handle),
    ] {
        if let Err(e) = handle.await {
            error!(task = name, error = %e, "Task failed during shutdown");
        }
    }
    match api_handle.await {
        Ok(Err(e)) => error!(error = %format!("{e:#}"), "API server failed"),
        Err(e) => error!(error = %e, "API server task failed"),
        Ok(Ok(())) => {}
    }

    info!("Shutdown complete");
    Ok(())
}
