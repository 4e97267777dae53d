//! Status monitor library for the platform control plane
//!
//! This crate provides the core functionality for:
//! - Connectivity probes for managed resources
//! - Workload status derivation from the cluster
//! - Resource and container reconciliation cycles
//! - Build event watching
//! - Telemetry publishing, health checks and observability

pub mod checker;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod platform;
pub mod policy;
pub mod probe;
pub mod reconcile;
pub mod telemetry;
pub mod watcher;
pub mod workload;

#[cfg(test)]
mod test_support;

pub use error::{DecryptError, PlatformError, ProbeError};
pub use health::{
    components, ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse,
    ReadinessResponse,
};
pub use models::*;
pub use observability::{MonitorMetrics, StructuredLogger};
