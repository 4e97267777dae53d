//! Compute workload probe
//!
//! Reads the replica counts of the workload backing a compute resource.

use super::{elapsed_ms, ProbeResult};
use crate::error::ProbeError;
use crate::models::{ProbeMetrics, WorkloadKind};
use crate::workload::WorkloadApi;
use tokio::time::Instant;

/// Probe a compute workload
///
/// Zero desired replicas means the workload is scaled down and reports `Ok(None)`.
pub async fn probe_workload(
    api: &dyn WorkloadApi,
    kind: WorkloadKind,
    name: &str,
    namespace: &str,
) -> ProbeResult {
    let started = Instant::now();
    let replicas = api
        .read_replicas(kind, name, namespace)
        .await
        .map_err(|e| ProbeError::Workload(format!("{e:#}")))?;

    if replicas.desired == 0 {
        return Ok(None);
    }
    if replicas.available == 0 {
        return Err(ProbeError::NoAvailableReplicas {
            unavailable: replicas.unavailable.max(replicas.desired),
        });
    }

    Ok(Some(ProbeMetrics {
        latency_ms: elapsed_ms(started),
        available_replicas: Some(replicas.available),
        unavailable_replicas: Some(replicas.unavailable),
    }))
}
