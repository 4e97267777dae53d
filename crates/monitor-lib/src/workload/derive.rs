//! Composite state derivation
//!
//! Pure functions from replica counts, job history and pod phases to a
//! [`ContainerState`]. Identical inputs always give identical outputs.

use super::{JobSnapshot, PodPhase, PodSnapshot, ReplicaSnapshot, ServiceSnapshot};
use crate::models::ContainerState;

/// Deployment and stateful set state
///
/// Checks run in order: not-yet-ready (Creating, or Error when no pod exists),
/// rollout in progress (Updating), some pods failing (Warning), all pods
/// failing (Error), otherwise Running. Failed and Unknown pods count as errors.
pub fn derive_replica_status(replicas: &ReplicaSnapshot, pods: &[PodSnapshot]) -> ContainerState {
    let total_pods = pods.len();
    let error_pods = pods
        .iter()
        .filter(|p| matches!(p.phase, PodPhase::Failed | PodPhase::Unknown))
        .count();

    if replicas.desired > replicas.ready && replicas.ready == 0 {
        if total_pods == 0 {
            ContainerState::Error
        } else {
            ContainerState::Creating
        }
    } else if replicas.desired != replicas.updated {
        ContainerState::Updating
    } else if error_pods > 0 && error_pods < total_pods {
        ContainerState::Warning
    } else if total_pods > 0 && error_pods == total_pods {
        ContainerState::Error
    } else {
        ContainerState::Running
    }
}

/// Cron job state from the history of its owned jobs
pub fn derive_cron_status(jobs: &[JobSnapshot]) -> ContainerState {
    if jobs.is_empty() {
        return ContainerState::Scheduled;
    }
    if jobs.iter().any(|j| j.active > 0) {
        return ContainerState::Running;
    }

    // Jobs that never started sort first, so `max_by_key` picks a started one when any exist
    let latest = jobs.iter().max_by_key(|j| j.start_time);
    if let Some(latest) = latest {
        if latest.succeeded > 0 {
            return ContainerState::Successful;
        }
        if latest.failed > 0 {
            return ContainerState::Failed;
        }
    }

    let any_failed = jobs.iter().any(|j| j.failed > 0);
    let any_succeeded = jobs.iter().any(|j| j.succeeded > 0);
    if any_failed && any_succeeded {
        ContainerState::Warning
    } else {
        ContainerState::Unknown
    }
}

/// Where a serverless pod sits in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodBucket {
    Active,
    Error,
    Pending,
    Creating,
    Updating,
}

/// Pod counts per bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PodBuckets {
    pub active: i32,
    pub error: i32,
    pub creating: i32,
    pub updating: i32,
    pub pending: i32,
}

impl PodBuckets {
    fn add(&mut self, bucket: PodBucket) {
        match bucket {
            PodBucket::Active => self.active += 1,
            PodBucket::Error => self.error += 1,
            PodBucket::Pending => self.pending += 1,
            PodBucket::Creating => self.creating += 1,
            PodBucket::Updating => self.updating += 1,
        }
    }
}

/// Classify one pod; the first matching rule wins
pub fn classify_pod(pod: &PodSnapshot) -> PodBucket {
    let all_ready = !pod.containers.is_empty() && pod.containers.iter().all(|c| c.ready);
    let terminated_with_error = pod
        .containers
        .iter()
        .any(|c| matches!(c.terminated_exit_code, Some(code) if code != 0));

    if pod.phase == PodPhase::Running && all_ready {
        PodBucket::Active
    } else if matches!(pod.phase, PodPhase::Failed | PodPhase::Unknown) || terminated_with_error {
        PodBucket::Error
    } else if pod.phase == PodPhase::Pending {
        PodBucket::Pending
    } else if pod.phase == PodPhase::Running {
        PodBucket::Creating
    } else {
        PodBucket::Updating
    }
}

/// Serverless service state plus the pod bucket counts behind it
pub fn derive_serverless_status(
    service: &ServiceSnapshot,
    pods: &[PodSnapshot],
) -> (ContainerState, PodBuckets) {
    let mut buckets = PodBuckets::default();
    for pod in pods {
        buckets.add(classify_pod(pod));
    }

    let state = if service.condition("Ready") != Some(true) {
        ContainerState::Creating
    } else if service.latest_created_revision != service.latest_ready_revision {
        ContainerState::Updating
    } else if service.condition("ConfigurationsReady") == Some(false)
        || service.condition("RoutesReady") == Some(false)
        || buckets.error > 0
    {
        ContainerState::Error
    } else {
        ContainerState::Running
    };

    (state, buckets)
}
