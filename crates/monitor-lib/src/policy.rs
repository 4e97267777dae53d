//! Transition policy
//!
//! Decides whether a fresh check outcome is worth persisting. Resources in
//! the middle of an operation (Creating, Updating, Deleting, Restarting) get
//! a grace period before any change is recorded, and a longer one before an
//! Error is recorded.

use crate::models::{CheckOutcome, LogChange, Resource, ResourceStatus, ResourceUpdate};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Grace periods for resources with an operation in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyConfig {
    /// Nothing is recorded before this much time has passed
    pub initial_delay: Duration,
    /// Errors are not recorded before this much time has passed
    pub max_wait: Duration,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(30),
            max_wait: Duration::from_secs(600),
        }
    }
}

/// What to do with an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Ignore,
    /// Record the outcome in the log without changing the status
    AppendLog,
    UpdateStatus,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Ignore => "ignore",
            Decision::AppendLog => "append_log",
            Decision::UpdateStatus => "update_status",
        }
    }
}

/// Decide how to handle `outcome` for the persisted `resource`
pub fn decide(
    resource: &Resource,
    outcome: Option<&CheckOutcome>,
    now: DateTime<Utc>,
    config: &PolicyConfig,
) -> Decision {
    let Some(outcome) = outcome else {
        return Decision::Ignore;
    };

    if resource.status.is_transitional() {
        let elapsed = elapsed_in_operation(resource, now);
        if elapsed < config.initial_delay {
            return Decision::Ignore;
        }
        if outcome.status == ResourceStatus::Error && elapsed < config.max_wait {
            return Decision::Ignore;
        }
    }

    let replicas_changed = replicas_changed(resource, outcome);
    match (outcome.status, resource.status) {
        (ResourceStatus::Ok, ResourceStatus::Ok) if replicas_changed => Decision::UpdateStatus,
        (ResourceStatus::Ok, ResourceStatus::Ok) => Decision::Ignore,
        (new, persisted) if new != persisted => Decision::UpdateStatus,
        (ResourceStatus::Error, ResourceStatus::Error) if replicas_changed => {
            Decision::UpdateStatus
        }
        (ResourceStatus::Error, ResourceStatus::Error) => Decision::AppendLog,
        _ => Decision::Ignore,
    }
}

/// Time since the current operation started
///
/// Creation is measured from `created_at`, other operations from `updated_at`.
fn elapsed_in_operation(resource: &Resource, now: DateTime<Utc>) -> Duration {
    let since = if resource.status == ResourceStatus::Creating {
        resource.created_at
    } else {
        resource.updated_at
    };
    (now - since).to_std().unwrap_or(Duration::ZERO)
}

fn replicas_changed(resource: &Resource, outcome: &CheckOutcome) -> bool {
    if !resource.instance.is_compute_service() {
        return false;
    }
    let (available, unavailable) = outcome.replicas();
    if available.is_none() && unavailable.is_none() {
        return false;
    }
    (available, unavailable) != (resource.available_replicas, resource.unavailable_replicas)
}

/// Build the catalog update that applies `decision`; `None` for [`Decision::Ignore`]
pub fn build_update(
    resource: &Resource,
    outcome: &CheckOutcome,
    decision: Decision,
    now: DateTime<Utc>,
) -> Option<ResourceUpdate> {
    let entry = outcome.latest_entry();
    let (available, unavailable) = if resource.instance.is_compute_service() {
        outcome.replicas()
    } else {
        (None, None)
    };

    match decision {
        Decision::Ignore => None,
        Decision::UpdateStatus => Some(ResourceUpdate {
            status: outcome.status,
            available_replicas: available,
            unavailable_replicas: unavailable,
            updated_at: now,
            log: LogChange::Prepend(entry),
        }),
        Decision::AppendLog => {
            let repeats_latest = resource
                .logs
                .first()
                .map(|latest| {
                    latest.status == ResourceStatus::Error && latest.message == entry.message
                })
                .unwrap_or(false);

            Some(ResourceUpdate {
                status: resource.status,
                available_replicas: None,
                unavailable_replicas: None,
                updated_at: now,
                log: if repeats_latest {
                    LogChange::ReplaceLatest(entry)
                } else {
                    LogChange::Prepend(entry)
                },
            })
        }
    }
}
