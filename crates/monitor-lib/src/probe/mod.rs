//! Backend probes
//!
//! One probe per backend family. Each probe takes decrypted access settings,
//! attempts a connection or a minimal operation, and returns either the
//! metrics it gathered or a typed [`ProbeError`]. Probes hold no state.

mod broker;
mod cache;
mod compute;
mod document;
mod object_store;
mod relational;
mod tcp;

#[cfg(test)]
mod tests;

pub use broker::{probe_kafka, probe_nats, probe_rabbitmq};
pub use cache::probe_redis;
pub use compute::probe_workload;
pub use document::probe_mongodb;
pub use object_store::{probe_object_store, ObjectStoreKind};
pub use relational::{probe_mysql, probe_postgres};
pub use tcp::{connect, probe_tcp};

use crate::error::ProbeError;
use crate::models::ProbeMetrics;
use serde_json::Value;

/// Outcome of a single probe; `Ok(None)` means the target is not observable yet
pub type ProbeResult = Result<Option<ProbeMetrics>, ProbeError>;

impl ProbeError {
    /// Metrics worth persisting even though the probe failed
    pub fn metrics(&self) -> Option<ProbeMetrics> {
        match self {
            ProbeError::NoAvailableReplicas { unavailable } => Some(ProbeMetrics {
                latency_ms: None,
                available_replicas: Some(0),
                unavailable_replicas: Some(*unavailable),
            }),
            _ => None,
        }
    }
}

/// Read-only view over a decrypted access settings tree
#[derive(Debug, Clone, Copy)]
pub struct Access<'a>(&'a Value);

impl<'a> Access<'a> {
    pub fn new(value: &'a Value) -> Self {
        Self(value)
    }

    /// String field, ignoring empty strings
    pub fn str(&self, key: &str) -> Option<&'a str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn required_str(&self, key: &str) -> Result<&'a str, ProbeError> {
        self.str(key)
            .ok_or_else(|| ProbeError::InvalidAccess(format!("missing `{key}`")))
    }

    /// Port field; accepts numbers and numeric strings
    pub fn port(&self, key: &str, default: u16) -> Result<u16, ProbeError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|p| u16::try_from(p).ok())
                .ok_or_else(|| ProbeError::InvalidAccess(format!("`{key}` is not a port"))),
            Some(Value::String(s)) if s.is_empty() => Ok(default),
            Some(Value::String(s)) => s
                .parse()
                .map_err(|_| ProbeError::InvalidAccess(format!("`{key}` is not a port"))),
            Some(_) => Err(ProbeError::InvalidAccess(format!("`{key}` is not a port"))),
        }
    }

    pub fn bool(&self, key: &str) -> bool {
        match self.0.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s == "true",
            _ => false,
        }
    }

    /// Array field as a slice; missing or non-array yields an empty slice
    pub fn list(&self, key: &str) -> &'a [Value] {
        self.0
            .get(key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

fn elapsed_ms(started: tokio::time::Instant) -> Option<u64> {
    Some(started.elapsed().as_millis() as u64)
}
