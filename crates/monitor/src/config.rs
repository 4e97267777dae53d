//! Monitor configuration

use anyhow::{Context, Result};
use monitor_lib::checker::CheckerConfig;
use monitor_lib::policy::PolicyConfig;
use monitor_lib::telemetry::TelemetryConfig;
use monitor_lib::watcher::{ReconnectPolicy, WatcherConfig};
use serde::Deserialize;
use std::time::Duration;

/// Monitor configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Base URL of the platform's internal API
    pub platform_url: String,

    /// Namespace holding platform workloads and build executions
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Bearer credential for the platform API
    #[serde(default = "default_access_token")]
    pub access_token: String,

    #[serde(default = "default_resource_interval")]
    pub resource_interval_secs: u64,

    #[serde(default = "default_container_interval")]
    pub container_interval_secs: u64,

    /// Catalog page size for both sweeps
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Grace period before a transitional resource may change state
    #[serde(default = "default_initial_delay")]
    pub initial_delay_secs: u64,

    /// Longest a transitional resource may report errors before being marked Error
    #[serde(default = "default_max_wait")]
    pub max_wait_secs: u64,

    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    #[serde(default = "default_watcher_reconnect")]
    pub watcher_reconnect_secs: u64,

    #[serde(default = "default_telemetry_queue_size")]
    pub telemetry_queue_size: usize,
}

fn default_api_port() -> u16 {
    8080
}

fn default_namespace() -> String {
    std::env::var("NAMESPACE").unwrap_or_else(|_| "default".to_string())
}

fn default_access_token() -> String {
    std::env::var("ACCESS_TOKEN").unwrap_or_default()
}

fn default_resource_interval() -> u64 {
    60
}

fn default_container_interval() -> u64 {
    30
}

fn default_page_size() -> u32 {
    100
}

fn default_initial_delay() -> u64 {
    30
}

fn default_max_wait() -> u64 {
    600
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_watcher_reconnect() -> u64 {
    5
}

fn default_telemetry_queue_size() -> usize {
    1000
}

impl MonitorConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        Self::from_source(config::Environment::with_prefix("MONITOR"))
    }

    fn from_source<S>(source: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config = config::Config::builder()
            .add_source(source)
            .build()
            .context("Failed to read configuration")?;

        let config: MonitorConfig = config
            .try_deserialize()
            .context("Invalid monitor configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.platform_url.trim().is_empty() {
            anyhow::bail!("platform_url must not be empty");
        }
        if self.resource_interval_secs == 0 || self.container_interval_secs == 0 {
            anyhow::bail!("sweep intervals must be greater than zero");
        }
        if self.max_wait_secs < self.initial_delay_secs {
            anyhow::bail!("max_wait_secs must not be shorter than initial_delay_secs");
        }
        Ok(())
    }

    pub fn resource_interval(&self) -> Duration {
        Duration::from_secs(self.resource_interval_secs)
    }

    pub fn container_interval(&self) -> Duration {
        Duration::from_secs(self.container_interval_secs)
    }

    pub fn checker(&self) -> CheckerConfig {
        CheckerConfig {
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
            platform_namespace: self.namespace.clone(),
            ..Default::default()
        }
    }

    pub fn policy(&self) -> PolicyConfig {
        PolicyConfig {
            initial_delay: Duration::from_secs(self.initial_delay_secs),
            max_wait: Duration::from_secs(self.max_wait_secs),
        }
    }

    pub fn telemetry(&self) -> TelemetryConfig {
        TelemetryConfig {
            queue_size: self.telemetry_queue_size,
        }
    }

    pub fn watcher(&self) -> WatcherConfig {
        WatcherConfig {
            namespace: self.namespace.clone(),
            reconnect: ReconnectPolicy {
                delay: Duration::from_secs(self.watcher_reconnect_secs),
                max_attempts: None,
            },
            ..Default::default()
        }
    }
}
