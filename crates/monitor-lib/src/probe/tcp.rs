//! Plain TCP reachability

use super::{elapsed_ms, Access, ProbeResult};
use crate::error::ProbeError;
use crate::models::ProbeMetrics;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::debug;

/// Open a TCP connection to `host:port`
pub async fn connect(host: &str, port: u16) -> Result<TcpStream, ProbeError> {
    let address = format!("{host}:{port}");
    TcpStream::connect(&address)
        .await
        .map_err(|source| ProbeError::Connect { address, source })
}

/// Succeeds when a TCP connection to `host`/`port` can be opened
pub async fn probe_tcp(access: &Value, default_port: u16) -> ProbeResult {
    let access = Access::new(access);
    let host = access.required_str("host")?;
    let port = access.port("port", default_port)?;

    let started = Instant::now();
    let stream = connect(host, port).await?;
    drop(stream);
    debug!(host = %host, port = port, "tcp reachability probe succeeded");

    Ok(Some(ProbeMetrics {
        latency_ms: elapsed_ms(started),
        ..Default::default()
    }))
}
