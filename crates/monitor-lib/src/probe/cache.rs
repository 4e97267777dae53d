//! Redis probe

use super::{elapsed_ms, Access, ProbeResult};
use crate::error::ProbeError;
use crate::models::ProbeMetrics;
use serde_json::Value;
use tokio::time::Instant;
use url::Url;

const REDIS_PORT: u16 = 6379;

/// Probe a Redis server: connect (authenticating when a password is set) and `PING`
pub async fn probe_redis(access: &Value) -> ProbeResult {
    let access = Access::new(access);
    let url = connection_url(&access)?;

    let started = Instant::now();
    let client = redis::Client::open(url.as_str())?;
    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .map_err(auth_or_redis)?;

    let reply: String = redis::cmd("PING").query_async(&mut conn).await?;
    if reply != "PONG" {
        return Err(ProbeError::Protocol {
            address: redact(&url),
            detail: format!("expected PONG, got {reply:?}"),
        });
    }

    Ok(Some(ProbeMetrics {
        latency_ms: elapsed_ms(started),
        ..Default::default()
    }))
}

/// `connectionString`/`url` when given, otherwise built from host, port and credentials
fn connection_url(access: &Access) -> Result<Url, ProbeError> {
    if let Some(raw) = access.str("connectionString").or_else(|| access.str("url")) {
        return Url::parse(raw)
            .map_err(|e| ProbeError::InvalidAccess(format!("bad redis url: {e}")));
    }

    let host = access.required_str("host")?;
    let port = access.port("port", REDIS_PORT)?;
    let mut url = Url::parse(&format!("redis://{host}:{port}"))
        .map_err(|e| ProbeError::InvalidAccess(format!("bad redis address: {e}")))?;

    if let Some(password) = access.str("password") {
        let invalid = |_| ProbeError::InvalidAccess("credentials do not fit a redis url".to_string());
        url.set_username(access.str("username").unwrap_or(""))
            .map_err(invalid)?;
        url.set_password(Some(password)).map_err(invalid)?;
    }

    Ok(url)
}

fn auth_or_redis(e: redis::RedisError) -> ProbeError {
    if e.kind() == redis::ErrorKind::AuthenticationFailed {
        ProbeError::Auth(e.to_string())
    } else {
        ProbeError::Redis(e)
    }
}

fn redact(url: &Url) -> String {
    format!(
        "{}:{}",
        url.host_str().unwrap_or_default(),
        url.port().unwrap_or(REDIS_PORT)
    )
}
