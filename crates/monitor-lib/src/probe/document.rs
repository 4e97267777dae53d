//! MongoDB probe
//!
//! Authenticates with the stored credentials and runs `ping` against the
//! `admin` database. Replica sets are addressed through the whole host list,
//! so any reachable member can serve the command.

use super::{elapsed_ms, Access, ProbeResult};
use crate::error::ProbeError;
use crate::models::ProbeMetrics;
use mongodb::bson::doc;
use mongodb::error::ErrorKind;
use mongodb::options::{ClientOptions, Credential, ServerAddress};
use mongodb::Client;
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

const MONGODB_PORT: u16 = 27017;

const SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Probe a MongoDB deployment
///
/// Uses `connectionString` when present. Otherwise hosts come from `hosts`
/// (objects with `host`/`port`) or `host`/`port`, with `username`,
/// `password` and `authSource` (default `admin`).
pub async fn probe_mongodb(access: &Value) -> ProbeResult {
    let options = client_options(&Access::new(access)).await?;

    let started = Instant::now();
    ping(options).await?;

    Ok(Some(ProbeMetrics {
        latency_ms: elapsed_ms(started),
        ..Default::default()
    }))
}

async fn client_options(access: &Access<'_>) -> Result<ClientOptions, ProbeError> {
    let mut options = match access.str("connectionString") {
        Some(uri) => ClientOptions::parse(uri).await?,
        None => {
            let mut options = ClientOptions::default();
            options.hosts = hosts(access)?;
            if let Some(username) = access.str("username") {
                let mut credential = Credential::default();
                credential.username = Some(username.to_string());
                credential.password = access.str("password").map(str::to_string);
                credential.source = Some(access.str("authSource").unwrap_or("admin").to_string());
                options.credential = Some(credential);
            }
            options
        }
    };

    options.app_name = Some("status-monitor".to_string());
    options.server_selection_timeout = Some(SERVER_SELECTION_TIMEOUT);
    options.connect_timeout = Some(SERVER_SELECTION_TIMEOUT);
    Ok(options)
}

fn hosts(access: &Access) -> Result<Vec<ServerAddress>, ProbeError> {
    let mut members = Vec::new();
    for member in access.list("hosts") {
        let member = Access::new(member);
        members.push((member.required_str("host")?, member.port("port", MONGODB_PORT)?));
    }
    if members.is_empty() {
        members.push((access.required_str("host")?, access.port("port", MONGODB_PORT)?));
    }

    members
        .into_iter()
        .map(|(host, port)| {
            ServerAddress::parse(format!("{host}:{port}"))
                .map_err(|e| ProbeError::InvalidAccess(format!("bad mongodb host {host}: {e}")))
        })
        .collect()
}

async fn ping(options: ClientOptions) -> Result<(), ProbeError> {
    let client = Client::with_options(options)?;
    let result = client
        .database("admin")
        .run_command(doc! { "ping": 1 })
        .await;

    match result {
        Ok(_) => Ok(()),
        Err(e) if matches!(*e.kind, ErrorKind::Authentication { .. }) => {
            Err(ProbeError::Auth(e.to_string()))
        }
        Err(e) => Err(ProbeError::MongoDb(e)),
    }
}
