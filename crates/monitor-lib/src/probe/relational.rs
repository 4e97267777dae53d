//! Relational database probes
//!
//! Opens a single connection with sqlx and runs `SELECT 1`. A connection
//! string in `connectionString` takes precedence over discrete fields.

use super::{elapsed_ms, Access, ProbeResult};
use crate::models::ProbeMetrics;
use serde_json::Value;
use sqlx::mysql::MySqlConnectOptions;
use sqlx::postgres::PgConnectOptions;
use sqlx::{ConnectOptions, Connection};
use std::str::FromStr;
use tokio::time::Instant;

const POSTGRES_PORT: u16 = 5432;
const MYSQL_PORT: u16 = 3306;

/// Probe a PostgreSQL server
pub async fn probe_postgres(access: &Value) -> ProbeResult {
    let access = Access::new(access);

    let options = match access.str("connectionString") {
        Some(url) => PgConnectOptions::from_str(url)?,
        None => {
            let mut options = PgConnectOptions::new()
                .host(access.required_str("host")?)
                .port(access.port("port", POSTGRES_PORT)?)
                .username(access.str("username").unwrap_or("postgres"));
            if let Some(password) = access.str("password") {
                options = options.password(password);
            }
            if let Some(database) = access.str("dbName") {
                options = options.database(database);
            }
            options
        }
    };

    let started = Instant::now();
    let mut conn = options.connect().await?;
    sqlx::query("SELECT 1").execute(&mut conn).await?;
    let latency_ms = elapsed_ms(started);
    conn.close().await?;

    Ok(Some(ProbeMetrics {
        latency_ms,
        ..Default::default()
    }))
}

/// Probe a MySQL server
pub async fn probe_mysql(access: &Value) -> ProbeResult {
    let access = Access::new(access);

    let options = match access.str("connectionString") {
        Some(url) => MySqlConnectOptions::from_str(url)?,
        None => {
            let mut options = MySqlConnectOptions::new()
                .host(access.required_str("host")?)
                .port(access.port("port", MYSQL_PORT)?)
                .username(access.str("username").unwrap_or("root"));
            if let Some(password) = access.str("password") {
                options = options.password(password);
            }
            if let Some(database) = access.str("dbName") {
                options = options.database(database);
            }
            options
        }
    };

    let started = Instant::now();
    let mut conn = options.connect().await?;
    sqlx::query("SELECT 1").execute(&mut conn).await?;
    let latency_ms = elapsed_ms(started);
    conn.close().await?;

    Ok(Some(ProbeMetrics {
        latency_ms,
        ..Default::default()
    }))
}
