//! Error types shared across the monitor

use std::time::Duration;
use thiserror::Error;

/// Failure of a single backend probe
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("cannot connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unexpected response from {address}: {detail}")]
    Protocol { address: String, detail: String },

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("invalid access settings: {0}")]
    InvalidAccess(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("mongodb error: {0}")]
    MongoDb(#[from] mongodb::error::Error),

    #[error("object store error: {0}")]
    ObjectStore(String),

    #[error("workload read failed: {0}")]
    Workload(String),

    #[error("no available replicas ({unavailable} unavailable)")]
    NoAvailableReplicas { unavailable: i32 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure while decrypting a resource's access settings
#[derive(Debug, Error)]
pub enum DecryptError {
    #[error("decryption service rejected value: {0}")]
    Rejected(String),

    #[error("decryption transport failed: {0}")]
    Transport(String),
}

/// Failure talking to the platform API
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("invalid platform url: {0}")]
    Url(#[from] url::ParseError),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("platform api error ({status}): {body}")]
    Status { status: u16, body: String },
}
