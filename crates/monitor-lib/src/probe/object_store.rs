//! Object store probes
//!
//! S3 and Cloud Storage are checked with an authenticated `HeadBucket` (or
//! `ListBuckets` when no bucket is configured) through the S3 API; Cloud
//! Storage is reached through its HMAC interoperability endpoint. Azure gets a
//! Shared Key signed container listing. MinIO exposes an unauthenticated
//! liveness endpoint, which must answer 2xx.

use super::{elapsed_ms, Access, ProbeResult};
use crate::error::ProbeError;
use crate::models::ProbeMetrics;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use sha2::Sha256;
use tokio::time::Instant;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

const GCS_INTEROP_ENDPOINT: &str = "https://storage.googleapis.com";

const AZURE_API_VERSION: &str = "2021-08-06";

/// Which object store a resource points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectStoreKind {
    AwsS3,
    GcpStorage,
    AzureBlob,
    MinIo,
}

/// Probe an object store with the resource's own credentials
pub async fn probe_object_store(client: &Client, kind: ObjectStoreKind, access: &Value) -> ProbeResult {
    let access = Access::new(access);

    let started = Instant::now();
    match kind {
        ObjectStoreKind::AwsS3 => s3_check(S3Settings::aws(&access)?).await?,
        ObjectStoreKind::GcpStorage => s3_check(S3Settings::gcs(&access)?).await?,
        ObjectStoreKind::AzureBlob => azure_check(client, &AzureSettings::from_access(&access)?).await?,
        ObjectStoreKind::MinIo => minio_check(client, &access).await?,
    }

    Ok(Some(ProbeMetrics {
        latency_ms: elapsed_ms(started),
        ..Default::default()
    }))
}

/// Credentials and addressing for an S3-compatible API
#[derive(Debug, Clone, PartialEq)]
struct S3Settings {
    access_key_id: String,
    secret_access_key: String,
    region: String,
    bucket: Option<String>,
    /// Custom endpoint; switches to path-style addressing
    endpoint: Option<String>,
}

impl S3Settings {
    fn aws(access: &Access) -> Result<Self, ProbeError> {
        Ok(Self {
            access_key_id: access.required_str("accessKeyId")?.to_string(),
            secret_access_key: access.required_str("secretAccessKey")?.to_string(),
            region: access.str("region").unwrap_or("us-east-1").to_string(),
            bucket: access.str("bucket").map(str::to_string),
            endpoint: access.str("endpoint").map(str::to_string),
        })
    }

    /// HMAC interoperability keys; `accessKey`/`secretKey` are accepted too
    fn gcs(access: &Access) -> Result<Self, ProbeError> {
        let access_key_id = access
            .str("accessKeyId")
            .or_else(|| access.str("accessKey"))
            .ok_or_else(|| ProbeError::InvalidAccess("missing `accessKeyId`".to_string()))?;
        let secret_access_key = access
            .str("secretAccessKey")
            .or_else(|| access.str("secretKey"))
            .ok_or_else(|| ProbeError::InvalidAccess("missing `secretAccessKey`".to_string()))?;

        Ok(Self {
            access_key_id: access_key_id.to_string(),
            secret_access_key: secret_access_key.to_string(),
            region: "auto".to_string(),
            bucket: access.str("bucket").map(str::to_string),
            endpoint: Some(access.str("endpoint").unwrap_or(GCS_INTEROP_ENDPOINT).to_string()),
        })
    }
}

async fn s3_check(settings: S3Settings) -> Result<(), ProbeError> {
    let mut builder = aws_sdk_s3::config::Builder::new()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new(settings.region))
        .credentials_provider(Credentials::new(
            settings.access_key_id,
            settings.secret_access_key,
            None,
            None,
            "access-settings",
        ))
        .retry_config(RetryConfig::disabled());
    if let Some(endpoint) = settings.endpoint {
        builder = builder.endpoint_url(endpoint).force_path_style(true);
    }
    let client = aws_sdk_s3::Client::from_conf(builder.build());

    match settings.bucket {
        Some(bucket) => {
            client.head_bucket().bucket(bucket).send().await.map_err(s3_error)?;
        }
        None => {
            client.list_buckets().send().await.map_err(s3_error)?;
        }
    }
    Ok(())
}

fn s3_error<E>(e: SdkError<E, HttpResponse>) -> ProbeError
where
    E: std::error::Error + 'static,
{
    let status = e.raw_response().map(|r| r.status().as_u16());
    let detail = DisplayErrorContext(&e).to_string();
    match status {
        Some(401) | Some(403) => ProbeError::Auth(detail),
        _ => ProbeError::ObjectStore(detail),
    }
}

/// Storage account addressing and its Shared Key
#[derive(Debug, Clone, PartialEq)]
struct AzureSettings {
    account: String,
    /// Base64 account key as issued by Azure
    key: String,
    endpoint: String,
    container: Option<String>,
}

impl AzureSettings {
    /// Fields win over the matching connection string entries
    fn from_access(access: &Access) -> Result<Self, ProbeError> {
        let conn = access.str("connectionString").unwrap_or_default();

        let account = access
            .str("accountName")
            .map(str::to_string)
            .or_else(|| connection_string_value(conn, "AccountName"))
            .ok_or_else(|| ProbeError::InvalidAccess("no storage account name".to_string()))?;
        let key = access
            .str("accountKey")
            .map(str::to_string)
            .or_else(|| connection_string_value(conn, "AccountKey"))
            .ok_or_else(|| ProbeError::InvalidAccess("no storage account key".to_string()))?;
        let endpoint = access
            .str("blobEndpoint")
            .map(str::to_string)
            .or_else(|| connection_string_value(conn, "BlobEndpoint"))
            .unwrap_or_else(|| format!("https://{account}.blob.core.windows.net"));

        Ok(Self {
            account,
            key,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            container: access.str("container").map(str::to_string),
        })
    }

    /// Smallest listing the key must be valid for
    fn listing_url(&self) -> Result<Url, ProbeError> {
        let raw = match &self.container {
            Some(container) => format!(
                "{}/{container}?restype=container&comp=list&maxresults=1",
                self.endpoint
            ),
            None => format!("{}/?comp=list&maxresults=1", self.endpoint),
        };
        Url::parse(&raw).map_err(|e| ProbeError::InvalidAccess(format!("bad blob endpoint: {e}")))
    }

    fn string_to_sign(&self, url: &Url, date: &str) -> String {
        let mut resource = format!("/{}{}\ncomp:list\nmaxresults:1", self.account, url.path());
        if self.container.is_some() {
            resource.push_str("\nrestype:container");
        }
        format!(
            "GET\n{}x-ms-date:{date}\nx-ms-version:{AZURE_API_VERSION}\n{resource}",
            "\n".repeat(11)
        )
    }

    fn authorization(&self, url: &Url, date: &str) -> Result<String, ProbeError> {
        let key = B64
            .decode(&self.key)
            .map_err(|_| ProbeError::InvalidAccess("account key is not base64".to_string()))?;
        let mut mac = HmacSha256::new_from_slice(&key)
            .map_err(|_| ProbeError::InvalidAccess("unusable account key".to_string()))?;
        mac.update(self.string_to_sign(url, date).as_bytes());
        let signature = B64.encode(mac.finalize().into_bytes());
        Ok(format!("SharedKey {}:{signature}", self.account))
    }
}

fn rfc1123(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

async fn azure_check(client: &Client, settings: &AzureSettings) -> Result<(), ProbeError> {
    let url = settings.listing_url()?;
    let date = rfc1123(Utc::now());
    let authorization = settings.authorization(&url, &date)?;

    let response = client
        .get(url.clone())
        .header("x-ms-date", &date)
        .header("x-ms-version", AZURE_API_VERSION)
        .header("Authorization", authorization)
        .send()
        .await?;

    let status = response.status();
    match status {
        s if s.is_success() => Ok(()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ProbeError::Auth(format!(
            "storage account {} rejected the shared key ({status})",
            settings.account
        ))),
        _ => Err(ProbeError::Protocol {
            address: format!("{}{}", settings.endpoint, url.path()),
            detail: format!("http status {status}"),
        }),
    }
}

async fn minio_check(client: &Client, access: &Access<'_>) -> Result<(), ProbeError> {
    let url = minio_health_url(access)?;
    let status = client.get(&url).send().await?.status();
    if !status.is_success() {
        return Err(ProbeError::Protocol {
            address: url,
            detail: format!("http status {status}"),
        });
    }
    Ok(())
}

fn minio_health_url(access: &Access) -> Result<String, ProbeError> {
    let endpoint = access.required_str("endPoint")?;
    let port = access.port("port", 9000)?;
    let scheme = if access.bool("useSSL") { "https" } else { "http" };
    Ok(format!("{scheme}://{endpoint}:{port}/minio/health/live"))
}

fn connection_string_value(conn: &str, key: &str) -> Option<String> {
    conn.split(';')
        .filter_map(|part| part.split_once('='))
        .find(|(k, _)| k.trim() == key)
        .map(|(_, value)| value.trim().to_string())
}
