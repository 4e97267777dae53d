//! Decryption service client

use super::PlatformClient;
use crate::checker::Decryptor;
use crate::error::{DecryptError, PlatformError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct DecryptRequest<'a> {
    value: &'a str,
}

#[derive(Deserialize)]
struct DecryptResponse {
    value: String,
}

/// Decrypts access settings through the platform API
#[derive(Clone)]
pub struct HttpDecryptor {
    client: PlatformClient,
}

impl HttpDecryptor {
    pub fn new(client: PlatformClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Decryptor for HttpDecryptor {
    async fn decrypt(&self, value: &str) -> Result<String, DecryptError> {
        let response: DecryptResponse = self
            .client
            .post("v1/internal/decrypt", &DecryptRequest { value })
            .await
            .map_err(|e| match e {
                PlatformError::Status { status, body } if status < 500 => {
                    DecryptError::Rejected(format!("{status}: {body}"))
                }
                other => DecryptError::Transport(other.to_string()),
            })?;

        Ok(response.value)
    }
}
