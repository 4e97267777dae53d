//! Platform API access
//!
//! This module provides:
//! - [`PlatformClient`], a bearer-authenticated JSON client
//! - The resource and container catalog ([`Catalog`], [`HttpCatalog`])
//! - The access settings decryption service ([`HttpDecryptor`])

mod catalog;
mod decrypt;

pub use catalog::{Catalog, HttpCatalog, Page};
pub use decrypt::HttpDecryptor;

use crate::error::PlatformError;
use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use url::Url;

/// JSON client for the platform's internal API
#[derive(Clone)]
pub struct PlatformClient {
    client: Client,
    base_url: Url,
    access_token: String,
}

impl PlatformClient {
    /// Create a new client; `base_url` may carry a path prefix
    pub fn new(base_url: &str, access_token: impl Into<String>) -> Result<Self, PlatformError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            base_url,
            access_token: access_token.into(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Make a GET request with query parameters
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, PlatformError> {
        let url = self.url(path)?;
        let response = self.send(self.client.get(url).query(query)).await?;
        Ok(response.json().await?)
    }

    /// Make a POST request with a JSON body and decode the reply
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, PlatformError> {
        let url = self.url(path)?;
        let response = self.send(self.client.post(url).json(body)).await?;
        Ok(response.json().await?)
    }

    /// Make a POST request with a JSON body, ignoring the reply body
    pub async fn post_unit<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(), PlatformError> {
        let url = self.url(path)?;
        self.send(self.client.post(url).json(body)).await?;
        Ok(())
    }

    /// Make a PATCH request with a JSON body, ignoring the reply body
    pub async fn patch<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), PlatformError> {
        let url = self.url(path)?;
        self.send(self.client.patch(url).json(body)).await?;
        Ok(())
    }

    fn url(&self, path: &str) -> Result<Url, PlatformError> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, PlatformError> {
        let response = request.bearer_auth(&self.access_token).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(PlatformError::Status { status, body });
        }

        Ok(response)
    }
}
