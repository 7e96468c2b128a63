// src/storage/pinata.rs
//! Pinata pinning service client.
//!
//! Uploads go to `POST {api}/pinning/pinFileToIPFS` as multipart form data,
//! authenticated with the `pinata_api_key` / `pinata_secret_api_key` headers.
//! Retrieval goes through the public gateway.

use crate::error::PipelineError;
use crate::models::certificate::CertificateFile;
use crate::models::registration::Locator;
use crate::storage::ContentStore;
use async_trait::async_trait;
use log::{debug, error};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

#[derive(Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: Option<String>,
}

#[derive(Clone)]
pub struct PinataStore {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    secret_key: String,
    gateway_url: String,
}

impl PinataStore {
    pub fn new(
        http: reqwest::Client,
        api_url: &str,
        api_key: &str,
        secret_key: &str,
        gateway_url: &str,
    ) -> Self {
        Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            secret_key: secret_key.to_string(),
            gateway_url: gateway_url.to_string(),
        }
    }
}

fn unavailable(err: reqwest::Error) -> PipelineError {
    PipelineError::StoreUnavailable(err.to_string())
}

#[async_trait]
impl ContentStore for PinataStore {
    async fn store(&self, file: &CertificateFile) -> Result<Locator, PipelineError> {
        let part = Part::bytes(file.bytes.clone())
            .file_name(file.file_name.clone())
            .mime_str(&file.content_type)
            .map_err(unavailable)?;
        let form = Form::new().part("file", part);

        let response = self
            .http
            .post(format!("{}/pinning/pinFileToIPFS", self.api_url))
            .header("pinata_api_key", &self.api_key)
            .header("pinata_secret_api_key", &self.secret_key)
            .multipart(form)
            .send()
            .await
            .map_err(unavailable)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("pinata upload rejected with {}: {}", status, body);
            return Err(PipelineError::StoreUnavailable(format!(
                "IPFS upload failed ({}): {}",
                status, body
            )));
        }

        let pinned: PinResponse = response.json().await.map_err(unavailable)?;
        let locator = pinned
            .ipfs_hash
            .as_deref()
            .and_then(Locator::parse)
            .ok_or_else(|| PipelineError::StoreUnavailable("response has no IpfsHash".into()))?;
        debug!("pinned {} as {}", file.file_name, locator);
        Ok(locator)
    }

    async fn fetch(&self, locator: &Locator) -> Result<Vec<u8>, PipelineError> {
        let response = self
            .http
            .get(self.gateway_link(locator))
            .send()
            .await
            .map_err(unavailable)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PipelineError::ContentNotFound(locator.to_string()));
        }
        let response = response.error_for_status().map_err(unavailable)?;
        Ok(response.bytes().await.map_err(unavailable)?.to_vec())
    }

    fn gateway_link(&self, locator: &Locator) -> String {
        locator.gateway_link(&self.gateway_url)
    }
}
