// src/services/verifier.rs
//! Verification query client.
//!
//! Resolves a binding key through a remote verification service instead of
//! reading the ledger directly, for deployments where verifiers hold no node
//! connection.

use crate::error::PipelineError;
use crate::models::registration::{BindingKey, Locator};
use crate::services::registry::Resolver;
use async_trait::async_trait;
use log::debug;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct VerifyRequest {
    metadata_hash: String,
}

#[derive(Deserialize)]
struct VerifyResponse {
    #[serde(default)]
    cid: Option<String>,
}

/// Resolver backed by `POST {base}/verify`.
///
/// The service answers `{ "cid": ... }` when the key is registered and
/// `404` (or a body without `cid`) when it is not.
#[derive(Clone)]
pub struct VerifyServiceResolver {
    http: reqwest::Client,
    base_url: String,
}

impl VerifyServiceResolver {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Resolver for VerifyServiceResolver {
    async fn resolve(&self, binding_key: &BindingKey) -> Result<Option<Locator>, PipelineError> {
        let response = self
            .http
            .post(format!("{}/verify", self.base_url))
            .json(&VerifyRequest {
                metadata_hash: binding_key.to_hex(),
            })
            .send()
            .await
            .map_err(|e| PipelineError::RegistryUnavailable(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!("verify service has no registration for {}", binding_key);
                Ok(None)
            }
            status if status.is_success() => {
                let body: VerifyResponse = response
                    .json()
                    .await
                    .map_err(|e| PipelineError::RegistryUnavailable(e.to_string()))?;
                Ok(body.cid.as_deref().and_then(Locator::parse))
            }
            status => Err(PipelineError::RegistryUnavailable(format!(
                "verify service returned {}",
                status
            ))),
        }
    }
}
