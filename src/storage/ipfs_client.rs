// src/storage/ipfs_client.rs
//! IPFS node storage client.
//!
//! Talks to an IPFS HTTP API node (`ipfs daemon`, default
//! `http://localhost:5001`) instead of a pinning service.
//!
//! # Security Considerations
//! - All stored data is public by default (IPFS is a public network)
//! - Hashes are content-addressable and permanent

use crate::error::PipelineError;
use crate::models::certificate::CertificateFile;
use crate::models::registration::Locator;
use crate::storage::ContentStore;
use async_trait::async_trait;
use bytes::BytesMut;
use futures::TryStreamExt;
use ipfs_api_backend_hyper::{IpfsApi, IpfsClient, TryFromUri};
use log::debug;
use std::io::Cursor;
use std::sync::Arc;

/// Thread-safe IPFS client wrapper.
#[derive(Clone)]
pub struct IpfsNodeStore {
    /// Shared IPFS client instance (thread-safe via Arc)
    client: Arc<IpfsClient>,
    gateway_url: String,
}

impl IpfsNodeStore {
    /// Connects to the node API at `api_url`.
    ///
    /// # Errors
    /// `StoreUnavailable` if the URL is not a valid URI. Connection errors
    /// only surface on the first operation.
    pub fn new(api_url: &str, gateway_url: &str) -> Result<Self, PipelineError> {
        let client = IpfsClient::from_str(api_url)
            .map_err(|e| PipelineError::StoreUnavailable(format!("ipfs api url: {}", e)))?;
        Ok(Self {
            client: Arc::new(client),
            gateway_url: gateway_url.to_string(),
        })
    }
}

#[async_trait]
impl ContentStore for IpfsNodeStore {
    async fn store(&self, file: &CertificateFile) -> Result<Locator, PipelineError> {
        let reader = Cursor::new(file.bytes.clone());
        let added = self
            .client
            .add(reader)
            .await
            .map_err(|e| PipelineError::StoreUnavailable(e.to_string()))?;
        debug!("added {} to ipfs node as {}", file.file_name, added.hash);
        Locator::parse(&added.hash)
            .ok_or_else(|| PipelineError::StoreUnavailable("node returned an empty hash".into()))
    }

    async fn fetch(&self, locator: &Locator) -> Result<Vec<u8>, PipelineError> {
        let data = self
            .client
            .cat(locator.as_str())
            .try_fold(BytesMut::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await
            .map_err(|e| PipelineError::StoreUnavailable(e.to_string()))?;
        Ok(data.to_vec())
    }

    fn gateway_link(&self, locator: &Locator) -> String {
        locator.gateway_link(&self.gateway_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::spawn_stub;
    use axum::{routing::post, Json, Router};
    use serde_json::json;

    #[tokio::test]
    async fn test_store_uses_add_response_hash() {
        let base = spawn_stub(Router::new().route(
            "/api/v0/add",
            post(|| async { Json(json!({ "Name": "cert", "Hash": "QmNode", "Size": "16" })) }),
        ))
        .await;
        let store = IpfsNodeStore::new(&base, "http://127.0.0.1:8080/ipfs").unwrap();

        let locator = store
            .store(&CertificateFile::new("cert.png", vec![1, 2, 3]))
            .await
            .unwrap();
        assert_eq!(locator, Locator("QmNode".into()));
        assert_eq!(store.gateway_link(&locator), "http://127.0.0.1:8080/ipfs/QmNode");
    }

    #[tokio::test]
    async fn test_unreachable_node() {
        let store = IpfsNodeStore::new("http://127.0.0.1:1", "").unwrap();
        let result = store.store(&CertificateFile::new("cert.png", vec![1])).await;
        assert!(matches!(result, Err(PipelineError::StoreUnavailable(_))));
    }
}
