// src/storage/mod.rs
//! Content-addressed storage of raw certificate files.
//!
//! Every successful upload yields its own [`Locator`] and is final; retrying a
//! failed upload is always safe.

use crate::error::PipelineError;
use crate::models::certificate::CertificateFile;
use crate::models::registration::Locator;
use async_trait::async_trait;

pub mod ipfs_client;
pub mod pinata;

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Uploads the file and returns its content locator.
    ///
    /// Never synthesizes a locator: any failure is `StoreUnavailable`.
    async fn store(&self, file: &CertificateFile) -> Result<Locator, PipelineError>;

    /// Retrieves the stored bytes.
    async fn fetch(&self, locator: &Locator) -> Result<Vec<u8>, PipelineError>;

    /// Public URL for the stored bytes.
    fn gateway_link(&self, locator: &Locator) -> String;
}
