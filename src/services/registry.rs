// src/services/registry.rs
//! Registry capabilities.
//!
//! `register` is restricted to the authority and append-only; `resolve` is
//! open to anyone. Implemented against the ledger contract by
//! [`crate::contracts::certificate_registry::CertificateRegistry`] and over
//! HTTP by [`crate::services::verifier::VerifyServiceResolver`].

use crate::error::PipelineError;
use crate::models::registration::{BindingKey, Locator, ReceiptId};
use async_trait::async_trait;

/// Reverse lookup of a binding key.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// `Ok(None)` is the explicit not-found result, not an error.
    async fn resolve(&self, binding_key: &BindingKey) -> Result<Option<Locator>, PipelineError>;
}

/// Creation of registrations.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Binds `binding_key` to `locator`.
    ///
    /// # Errors
    /// - `DuplicateBinding` if the key is already bound; the existing binding
    ///   is left untouched
    /// - `Unauthorized` if the caller is not the authority
    /// - `RegistryUnavailable` / `InsufficientResources` for transient failures
    async fn register(
        &self,
        locator: &Locator,
        binding_key: &BindingKey,
    ) -> Result<ReceiptId, PipelineError>;
}
