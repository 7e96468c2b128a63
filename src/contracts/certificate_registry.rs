// src/contracts/certificate_registry.rs
//! Certificate Registry smart contract interface.
//!
//! Wraps the ledger-resident registry that binds a binding key (`bytes32`) to
//! the content locator of the certificate file. The contract itself enforces
//! that only the admin may store and that a key is stored at most once.

use crate::blockchain::ledger_session::LedgerSession;
use crate::error::PipelineError;
use crate::models::registration::{BindingKey, Locator, ReceiptId, Registration};
use crate::services::registry::{Registry, Resolver};
use async_trait::async_trait;
use ethers::abi::Abi;
use ethers::types::{Address, H256};
use log::{info, warn};
use std::sync::Arc;

const REGISTRY_ABI: &[u8] = include_bytes!("abi/CertificateRegistry.json");

/// Certificate Registry smart contract wrapper.
///
/// - `storeCertificate(string, bytes32)` creates a registration
/// - `certificates(bytes32)` reads the stored `{ipfsCID, metadataHash}` record
pub struct CertificateRegistry {
    session: Arc<LedgerSession>,
    address: Address,
    abi: Abi,
}

impl CertificateRegistry {
    /// Creates a new CertificateRegistry instance.
    ///
    /// # Errors
    /// Returns `RegistryUnavailable` if the bundled ABI cannot be parsed.
    pub fn new(session: Arc<LedgerSession>, address: Address) -> Result<Self, PipelineError> {
        let abi = Abi::load(REGISTRY_ABI)
            .map_err(|e| PipelineError::RegistryUnavailable(format!("registry ABI: {}", e)))?;
        Ok(Self {
            session,
            address,
            abi,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Reads the stored record for `binding_key`, if any.
    pub async fn registration(
        &self,
        binding_key: &BindingKey,
    ) -> Result<Option<Registration>, PipelineError> {
        let (cid, stored_key): (String, H256) = self
            .session
            .query_contract(
                self.address,
                &self.abi,
                "certificates",
                H256::from(*binding_key),
            )
            .await?;

        Ok(Locator::parse(&cid).map(|locator| Registration {
            locator,
            binding_key: BindingKey(stored_key.0),
        }))
    }
}

#[async_trait]
impl Registry for CertificateRegistry {
    async fn register(
        &self,
        locator: &Locator,
        binding_key: &BindingKey,
    ) -> Result<ReceiptId, PipelineError> {
        if !self.session.is_authority() {
            warn!(
                "signer {:?} is not the registry authority {:?}",
                self.session.signer_address(),
                self.session.authority()
            );
            return Err(PipelineError::Unauthorized);
        }

        let tx_hash = self
            .session
            .send_transaction(
                self.address,
                &self.abi,
                "storeCertificate",
                (locator.as_str().to_string(), H256::from(*binding_key)),
            )
            .await?;
        info!("registered {} -> {} in {:?}", binding_key, locator, tx_hash);
        Ok(ReceiptId::from(tx_hash))
    }
}

#[async_trait]
impl Resolver for CertificateRegistry {
    async fn resolve(&self, binding_key: &BindingKey) -> Result<Option<Locator>, PipelineError> {
        Ok(self
            .registration(binding_key)
            .await?
            .map(|registration| registration.locator))
    }
}
