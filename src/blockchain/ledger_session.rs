// src/blockchain/ledger_session.rs
//! Ledger session.
//!
//! Holds the node connection, the authority's signing wallet and the gas policy.
//! Built once at startup and shared by reference with everything that talks to
//! the registry contract.

use crate::error::{classify_ledger_error, PipelineError};
use ethers::{
    abi::{Abi, Detokenize, Tokenize},
    contract::{Contract, ContractError},
    middleware::SignerMiddleware,
    providers::{Http, Middleware, Provider, ProviderError},
    signers::{LocalWallet, Signer, WalletError},
    types::{Address, H256, U256, U64},
};
use log::{debug, info};
use std::sync::Arc;
use thiserror::Error;

/// Provider plus the authority's wallet.
pub type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

#[derive(Debug, Error)]
pub enum LedgerSessionError {
    #[error("invalid rpc url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid private key: {0}")]
    InvalidKey(#[from] WalletError),

    #[error("node unreachable: {0}")]
    Provider(#[from] ProviderError),
}

/// Connection to the ledger on behalf of one signing identity.
///
/// This client provides:
/// - The signer used for `storeCertificate` transactions
/// - The designated authority address registrations are checked against
/// - Simulated-then-sent transactions so revert reasons are not lost
#[derive(Clone)]
pub struct LedgerSession {
    /// Signing middleware over the HTTP provider
    client: Arc<SignerClient>,
    /// Only this identity may create registrations
    authority: Address,
    /// Gas limit attached to every transaction
    gas_limit: U256,
}

impl LedgerSession {
    /// Creates a new session.
    ///
    /// # Arguments
    /// * `rpc_url` - JSON-RPC endpoint
    /// * `private_key` - Hex-encoded private key (with or without 0x prefix)
    /// * `chain_id` - Chain id; queried from the node when `None`
    /// * `authority` - Address of the designated authority
    /// * `gas_limit` - Gas limit for transactions
    ///
    /// # Errors
    /// Returns error if:
    /// - The RPC URL does not parse
    /// - The private key is invalid
    /// - The chain id has to be queried and the node is unreachable
    pub async fn connect(
        rpc_url: &str,
        private_key: &str,
        chain_id: Option<u64>,
        authority: Address,
        gas_limit: u64,
    ) -> Result<Self, LedgerSessionError> {
        let provider =
            Provider::<Http>::try_from(rpc_url).map_err(|e| LedgerSessionError::InvalidUrl {
                url: rpc_url.to_string(),
                reason: e.to_string(),
            })?;
        let wallet: LocalWallet = private_key
            .trim()
            .trim_start_matches("0x")
            .parse::<LocalWallet>()?;

        let chain_id = match chain_id {
            Some(id) => id,
            None => provider.get_chainid().await?.as_u64(),
        };
        let wallet = wallet.with_chain_id(chain_id);
        info!(
            "ledger session on chain {} as {:?} (authority {:?})",
            chain_id,
            wallet.address(),
            authority
        );

        Ok(Self {
            client: Arc::new(SignerMiddleware::new(provider, wallet)),
            authority,
            gas_limit: U256::from(gas_limit),
        })
    }

    /// Address transactions are signed with.
    pub fn signer_address(&self) -> Address {
        self.client.address()
    }

    pub fn authority(&self) -> Address {
        self.authority
    }

    /// Whether the signer is the designated authority.
    pub fn is_authority(&self) -> bool {
        self.signer_address() == self.authority
    }

    fn contract(&self, contract_address: Address, abi: &Abi) -> Contract<SignerClient> {
        Contract::new(contract_address, abi.clone(), self.client.clone())
    }

    /// Sends a state-changing call and waits for its receipt.
    ///
    /// The call is first simulated with `eth_call` so a revert reason
    /// ("Certificate already exists", "Not authorized") surfaces as the
    /// matching error instead of an opaque failed receipt.
    ///
    /// # Returns
    /// Transaction hash of the mined transaction
    pub async fn send_transaction<T: Tokenize>(
        &self,
        contract_address: Address,
        abi: &Abi,
        method: &str,
        params: T,
    ) -> Result<H256, PipelineError> {
        let contract = self.contract(contract_address, abi);
        let call = contract
            .method::<_, ()>(method, params)
            .map_err(|e| PipelineError::RegistryUnavailable(e.to_string()))?
            .gas(self.gas_limit);

        call.call().await.map_err(contract_error)?;
        debug!("{} simulation passed, sending", method);

        let pending = call.send().await.map_err(contract_error)?;
        let tx_hash: H256 = *pending;
        let receipt = pending
            .await
            .map_err(|e| classify_ledger_error(&e.to_string()))?
            .ok_or_else(|| {
                PipelineError::RegistryUnavailable(format!("transaction {:?} dropped", tx_hash))
            })?;

        if receipt.status == Some(U64::zero()) {
            return Err(PipelineError::RegistryUnavailable(format!(
                "transaction {:?} reverted",
                tx_hash
            )));
        }
        Ok(receipt.transaction_hash)
    }

    /// Queries a contract (read-only operation).
    pub async fn query_contract<T: Tokenize, R: Detokenize>(
        &self,
        contract_address: Address,
        abi: &Abi,
        method: &str,
        params: T,
    ) -> Result<R, PipelineError> {
        self.contract(contract_address, abi)
            .method::<_, R>(method, params)
            .map_err(|e| PipelineError::RegistryUnavailable(e.to_string()))?
            .call()
            .await
            .map_err(contract_error)
    }
}

/// Prefers the decoded revert reason over the generic error text.
fn contract_error<M: Middleware>(err: ContractError<M>) -> PipelineError {
    let message = err
        .decode_revert::<String>()
        .unwrap_or_else(|| err.to_string());
    classify_ledger_error(&message)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known development key (first Hardhat/Anvil account)
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const DEV_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    #[tokio::test]
    async fn test_signer_matches_authority() {
        let authority: Address = DEV_ADDRESS.parse().unwrap();
        let session = LedgerSession::connect(
            "http://127.0.0.1:8545",
            DEV_KEY,
            Some(1337),
            authority,
            5_000_000,
        )
        .await
        .unwrap();
        assert_eq!(session.signer_address(), authority);
        assert!(session.is_authority());
    }

    #[tokio::test]
    async fn test_foreign_signer_is_not_authority() {
        let session = LedgerSession::connect(
            "http://127.0.0.1:8545",
            DEV_KEY,
            Some(1337),
            Address::repeat_byte(0x42),
            5_000_000,
        )
        .await
        .unwrap();
        assert!(!session.is_authority());
    }

    #[tokio::test]
    async fn test_rejects_malformed_key() {
        let result = LedgerSession::connect(
            "http://127.0.0.1:8545",
            "not-hex",
            Some(1337),
            Address::zero(),
            5_000_000,
        )
        .await;
        assert!(matches!(result, Err(LedgerSessionError::InvalidKey(_))));
    }
}
