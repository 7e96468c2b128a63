// src/main.rs

//! # Certificate Registry - Main Entry Point
//!
//! Wires the collaborators together and starts the API server.
//!
//! ## Initialization Sequence
//! 1. Load configuration (`.env`, `certchain.toml`, environment)
//! 2. Open the ledger session for the authority's wallet
//! 3. Bind the registry contract, content store and extractor
//! 4. Start the API server
//!
//! `RUST_LOG` controls log output, e.g. `RUST_LOG=certchain=debug`.

use anyhow::Context;
use certchain::blockchain::ledger_session::LedgerSession;
use certchain::config::{AppConfig, StoreBackend};
use certchain::contracts::certificate_registry::CertificateRegistry;
use certchain::services::api_server::{ApiServer, ServerSettings};
use certchain::services::extractor::{FieldExtractor, HttpExtractor};
use certchain::services::registry::{Registry, Resolver};
use certchain::services::verifier::VerifyServiceResolver;
use certchain::storage::ipfs_client::IpfsNodeStore;
use certchain::storage::pinata::PinataStore;
use certchain::storage::ContentStore;
use log::{info, warn};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = AppConfig::load().context("failed to load configuration")?;
    info!("starting with {:?}", config);

    // Ledger session shared by the registry binding
    let session = LedgerSession::connect(
        &config.rpc_url,
        &config.private_key,
        config.chain_id,
        config.authority()?,
        config.gas_limit,
    )
    .await
    .context("failed to open ledger session")?;
    if !session.is_authority() {
        warn!(
            "signer {:?} is not the authority, registrations will be refused",
            session.signer_address()
        );
    }
    let registry = Arc::new(CertificateRegistry::new(
        Arc::new(session),
        config.contract()?,
    )?);
    info!("registry contract at {:?}", registry.address());

    let http = reqwest::Client::builder()
        .timeout(config.call_timeout())
        .build()
        .context("failed to build http client")?;

    let store: Arc<dyn ContentStore> = match config.store_backend {
        StoreBackend::Pinata => Arc::new(PinataStore::new(
            http.clone(),
            &config.pinata_api_url,
            &config.pinata_api_key,
            &config.pinata_secret_key,
            &config.gateway_url,
        )),
        StoreBackend::IpfsNode => Arc::new(IpfsNodeStore::new(
            &config.ipfs_api_url,
            &config.gateway_url,
        )?),
    };

    let extractor: Arc<dyn FieldExtractor> =
        Arc::new(HttpExtractor::new(http.clone(), &config.extractor_url));

    let resolver: Arc<dyn Resolver> = match &config.verify_url {
        Some(url) => {
            info!("resolving through verification service at {}", url);
            Arc::new(VerifyServiceResolver::new(http, url))
        }
        None => registry.clone(),
    };
    let registry: Arc<dyn Registry> = registry;

    let api_server = ApiServer::new(
        extractor,
        store,
        registry,
        resolver,
        ServerSettings {
            contract_address: config.contract_address.clone(),
            authority_address: config.authority_address.clone(),
            call_timeout: config.call_timeout(),
            allowed_origins: config.origins(),
        },
    );

    let addr = config.socket_addr()?;
    api_server.run(addr).await.context("API server stopped")?;
    Ok(())
}
