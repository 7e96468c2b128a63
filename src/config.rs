// src/config.rs
//! Application configuration.
//!
//! Values are layered, lowest precedence first:
//! 1. Built-in defaults (local Ganache node, Pinata endpoints)
//! 2. Optional `certchain.toml` in the working directory
//! 3. Environment variables (a `.env` file is loaded first)
//!
//! ## Environment Variables
//! - `PRIVATE_KEY` / `ADMIN_PRIVATE_KEY`: authority signing key
//! - `CONTRACT_ADDRESS`: deployed certificate registry
//! - `AUTHORITY_ADDRESS` / `ADMIN_ADDRESS`: the only identity allowed to register
//! - `PINATA_API_KEY`, `PINATA_SECRET_KEY`: pinning credentials
//! - `EXTRACTOR_URL`: field extraction service base URL

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use dotenv::dotenv;
use ethers::types::Address;
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Source(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Which content store backs certificate uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Pinata,
    IpfsNode,
}

#[derive(Clone, Deserialize)]
pub struct AppConfig {
    /// JSON-RPC endpoint of the ledger node
    pub rpc_url: String,
    /// Chain id; queried from the node when unset
    #[serde(default)]
    pub chain_id: Option<u64>,
    #[serde(alias = "admin_private_key")]
    pub private_key: String,
    pub contract_address: String,
    #[serde(alias = "admin_address")]
    pub authority_address: String,
    pub gas_limit: u64,

    pub extractor_url: String,
    /// Remote verification query service; the ledger is read directly when unset
    #[serde(default)]
    pub verify_url: Option<String>,

    pub store_backend: StoreBackend,
    pub pinata_api_url: String,
    #[serde(default)]
    pub pinata_api_key: String,
    #[serde(default)]
    pub pinata_secret_key: String,
    pub ipfs_api_url: String,
    pub gateway_url: String,

    pub listen_addr: String,
    pub call_timeout_secs: u64,
    /// Comma-separated CORS origins
    pub allowed_origins: String,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("rpc_url", &self.rpc_url)
            .field("chain_id", &self.chain_id)
            .field("contract_address", &self.contract_address)
            .field("authority_address", &self.authority_address)
            .field("extractor_url", &self.extractor_url)
            .field("verify_url", &self.verify_url)
            .field("store_backend", &self.store_backend)
            .field("gateway_url", &self.gateway_url)
            .field("listen_addr", &self.listen_addr)
            .field("call_timeout_secs", &self.call_timeout_secs)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    /// Loads `.env`, the optional config file and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenv().ok();
        let builder = Self::defaults()?
            .add_source(File::with_name("certchain").required(false))
            .add_source(Environment::default().try_parsing(true));
        Self::build(builder)
    }

    /// Defaults overlaid with a TOML document.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        Self::build(Self::defaults()?.add_source(File::from_str(toml, FileFormat::Toml)))
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Ok(Config::builder()
            .set_default("rpc_url", "http://127.0.0.1:7545")?
            .set_default("gas_limit", 5_000_000_i64)?
            .set_default("extractor_url", "http://127.0.0.1:5000")?
            .set_default("store_backend", "pinata")?
            .set_default("pinata_api_url", "https://api.pinata.cloud")?
            .set_default("ipfs_api_url", "http://localhost:5001")?
            .set_default("gateway_url", "https://gateway.pinata.cloud/ipfs")?
            .set_default("listen_addr", "127.0.0.1:3000")?
            .set_default("call_timeout_secs", 30_i64)?
            .set_default(
                "allowed_origins",
                "http://localhost:3000,http://127.0.0.1:3000",
            )?)
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.contract()?;
        self.authority()?;
        self.socket_addr()?;
        if self.private_key.trim().is_empty() {
            return Err(ConfigError::Invalid("private_key is empty".into()));
        }
        if self.call_timeout_secs == 0 {
            return Err(ConfigError::Invalid("call_timeout_secs must be positive".into()));
        }
        if self.store_backend == StoreBackend::Pinata
            && (self.pinata_api_key.is_empty() || self.pinata_secret_key.is_empty())
        {
            return Err(ConfigError::Invalid(
                "pinata backend needs pinata_api_key and pinata_secret_key".into(),
            ));
        }
        Ok(())
    }

    pub fn contract(&self) -> Result<Address, ConfigError> {
        parse_address("contract_address", &self.contract_address)
    }

    pub fn authority(&self) -> Result<Address, ConfigError> {
        parse_address("authority_address", &self.authority_address)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen_addr
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("listen_addr: {}", e)))
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn origins(&self) -> Vec<String> {
        self.allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(String::from)
            .collect()
    }
}

fn parse_address(key: &str, value: &str) -> Result<Address, ConfigError> {
    value
        .trim()
        .parse::<Address>()
        .map_err(|e| ConfigError::Invalid(format!("{}: {}", key, e)))
}
