// src/models/registration.rs
//! On-ledger registration model.
//!
//! A [`Registration`] binds a [`BindingKey`] to the [`Locator`] of the stored
//! certificate bytes. Registrations are append-only: at most one locator per
//! binding key, never updated, never deleted.

use ethers::types::H256;
use ethers::utils::hex;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Ledger index derived from a fingerprint by the binding transform.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingKey(pub [u8; 32]);

impl BindingKey {
    /// `0x`-prefixed lowercase hex, the form contracts and the query service use.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl From<BindingKey> for H256 {
    fn from(key: BindingKey) -> Self {
        H256::from(key.0)
    }
}

impl fmt::Display for BindingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for BindingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BindingKey({})", self.to_hex())
    }
}

/// Error parsing a binding key from hex.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("binding key must be 32 bytes of hex: {0}")]
pub struct InvalidBindingKey(pub String);

impl FromStr for BindingKey {
    type Err = InvalidBindingKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let bytes = hex::decode(digits).map_err(|e| InvalidBindingKey(e.to_string()))?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| InvalidBindingKey(format!("got {} bytes", b.len())))?;
        Ok(BindingKey(array))
    }
}

impl Serialize for BindingKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BindingKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Content-store reference to the raw certificate bytes (an IPFS CID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator(pub String);

impl Locator {
    /// Accepts any non-blank reference; existence is the store's concern.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            None
        } else {
            Some(Locator(value.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Public URL of the stored bytes under `gateway`.
    pub fn gateway_link(&self, gateway: &str) -> String {
        format!("{}/{}", gateway.trim_end_matches('/'), self.0)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of the committing transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceiptId(pub String);

impl From<H256> for ReceiptId {
    fn from(hash: H256) -> Self {
        ReceiptId(format!("0x{:x}", hash))
    }
}

impl fmt::Display for ReceiptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A binding as stored on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Registration {
    pub locator: Locator,
    pub binding_key: BindingKey,
}
