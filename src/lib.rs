// src/lib.rs

//! # Certificate Registry
//!
//! Registers the existence of a certificate on a ledger and lets anyone
//! confirm it later:
//!
//! 1. **Extraction**: structured fields and a canonical fingerprint from a
//!    certificate file or manual entry
//! 2. **Storage**: the raw file on a content-addressed store
//! 3. **Registry**: `keccak256(fingerprint) → locator`, append-only and
//!    restricted to a single authority
//!
//! [`services::pipeline`] sequences these into the issue and verify workflows.

pub mod blockchain; // Ledger session and transaction submission
pub mod config;
pub mod contracts; // Registry contract binding
pub mod error;
pub mod models;
pub mod services; // Workflows, clients and the API
pub mod storage; // Content store backends
pub mod utils;

#[cfg(test)]
pub mod test_utils;
