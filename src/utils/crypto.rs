// src/utils/crypto.rs
//! Fingerprint and binding transforms.
//!
//! The binding transform is Keccak-256 over the UTF-8 bytes of the fingerprint
//! string, the same value Solidity's `keccak256(abi.encodePacked(string))`
//! produces. Issuance and verification must both go through
//! [`compute_binding_key`] or ledger lookups silently miss.

use crate::error::PipelineError;
use crate::models::certificate::{CertificateFields, Fingerprint, NOT_FOUND_PLACEHOLDER};
use crate::models::registration::BindingKey;
use ethers::utils::{hex, keccak256};
use ring::digest::{digest, SHA256};

/// Computes a Keccak-256 hash of the input data (Ethereum-compatible).
pub fn hash_data(data: &[u8]) -> [u8; 32] {
    keccak256(data)
}

/// Derives the ledger key for a fingerprint.
///
/// Pure and deterministic. Fails with `MissingFingerprint` for an empty one.
pub fn compute_binding_key(fingerprint: &Fingerprint) -> Result<BindingKey, PipelineError> {
    if fingerprint.is_empty() {
        return Err(PipelineError::MissingFingerprint);
    }
    Ok(BindingKey(hash_data(fingerprint.as_str().as_bytes())))
}

/// Recomputes the extraction service's `metadata_hash` for a set of fields.
///
/// SHA-256 hex of the normalised values concatenated as
/// name, register_number, passing_date, college, cgpa. A field the service
/// could not read contributes its `Not Found` placeholder, so the digest
/// exists even for unreadable certificates.
pub fn extractor_fingerprint(fields: &CertificateFields) -> Fingerprint {
    let fields = fields.normalized();
    let value = |v: &Option<String>| match v.as_deref() {
        Some(v) if !v.is_empty() && !v.eq_ignore_ascii_case(NOT_FOUND_PLACEHOLDER) => v.to_string(),
        _ => NOT_FOUND_PLACEHOLDER.to_string(),
    };
    let joined: String = [
        &fields.name,
        &fields.register_number,
        &fields.passing_date,
        &fields.college,
        &fields.cgpa,
    ]
    .into_iter()
    .map(value)
    .collect();
    Fingerprint(hex::encode(digest(&SHA256, joined.as_bytes())))
}
