// src/test_utils.rs
//! In-memory collaborators for tests.

use crate::error::PipelineError;
use crate::models::certificate::{CertificateFields, CertificateFile, Extraction, FieldSource};
use crate::models::registration::{BindingKey, Locator, ReceiptId};
use crate::services::extractor::FieldExtractor;
use crate::services::registry::{Registry, Resolver};
use crate::storage::ContentStore;
use crate::utils::crypto::extractor_fingerprint;
use async_trait::async_trait;
use axum::Router;
use ethers::utils::hex;
use ring::digest::{digest, SHA256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Serves `router` on an ephemeral local port and returns its base URL.
pub async fn spawn_stub(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

pub fn jane_doe() -> CertificateFields {
    CertificateFields::new("Jane Doe", "R100", "X College", "MAY-2021", "8.9")
}

/// A certificate "file" whose bytes are the JSON of its fields.
pub fn certificate_file(name: &str, fields: &CertificateFields) -> CertificateFile {
    CertificateFile::new(name, serde_json::to_vec(fields).unwrap())
}

/// Extractor that reads files as JSON-encoded fields and fingerprints them
/// the way the real service does.
#[derive(Default)]
pub struct FakeExtractor {
    calls: AtomicUsize,
    held: Mutex<Option<(Vec<u8>, Arc<Notify>)>>,
    fail_next: Mutex<Option<PipelineError>>,
}

impl FakeExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Responses for a file with these bytes wait until the returned gate is notified.
    pub fn hold(&self, bytes: &[u8]) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.held.lock().unwrap() = Some((bytes.to_vec(), gate.clone()));
        gate
    }

    pub fn release_hold(&self) {
        *self.held.lock().unwrap() = None;
    }

    pub fn fail_next(&self, err: PipelineError) {
        *self.fail_next.lock().unwrap() = Some(err);
    }

    /// Yields until `n` calls have started.
    pub async fn wait_for_calls(&self, n: usize) {
        while self.calls() < n {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl FieldExtractor for FakeExtractor {
    async fn extract(&self, source: &FieldSource) -> Result<Extraction, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fail_next.lock().unwrap().take() {
            return Err(err);
        }

        let fields = match source {
            FieldSource::File(file) => {
                let gate = match &*self.held.lock().unwrap() {
                    Some((bytes, gate)) if *bytes == file.bytes => Some(gate.clone()),
                    _ => None,
                };
                if let Some(gate) = gate {
                    gate.notified().await;
                }
                serde_json::from_slice::<CertificateFields>(&file.bytes).map_err(|_| {
                    PipelineError::ExtractionFailed("cannot identify image file".into())
                })?
            }
            FieldSource::Manual(fields) => fields.clone(),
        };

        // Hashes whatever was read, like the real service.
        let fingerprint = extractor_fingerprint(&fields);
        Ok(Extraction {
            fields,
            fingerprint,
        })
    }
}

/// Content-addressed in-memory store.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<Locator, Vec<u8>>>,
    fail_next: Mutex<Option<PipelineError>>,
    calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self, err: PipelineError) {
        *self.fail_next.lock().unwrap() = Some(err);
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn store(&self, file: &CertificateFile) -> Result<Locator, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fail_next.lock().unwrap().take() {
            return Err(err);
        }
        let locator = Locator(format!(
            "bafy{}",
            &hex::encode(digest(&SHA256, &file.bytes))[..32]
        ));
        self.objects
            .lock()
            .unwrap()
            .insert(locator.clone(), file.bytes.clone());
        Ok(locator)
    }

    async fn fetch(&self, locator: &Locator) -> Result<Vec<u8>, PipelineError> {
        self.objects
            .lock()
            .unwrap()
            .get(locator)
            .cloned()
            .ok_or_else(|| PipelineError::ContentNotFound(locator.to_string()))
    }

    fn gateway_link(&self, locator: &Locator) -> String {
        locator.gateway_link("https://gateway.test/ipfs")
    }
}

/// Ledger enforcing the registry contract's rules in memory.
pub struct MemoryLedger {
    registrations: Mutex<HashMap<BindingKey, Locator>>,
    caller_is_authority: bool,
    register_calls: AtomicUsize,
    fail_next: Mutex<Option<PipelineError>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::with_authority(true)
    }

    pub fn with_authority(caller_is_authority: bool) -> Self {
        Self {
            registrations: Mutex::new(HashMap::new()),
            caller_is_authority,
            register_calls: AtomicUsize::new(0),
            fail_next: Mutex::new(None),
        }
    }

    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self, err: PipelineError) {
        *self.fail_next.lock().unwrap() = Some(err);
    }

    pub fn bound(&self, key: &BindingKey) -> Option<Locator> {
        self.registrations.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl Registry for MemoryLedger {
    async fn register(
        &self,
        locator: &Locator,
        binding_key: &BindingKey,
    ) -> Result<ReceiptId, PipelineError> {
        let n = self.register_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fail_next.lock().unwrap().take() {
            return Err(err);
        }
        if !self.caller_is_authority {
            return Err(PipelineError::Unauthorized);
        }
        let mut registrations = self.registrations.lock().unwrap();
        if registrations.contains_key(binding_key) {
            return Err(PipelineError::DuplicateBinding);
        }
        registrations.insert(*binding_key, locator.clone());
        Ok(ReceiptId(format!("0x{:064x}", n + 1)))
    }
}

#[async_trait]
impl Resolver for MemoryLedger {
    async fn resolve(&self, binding_key: &BindingKey) -> Result<Option<Locator>, PipelineError> {
        if let Some(err) = self.fail_next.lock().unwrap().take() {
            return Err(err);
        }
        Ok(self.bound(binding_key))
    }
}
