// src/services/pipeline.rs
//! Pipeline Orchestrator
//!
//! Sequences extraction, storage and registry calls into the two workflows:
//!
//! - **Issue**: select file → extract → store → register
//! - **Verify**: select file or enter fields → extract → resolve
//!
//! Each selection starts a new run with a monotonically increasing run id.
//! Every outstanding call is tagged with the run it was started for, and its
//! response is applied only if that run is still current; otherwise it is
//! discarded as [`PipelineError::Superseded`]. Intermediate results (fields,
//! fingerprint, locator) are held per run so any stage can be retried alone.
//!
//! A failed stage leaves the held results untouched, so the pipeline sits in
//! the state that preceded the failure.

use crate::error::{ErrorKind, PipelineError};
use crate::models::certificate::{
    CertificateFields, CertificateFile, Extraction, FieldSource, Fingerprint,
};
use crate::models::registration::{BindingKey, Locator, ReceiptId};
use crate::services::extractor::FieldExtractor;
use crate::services::registry::{Registry, Resolver};
use crate::storage::ContentStore;
use crate::utils::crypto::compute_binding_key;
use log::{debug, info, warn};
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub type RunId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryMode {
    Automatic,
    Manual,
}

/// Position of a run in its workflow, derived from the results it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    FieldsReady,
    Fingerprinted,
    Stored,
    Registered,
    Resolved,
    NotFound,
}

/// Outcome of a successful registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueReceipt {
    pub binding_key: BindingKey,
    pub locator: Locator,
    pub receipt: ReceiptId,
}

/// Outcome of a verification lookup. `NotFound` is a result, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Verification {
    Resolved {
        binding_key: BindingKey,
        locator: Locator,
    },
    NotFound {
        binding_key: BindingKey,
    },
}

impl Verification {
    pub fn binding_key(&self) -> BindingKey {
        match self {
            Verification::Resolved { binding_key, .. } | Verification::NotFound { binding_key } => {
                *binding_key
            }
        }
    }

    pub fn locator(&self) -> Option<&Locator> {
        match self {
            Verification::Resolved { locator, .. } => Some(locator),
            Verification::NotFound { .. } => None,
        }
    }
}

/// Point-in-time view of a session, suitable for rendering a status banner.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub run: RunId,
    pub mode: EntryMode,
    pub stage: Stage,
    pub busy: bool,
    pub fields: Option<CertificateFields>,
    pub fingerprint: Option<Fingerprint>,
    pub locator: Option<Locator>,
    pub receipt: Option<ReceiptId>,
    pub failure: Option<ErrorKind>,
    pub status: String,
    pub registration_locked: bool,
}

#[derive(Debug)]
struct SessionState {
    run: RunId,
    mode: EntryMode,
    source: Option<FieldSource>,
    extraction: Option<Extraction>,
    locator: Option<Locator>,
    receipt: Option<ReceiptId>,
    verdict: Option<Option<Locator>>,
    in_flight: Option<RunId>,
    failure: Option<PipelineError>,
    status: String,
    // Survives new runs: the signer's authority does not change per file
    registration_locked: bool,
}

impl SessionState {
    fn new() -> Self {
        Self {
            run: 0,
            mode: EntryMode::Automatic,
            source: None,
            extraction: None,
            locator: None,
            receipt: None,
            verdict: None,
            in_flight: None,
            failure: None,
            status: String::new(),
            registration_locked: false,
        }
    }

    fn stage(&self) -> Stage {
        if self.receipt.is_some() {
            Stage::Registered
        } else if let Some(verdict) = &self.verdict {
            if verdict.is_some() {
                Stage::Resolved
            } else {
                Stage::NotFound
            }
        } else if self.extraction.is_some() && self.locator.is_some() {
            Stage::Stored
        } else if self.extraction.is_some() {
            Stage::Fingerprinted
        } else if self.source.is_some() {
            Stage::FieldsReady
        } else {
            Stage::Idle
        }
    }

    fn record_failure(&mut self, err: &PipelineError) {
        if matches!(err, PipelineError::Busy | PipelineError::Superseded { .. }) {
            return;
        }
        if *err == PipelineError::Unauthorized {
            self.registration_locked = true;
        }
        self.status = err.status_message();
        self.failure = Some(err.clone());
    }
}

/// Per-operator session state shared by both workflows.
///
/// The lock is never held across an external call.
pub struct Session {
    extractor: Arc<dyn FieldExtractor>,
    call_timeout: Duration,
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new(extractor: Arc<dyn FieldExtractor>, call_timeout: Duration) -> Self {
        Self {
            extractor,
            call_timeout,
            state: Mutex::new(SessionState::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Starts a new run with `source`, dropping everything derived from the
    /// previous selection.
    fn start_run(&self, mode: EntryMode, source: Option<FieldSource>) -> RunId {
        let mut state = self.lock();
        state.run += 1;
        state.mode = mode;
        state.source = source;
        state.extraction = None;
        state.locator = None;
        state.receipt = None;
        state.verdict = None;
        state.in_flight = None;
        state.failure = None;
        state.status.clear();
        info!("run {} started ({:?} entry)", state.run, mode);
        state.run
    }

    pub fn select_file(&self, file: CertificateFile) -> RunId {
        debug!("selected {} ({} bytes)", file.file_name, file.bytes.len());
        self.start_run(EntryMode::Automatic, Some(FieldSource::File(file)))
    }

    pub fn enter_manual(&self, fields: CertificateFields) -> RunId {
        self.start_run(EntryMode::Manual, Some(FieldSource::Manual(fields)))
    }

    /// Switching entry mode resets all downstream state. Re-selecting the
    /// current mode is a no-op.
    pub fn switch_mode(&self, mode: EntryMode) -> RunId {
        let current = {
            let state = self.lock();
            (state.mode == mode).then_some(state.run)
        };
        match current {
            Some(run) => run,
            None => self.start_run(mode, None),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.lock();
        Snapshot {
            run: state.run,
            mode: state.mode,
            stage: state.stage(),
            busy: state.in_flight == Some(state.run),
            fields: state.extraction.as_ref().map(|e| e.fields.clone()),
            fingerprint: state.extraction.as_ref().map(|e| e.fingerprint.clone()),
            locator: state.locator.clone(),
            receipt: state.receipt.clone(),
            failure: state.failure.as_ref().map(PipelineError::kind),
            status: state.status.clone(),
            registration_locked: state.registration_locked,
        }
    }

    /// Claims the busy gate for the current run after `prepare` has taken
    /// the stage's inputs from the held state.
    fn begin<T>(
        &self,
        activity: &str,
        prepare: impl FnOnce(&SessionState) -> Result<T, PipelineError>,
    ) -> Result<(RunId, T), PipelineError> {
        let mut state = self.lock();
        if state.in_flight == Some(state.run) {
            return Err(PipelineError::Busy);
        }
        match prepare(&state) {
            Ok(input) => {
                state.in_flight = Some(state.run);
                state.failure = None;
                state.status = format!("{}...", activity);
                debug!("run {}: {}", state.run, activity);
                Ok((state.run, input))
            }
            Err(err) => {
                state.record_failure(&err);
                Err(err)
            }
        }
    }

    /// Applies the outcome of a call started by `begin` for `run`.
    ///
    /// `apply` stores a successful result and returns the status line.
    fn finish<R>(
        &self,
        run: RunId,
        result: Result<R, PipelineError>,
        apply: impl FnOnce(&mut SessionState, &R) -> String,
    ) -> Result<R, PipelineError> {
        let mut state = self.lock();
        if state.run != run {
            info!("discarding response for run {} (run {} is current)", run, state.run);
            return Err(PipelineError::Superseded {
                run,
                current: state.run,
            });
        }
        state.in_flight = None;
        match &result {
            Ok(value) => {
                let status = apply(&mut state, value);
                info!("run {}: {}", run, status);
                state.status = status;
            }
            Err(err) => {
                warn!("run {} failed: {}", run, err);
                state.record_failure(err);
            }
        }
        result
    }

    async fn call<T, F>(
        &self,
        call: F,
        on_timeout: fn(String) -> PipelineError,
    ) -> Result<T, PipelineError>
    where
        F: Future<Output = Result<T, PipelineError>>,
    {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(on_timeout(format!(
                "no response within {}s",
                self.call_timeout.as_secs_f32()
            ))),
        }
    }

    /// Extracts fields and fingerprint from the selected source.
    ///
    /// Manual entry is validated before the extractor is called.
    pub async fn extract(&self) -> Result<Extraction, PipelineError> {
        let (run, source) = self.begin("Extracting metadata", |state| {
            state
                .source
                .clone()
                .ok_or(PipelineError::NothingSelected)?
                .prepare()
        })?;

        let result = self
            .call(self.extractor.extract(&source), PipelineError::ExtractionFailed)
            .await
            .and_then(accept_extraction);

        self.finish(run, result, |state, extraction| {
            state.extraction = Some(extraction.clone());
            state.verdict = None;
            "Metadata extracted successfully".to_string()
        })
    }
}

/// A fingerprint counts only when every field behind it was read. The
/// extractor hashes whatever it has, placeholders included.
fn accept_extraction(extraction: Extraction) -> Result<Extraction, PipelineError> {
    if extraction.fingerprint.is_empty() {
        return Err(PipelineError::MissingFingerprint);
    }
    let missing = extraction.fields.missing();
    if !missing.is_empty() {
        return Err(PipelineError::IncompleteExtraction { missing });
    }
    Ok(extraction)
}

/// Issue workflow: extract, store and register one certificate file.
pub struct IssuePipeline {
    session: Session,
    store: Arc<dyn ContentStore>,
    registry: Arc<dyn Registry>,
}

impl IssuePipeline {
    pub fn new(
        extractor: Arc<dyn FieldExtractor>,
        store: Arc<dyn ContentStore>,
        registry: Arc<dyn Registry>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            session: Session::new(extractor, call_timeout),
            store,
            registry,
        }
    }

    pub fn select_file(&self, file: CertificateFile) -> RunId {
        self.session.select_file(file)
    }

    pub async fn extract(&self) -> Result<Extraction, PipelineError> {
        self.session.extract().await
    }

    /// Uploads the selected file. Independent of extraction, so a failed
    /// upload can be retried without re-extracting.
    pub async fn store(&self) -> Result<Locator, PipelineError> {
        let (run, file) = self.session.begin("Uploading to IPFS", |state| {
            state
                .source
                .as_ref()
                .and_then(FieldSource::file)
                .cloned()
                .ok_or(PipelineError::NothingSelected)
        })?;

        let result = self
            .session
            .call(self.store.store(&file), PipelineError::StoreUnavailable)
            .await;

        self.session.finish(run, result, |state, locator| {
            state.locator = Some(locator.clone());
            format!("File uploaded to IPFS as {}", locator)
        })
    }

    /// Binds the held fingerprint's binding key to the held locator.
    ///
    /// Once the registry has answered `Unauthorized`, registration is refused
    /// locally for the rest of the session.
    pub async fn register(&self) -> Result<IssueReceipt, PipelineError> {
        let (run, (locator, binding_key)) = self.session.begin("Sending to blockchain", |state| {
            if state.registration_locked {
                return Err(PipelineError::Unauthorized);
            }
            let (Some(extraction), Some(locator)) = (&state.extraction, &state.locator) else {
                return Err(PipelineError::NotReady);
            };
            let binding_key = compute_binding_key(&extraction.fingerprint)?;
            Ok((locator.clone(), binding_key))
        })?;

        let result = self
            .session
            .call(
                self.registry.register(&locator, &binding_key),
                PipelineError::RegistryUnavailable,
            )
            .await
            .map(|receipt| IssueReceipt {
                binding_key,
                locator: locator.clone(),
                receipt,
            });

        self.session.finish(run, result, |state, issued| {
            state.receipt = Some(issued.receipt.clone());
            format!("Stored on blockchain in {}", issued.receipt)
        })
    }

    /// Runs every stage in order for `file`.
    pub async fn run(
        &self,
        file: CertificateFile,
    ) -> Result<(Extraction, IssueReceipt), PipelineError> {
        self.select_file(file);
        let extraction = self.extract().await?;
        self.store().await?;
        let receipt = self.register().await?;
        Ok((extraction, receipt))
    }

    pub fn snapshot(&self) -> Snapshot {
        self.session.snapshot()
    }
}

/// Verify workflow: re-derive the binding key and resolve it.
pub struct VerifyPipeline {
    session: Session,
    resolver: Arc<dyn Resolver>,
}

impl VerifyPipeline {
    pub fn new(
        extractor: Arc<dyn FieldExtractor>,
        resolver: Arc<dyn Resolver>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            session: Session::new(extractor, call_timeout),
            resolver,
        }
    }

    pub fn select_file(&self, file: CertificateFile) -> RunId {
        self.session.select_file(file)
    }

    pub fn enter_manual(&self, fields: CertificateFields) -> RunId {
        self.session.enter_manual(fields)
    }

    pub fn switch_mode(&self, mode: EntryMode) -> RunId {
        self.session.switch_mode(mode)
    }

    pub async fn extract(&self) -> Result<Extraction, PipelineError> {
        self.session.extract().await
    }

    pub async fn verify(&self) -> Result<Verification, PipelineError> {
        let (run, binding_key) = self.session.begin("Verifying on blockchain", |state| {
            let extraction = state.extraction.as_ref().ok_or(PipelineError::NotReady)?;
            compute_binding_key(&extraction.fingerprint)
        })?;

        let result = self
            .session
            .call(
                self.resolver.resolve(&binding_key),
                PipelineError::RegistryUnavailable,
            )
            .await
            .map(|found| match found {
                Some(locator) => Verification::Resolved {
                    binding_key,
                    locator,
                },
                None => Verification::NotFound { binding_key },
            });

        self.session.finish(run, result, |state, verification| {
            state.verdict = Some(verification.locator().cloned());
            match verification.locator() {
                Some(locator) => format!("Certificate is valid, stored at {}", locator),
                None => "Certificate not found on blockchain".to_string(),
            }
        })
    }

    /// Extracts from `source` and resolves the result.
    pub async fn run(
        &self,
        source: FieldSource,
    ) -> Result<(Extraction, Verification), PipelineError> {
        match source {
            FieldSource::File(file) => self.select_file(file),
            FieldSource::Manual(fields) => self.enter_manual(fields),
        };
        let extraction = self.extract().await?;
        let verification = self.verify().await?;
        Ok((extraction, verification))
    }

    pub fn snapshot(&self) -> Snapshot {
        self.session.snapshot()
    }
}
