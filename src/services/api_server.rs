// src/services/api_server.rs
//! API Server for the certificate registry
//!
//! REST surface over the issue and verify workflows. Every request runs in
//! its own pipeline session; the collaborators behind them are shared.
//!
//! Endpoints:
//! - `POST /issue` (multipart `certificate`) runs extract, store, register
//! - `POST /verify-certificate` (multipart `certificate`) and
//!   `POST /verify-manual` (JSON fields) run extract, resolve
//! - `POST /verify` resolves a binding key directly
//! - `POST /api/upload-ipfs` stores a base64 data URL
//! - `GET /api/config` exposes the contract and authority addresses
//! - `GET /certificate/:cid` returns stored bytes

use crate::error::{ErrorKind, PipelineError};
use crate::models::certificate::{CertificateFields, CertificateFile, Extraction, FieldSource};
use crate::models::registration::{BindingKey, Locator};
use crate::services::extractor::FieldExtractor;
use crate::services::pipeline::{IssuePipeline, Verification, VerifyPipeline};
use crate::services::registry::{Registry, Resolver};
use crate::storage::ContentStore;
use crate::utils::serialization::decode_data_url;
use axum::{
    extract::{Json, Multipart, Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// Request payload for a direct binding key lookup
#[derive(Deserialize)]
struct VerifyRequest {
    metadata_hash: String,
}

/// Request payload for storing a file sent as a data URL
#[derive(Deserialize)]
struct UploadRequest {
    file: String,
    #[serde(default)]
    filetype: Option<String>,
}

#[derive(Serialize)]
struct UploadResponse {
    cid: String,
    gateway_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigResponse {
    contract_address: String,
    admin_address: String,
}

#[derive(Serialize)]
struct IssueResponse {
    #[serde(flatten)]
    fields: CertificateFields,
    metadata_hash: String,
    binding_key: BindingKey,
    cid: String,
    gateway_url: String,
    tx_hash: String,
    message: String,
}

#[derive(Serialize)]
struct VerifyCertificateResponse {
    valid: bool,
    #[serde(flatten)]
    fields: CertificateFields,
    metadata_hash: String,
    binding_key: BindingKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    cid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    gateway_url: Option<String>,
    message: String,
}

/// Error body shared by every endpoint.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    kind: ErrorKind,
    message: String,
    retryable: bool,
}

/// Pipeline failure rendered as an HTTP response.
struct ApiError(PipelineError);

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        ApiError(err)
    }
}

fn status_for(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::IncompleteManualFields { .. }
        | PipelineError::NothingSelected
        | PipelineError::NotReady
        | PipelineError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
        PipelineError::MissingFingerprint | PipelineError::IncompleteExtraction { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        PipelineError::ContentNotFound(_) => StatusCode::NOT_FOUND,
        PipelineError::Unauthorized => StatusCode::FORBIDDEN,
        PipelineError::DuplicateBinding
        | PipelineError::Busy
        | PipelineError::Superseded { .. } => StatusCode::CONFLICT,
        PipelineError::ExtractionFailed(_) => StatusCode::BAD_GATEWAY,
        PipelineError::StoreUnavailable(_)
        | PipelineError::RegistryUnavailable(_)
        | PipelineError::InsufficientResources(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!("request failed: {}", self.0);
        } else {
            warn!("request rejected: {}", self.0);
        }
        let body = ErrorResponse {
            error: self.0.to_string(),
            kind: self.0.kind(),
            message: self.0.status_message(),
            retryable: self.0.is_retryable(),
        };
        (status, Json(body)).into_response()
    }
}

/// Connection settings exposed to the operator UI.
#[derive(Clone, Debug)]
pub struct ServerSettings {
    pub contract_address: String,
    pub authority_address: String,
    pub call_timeout: Duration,
    pub allowed_origins: Vec<String>,
}

/// API server state containing all service dependencies
#[derive(Clone)]
pub struct ApiServer {
    extractor: Arc<dyn FieldExtractor>,
    store: Arc<dyn ContentStore>,
    registry: Arc<dyn Registry>,
    resolver: Arc<dyn Resolver>,
    settings: ServerSettings,
}

impl ApiServer {
    pub fn new(
        extractor: Arc<dyn FieldExtractor>,
        store: Arc<dyn ContentStore>,
        registry: Arc<dyn Registry>,
        resolver: Arc<dyn Resolver>,
        settings: ServerSettings,
    ) -> Self {
        Self {
            extractor,
            store,
            registry,
            resolver,
            settings,
        }
    }

    fn cors(&self) -> CorsLayer {
        let origins: Vec<HeaderValue> = self
            .settings
            .allowed_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("ignoring invalid CORS origin {:?}", origin);
                    None
                }
            })
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(Any)
    }

    /// Builds the router with all routes and shared state
    pub fn router(&self) -> Router {
        Router::new()
            .route("/issue", post(Self::issue_handler))
            .route("/verify", post(Self::verify_handler))
            .route("/verify-certificate", post(Self::verify_certificate_handler))
            .route("/verify-manual", post(Self::verify_manual_handler))
            .route("/api/upload-ipfs", post(Self::upload_handler))
            .route("/api/config", get(Self::config_handler))
            .route("/certificate/:cid", get(Self::certificate_handler))
            .layer(self.cors())
            .with_state(Arc::new(self.clone()))
    }

    /// Starts the API server and serves until the listener fails
    pub async fn run(&self, addr: SocketAddr) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("API server listening on http://{}", addr);
        axum::serve(listener, self.router()).await
    }

    fn issue_pipeline(&self) -> IssuePipeline {
        IssuePipeline::new(
            self.extractor.clone(),
            self.store.clone(),
            self.registry.clone(),
            self.settings.call_timeout,
        )
    }

    fn verify_pipeline(&self) -> VerifyPipeline {
        VerifyPipeline::new(
            self.extractor.clone(),
            self.resolver.clone(),
            self.settings.call_timeout,
        )
    }

    async fn timed<T>(
        &self,
        call: impl std::future::Future<Output = Result<T, PipelineError>>,
        on_timeout: fn(String) -> PipelineError,
    ) -> Result<T, PipelineError> {
        tokio::time::timeout(self.settings.call_timeout, call)
            .await
            .unwrap_or_else(|_| Err(on_timeout("request timed out".to_string())))
    }

    /// Runs the full Issue workflow for an uploaded certificate
    ///
    /// # Endpoint
    /// POST /issue
    ///
    /// # Responses
    /// - 200 OK: fields, fingerprint, binding key, CID and transaction hash
    /// - 403 Forbidden: signer is not the admin
    /// - 409 Conflict: certificate already registered
    /// - 422 Unprocessable Entity: fields could not be read from the file
    async fn issue_handler(
        State(state): State<Arc<ApiServer>>,
        multipart: Multipart,
    ) -> Result<Json<IssueResponse>, ApiError> {
        let file = read_certificate(multipart).await?;
        let pipeline = state.issue_pipeline();
        let (extraction, issued) = pipeline.run(file).await?;

        Ok(Json(IssueResponse {
            fields: extraction.fields,
            metadata_hash: extraction.fingerprint.0,
            binding_key: issued.binding_key,
            gateway_url: state.store.gateway_link(&issued.locator),
            cid: issued.locator.0,
            tx_hash: issued.receipt.0,
            message: pipeline.snapshot().status,
        }))
    }

    /// Resolves a binding key
    ///
    /// # Endpoint
    /// POST /verify
    ///
    /// # Responses
    /// - 200 OK: `{valid: true, cid}`
    /// - 404 Not Found: no registration for the key
    /// - 400 Bad Request: malformed key
    /// - 500 Internal Server Error: ledger query failed
    async fn verify_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<VerifyRequest>,
    ) -> impl IntoResponse {
        let binding_key: BindingKey = match payload.metadata_hash.parse() {
            Ok(key) => key,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "valid": false, "error": format!("{}", e) })),
                )
            }
        };

        match state
            .timed(
                state.resolver.resolve(&binding_key),
                PipelineError::RegistryUnavailable,
            )
            .await
        {
            Ok(Some(locator)) => (
                StatusCode::OK,
                Json(json!({
                    "valid": true,
                    "cid": locator.as_str(),
                    "message": "Certificate is valid",
                })),
            ),
            Ok(None) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "valid": false, "message": "Certificate not found" })),
            ),
            Err(e) => {
                error!("verification query failed: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "valid": false, "error": e.to_string() })),
                )
            }
        }
    }

    /// Verifies an uploaded certificate
    ///
    /// # Endpoint
    /// POST /verify-certificate
    async fn verify_certificate_handler(
        State(state): State<Arc<ApiServer>>,
        multipart: Multipart,
    ) -> Result<Json<VerifyCertificateResponse>, ApiError> {
        let file = read_certificate(multipart).await?;
        state.verify(FieldSource::File(file)).await
    }

    /// Verifies manually entered certificate fields
    ///
    /// # Endpoint
    /// POST /verify-manual
    async fn verify_manual_handler(
        State(state): State<Arc<ApiServer>>,
        Json(fields): Json<CertificateFields>,
    ) -> Result<Json<VerifyCertificateResponse>, ApiError> {
        state.verify(FieldSource::Manual(fields)).await
    }

    async fn verify(
        &self,
        source: FieldSource,
    ) -> Result<Json<VerifyCertificateResponse>, ApiError> {
        let pipeline = self.verify_pipeline();
        let (extraction, verification) = pipeline.run(source).await?;
        Ok(Json(self.verification_body(
            extraction,
            verification,
            pipeline.snapshot().status,
        )))
    }

    fn verification_body(
        &self,
        extraction: Extraction,
        verification: Verification,
        message: String,
    ) -> VerifyCertificateResponse {
        VerifyCertificateResponse {
            valid: verification.locator().is_some(),
            fields: extraction.fields,
            metadata_hash: extraction.fingerprint.0,
            binding_key: verification.binding_key(),
            gateway_url: verification.locator().map(|l| self.store.gateway_link(l)),
            cid: verification.locator().map(|l| l.0.clone()),
            message,
        }
    }

    /// Stores a file sent as a base64 data URL
    ///
    /// # Endpoint
    /// POST /api/upload-ipfs
    async fn upload_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<UploadRequest>,
    ) -> Result<Json<UploadResponse>, ApiError> {
        let bytes = decode_data_url(&payload.file)
            .map_err(|e| PipelineError::MalformedRequest(format!("file is not base64: {}", e)))?;
        let extension = match payload.filetype.as_deref() {
            Some("application/pdf") => "pdf",
            Some("image/jpeg") => "jpg",
            _ => "png",
        };
        let file = CertificateFile::new(format!("certificate.{}", extension), bytes);
        let locator = state
            .timed(state.store.store(&file), PipelineError::StoreUnavailable)
            .await?;
        Ok(Json(UploadResponse {
            gateway_url: state.store.gateway_link(&locator),
            cid: locator.0,
        }))
    }

    /// Returns the contract and admin addresses
    ///
    /// # Endpoint
    /// GET /api/config
    async fn config_handler(State(state): State<Arc<ApiServer>>) -> impl IntoResponse {
        Json(ConfigResponse {
            contract_address: state.settings.contract_address.clone(),
            admin_address: state.settings.authority_address.clone(),
        })
    }

    /// Returns the stored bytes behind a CID
    ///
    /// # Endpoint
    /// GET /certificate/:cid
    ///
    /// # Responses
    /// - 400 Bad Request: blank CID
    /// - 404 Not Found: nothing stored under the CID
    async fn certificate_handler(
        State(state): State<Arc<ApiServer>>,
        Path(cid): Path<String>,
    ) -> Result<Response, ApiError> {
        let locator = Locator::parse(&cid)
            .ok_or_else(|| PipelineError::MalformedRequest("blank cid".to_string()))?;
        let bytes = state
            .timed(state.store.fetch(&locator), PipelineError::StoreUnavailable)
            .await?;
        Ok(([(header::CONTENT_TYPE, "application/octet-stream")], bytes).into_response())
    }
}

/// Reads the `certificate` part of a multipart upload.
async fn read_certificate(mut multipart: Multipart) -> Result<CertificateFile, PipelineError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| PipelineError::NothingSelected)?
    {
        if field.name() != Some("certificate") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("certificate").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|_| PipelineError::NothingSelected)?;
        if bytes.is_empty() {
            return Err(PipelineError::NothingSelected);
        }
        return Ok(CertificateFile::new(file_name, bytes.to_vec()));
    }
    Err(PipelineError::NothingSelected)
}
