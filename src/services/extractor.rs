// src/services/extractor.rs
//! Field extraction client.
//!
//! The extraction service turns a certificate into structured fields plus the
//! canonical fingerprint (`metadata_hash`). Both input variants go through the
//! single [`FieldExtractor::extract`] entry point so file and manual entry
//! share one set of validation rules.

use crate::error::PipelineError;
use crate::models::certificate::{CertificateFields, Extraction, FieldSource, Fingerprint};
use crate::utils::serialization::deserialize;
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

#[async_trait]
pub trait FieldExtractor: Send + Sync {
    /// Extracts fields and fingerprint from `source`.
    ///
    /// # Errors
    /// - `IncompleteManualFields` for manual entry missing a key (no call made)
    /// - `ExtractionFailed` for transport errors or a malformed response
    /// - `MissingFingerprint` when the service returns an empty fingerprint
    async fn extract(&self, source: &FieldSource) -> Result<Extraction, PipelineError>;
}

/// Body returned by both extraction endpoints.
#[derive(Deserialize)]
struct ExtractionResponse {
    #[serde(flatten)]
    fields: CertificateFields,
    #[serde(default)]
    metadata_hash: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP client for the extraction service.
///
/// - `POST {base}/upload` with the file in the `certificate` multipart part
/// - `POST {base}/extract-manual` with the five fields as JSON
#[derive(Clone)]
pub struct HttpExtractor {
    http: reqwest::Client,
    base_url: String,
}

impl HttpExtractor {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post(&self, source: &FieldSource) -> Result<reqwest::Response, reqwest::Error> {
        match source {
            FieldSource::File(file) => {
                let part = Part::bytes(file.bytes.clone())
                    .file_name(file.file_name.clone())
                    .mime_str(&file.content_type)?;
                self.http
                    .post(format!("{}/upload", self.base_url))
                    .multipart(Form::new().part("certificate", part))
                    .send()
                    .await
            }
            FieldSource::Manual(fields) => {
                self.http
                    .post(format!("{}/extract-manual", self.base_url))
                    .json(fields)
                    .send()
                    .await
            }
        }
    }
}

#[async_trait]
impl FieldExtractor for HttpExtractor {
    async fn extract(&self, source: &FieldSource) -> Result<Extraction, PipelineError> {
        let source = source.clone().prepare()?;

        let response = self
            .post(&source)
            .await
            .map_err(|e| PipelineError::ExtractionFailed(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PipelineError::ExtractionFailed(e.to_string()))?;

        let parsed: Option<ExtractionResponse> = deserialize(&body).ok();
        if !status.is_success() {
            let reason = parsed
                .and_then(|r| r.error)
                .unwrap_or_else(|| format!("extractor returned {}", status));
            warn!("extraction rejected: {}", reason);
            return Err(PipelineError::ExtractionFailed(reason));
        }

        let parsed = parsed.ok_or_else(|| {
            PipelineError::ExtractionFailed("malformed extractor response".to_string())
        })?;
        let metadata_hash = parsed.metadata_hash.ok_or_else(|| {
            PipelineError::ExtractionFailed("response has no metadata_hash".to_string())
        })?;
        let fingerprint = Fingerprint(metadata_hash.trim().to_string());
        if fingerprint.is_empty() {
            return Err(PipelineError::MissingFingerprint);
        }

        debug!("extracted fingerprint {}", fingerprint);
        Ok(Extraction {
            fields: parsed.fields,
            fingerprint,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::certificate::CertificateFile;
    use crate::test_utils::{jane_doe, spawn_stub};
    use axum::{extract::Multipart, http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};

    async fn upload(mut multipart: Multipart) -> (StatusCode, Json<Value>) {
        while let Ok(Some(field)) = multipart.next_field().await {
            if field.name() == Some("certificate") {
                let bytes = field.bytes().await.unwrap_or_default();
                return match &bytes[..] {
                    b"no-hash" => (StatusCode::OK, Json(json!({ "name": "JANE DOE" }))),
                    b"empty-hash" => (
                        StatusCode::OK,
                        Json(json!({ "name": "JANE DOE", "metadata_hash": "" })),
                    ),
                    b"unreadable" => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({ "error": "cannot identify image file" })),
                    ),
                    _ => (
                        StatusCode::OK,
                        Json(json!({
                            "name": "JANE DOE", "register_number": "R100",
                            "college": "X COLLEGE", "passing_date": "MAY-2021",
                            "cgpa": "8.9", "metadata_hash": "abc123"
                        })),
                    ),
                };
            }
        }
        (StatusCode::BAD_REQUEST, Json(json!({ "error": "No file selected" })))
    }

    async fn manual(Json(fields): Json<CertificateFields>) -> Json<Value> {
        // Echo what arrived so the test can see the normalised form
        Json(json!({
            "name": fields.name, "register_number": fields.register_number,
            "college": fields.college, "passing_date": fields.passing_date,
            "cgpa": fields.cgpa, "metadata_hash": "manual-hash"
        }))
    }

    async fn extractor() -> HttpExtractor {
        let base = spawn_stub(
            Router::new()
                .route("/upload", post(upload))
                .route("/extract-manual", post(manual)),
        )
        .await;
        HttpExtractor::new(reqwest::Client::new(), &base)
    }

    fn file(bytes: &[u8]) -> FieldSource {
        FieldSource::File(CertificateFile::new("cert.png", bytes.to_vec()))
    }

    #[tokio::test]
    async fn test_file_extraction() {
        let extraction = extractor().await.extract(&file(b"scan")).await.unwrap();
        assert_eq!(extraction.fingerprint, Fingerprint("abc123".into()));
        assert_eq!(extraction.fields.register_number.as_deref(), Some("R100"));
    }

    #[tokio::test]
    async fn test_missing_metadata_hash_is_contract_violation() {
        let err = extractor().await.extract(&file(b"no-hash")).await.unwrap_err();
        assert!(
            matches!(err, PipelineError::ExtractionFailed(ref m) if m.contains("metadata_hash"))
        );
    }

    #[tokio::test]
    async fn test_empty_metadata_hash_is_missing_fingerprint() {
        let err = extractor().await.extract(&file(b"empty-hash")).await.unwrap_err();
        assert_eq!(err, PipelineError::MissingFingerprint);
    }

    #[tokio::test]
    async fn test_server_reason_is_passed_through() {
        let err = extractor().await.extract(&file(b"unreadable")).await.unwrap_err();
        assert_eq!(
            err,
            PipelineError::ExtractionFailed("cannot identify image file".into())
        );
    }

    #[tokio::test]
    async fn test_manual_fields_are_normalised_before_sending() {
        let mut fields = jane_doe();
        fields.name = Some("  jane doe ".into());
        let extraction = extractor()
            .await
            .extract(&FieldSource::Manual(fields))
            .await
            .unwrap();
        assert_eq!(extraction.fields.name.as_deref(), Some("JANE DOE"));
        assert_eq!(extraction.fingerprint.as_str(), "manual-hash");
    }

    #[tokio::test]
    async fn test_incomplete_manual_fields_fail_without_call() {
        // Unroutable base URL: any request would surface as ExtractionFailed
        let extractor = HttpExtractor::new(reqwest::Client::new(), "http://127.0.0.1:1");
        let mut fields = jane_doe();
        fields.cgpa = None;
        let err = extractor.extract(&FieldSource::Manual(fields)).await.unwrap_err();
        assert_eq!(
            err,
            PipelineError::IncompleteManualFields { missing: vec!["cgpa"] }
        );
    }
}
