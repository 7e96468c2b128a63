// src/error.rs
//! Error taxonomy for the certificate pipeline.
//!
//! Every failure a stage can produce is a [`PipelineError`]. The orchestrator
//! never panics on one of these: it records the error, returns the pipeline to
//! the state preceding the failed stage and hands the error back to the caller.

use serde::Serialize;
use thiserror::Error;

/// Failures surfaced by the extraction, storage and ledger stages.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    /// Manual entry is missing one or more of the five certificate fields.
    /// Raised locally, before any network call.
    #[error("manual entry is missing required fields: {}", .missing.join(", "))]
    IncompleteManualFields { missing: Vec<&'static str> },

    /// The extractor produced no usable fingerprint.
    #[error("extractor returned no fingerprint")]
    MissingFingerprint,

    /// The extractor produced a fingerprint, but over fields it could not
    /// read. Such a fingerprint is never accepted for registration.
    #[error("extracted certificate is missing fields: {}", .missing.join(", "))]
    IncompleteExtraction { missing: Vec<&'static str> },

    /// The extractor call failed or returned a malformed response.
    #[error("field extraction failed: {0}")]
    ExtractionFailed(String),

    /// The content store could not accept the upload.
    #[error("content store unavailable: {0}")]
    StoreUnavailable(String),

    /// The content store holds nothing under the requested locator.
    #[error("no stored content for {0}")]
    ContentNotFound(String),

    /// A registration for this binding key already exists on the ledger.
    #[error("certificate already registered")]
    DuplicateBinding,

    /// The caller is not the designated authority.
    #[error("caller is not authorized to register certificates")]
    Unauthorized,

    /// Transient ledger or node failure.
    #[error("registry unavailable: {0}")]
    RegistryUnavailable(String),

    /// The committing transaction ran out of gas or funds.
    #[error("insufficient resources for transaction: {0}")]
    InsufficientResources(String),

    /// A request body or path that cannot be interpreted.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// A stage was triggered before any file or manual entry was selected.
    #[error("no certificate source selected")]
    NothingSelected,

    /// A call for the current run is still outstanding.
    #[error("a stage is already in progress")]
    Busy,

    /// Registration needs both a fingerprint and a stored locator.
    #[error("fingerprint and locator are both required before registration")]
    NotReady,

    /// The response belongs to a run that has since been replaced.
    #[error("response for run {run} discarded, run {current} is active")]
    Superseded { run: u64, current: u64 },
}

/// Flat, serialisable discriminant of [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    IncompleteManualFields,
    MissingFingerprint,
    IncompleteExtraction,
    ExtractionFailed,
    StoreUnavailable,
    ContentNotFound,
    DuplicateBinding,
    Unauthorized,
    RegistryUnavailable,
    InsufficientResources,
    MalformedRequest,
    NothingSelected,
    Busy,
    NotReady,
    Superseded,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::IncompleteManualFields { .. } => ErrorKind::IncompleteManualFields,
            PipelineError::MissingFingerprint => ErrorKind::MissingFingerprint,
            PipelineError::IncompleteExtraction { .. } => ErrorKind::IncompleteExtraction,
            PipelineError::ExtractionFailed(_) => ErrorKind::ExtractionFailed,
            PipelineError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            PipelineError::ContentNotFound(_) => ErrorKind::ContentNotFound,
            PipelineError::DuplicateBinding => ErrorKind::DuplicateBinding,
            PipelineError::Unauthorized => ErrorKind::Unauthorized,
            PipelineError::RegistryUnavailable(_) => ErrorKind::RegistryUnavailable,
            PipelineError::InsufficientResources(_) => ErrorKind::InsufficientResources,
            PipelineError::MalformedRequest(_) => ErrorKind::MalformedRequest,
            PipelineError::NothingSelected => ErrorKind::NothingSelected,
            PipelineError::Busy => ErrorKind::Busy,
            PipelineError::NotReady => ErrorKind::NotReady,
            PipelineError::Superseded { .. } => ErrorKind::Superseded,
        }
    }

    /// Whether re-running the same stage with the same inputs may succeed.
    ///
    /// `DuplicateBinding` and `Unauthorized` are business outcomes and are
    /// never retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::ExtractionFailed(_)
                | PipelineError::StoreUnavailable(_)
                | PipelineError::RegistryUnavailable(_)
                | PipelineError::InsufficientResources(_)
        )
    }

    /// Operator-facing status line.
    pub fn status_message(&self) -> String {
        match self {
            PipelineError::IncompleteManualFields { missing } => {
                format!("Please fill in: {}", missing.join(", "))
            }
            PipelineError::MissingFingerprint => "Failed to extract metadata.".to_string(),
            PipelineError::IncompleteExtraction { missing } => {
                format!("Could not read from certificate: {}", missing.join(", "))
            }
            PipelineError::ExtractionFailed(reason) => {
                format!("Failed to extract metadata: {}", reason)
            }
            PipelineError::StoreUnavailable(_) => "Failed to upload file to IPFS.".to_string(),
            PipelineError::ContentNotFound(cid) => format!("Nothing stored under {}", cid),
            PipelineError::DuplicateBinding => {
                "Certificate already exists on blockchain".to_string()
            }
            PipelineError::Unauthorized => "Only admin can store certificates".to_string(),
            PipelineError::RegistryUnavailable(_) => {
                "Blockchain is unreachable, please retry".to_string()
            }
            PipelineError::InsufficientResources(_) => "Transaction ran out of gas".to_string(),
            PipelineError::MalformedRequest(reason) => format!("Invalid request: {}", reason),
            PipelineError::NothingSelected => "Please select a file first!".to_string(),
            PipelineError::Busy => "Please wait for the current step to finish".to_string(),
            PipelineError::NotReady => "Missing metadata hash or CID".to_string(),
            PipelineError::Superseded { .. } => "Discarded an outdated response".to_string(),
        }
    }
}

/// Maps a node or contract error text onto the ledger taxonomy.
///
/// Revert reasons come back embedded in provider error strings, so the match
/// is on substrings, case-insensitive.
pub fn classify_ledger_error(message: &str) -> PipelineError {
    let lower = message.to_lowercase();
    if lower.contains("already exists") {
        PipelineError::DuplicateBinding
    } else if lower.contains("not authorized") || lower.contains("unauthorized") {
        PipelineError::Unauthorized
    } else if lower.contains("insufficient funds")
        || lower.contains("out of gas")
        || lower.contains("gas required exceeds")
    {
        PipelineError::InsufficientResources(message.to_string())
    } else {
        PipelineError::RegistryUnavailable(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_revert_reasons() {
        assert_eq!(
            classify_ledger_error("execution reverted: Certificate already exists"),
            PipelineError::DuplicateBinding
        );
        assert_eq!(
            classify_ledger_error("execution reverted: Not authorized"),
            PipelineError::Unauthorized
        );
        assert_eq!(
            classify_ledger_error("insufficient funds for gas * price + value").kind(),
            ErrorKind::InsufficientResources
        );
        assert_eq!(
            classify_ledger_error("Out of gas").kind(),
            ErrorKind::InsufficientResources
        );
        assert_eq!(
            classify_ledger_error("error sending request for url").kind(),
            ErrorKind::RegistryUnavailable
        );
    }

    #[test]
    fn test_retryability() {
        assert!(PipelineError::RegistryUnavailable("x".into()).is_retryable());
        assert!(PipelineError::InsufficientResources("x".into()).is_retryable());
        assert!(PipelineError::StoreUnavailable("x".into()).is_retryable());
        assert!(!PipelineError::DuplicateBinding.is_retryable());
        assert!(!PipelineError::Unauthorized.is_retryable());
        assert!(!PipelineError::IncompleteManualFields { missing: vec!["name"] }.is_retryable());
        assert!(!PipelineError::IncompleteExtraction { missing: vec!["cgpa"] }.is_retryable());
        assert!(!PipelineError::ContentNotFound("QmMissing".into()).is_retryable());
    }

    #[test]
    fn test_incomplete_fields_message_lists_keys() {
        let err = PipelineError::IncompleteManualFields {
            missing: vec!["college", "cgpa"],
        };
        assert_eq!(
            err.to_string(),
            "manual entry is missing required fields: college, cgpa"
        );
        assert_eq!(err.status_message(), "Please fill in: college, cgpa");
    }
}
