// src/models/certificate.rs
//! Certificate field model.
//!
//! Defines the structured fields extracted from a certificate, the two ways of
//! supplying them (raw file or manual entry) and the extractor's result.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};

/// Placeholder the extractor writes for a field it could not read.
pub const NOT_FOUND_PLACEHOLDER: &str = "Not Found";

/// Field keys in display order.
pub const FIELD_KEYS: [&str; 5] = [
    "name",
    "register_number",
    "college",
    "passing_date",
    "cgpa",
];

/// Structured fields of a certificate.
///
/// Every field is optional for display, but all five must be present before a
/// fingerprint derived from them is accepted for registration.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateFields {
    /// Holder's name, without honorific
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// University register number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub register_number: Option<String>,

    /// College of study
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub college: Option<String>,

    /// Month and year of passing, e.g. "MAY-2021"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passing_date: Option<String>,

    /// Cumulative grade point average as printed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cgpa: Option<String>,
}

impl CertificateFields {
    pub fn new(
        name: &str,
        register_number: &str,
        college: &str,
        passing_date: &str,
        cgpa: &str,
    ) -> Self {
        Self {
            name: Some(name.to_string()),
            register_number: Some(register_number.to_string()),
            college: Some(college.to_string()),
            passing_date: Some(passing_date.to_string()),
            cgpa: Some(cgpa.to_string()),
        }
    }

    fn values(&self) -> [(&'static str, Option<&str>); 5] {
        let [name, register_number, college, passing_date, cgpa] = FIELD_KEYS;
        [
            (name, self.name.as_deref()),
            (register_number, self.register_number.as_deref()),
            (college, self.college.as_deref()),
            (passing_date, self.passing_date.as_deref()),
            (cgpa, self.cgpa.as_deref()),
        ]
    }

    /// Keys whose value is absent, blank, or the extractor's placeholder.
    pub fn missing(&self) -> Vec<&'static str> {
        self.values()
            .into_iter()
            .filter(|(_, value)| !is_present(*value))
            .map(|(key, _)| key)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }

    /// Trimmed, uppercased copy. "John Doe" and " JOHN DOE" normalise alike.
    pub fn normalized(&self) -> Self {
        let norm = |v: &Option<String>| v.as_ref().map(|s| s.trim().to_uppercase());
        Self {
            name: norm(&self.name),
            register_number: norm(&self.register_number),
            college: norm(&self.college),
            passing_date: norm(&self.passing_date),
            cgpa: norm(&self.cgpa),
        }
    }

    /// Fails with `IncompleteManualFields` unless all five keys are usable.
    pub fn require_complete(&self) -> Result<(), PipelineError> {
        let missing = self.missing();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::IncompleteManualFields { missing })
        }
    }
}

fn is_present(value: Option<&str>) -> bool {
    match value.map(str::trim) {
        Some(v) => !v.is_empty() && !v.eq_ignore_ascii_case(NOT_FOUND_PLACEHOLDER),
        None => false,
    }
}

/// Raw certificate file as selected by the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl CertificateFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let content_type = guess_content_type(&file_name).to_string();
        Self {
            file_name,
            content_type,
            bytes,
        }
    }
}

fn guess_content_type(file_name: &str) -> &'static str {
    let lower = file_name.to_lowercase();
    if lower.ends_with(".pdf") {
        "application/pdf"
    } else if lower.ends_with(".png") {
        "image/png"
    } else if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        "image/jpeg"
    } else {
        "application/octet-stream"
    }
}

/// Where certificate fields come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSource {
    /// The extractor reads the fields out of the file.
    File(CertificateFile),
    /// The operator typed the fields in.
    Manual(CertificateFields),
}

impl FieldSource {
    /// Checks what can be checked without a network call and applies
    /// normalisation to manual entry.
    pub fn prepare(self) -> Result<Self, PipelineError> {
        match self {
            FieldSource::File(file) => Ok(FieldSource::File(file)),
            FieldSource::Manual(fields) => {
                let fields = fields.normalized();
                fields.require_complete()?;
                Ok(FieldSource::Manual(fields))
            }
        }
    }

    pub fn file(&self) -> Option<&CertificateFile> {
        match self {
            FieldSource::File(file) => Some(file),
            FieldSource::Manual(_) => None,
        }
    }
}

/// Content identity of a certificate as computed by the extractor.
///
/// Opaque to this crate: compared and hashed, never parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the extractor hands back for one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Extraction {
    pub fields: CertificateFields,
    pub fingerprint: Fingerprint,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_trims_and_uppercases() {
        let fields = CertificateFields::new(" Jane Doe ", "r100", "X College", "May-2021", "8.9");
        let norm = fields.normalized();
        assert_eq!(norm.name.as_deref(), Some("JANE DOE"));
        assert_eq!(norm.register_number.as_deref(), Some("R100"));
        assert_eq!(norm.passing_date.as_deref(), Some("MAY-2021"));
        assert_eq!(norm, norm.normalized());
    }

    #[test]
    fn test_missing_treats_placeholder_and_blank_as_absent() {
        let mut fields = CertificateFields::new("Jane", "R1", "X", "MAY-2021", "8.9");
        assert!(fields.is_complete());

        fields.college = Some("  ".into());
        fields.cgpa = Some("not found".into());
        fields.name = None;
        assert_eq!(fields.missing(), vec!["name", "college", "cgpa"]);
        assert!(matches!(
            fields.require_complete(),
            Err(PipelineError::IncompleteManualFields { .. })
        ));
    }

    #[test]
    fn test_empty_fields_miss_every_key_in_display_order() {
        assert_eq!(CertificateFields::default().missing(), FIELD_KEYS.to_vec());
    }

    #[test]
    fn test_manual_source_prepare_rejects_incomplete() {
        let fields = CertificateFields {
            name: Some("Jane".into()),
            ..Default::default()
        };
        let err = FieldSource::Manual(fields).prepare().unwrap_err();
        assert_eq!(
            err,
            PipelineError::IncompleteManualFields {
                missing: vec!["register_number", "college", "passing_date", "cgpa"]
            }
        );
    }

    #[test]
    fn test_fields_deserialize_with_extra_keys() {
        let json = r#"{"name":"Jane","register_number":"R1","college":"X",
            "passing_date":"MAY-2021","cgpa":"8.9","metadata_hash":"abc"}"#;
        let fields: CertificateFields = serde_json::from_str(json).unwrap();
        assert!(fields.is_complete());
    }

    #[test]
    fn test_content_type_from_extension() {
        assert_eq!(CertificateFile::new("cert.PDF", vec![]).content_type, "application/pdf");
        assert_eq!(CertificateFile::new("scan.jpeg", vec![]).content_type, "image/jpeg");
        assert_eq!(
            CertificateFile::new("blob", vec![]).content_type,
            "application/octet-stream"
        );
    }
}
