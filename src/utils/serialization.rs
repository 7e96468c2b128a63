// src/utils/serialization.rs
//! Serialization utilities.
//!
//! JSON helpers shared by the HTTP clients, plus decoding of the base64 data
//! URLs browsers send for file uploads.

use serde::{Deserialize, Serialize};
use serde_json;

/// Serializes a value to a JSON string.
pub fn serialize<T: Serialize>(data: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(data)
}

/// Deserializes a value from a JSON string.
///
/// # Note
/// The lifetime parameter lets the result borrow from the input.
pub fn deserialize<'a, T: Deserialize<'a>>(data: &'a str) -> Result<T, serde_json::Error> {
    serde_json::from_str(data)
}

/// Decodes a `data:<mime>;base64,<payload>` URL, or a bare base64 payload.
pub fn decode_data_url(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let payload = match data.split_once(',') {
        Some((_, payload)) => payload,
        None => data,
    };
    base64::decode(payload.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_data_url() {
        let url = format!("data:application/pdf;base64,{}", base64::encode(b"%PDF-1.4"));
        assert_eq!(decode_data_url(&url).unwrap(), b"%PDF-1.4");
        assert_eq!(decode_data_url(&base64::encode(b"raw")).unwrap(), b"raw");
        assert!(decode_data_url("data:x;base64,***").is_err());
    }

    #[test]
    fn test_json_helpers() {
        let json = serialize(&serde_json::json!({"cid": "Qm1"})).unwrap();
        let value: serde_json::Value = deserialize(&json).unwrap();
        assert_eq!(value["cid"], "Qm1");
    }
}
