//! Sync data models: wire format, collection names, token server response.

use serde::{Deserialize, Serialize};

/// Collection holding the single `keys` record.
pub const CRYPTO_COLLECTION: &str = "crypto";
/// Id of the record carrying the collection key bundles.
pub const KEYS_RECORD_ID: &str = "keys";
/// Collection holding saved logins.
pub const PASSWORDS_COLLECTION: &str = "passwords";

/// A Basic Storage Object as stored on the sync server.
///
/// `payload` is an opaque JSON string (see [`crate::crypto::EnvelopePayload`]).
/// `modified` and `sortindex` are server-populated and only read back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptedRecord {
    pub id: String,
    pub payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sortindex: Option<i64>,
}

impl EncryptedRecord {
    /// Create a record ready for upload.
    pub fn new(id: &str, payload: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            payload: payload.into(),
            modified: None,
            sortindex: None,
        }
    }
}

/// Token server response for the sync 1.5 service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Hawk credentials id
    pub id: String,
    /// Hawk credentials key
    pub key: String,
    pub uid: u64,
    /// Base URL for `/storage/...` requests
    pub api_endpoint: String,
    /// Token lifetime in seconds
    pub duration: u64,
    #[serde(default)]
    pub hashed_fxa_uid: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_omits_server_fields() {
        let record = EncryptedRecord::new("{abc}", "{}");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json, serde_json::json!({ "id": "{abc}", "payload": "{}" }));
    }

    #[test]
    fn server_record_deserializes() {
        let record: EncryptedRecord = serde_json::from_str(
            r#"{"id":"keys","modified":1700000000.25,"payload":"{\"IV\":\"\"}","sortindex":5}"#,
        )
        .unwrap();
        assert_eq!(record.id, "keys");
        assert_eq!(record.modified, Some(1700000000.25));
        assert_eq!(record.sortindex, Some(5));
    }

    #[test]
    fn token_response_deserializes() {
        let token: TokenResponse = serde_json::from_str(
            r#"{"id":"tok","key":"sekrit","uid":42,"api_endpoint":"https://sync.example.com/1.5/42","duration":3600}"#,
        )
        .unwrap();
        assert_eq!(token.uid, 42);
        assert_eq!(token.api_endpoint, "https://sync.example.com/1.5/42");
        assert!(token.hashed_fxa_uid.is_none());
    }
}
