//! Record envelope: turns a cleartext JSON object into an encrypted BSO and back.
//!
//! The BSO `payload` field is itself a JSON string:
//!
//! ```text
//! {"ciphertext": base64(AES-256-CBC(json)), "IV": base64(iv), "hmac": hex(HMAC-SHA256(ciphertext_b64))}
//! ```
//!
//! The tag covers the base64 text exactly as stored, so it is checked before
//! anything is decoded.

use crate::crypto::cipher::{
    decrypt_cbc, encrypt_cbc, generate_iv, hmac_sha256_hex, verify_hmac_hex, BLOCK_SIZE,
};
use crate::crypto::{CryptoError, KeyBundle, Result};
use crate::sync::models::EncryptedRecord;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A decrypted record body: a flat JSON object.
pub type Cleartext = Map<String, Value>;

/// The JSON document carried in a BSO `payload` string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopePayload {
    /// Base64 AES-256-CBC ciphertext
    pub ciphertext: String,
    /// Base64 16-byte initialization vector
    #[serde(rename = "IV")]
    pub iv: String,
    /// Hex HMAC-SHA256 over `ciphertext`
    pub hmac: String,
}

impl EnvelopePayload {
    /// Parse the payload string of a BSO.
    pub fn parse(payload: &str) -> Result<Self> {
        serde_json::from_str(payload)
            .map_err(|e| CryptoError::DecryptionFailed(format!("Malformed payload: {}", e)))
    }
}

/// Encrypt a cleartext object into a BSO with the given id.
///
/// A fresh IV is drawn for every call, so encrypting the same object twice
/// yields different payloads.
pub fn encrypt_record(bundle: &KeyBundle, id: &str, cleartext: &Cleartext) -> Result<EncryptedRecord> {
    let json = serde_json::to_vec(cleartext)
        .map_err(|e| CryptoError::EncryptionFailed(format!("Serialize cleartext: {}", e)))?;

    let iv = generate_iv();
    let ciphertext = encrypt_cbc(bundle.encryption_key(), &iv, &json)?;
    let ciphertext = STANDARD.encode(ciphertext);
    let hmac = hmac_sha256_hex(bundle.hmac_key(), ciphertext.as_bytes())?;

    let payload = EnvelopePayload {
        ciphertext,
        iv: STANDARD.encode(iv),
        hmac,
    };
    let payload = serde_json::to_string(&payload)
        .map_err(|e| CryptoError::EncryptionFailed(format!("Serialize payload: {}", e)))?;

    Ok(EncryptedRecord::new(id, payload))
}

/// Verify and decrypt a BSO into its cleartext object.
///
/// # Security
/// - Returns [`CryptoError::AuthenticationFailed`] if the tag does not match;
///   nothing is decrypted in that case.
/// - Empty or corrupt ciphertext fails rather than producing empty output.
pub fn decrypt_record(bundle: &KeyBundle, record: &EncryptedRecord) -> Result<Cleartext> {
    let payload = EnvelopePayload::parse(&record.payload)?;

    if payload.ciphertext.is_empty() {
        return Err(CryptoError::DecryptionFailed(format!(
            "Record {} has empty ciphertext",
            record.id
        )));
    }

    verify_hmac_hex(bundle.hmac_key(), payload.ciphertext.as_bytes(), &payload.hmac)?;

    let iv: [u8; BLOCK_SIZE] = STANDARD
        .decode(&payload.iv)
        .map_err(|e| CryptoError::DecryptionFailed(format!("Invalid IV encoding: {}", e)))?
        .try_into()
        .map_err(|_| CryptoError::DecryptionFailed("IV must be 16 bytes".to_string()))?;
    let ciphertext = STANDARD
        .decode(&payload.ciphertext)
        .map_err(|e| CryptoError::DecryptionFailed(format!("Invalid ciphertext encoding: {}", e)))?;

    let plaintext = decrypt_cbc(bundle.encryption_key(), &iv, &ciphertext)?;

    match serde_json::from_slice(&plaintext) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(CryptoError::DecryptionFailed(
            "Cleartext is not a JSON object".to_string(),
        )),
        Err(e) => Err(CryptoError::DecryptionFailed(format!(
            "Cleartext is not JSON: {}",
            e
        ))),
    }
}
