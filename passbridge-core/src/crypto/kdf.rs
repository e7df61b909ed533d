//! Key derivation from the account master secret.
//!
//! - Root bundle: HKDF-SHA256 (no salt) over the master secret with the
//!   `oldsync` context label, 64 bytes split into encryption/HMAC halves.
//! - Client state: first 16 bytes of SHA-256(master secret), hex-encoded.
//!   The token server checks it on every session, so it must be stable.
//! - Collection bundle: the `crypto/keys` record decrypted with the root
//!   bundle; its `default` entry holds two base64 keys.

use crate::crypto::envelope::{decrypt_record, encrypt_record, Cleartext};
use crate::crypto::{CryptoError, KeyBundle, MasterSecret, Result};
use crate::sync::models::{EncryptedRecord, CRYPTO_COLLECTION, KEYS_RECORD_ID};
use base64::{engine::general_purpose::STANDARD, Engine};
use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use zeroize::Zeroize;

/// HKDF info label for the legacy sync key context.
pub const OLDSYNC_INFO: &[u8] = b"identity.mozilla.com/picl/v1/oldsync";

/// Derive the root key bundle from the master secret.
///
/// Pure: the same secret always yields the same bundle.
pub fn derive_root_bundle(master_secret: &MasterSecret) -> Result<KeyBundle> {
    let hkdf = Hkdf::<Sha256>::new(None, master_secret.as_bytes());
    let mut material = [0u8; 64];
    hkdf.expand(OLDSYNC_INFO, &mut material)
        .map_err(|e| CryptoError::KdfFailed(format!("HKDF expand failed: {}", e)))?;

    let bundle = KeyBundle::from_expanded(&material);
    material.zeroize();
    Ok(bundle)
}

/// Derive the `X-Client-State` value for the token server.
pub fn derive_client_state(master_secret: &MasterSecret) -> String {
    let digest = Sha256::digest(master_secret.as_bytes());
    hex::encode(&digest[..16])
}

/// Cleartext of the `crypto/keys` record.
#[derive(Debug, Default, Serialize, Deserialize)]
struct KeysCleartext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    collection: Option<String>,
    #[serde(default)]
    default: Option<Vec<String>>,
    #[serde(default)]
    collections: BTreeMap<String, Vec<String>>,
}

/// Decrypt the keys record and return the `default` collection bundle.
pub fn unwrap_collection_bundle(root: &KeyBundle, keys_record: &EncryptedRecord) -> Result<KeyBundle> {
    let keys = decrypt_keys(root, keys_record)?;
    let pair = keys
        .default
        .as_deref()
        .ok_or_else(|| CryptoError::InvalidKeyMaterial("keys record has no default entry".to_string()))?;
    decode_key_pair(pair)
}

/// Decrypt the keys record and return the bundle for `collection`.
///
/// A per-collection entry under `collections` wins over `default`.
pub fn unwrap_bundle_for(
    root: &KeyBundle,
    keys_record: &EncryptedRecord,
    collection: &str,
) -> Result<KeyBundle> {
    let keys = decrypt_keys(root, keys_record)?;
    match keys.collections.get(collection) {
        Some(pair) => decode_key_pair(pair),
        None => {
            let pair = keys.default.as_deref().ok_or_else(|| {
                CryptoError::InvalidKeyMaterial("keys record has no default entry".to_string())
            })?;
            decode_key_pair(pair)
        }
    }
}

/// Build a `crypto/keys` record holding `default`, encrypted under `root`.
///
/// This is what a fresh account stores on first sync.
pub fn build_keys_record(root: &KeyBundle, default: &KeyBundle) -> Result<EncryptedRecord> {
    let keys = KeysCleartext {
        id: Some(KEYS_RECORD_ID.to_string()),
        collection: Some(CRYPTO_COLLECTION.to_string()),
        default: Some(vec![
            STANDARD.encode(default.encryption_key()),
            STANDARD.encode(default.hmac_key()),
        ]),
        collections: BTreeMap::new(),
    };

    let cleartext: Cleartext = match serde_json::to_value(&keys) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => {
            return Err(CryptoError::EncryptionFailed(
                "Keys record did not serialize to an object".to_string(),
            ))
        }
    };
    encrypt_record(root, KEYS_RECORD_ID, &cleartext)
}

fn decrypt_keys(root: &KeyBundle, keys_record: &EncryptedRecord) -> Result<KeysCleartext> {
    let cleartext = decrypt_record(root, keys_record)?;
    serde_json::from_value(serde_json::Value::Object(cleartext))
        .map_err(|e| CryptoError::InvalidKeyMaterial(format!("Malformed keys record: {}", e)))
}

fn decode_key_pair(pair: &[String]) -> Result<KeyBundle> {
    let [encryption_key, hmac_key] = pair else {
        return Err(CryptoError::InvalidKeyMaterial(format!(
            "expected 2 keys, found {}",
            pair.len()
        )));
    };

    let mut encryption_key = STANDARD
        .decode(encryption_key)
        .map_err(|e| CryptoError::InvalidKeyMaterial(format!("encryption key: {}", e)))?;
    let mut hmac_key = STANDARD
        .decode(hmac_key)
        .map_err(|e| CryptoError::InvalidKeyMaterial(format!("HMAC key: {}", e)))?;

    let bundle = KeyBundle::from_slices(&encryption_key, &hmac_key);
    encryption_key.zeroize();
    hmac_key.zeroize();
    bundle
}
