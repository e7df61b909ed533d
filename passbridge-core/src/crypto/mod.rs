//! Cryptographic primitives for sync records.
//!
//! This module provides:
//! - AES-256-CBC with PKCS#7 padding and HMAC-SHA256 tags
//! - The record envelope (encrypt/decrypt of a single BSO payload)
//! - HKDF expansion of the account master secret into key bundles
//! - Zeroizing holders for key material

pub mod cipher;
pub mod envelope;
pub mod kdf;
pub mod keyring;

pub use envelope::{decrypt_record, encrypt_record, Cleartext, EnvelopePayload};
pub use kdf::{
    build_keys_record, derive_client_state, derive_root_bundle, unwrap_bundle_for,
    unwrap_collection_bundle,
};
pub use keyring::{KeyBundle, MasterSecret};

use thiserror::Error;

/// Errors that can occur in cryptographic operations
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Key derivation failed: {0}")]
    KdfFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("Authentication failed - data may have been tampered with")]
    AuthenticationFailed,
}

/// Result type for crypto operations
pub type Result<T> = std::result::Result<T, CryptoError>;
