//! passbridge core library
//!
//! Moves browser credentials into a remote sync account. This crate holds the
//! envelope cryptography for sync records, key derivation from the account
//! master secret, the storage protocol client, and the reconciliation engine
//! that imports or prunes the password collection. Local credential sources
//! (Chrome `Login Data`, CSV exports) live alongside as thin collaborators.

pub mod config;
pub mod crypto;
pub mod import_export;
pub mod local;
pub mod platform;
pub mod records;
pub mod sync;

pub use config::PassbridgeConfig;
pub use crypto::{
    decrypt_record, derive_client_state, derive_root_bundle, encrypt_record,
    unwrap_collection_bundle, CryptoError, KeyBundle, MasterSecret,
};
pub use records::{
    current_time_millis, normalize_batch, normalize_import_row, CredentialRecord, RawLoginRow,
    SourceRows,
};
pub use sync::engine::{ConfirmationGate, PruneReport, ReconciliationEngine, RunSummary};
pub use sync::models::EncryptedRecord;
pub use sync::storage::{MemoryStorage, SyncStorage};

use thiserror::Error;

/// Result type for passbridge operations
pub type Result<T> = std::result::Result<T, PassbridgeError>;

/// General error type for passbridge operations
#[derive(Error, Debug)]
pub enum PassbridgeError {
    /// A primitive failure that is not an authentication mismatch.
    #[error("Crypto error: {0}")]
    Crypto(CryptoError),

    /// Malformed input record. Recoverable: the record is skipped.
    #[error("Invalid record: {0}")]
    Validation(String),

    /// Authentication tag mismatch or failed round-trip verification.
    #[error("Integrity check failed: {0}")]
    Integrity(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Remote service returned {status}: {body}")]
    RemoteService { status: u16, body: String },

    /// Missing or invalid key material or settings. Fatal before any network call.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Local credential store error: {0}")]
    LocalStore(String),

    /// A batch stopped part way through. Changes already committed remotely stay.
    #[error("Run aborted ({summary}): {source}")]
    Aborted {
        summary: RunSummary,
        #[source]
        source: Box<PassbridgeError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PassbridgeError {
    /// Whether the enclosing batch may continue after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<CryptoError> for PassbridgeError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::AuthenticationFailed => {
                Self::Integrity("authentication tag mismatch".to_string())
            }
            CryptoError::InvalidKeyLength { .. } | CryptoError::InvalidKeyMaterial(_) => {
                Self::Configuration(err.to_string())
            }
            other => Self::Crypto(other),
        }
    }
}

impl From<serde_json::Error> for PassbridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<rusqlite::Error> for PassbridgeError {
    fn from(err: rusqlite::Error) -> Self {
        Self::LocalStore(err.to_string())
    }
}

impl From<csv::Error> for PassbridgeError {
    fn from(err: csv::Error) -> Self {
        Self::Serialization(format!("CSV: {}", err))
    }
}
