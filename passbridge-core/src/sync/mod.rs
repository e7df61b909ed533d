//! Sync protocol client and reconciliation
//!
//! Talks to a sync 1.5 storage service:
//! - BrowserID token exchange, then Hawk-signed storage requests
//! - Paged collection listing as a lazy stream
//! - Import, fetch and age-based prune of the password collection
//!
//! The engine works against the [`storage::SyncStorage`] trait, so it runs
//! unchanged over the HTTP client or the in-memory store.

pub mod auth;
#[cfg(feature = "sync")]
pub mod client;
pub mod config;
pub mod engine;
pub mod models;
pub mod retention;
pub mod storage;

#[cfg(feature = "sync")]
pub use client::SyncClient;
pub use config::SyncSettings;
pub use engine::{ConfirmationGate, PruneReport, ReconciliationEngine, RunSummary};
pub use models::{EncryptedRecord, PASSWORDS_COLLECTION};
pub use storage::{MemoryStorage, SyncStorage};
