//! Storage seam between the reconciliation engine and the remote service.

use crate::crypto::{build_keys_record, KeyBundle};
use crate::sync::models::{EncryptedRecord, CRYPTO_COLLECTION};
use crate::{PassbridgeError, Result};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// A lazy, finite, non-restartable sequence of records.
pub type RecordStream<'a> = BoxStream<'a, Result<EncryptedRecord>>;

/// The four storage operations the engine needs.
#[async_trait]
pub trait SyncStorage: Send + Sync {
    /// Fetch one record. A missing record is a `RemoteService` 404.
    async fn get_record(&self, collection: &str, id: &str) -> Result<EncryptedRecord>;

    /// Stream every record of a collection.
    fn get_records<'a>(&'a self, collection: &'a str) -> RecordStream<'a>;

    /// Create or replace a record.
    async fn put_record(&self, collection: &str, record: &EncryptedRecord) -> Result<()>;

    async fn delete_record(&self, collection: &str, id: &str) -> Result<()>;
}

type Collections = BTreeMap<String, BTreeMap<String, EncryptedRecord>>;

/// In-process storage with the same semantics as the remote service.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    collections: Mutex<Collections>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose `crypto/keys` record wraps `collection` under `root`.
    pub fn with_keys(root: &KeyBundle, collection: &KeyBundle) -> Result<Self> {
        let storage = Self::new();
        let keys = build_keys_record(root, collection)?;
        storage.insert(CRYPTO_COLLECTION, keys)?;
        Ok(storage)
    }

    /// Ids currently stored in `collection`, sorted.
    pub fn ids(&self, collection: &str) -> Result<Vec<String>> {
        let collections = self.lock()?;
        Ok(collections
            .get(collection)
            .map(|records| records.keys().cloned().collect())
            .unwrap_or_default())
    }

    /// Snapshot of every record in `collection`.
    pub fn snapshot(&self, collection: &str) -> Result<Vec<EncryptedRecord>> {
        let collections = self.lock()?;
        Ok(collections
            .get(collection)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default())
    }

    fn insert(&self, collection: &str, record: EncryptedRecord) -> Result<()> {
        self.lock()?
            .entry(collection.to_string())
            .or_default()
            .insert(record.id.clone(), record);
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Collections>> {
        self.collections
            .lock()
            .map_err(|_| PassbridgeError::LocalStore("memory storage lock poisoned".to_string()))
    }
}

fn not_found(collection: &str, id: &str) -> PassbridgeError {
    PassbridgeError::RemoteService {
        status: 404,
        body: format!("{}/{} not found", collection, id),
    }
}

#[async_trait]
impl SyncStorage for MemoryStorage {
    async fn get_record(&self, collection: &str, id: &str) -> Result<EncryptedRecord> {
        self.lock()?
            .get(collection)
            .and_then(|records| records.get(id))
            .cloned()
            .ok_or_else(|| not_found(collection, id))
    }

    fn get_records<'a>(&'a self, collection: &'a str) -> RecordStream<'a> {
        match self.snapshot(collection) {
            Ok(records) => stream::iter(records.into_iter().map(Ok)).boxed(),
            Err(e) => stream::once(async move { Err(e) }).boxed(),
        }
    }

    async fn put_record(&self, collection: &str, record: &EncryptedRecord) -> Result<()> {
        self.insert(collection, record.clone())
    }

    async fn delete_record(&self, collection: &str, id: &str) -> Result<()> {
        self.lock()?
            .get_mut(collection)
            .and_then(|records| records.remove(id))
            .map(|_| ())
            .ok_or_else(|| not_found(collection, id))
    }
}
