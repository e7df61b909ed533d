//! Reconciliation engine: opens the password collection and imports, fetches,
//! or prunes its records.
//!
//! A run proceeds DeriveRoot -> FetchKeys -> UnwrapCollectionBundle -> Operate.
//! Any failure past validation aborts the rest of the batch. Records already
//! written or deleted remotely stay that way.

use crate::crypto::{
    decrypt_record, derive_root_bundle, encrypt_record, unwrap_bundle_for, Cleartext, KeyBundle,
    MasterSecret,
};
use crate::records::{
    current_time_millis, normalize_batch, record_id, to_wire_fields, CredentialRecord, RawLoginRow,
    SourceRows,
};
use crate::sync::models::{CRYPTO_COLLECTION, KEYS_RECORD_ID, PASSWORDS_COLLECTION};
use crate::sync::retention::partition_by_age;
use crate::sync::storage::SyncStorage;
use crate::{PassbridgeError, Result};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::fmt;
use tracing::{debug, info, warn};

/// Asks a human (or a test) before destructive remote changes.
pub trait ConfirmationGate: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> ConfirmationGate for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Per-run record counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} succeeded, {} skipped, {} failed",
            self.succeeded, self.skipped, self.failed
        )
    }
}

/// Result of a prune run.
#[derive(Debug, Clone, Default)]
pub struct PruneReport {
    /// Records older than the cutoff (or undated), left alone
    pub kept: usize,
    /// Whether the gate approved the deletion
    pub confirmed: bool,
    /// Deleted records count as succeeded; declined ones as skipped
    pub summary: RunSummary,
}

/// Drives one run against a [`SyncStorage`].
pub struct ReconciliationEngine<S: SyncStorage> {
    storage: S,
    concurrency: usize,
}

impl<S: SyncStorage> ReconciliationEngine<S> {
    pub fn new(storage: S, concurrency: usize) -> Self {
        Self {
            storage,
            concurrency: concurrency.max(1),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Derive the root bundle, fetch `crypto/keys`, and unwrap the bundle for
    /// the password collection.
    pub async fn open_collection(&self, master_secret: &MasterSecret) -> Result<KeyBundle> {
        let root = derive_root_bundle(master_secret)?;
        let keys = self
            .storage
            .get_record(CRYPTO_COLLECTION, KEYS_RECORD_ID)
            .await?;
        let bundle = unwrap_bundle_for(&root, &keys, PASSWORDS_COLLECTION)?;
        debug!("Unwrapped collection key bundle");
        Ok(bundle)
    }

    /// Normalize raw rows and import the valid ones.
    ///
    /// Rows failing validation are skipped and counted, never fatal.
    pub async fn import_rows(&self, bundle: &KeyBundle, rows: &[RawLoginRow]) -> Result<RunSummary> {
        let batch = normalize_batch(rows, current_time_millis());
        if batch.skipped > 0 {
            warn!("{} of {} rows failed validation", batch.skipped, rows.len());
        }
        self.upload(bundle, &batch.records, batch.skipped).await
    }

    /// Import everything a record source produced.
    ///
    /// Rows the source could not parse count as skipped alongside the
    /// ones rejected by validation.
    pub async fn import_source(&self, bundle: &KeyBundle, source: &SourceRows) -> Result<RunSummary> {
        let batch = normalize_batch(&source.rows, current_time_millis());
        let skipped = source.skipped + batch.skipped;
        if skipped > 0 {
            warn!(
                "{} of {} rows skipped",
                skipped,
                source.rows.len() + source.skipped
            );
        }
        self.upload(bundle, &batch.records, skipped).await
    }

    /// Encrypt, verify, and upload already normalized records.
    pub async fn import_records(
        &self,
        bundle: &KeyBundle,
        records: &[CredentialRecord],
    ) -> Result<RunSummary> {
        self.upload(bundle, records, 0).await
    }

    /// Decrypt every record in the password collection.
    ///
    /// An authentication failure on any record aborts the fetch.
    pub async fn fetch_all(&self, bundle: &KeyBundle) -> Result<Vec<Cleartext>> {
        let mut records = self.storage.get_records(PASSWORDS_COLLECTION);
        let mut cleartexts = Vec::new();
        while let Some(record) = records.try_next().await? {
            cleartexts.push(decrypt_record(bundle, &record)?);
        }
        debug!("Fetched {} records", cleartexts.len());
        Ok(cleartexts)
    }

    /// Delete records created at or after `cutoff`, once `gate` approves.
    pub async fn prune(
        &self,
        bundle: &KeyBundle,
        cutoff: i64,
        gate: &dyn ConfirmationGate,
    ) -> Result<PruneReport> {
        let records = self.fetch_all(bundle).await?;
        let total = records.len();
        let partition = partition_by_age(records, cutoff);

        let mut report = PruneReport {
            kept: partition.keep.len(),
            ..Default::default()
        };
        if partition.remove.is_empty() {
            info!("Nothing to prune ({} records kept)", report.kept);
            return Ok(report);
        }

        let mut ids = Vec::with_capacity(partition.remove.len());
        for record in &partition.remove {
            match record_id(record) {
                Some(id) => ids.push(id.to_string()),
                None => {
                    warn!("Record without id cannot be deleted");
                    report.summary.skipped += 1;
                }
            }
        }

        let since = chrono::DateTime::from_timestamp_millis(cutoff)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| cutoff.to_string());
        let prompt = format!(
            "Delete {} of {} records created since {}?",
            ids.len(),
            total,
            since
        );
        if !gate.confirm(&prompt) {
            info!("Prune declined, nothing deleted");
            report.summary.skipped += ids.len();
            return Ok(report);
        }
        report.confirmed = true;

        let mut deletes = stream::iter(&ids)
            .map(|id| async move {
                self.storage.delete_record(PASSWORDS_COLLECTION, id).await?;
                debug!(id = %id, "Deleted record");
                Ok::<_, PassbridgeError>(())
            })
            .buffer_unordered(self.concurrency);

        while let Some(result) = deletes.next().await {
            match result {
                Ok(()) => report.summary.succeeded += 1,
                Err(e) => {
                    report.summary.failed += 1;
                    return Err(PassbridgeError::Aborted {
                        summary: report.summary,
                        source: Box::new(e),
                    });
                }
            }
        }

        info!("Pruned records: {}", report.summary);
        Ok(report)
    }

    async fn upload(
        &self,
        bundle: &KeyBundle,
        records: &[CredentialRecord],
        skipped: usize,
    ) -> Result<RunSummary> {
        let mut summary = RunSummary {
            skipped,
            ..Default::default()
        };

        let mut uploads = stream::iter(records)
            .map(|record| self.upload_one(bundle, record))
            .buffer_unordered(self.concurrency);

        while let Some(result) = uploads.next().await {
            match result {
                Ok(()) => summary.succeeded += 1,
                Err(e) => {
                    summary.failed += 1;
                    return Err(PassbridgeError::Aborted {
                        summary,
                        source: Box::new(e),
                    });
                }
            }
        }

        info!("Imported records: {}", summary);
        if tracing::enabled!(tracing::Level::DEBUG) {
            self.log_remote_count().await;
        }
        Ok(summary)
    }

    async fn upload_one(&self, bundle: &KeyBundle, record: &CredentialRecord) -> Result<()> {
        let fields = to_wire_fields(record)?;
        let encrypted = encrypt_record(bundle, &record.id, &fields)?;

        let decrypted = decrypt_record(bundle, &encrypted)?;
        if decrypted != fields {
            return Err(PassbridgeError::Integrity(format!(
                "record {} did not survive an encrypt/decrypt round trip",
                record.id
            )));
        }

        self.storage
            .put_record(PASSWORDS_COLLECTION, &encrypted)
            .await?;
        debug!(id = %record.id, hostname = %record.hostname, "Uploaded record");
        Ok(())
    }

    async fn log_remote_count(&self) {
        let count = self
            .storage
            .get_records(PASSWORDS_COLLECTION)
            .try_fold(0usize, |n, _| async move { Ok(n + 1) })
            .await;
        match count {
            Ok(n) => debug!("Remote password collection now holds {} records", n),
            Err(e) => warn!("Could not count remote records: {}", e),
        }
    }
}
