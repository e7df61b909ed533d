//! Import, fetch and prune against an in-memory sync account.

use passbridge_core::crypto::{derive_root_bundle, KeyBundle, MasterSecret};
use passbridge_core::import_export::{read_rows_csv, write_rows_csv};
use passbridge_core::records::{normalize_batch, CredentialRecord, RawLoginRow};
use passbridge_core::sync::retention::age_cutoff;
use passbridge_core::sync::PASSWORDS_COLLECTION;
use passbridge_core::{MemoryStorage, PassbridgeError, ReconciliationEngine};
use std::collections::HashSet;

fn account() -> (MasterSecret, KeyBundle, MemoryStorage) {
    let master = MasterSecret::new((0u8..32).collect()).unwrap();
    let collection = KeyBundle::random();
    let root = derive_root_bundle(&master).unwrap();
    let storage = MemoryStorage::with_keys(&root, &collection).unwrap();
    (master, collection, storage)
}

fn rows() -> Vec<RawLoginRow> {
    ["https://a.example.com/", "https://b.example.com/login/", "http://c.example.org:8080"]
        .iter()
        .enumerate()
        .map(|(i, hostname)| RawLoginRow {
            hostname: hostname.to_string(),
            username: Some(format!("user{}", i)),
            password: format!("password-{}", i),
            ..Default::default()
        })
        .collect()
}

#[tokio::test]
async fn three_records_survive_upload_and_fetch() {
    let (master, expected_bundle, storage) = account();
    let engine = ReconciliationEngine::new(storage, 4);

    let bundle = engine.open_collection(&master).await.unwrap();
    assert_eq!(bundle, expected_bundle);

    let batch = normalize_batch(&rows(), 1_700_000_000_000);
    assert_eq!(batch.records.len(), 3);
    let summary = engine.import_records(&bundle, &batch.records).await.unwrap();
    assert_eq!(summary.succeeded, 3);

    // Stored payloads are opaque
    for record in engine.storage().snapshot(PASSWORDS_COLLECTION).unwrap() {
        assert!(!record.payload.contains("password-"));
    }

    let fetched: HashSet<String> = engine
        .fetch_all(&bundle)
        .await
        .unwrap()
        .into_iter()
        .map(|fields| {
            let record = CredentialRecord::try_from(fields).unwrap();
            serde_json::to_string(&record).unwrap()
        })
        .collect();
    let uploaded: HashSet<String> = batch
        .records
        .iter()
        .map(|r| serde_json::to_string(r).unwrap())
        .collect();
    assert_eq!(fetched, uploaded);
}

#[tokio::test]
async fn csv_import_then_remote_export() {
    let (master, _, storage) = account();
    let engine = ReconciliationEngine::new(storage, 2);
    let bundle = engine.open_collection(&master).await.unwrap();

    let mut csv = Vec::new();
    write_rows_csv(&mut csv, &rows()).unwrap();
    let source = read_rows_csv(csv.as_slice()).unwrap();
    assert_eq!(source.skipped, 0);
    let summary = engine.import_source(&bundle, &source).await.unwrap();
    assert_eq!(summary.succeeded, 3);

    let mut exported: Vec<RawLoginRow> = engine
        .fetch_all(&bundle)
        .await
        .unwrap()
        .into_iter()
        .map(|fields| RawLoginRow::from(&CredentialRecord::try_from(fields).unwrap()))
        .collect();
    exported.sort_by(|a, b| a.hostname.cmp(&b.hostname));

    let hosts: Vec<_> = exported.iter().map(|r| r.hostname.as_str()).collect();
    assert_eq!(
        hosts,
        vec![
            "http://c.example.org:8080",
            "https://a.example.com",
            "https://b.example.com/login"
        ]
    );
    assert_eq!(exported[1].form_submit_url, "https://a.example.com");
}

#[tokio::test]
async fn malformed_csv_row_is_skipped_not_fatal() {
    let (master, _, storage) = account();
    let engine = ReconciliationEngine::new(storage, 2);
    let bundle = engine.open_collection(&master).await.unwrap();

    let mut csv = Vec::new();
    write_rows_csv(&mut csv, &rows()[..1]).unwrap();
    csv.extend_from_slice(b"\"https://broken.example.com\"\n");
    let mut tail = Vec::new();
    write_rows_csv(&mut tail, &rows()[1..2]).unwrap();
    // drop the second header line
    let tail_start = tail.iter().position(|&b| b == b'\n').unwrap() + 1;
    csv.extend_from_slice(&tail[tail_start..]);

    let source = read_rows_csv(csv.as_slice()).unwrap();
    assert_eq!(source.rows.len(), 2);
    assert_eq!(source.skipped, 1);

    let summary = engine.import_source(&bundle, &source).await.unwrap();
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(engine.storage().ids(PASSWORDS_COLLECTION).unwrap().len(), 2);
}

#[tokio::test]
async fn prune_only_removes_recent_import() {
    let (master, _, storage) = account();
    let engine = ReconciliationEngine::new(storage, 4);
    let bundle = engine.open_collection(&master).await.unwrap();

    let now = 1_700_000_000_000;
    let day = 24 * 3_600_000;
    let old = normalize_batch(&rows()[..2], now - 3 * day);
    let recent = normalize_batch(&rows()[2..], now - 60_000);
    engine.import_records(&bundle, &old.records).await.unwrap();
    engine.import_records(&bundle, &recent.records).await.unwrap();

    let report = engine
        .prune(&bundle, age_cutoff(now, 24), &|_: &str| true)
        .await
        .unwrap();
    assert_eq!(report.kept, 2);
    assert_eq!(report.summary.succeeded, 1);

    let remaining: HashSet<String> = engine
        .storage()
        .ids(PASSWORDS_COLLECTION)
        .unwrap()
        .into_iter()
        .collect();
    let expected: HashSet<String> = old.records.iter().map(|r| r.id.clone()).collect();
    assert_eq!(remaining, expected);
}

#[tokio::test]
async fn wrong_master_secret_never_touches_collection() {
    let (_, _, storage) = account();
    let engine = ReconciliationEngine::new(storage, 4);
    let other = MasterSecret::new(vec![0xAA; 32]).unwrap();

    let err = engine.open_collection(&other).await.unwrap_err();
    assert!(matches!(err, PassbridgeError::Integrity(_)));
    assert!(engine.storage().ids(PASSWORDS_COLLECTION).unwrap().is_empty());
}
