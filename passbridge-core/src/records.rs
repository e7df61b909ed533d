//! Record codec: plaintext login rows, credential records, and their wire fields.
//!
//! A [`RawLoginRow`] is what sources produce and sinks consume. Import turns a
//! row into a [`CredentialRecord`] (validated, id and timestamps assigned),
//! whose wire fields are the cleartext of one `passwords` BSO.

use crate::crypto::Cleartext;
use crate::{PassbridgeError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use url::Url;
use uuid::Uuid;

/// A flat login row as exchanged with record sources and sinks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLoginRow {
    pub hostname: String,
    #[serde(rename = "formSubmitURL", default)]
    pub form_submit_url: String,
    #[serde(rename = "usernameField", default)]
    pub username_field: Option<String>,
    #[serde(rename = "passwordField", default)]
    pub password_field: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    pub password: String,
}

/// A saved login as stored in the `passwords` collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    pub id: String,
    pub hostname: String,
    #[serde(rename = "formSubmitURL")]
    pub form_submit_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub password: String,
    #[serde(default)]
    pub http_realm: Option<String>,
    pub time_created: i64,
    pub time_password_changed: i64,
}

impl From<&CredentialRecord> for RawLoginRow {
    fn from(record: &CredentialRecord) -> Self {
        Self {
            hostname: record.hostname.clone(),
            form_submit_url: record.form_submit_url.clone(),
            username_field: record.username_field.clone(),
            password_field: record.password_field.clone(),
            username: record.username.clone(),
            password: record.password.clone(),
        }
    }
}

impl TryFrom<Cleartext> for CredentialRecord {
    type Error = PassbridgeError;

    fn try_from(fields: Cleartext) -> Result<Self> {
        serde_json::from_value(Value::Object(fields))
            .map_err(|e| PassbridgeError::Validation(format!("not a login record: {}", e)))
    }
}

/// Wire fields of a record: every field, unchanged.
pub fn to_wire_fields(record: &CredentialRecord) -> Result<Cleartext> {
    match serde_json::to_value(record)? {
        Value::Object(map) => Ok(map),
        _ => Err(PassbridgeError::Serialization(
            "credential record did not serialize to an object".to_string(),
        )),
    }
}

/// Decrypted wire fields pass through untouched; callers pick what they need.
pub fn from_wire_fields(fields: Cleartext) -> Cleartext {
    fields
}

/// Read `timeCreated` from wire fields, if present and integral.
pub fn time_created(fields: &Cleartext) -> Option<i64> {
    fields.get("timeCreated").and_then(Value::as_i64)
}

/// Read the record `id` from wire fields.
pub fn record_id(fields: &Cleartext) -> Option<&str> {
    fields.get("id").and_then(Value::as_str)
}

/// Current time in epoch milliseconds.
pub fn current_time_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Generate a record id in the `{uuid}` form the password engine uses.
pub fn generate_record_id() -> String {
    format!("{{{}}}", Uuid::new_v4())
}

/// Validate and normalize one imported row.
///
/// - `hostname` must be an absolute URL with a host
/// - `password` must be non-empty
/// - trailing `/` is stripped from `hostname` and `formSubmitURL`
/// - an empty `formSubmitURL` falls back to the hostname
/// - `now_millis` stamps both `timeCreated` and `timePasswordChanged`
pub fn normalize_import_row(row: &RawLoginRow, now_millis: i64) -> Result<CredentialRecord> {
    match Url::parse(&row.hostname) {
        Ok(url) if url.host_str().is_some() => {}
        Ok(_) => {
            return Err(PassbridgeError::Validation(format!(
                "hostname {:?} has no host",
                row.hostname
            )))
        }
        Err(e) => {
            return Err(PassbridgeError::Validation(format!(
                "hostname {:?} is not a URL: {}",
                row.hostname, e
            )))
        }
    }
    if row.password.is_empty() {
        return Err(PassbridgeError::Validation(format!(
            "empty password for {}",
            row.hostname
        )));
    }

    let hostname = row.hostname.trim_end_matches('/').to_string();
    let form_submit_url = match row.form_submit_url.trim_end_matches('/') {
        "" => hostname.clone(),
        stripped => stripped.to_string(),
    };

    Ok(CredentialRecord {
        id: generate_record_id(),
        hostname,
        form_submit_url,
        username_field: row.username_field.clone(),
        password_field: row.password_field.clone(),
        username: row.username.clone(),
        password: row.password.clone(),
        http_realm: None,
        time_created: now_millis,
        time_password_changed: now_millis,
    })
}

/// Rows read from a record source, plus the number it could not parse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceRows {
    pub rows: Vec<RawLoginRow>,
    pub skipped: usize,
}

impl From<Vec<RawLoginRow>> for SourceRows {
    fn from(rows: Vec<RawLoginRow>) -> Self {
        Self { rows, skipped: 0 }
    }
}

/// Normalized batch plus the number of rows rejected by validation.
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    pub records: Vec<CredentialRecord>,
    pub skipped: usize,
}

/// Normalize a batch of rows with a single timestamp.
///
/// Invalid rows are logged and skipped; they never abort the batch.
pub fn normalize_batch(rows: &[RawLoginRow], now_millis: i64) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();
    for row in rows {
        match normalize_import_row(row, now_millis) {
            Ok(record) => batch.records.push(record),
            Err(e) => {
                warn!(hostname = %row.hostname, "Skipping row: {}", e);
                batch.skipped += 1;
            }
        }
    }
    batch
}
