//! Request authentication for the sync API.
//!
//! Two schemes are involved:
//! - the token server takes `Authorization: BrowserID <assertion>` plus
//!   `X-Client-State`
//! - storage requests are signed with Hawk using the id/key pair the token
//!   server returns

use crate::{PassbridgeError, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};
use url::Url;

type HmacSha256 = Hmac<Sha256>;

/// Hawk credentials issued by the token server.
#[derive(Clone)]
pub struct HawkCredentials {
    pub id: String,
    key: String,
}

impl HawkCredentials {
    pub fn new(id: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            key: key.into(),
        }
    }
}

impl std::fmt::Debug for HawkCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HawkCredentials")
            .field("id", &self.id)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Format the token server Authorization header value.
pub fn browserid_header(assertion: &str) -> String {
    format!("BrowserID {}", assertion)
}

/// Hash a request body the way Hawk expects.
///
/// ```text
/// base64(SHA256("hawk.1.payload\n{content-type}\n{body}\n"))
/// ```
pub fn payload_hash(content_type: &str, body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"hawk.1.payload\n");
    hasher.update(content_type.as_bytes());
    hasher.update(b"\n");
    hasher.update(body);
    hasher.update(b"\n");
    STANDARD.encode(hasher.finalize())
}

/// Format the normalized string-to-sign for a request.
///
/// ```text
/// hawk.1.header\n{TS}\n{NONCE}\n{METHOD}\n{PATH?QUERY}\n{HOST}\n{PORT}\n{HASH}\n{EXT}\n
/// ```
pub fn normalized_string(
    timestamp: i64,
    nonce: &str,
    method: &str,
    url: &Url,
    hash: Option<&str>,
) -> Result<String> {
    let host = url
        .host_str()
        .ok_or_else(|| PassbridgeError::Configuration(format!("URL {} has no host", url)))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| PassbridgeError::Configuration(format!("URL {} has no port", url)))?;
    let resource = match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    };

    Ok(format!(
        "hawk.1.header\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n\n",
        timestamp,
        nonce,
        method.to_ascii_uppercase(),
        resource,
        host.to_ascii_lowercase(),
        port,
        hash.unwrap_or(""),
    ))
}

/// Sign a request and return the complete `Authorization` header value.
///
/// `body` carries the content type and bytes when the request has one.
pub fn sign_request(
    credentials: &HawkCredentials,
    method: &str,
    url: &Url,
    body: Option<(&str, &[u8])>,
    timestamp: i64,
    nonce: &str,
) -> Result<String> {
    let hash = body.map(|(content_type, bytes)| payload_hash(content_type, bytes));
    let normalized = normalized_string(timestamp, nonce, method, url, hash.as_deref())?;

    let mut mac = HmacSha256::new_from_slice(credentials.key.as_bytes())
        .map_err(|e| PassbridgeError::Configuration(format!("Hawk key: {}", e)))?;
    mac.update(normalized.as_bytes());
    let mac = STANDARD.encode(mac.finalize().into_bytes());

    Ok(format_auth_header(
        &credentials.id,
        timestamp,
        nonce,
        hash.as_deref(),
        &mac,
    ))
}

/// Format the Hawk Authorization header value.
pub fn format_auth_header(
    id: &str,
    timestamp: i64,
    nonce: &str,
    hash: Option<&str>,
    mac: &str,
) -> String {
    match hash {
        Some(hash) => format!(
            r#"Hawk id="{}", ts="{}", nonce="{}", hash="{}", mac="{}""#,
            id, timestamp, nonce, hash, mac
        ),
        None => format!(
            r#"Hawk id="{}", ts="{}", nonce="{}", mac="{}""#,
            id, timestamp, nonce, mac
        ),
    }
}

/// Random nonce for a single request.
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}
